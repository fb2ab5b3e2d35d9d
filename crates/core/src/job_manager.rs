//! Thread-pool dispatcher for build jobs
//!
//! Worker threads block on child processes; the dispatcher feeds them
//! runnable jobs from the factory, at most `max_jobs` in flight, and is the
//! only writer of job outcomes into the cache. On the first failure no new
//! jobs start and in-flight work is drained before failure is reported.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::thread;

use crossbeam_channel::unbounded;
use tracing::{debug, error};

use crate::cache::MeiqueCache;
use crate::job::{CacheUpdate, Job, JobId};
use crate::job_factory::JobFactory;

pub struct JobManager {
    factory: JobFactory,
    max_jobs: usize,
}

impl JobManager {
    pub fn new(factory: JobFactory, max_jobs: usize) -> Self {
        assert!(max_jobs > 0);
        Self { factory, max_jobs }
    }

    /// Run every job the factory produces. Returns true when all jobs
    /// completed successfully.
    pub fn run(&mut self, cache: &Mutex<MeiqueCache>) -> bool {
        let total = self.factory.total();
        if total == 0 {
            return true;
        }
        debug!(total, max_jobs = self.max_jobs, "dispatching jobs");

        let (job_tx, job_rx) = unbounded::<(JobId, Box<dyn Job>)>();
        let (result_tx, result_rx) = unbounded::<(JobId, i32)>();

        thread::scope(|scope| {
            for _ in 0..self.max_jobs {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for (id, job) in job_rx.iter() {
                        let exit_code = job.run();
                        if result_tx.send((id, exit_code)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            let mut completed: HashSet<JobId> = HashSet::new();
            let mut pending_updates: HashMap<JobId, Vec<CacheUpdate>> = HashMap::new();
            let mut running = 0usize;
            let mut dispatched = 0usize;
            let mut failed = false;

            loop {
                if !failed {
                    while running < self.max_jobs {
                        match self.factory.take_runnable(&completed) {
                            Some(scheduled) => {
                                dispatched += 1;
                                println!("[{}/{}] {}", dispatched, total, scheduled.description);
                                pending_updates.insert(scheduled.id, scheduled.updates);
                                job_tx
                                    .send((scheduled.id, scheduled.job))
                                    .expect("workers alive while dispatching");
                                running += 1;
                            }
                            None => break,
                        }
                    }
                }

                if running == 0 {
                    if !failed && self.factory.pending() > 0 {
                        // Every remaining job waits on something that can no
                        // longer complete; the factory guarantees this cannot
                        // happen for well-formed graphs.
                        error!("job graph stalled with {} jobs pending", self.factory.pending());
                        failed = true;
                    }
                    break;
                }

                let (id, exit_code) = result_rx.recv().expect("workers outlive dispatch loop");
                running -= 1;

                if exit_code == 0 {
                    completed.insert(id);
                    if let Some(updates) = pending_updates.remove(&id) {
                        let mut cache = cache.lock().unwrap();
                        for update in &updates {
                            cache.apply(update);
                        }
                    }
                } else {
                    debug!(id, exit_code, "job failed");
                    failed = true;
                }
            }

            drop(job_tx);
            !failed && self.factory.pending() == 0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ScheduledJob;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Debug)]
    struct FakeJob {
        exit_code: i32,
        delay: Duration,
        order: Arc<Mutex<Vec<JobId>>>,
        id: JobId,
        started: Arc<AtomicUsize>,
    }

    impl Job for FakeJob {
        fn run(&self) -> i32 {
            self.started.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.order.lock().unwrap().push(self.id);
            self.exit_code
        }
    }

    struct Fixture {
        order: Arc<Mutex<Vec<JobId>>>,
        started: Arc<AtomicUsize>,
        jobs: Vec<ScheduledJob>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                order: Arc::new(Mutex::new(Vec::new())),
                started: Arc::new(AtomicUsize::new(0)),
                jobs: Vec::new(),
            }
        }

        fn job(&mut self, id: JobId, exit_code: i32, deps: Vec<JobId>) {
            let fake = FakeJob {
                exit_code,
                delay: Duration::from_millis(5),
                order: Arc::clone(&self.order),
                id,
                started: Arc::clone(&self.started),
            };
            let mut scheduled = ScheduledJob::new(id, format!("job {id}"), Box::new(fake));
            scheduled.deps = deps;
            self.jobs.push(scheduled);
        }

        fn run(self, max_jobs: usize) -> (bool, Vec<JobId>, usize) {
            let dir = TempDir::new().unwrap();
            let mut cache = MeiqueCache::new_at(dir.path().join("meiquecache.lua"));
            cache.set_auto_save(false);
            let cache = Mutex::new(cache);

            let mut manager = JobManager::new(JobFactory::from_jobs(self.jobs), max_jobs);
            let ok = manager.run(&cache);
            let order = self.order.lock().unwrap().clone();
            (ok, order, self.started.load(Ordering::SeqCst))
        }
    }

    #[test]
    fn empty_factory_succeeds() {
        let fixture = Fixture::new();
        let (ok, order, _) = fixture.run(4);
        assert!(ok);
        assert!(order.is_empty());
    }

    #[test]
    fn runs_all_independent_jobs() {
        let mut fixture = Fixture::new();
        for id in 0..8 {
            fixture.job(id, 0, vec![]);
        }
        let (ok, order, started) = fixture.run(3);
        assert!(ok);
        assert_eq!(order.len(), 8);
        assert_eq!(started, 8);
    }

    #[test]
    fn dependencies_complete_first() {
        let mut fixture = Fixture::new();
        fixture.job(0, 0, vec![]);
        fixture.job(1, 0, vec![]);
        fixture.job(2, 0, vec![0, 1]); // the "link" job
        let (ok, order, _) = fixture.run(4);
        assert!(ok);
        assert_eq!(order.len(), 3);
        assert_eq!(*order.last().unwrap(), 2);
    }

    #[test]
    fn failure_stops_new_dispatch_and_reports() {
        let mut fixture = Fixture::new();
        fixture.job(0, 1, vec![]);
        fixture.job(1, 0, vec![0]); // depends on the failing job
        let (ok, order, started) = fixture.run(1);
        assert!(!ok);
        assert_eq!(order, vec![0]);
        assert_eq!(started, 1);
    }

    #[test]
    fn failure_in_one_chain_fails_the_build() {
        let mut fixture = Fixture::new();
        fixture.job(0, 0, vec![]);
        fixture.job(1, 2, vec![]);
        fixture.job(2, 0, vec![0]);
        let (ok, _, _) = fixture.run(1);
        assert!(!ok);
    }

    #[test]
    fn single_worker_serializes() {
        let mut fixture = Fixture::new();
        fixture.job(0, 0, vec![]);
        fixture.job(1, 0, vec![]);
        fixture.job(2, 0, vec![]);
        let (ok, order, _) = fixture.run(1);
        assert!(ok);
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn successful_jobs_commit_cache_updates() {
        let dir = TempDir::new().unwrap();
        let mut cache = MeiqueCache::new_at(dir.path().join("meiquecache.lua"));
        cache.set_auto_save(false);
        let cache = Mutex::new(cache);

        let order = Arc::new(Mutex::new(Vec::new()));
        let started = Arc::new(AtomicUsize::new(0));

        let ok_job = FakeJob {
            exit_code: 0,
            delay: Duration::ZERO,
            order: Arc::clone(&order),
            id: 0,
            started: Arc::clone(&started),
        };
        let mut ok_scheduled = ScheduledJob::new(0, "ok".into(), Box::new(ok_job));
        ok_scheduled.updates.push(CacheUpdate::FileHash {
            source: "/src/a.cpp".into(),
            hash: "aa".into(),
        });

        let bad_job = FakeJob {
            exit_code: 1,
            delay: Duration::ZERO,
            order: Arc::clone(&order),
            id: 1,
            started: Arc::clone(&started),
        };
        let mut bad_scheduled = ScheduledJob::new(1, "bad".into(), Box::new(bad_job));
        bad_scheduled.deps = vec![0];
        bad_scheduled.updates.push(CacheUpdate::FileHash {
            source: "/src/b.cpp".into(),
            hash: "bb".into(),
        });

        let factory = JobFactory::from_jobs(vec![ok_scheduled, bad_scheduled]);
        let mut manager = JobManager::new(factory, 2);
        assert!(!manager.run(&cache));

        let cache = cache.lock().unwrap();
        assert_eq!(cache.file_hash("/src/a.cpp"), "aa");
        assert_eq!(cache.file_hash("/src/b.cpp"), "");
    }
}

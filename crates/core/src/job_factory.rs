//! Turning targets into a dependency-ordered stream of jobs

use std::collections::{HashMap, HashSet};
use std::path::Path;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::cache::MeiqueCache;
use crate::compiler::Compiler;
use crate::job::{JobId, ScheduledJob};
use crate::script::MeiqueScript;
use crate::target::Target;
use crate::{Error, Result};

/// Produces the jobs of one build invocation and hands them to the manager
/// one at a time as their dependencies become runnable.
#[derive(Debug)]
pub struct JobFactory {
    jobs: Vec<ScheduledJob>,
    total: usize,
}

impl JobFactory {
    /// Build jobs for the chosen targets (all targets when none are named)
    /// and their transitive dependencies.
    pub fn new(script: &MeiqueScript, chosen: &[String]) -> Result<Self> {
        let compiler = script.compiler()?;
        let cache = script.cache().lock().unwrap();
        Self::for_targets(
            script.targets(),
            chosen,
            &cache,
            compiler.as_ref(),
            script.build_dir(),
        )
    }

    pub(crate) fn for_targets(
        targets: &[Target],
        chosen: &[String],
        cache: &MeiqueCache,
        compiler: &dyn Compiler,
        build_dir: &Path,
    ) -> Result<Self> {
        let selected = select_targets(targets, chosen)?;
        let ordered = dependency_order(&selected)?;

        let mut jobs: Vec<ScheduledJob> = Vec::new();
        let mut terminal_job: HashMap<&str, JobId> = HashMap::new();
        let mut next_id: JobId = 0;

        for target in ordered {
            let mut target_jobs = target.create_jobs(cache, compiler, build_dir, &mut next_id)?;

            // A target's jobs start only after every declared dependency
            // has fully completed.
            let upstream: Vec<JobId> = target
                .dependencies
                .iter()
                .filter_map(|dep| terminal_job.get(dep.as_str()).copied())
                .collect();
            for job in &mut target_jobs {
                job.deps.extend(upstream.iter().copied());
            }

            if let Some(last) = target_jobs.last() {
                terminal_job.insert(target.name.as_str(), last.id);
            }
            jobs.extend(target_jobs);
        }

        debug!(jobs = jobs.len(), "job graph built");
        let total = jobs.len();
        Ok(Self { jobs, total })
    }

    /// Wrap pre-built jobs; used by the manager's own tests.
    #[cfg(test)]
    pub(crate) fn from_jobs(jobs: Vec<ScheduledJob>) -> Self {
        let total = jobs.len();
        Self { jobs, total }
    }

    /// Total number of jobs this invocation will run.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Jobs not yet handed out.
    pub fn pending(&self) -> usize {
        self.jobs.len()
    }

    /// Hand out the next job whose dependencies have all completed.
    pub fn take_runnable(&mut self, completed: &HashSet<JobId>) -> Option<ScheduledJob> {
        let position = self.jobs.iter().position(|job| job.is_runnable(completed))?;
        Some(self.jobs.remove(position))
    }
}

/// Resolve the chosen names to targets plus their transitive dependencies.
fn select_targets<'a>(targets: &'a [Target], chosen: &[String]) -> Result<Vec<&'a Target>> {
    if chosen.is_empty() {
        return Ok(targets.iter().collect());
    }

    let by_name: HashMap<&str, &Target> = targets.iter().map(|t| (t.name.as_str(), t)).collect();
    let mut selected: Vec<&Target> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: Vec<&str> = Vec::new();

    for name in chosen {
        if !by_name.contains_key(name.as_str()) {
            return Err(Error::Argument(format!("Unknown target: {name}")));
        }
        queue.push(name.as_str());
    }

    while let Some(name) = queue.pop() {
        if !seen.insert(name) {
            continue;
        }
        let target = by_name[name];
        selected.push(target);
        for dep in &target.dependencies {
            match by_name.get(dep.as_str()) {
                Some(_) => queue.push(dep.as_str()),
                None => {
                    return Err(Error::Config(format!(
                        "Target '{}' depends on unknown target '{dep}'.",
                        target.name
                    )))
                }
            }
        }
    }

    Ok(selected)
}

/// Order targets so that dependencies come before dependents.
fn dependency_order<'a>(selected: &[&'a Target]) -> Result<Vec<&'a Target>> {
    let mut graph: DiGraph<&Target, ()> = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

    for target in selected {
        let idx = graph.add_node(*target);
        nodes.insert(target.name.as_str(), idx);
    }
    for target in selected {
        let dependent = nodes[target.name.as_str()];
        for dep in &target.dependencies {
            if let Some(&dependency) = nodes.get(dep.as_str()) {
                graph.add_edge(dependency, dependent, ());
            }
        }
    }

    let sorted = toposort(&graph, None)
        .map_err(|_| Error::Config("Cyclic dependency between targets.".to_string()))?;
    Ok(sorted.into_iter().map(|idx| graph[idx]).collect())
}

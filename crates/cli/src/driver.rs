//! The configure/build state machine
//!
//! A table-driven machine over small operations: each state runs a member
//! routine which either yields a transition label or exits with a code.
//! Terminal states are the build actions. Any error aborts the machine and
//! surfaces as a non-zero process exit in `main`.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use console::style;
use meique_core::{
    install_interrupt_hook, ConfigureOptions, Error, JobFactory, JobManager, MeiqueScript, Result,
    Target, TargetType, MEIQUE_CACHE,
};
use meique_platform as os;
use meique_platform::ExecMode;
use regex::Regex;
use tracing::debug;

use crate::args::Args;

const MEIQUE_TEST_LOG: &str = "meiquetest.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    CheckArgs,
    LookForCache,
    LookForProjectFile,
    ConfigureProject,
    GetBuildAction,
    ShowHelp,
    ShowVersion,
    DumpProject,
    BuildTargets,
    CleanTargets,
    InstallTargets,
    UninstallTargets,
    TestTargets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    HasHelpArg,
    HasVersionArg,
    DumpProject,
    NormalArgs,
    Found,
    NotFound,
    Ok,
    BuildAction,
    CleanAction,
    InstallAction,
    UninstallAction,
    TestAction,
}

const TRANSITIONS: &[(State, Label, State)] = &[
    (State::CheckArgs, Label::HasHelpArg, State::ShowHelp),
    (State::CheckArgs, Label::HasVersionArg, State::ShowVersion),
    (State::CheckArgs, Label::DumpProject, State::DumpProject),
    (State::CheckArgs, Label::NormalArgs, State::LookForCache),
    (State::LookForCache, Label::Found, State::GetBuildAction),
    (State::LookForCache, Label::NotFound, State::LookForProjectFile),
    (State::LookForProjectFile, Label::Found, State::ConfigureProject),
    (State::LookForProjectFile, Label::NotFound, State::ShowHelp),
    (State::ConfigureProject, Label::Ok, State::GetBuildAction),
    (State::GetBuildAction, Label::BuildAction, State::BuildTargets),
    (State::GetBuildAction, Label::CleanAction, State::CleanTargets),
    (State::GetBuildAction, Label::InstallAction, State::InstallTargets),
    (State::GetBuildAction, Label::UninstallAction, State::UninstallTargets),
    (State::GetBuildAction, Label::TestAction, State::TestTargets),
];

enum Step {
    Next(Label),
    Exit(i32),
}

/// The driver: owns the parsed arguments and the evaluated script.
pub struct Meique {
    args: Args,
    script: Option<MeiqueScript>,
    first_run: bool,
    build_dir: PathBuf,
}

impl Meique {
    pub fn new(args: Args) -> Self {
        Self {
            args,
            script: None,
            first_run: false,
            build_dir: PathBuf::from("."),
        }
    }

    pub fn exec(&mut self) -> Result<i32> {
        let mut state = State::CheckArgs;
        loop {
            debug!(?state, "state machine");
            let step = self.run_state(state)?;
            match step {
                Step::Exit(code) => return Ok(code),
                Step::Next(label) => {
                    state = TRANSITIONS
                        .iter()
                        .find(|(from, on, _)| *from == state && *on == label)
                        .map(|(_, _, to)| *to)
                        .unwrap_or_else(|| {
                            unreachable!("no transition from {state:?} on {label:?}")
                        });
                }
            }
        }
    }

    fn run_state(&mut self, state: State) -> Result<Step> {
        match state {
            State::CheckArgs => self.check_args(),
            State::LookForCache => self.look_for_cache(),
            State::LookForProjectFile => self.look_for_project_file(),
            State::ConfigureProject => self.configure_project(),
            State::GetBuildAction => self.get_build_action(),
            State::ShowHelp => self.show_help(),
            State::ShowVersion => self.show_version(),
            State::DumpProject => self.dump_project(),
            State::BuildTargets => self.build_targets().map(Step::Exit),
            State::CleanTargets => self.clean_targets().map(Step::Exit),
            State::InstallTargets => self.install_targets().map(Step::Exit),
            State::UninstallTargets => self.uninstall_targets().map(Step::Exit),
            State::TestTargets => self.test_targets().map(Step::Exit),
        }
    }

    fn check_args(&mut self) -> Result<Step> {
        if self.args.no_color {
            console::set_colors_enabled(false);
        }
        if self.args.version {
            return Ok(Step::Next(Label::HasVersionArg));
        }
        if self.args.help {
            return Ok(Step::Next(Label::HasHelpArg));
        }
        if self.args.dump_project {
            return Ok(Step::Next(Label::DumpProject));
        }
        Ok(Step::Next(Label::NormalArgs))
    }

    fn look_for_cache(&mut self) -> Result<Step> {
        if os::file_exists(self.build_dir.join(MEIQUE_CACHE)) {
            Ok(Step::Next(Label::Found))
        } else {
            Ok(Step::Next(Label::NotFound))
        }
    }

    fn look_for_project_file(&mut self) -> Result<Step> {
        match self.args.free_args.first() {
            Some(dir) if os::file_exists(format!("{dir}/meique.lua")) => {
                Ok(Step::Next(Label::Found))
            }
            _ => Ok(Step::Next(Label::NotFound)),
        }
    }

    fn configure_project(&mut self) -> Result<Step> {
        let options = ConfigureOptions {
            build_type: self.args.build_type()?,
            install_prefix: self.args.install_prefix.clone(),
            user_options: self.args.user_options()?,
        };
        let project_dir = self.args.free_args[0].clone();
        let mut script = MeiqueScript::configure(&project_dir, &options, &self.build_dir)?;
        self.first_run = true;

        install_interrupt_hook(Arc::clone(script.cache()))?;

        if let Err(e) = script.exec() {
            script.cache().lock().unwrap().set_auto_save(false);
            return Err(e);
        }

        self.print_options_summary(&script);
        println!("-- Done!");
        script.cache().lock().unwrap().save()?;
        self.script = Some(script);

        if self.args.stop_after_configure {
            Ok(Step::Exit(0))
        } else {
            Ok(Step::Next(Label::Ok))
        }
    }

    fn get_build_action(&mut self) -> Result<Step> {
        if self.script.is_none() {
            let mut script = MeiqueScript::open(&self.build_dir)?;
            install_interrupt_hook(Arc::clone(script.cache()))?;
            script.exec()?;
            self.script = Some(script);
        }

        let label = if self.args.clean {
            Label::CleanAction
        } else if self.args.install {
            Label::InstallAction
        } else if self.args.test {
            Label::TestAction
        } else if self.args.uninstall {
            Label::UninstallAction
        } else {
            Label::BuildAction
        };
        Ok(Step::Next(label))
    }

    fn show_version(&self) -> Result<Step> {
        println!("Meique version {}", env!("CARGO_PKG_VERSION"));
        Ok(Step::Exit(0))
    }

    fn show_help(&self) -> Result<Step> {
        println!("Usage: meique OPTIONS TARGET\n");
        println!("When in configure mode, TARGET is the directory of meique.lua file.");
        println!("When in build mode, TARGET is the target name.\n");
        println!("General options:");
        println!(" --help                             Print this message and exit.");
        println!(" --version                          Print the version number of meique and exit.");
        println!("Config mode options for this project:");
        println!(" --debug                            Create a debug build.");
        println!(" --release                          Create a release build.");
        println!(" --install-prefix=PATH              Install directory used by install, this directory");
        println!("                                    is prepended onto all install directories.");
        println!(" -o NAME=VALUE                      Set a project option.");
        println!("Build mode options:");
        println!(" -jN                                Allow N jobs at once, default to number of");
        println!("                                    cores + 1.");
        println!(" -d                                 Disable colored output");
        println!(" -s                                 Stop after configure step.");
        println!(" -c [target [, target2 [, ...]]]    Clean a specific target or all targets if");
        println!("                                    none was specified.");
        println!(" -i [target [, target2 [, ...]]]    Install a specific target or all targets if");
        println!("                                    none was specified.");
        println!(" -u [target [, target2 [, ...]]]    Uninstall a specific target or all targets if");
        println!("                                    none was specified.");
        println!(" -t [regex]                         Run tests matching a regular expression, all");
        println!("                                    tests if none was specified.");
        Ok(Step::Exit(0))
    }

    fn dump_project(&mut self) -> Result<Step> {
        if !os::file_exists(self.build_dir.join(MEIQUE_CACHE)) {
            return Err(Error::Config(format!("{MEIQUE_CACHE} not found.")));
        }
        let mut script = MeiqueScript::open(&self.build_dir)?;
        script.exec()?;

        for target in script.targets() {
            let kind = match target.target_type {
                TargetType::Executable => "executable",
                TargetType::StaticLibrary => "static_library",
                TargetType::SharedLibrary => "shared_library",
                TargetType::Custom => "custom",
            };
            println!("Target: {}", target.name);
            println!("  type: {kind}");
            println!("  directory: {}", target.directory);
            println!("  files: {}", target.files.join(" "));
        }
        Ok(Step::Exit(0))
    }

    fn print_options_summary(&self, script: &MeiqueScript) {
        let cache = script.cache().lock().unwrap();
        if cache.user_options().is_empty() {
            return;
        }
        println!("-- Project options:");
        for (name, value) in cache.user_options() {
            if name.is_empty() {
                continue;
            }
            println!("    {name:<33}{value}");
        }
    }

    /// Free args are target names; during a configure run the first one was
    /// the project directory.
    fn chosen_target_names(&self) -> Vec<String> {
        let skip = usize::from(self.first_run);
        self.args.free_args.iter().skip(skip).cloned().collect()
    }

    fn script(&self) -> &MeiqueScript {
        self.script.as_ref().expect("script evaluated before actions")
    }

    fn job_limit(&self) -> Result<usize> {
        match self.args.jobs {
            Some(n) if n <= 0 => Err(Error::Argument(
                "You should use a number greater than zero in -j option.".to_string(),
            )),
            Some(n) => Ok(n as usize),
            None => Ok(os::number_of_cpu_cores() + 1),
        }
    }

    fn build_targets(&mut self) -> Result<i32> {
        let names = self.chosen_target_names();
        self.build(&names)
    }

    fn build(&mut self, chosen: &[String]) -> Result<i32> {
        let job_limit = self.job_limit()?;
        let script = self.script();

        let factory = JobFactory::new(script, chosen)?;
        let mut manager = JobManager::new(factory, job_limit);
        let ok = manager.run(script.cache());

        script.cache().lock().unwrap().save()?;
        if !ok {
            return Err(Error::Build("Build error.".to_string()));
        }
        Ok(0)
    }

    /// Chosen targets resolved against the project, all when none named.
    fn selected_targets(&self) -> Result<Vec<&Target>> {
        let script = self.script();
        let names = self.chosen_target_names();
        if names.is_empty() {
            return Ok(script.targets().iter().collect());
        }
        names
            .iter()
            .map(|name| {
                script
                    .target(name)
                    .ok_or_else(|| Error::Argument(format!("Unknown target: {name}")))
            })
            .collect()
    }

    fn clean_targets(&mut self) -> Result<i32> {
        let script = self.script();
        let compiler = script.compiler()?;
        let targets = self.selected_targets()?;

        {
            let mut cache = script.cache().lock().unwrap();
            for target in &targets {
                println!("Cleaning {}", target.name);
                target.clean(&mut cache, compiler.as_ref(), &self.build_dir)?;
            }
            cache.save()?;
        }
        Ok(0)
    }

    fn install_targets(&mut self) -> Result<i32> {
        self.build_targets()?;
        debug!("build finished, installing");
        let script = self.script();
        let compiler = script.compiler()?;
        let cache = script.cache().lock().unwrap();
        for target in self.selected_targets()? {
            target.install(&cache, compiler.as_ref(), &self.build_dir)?;
        }
        Ok(0)
    }

    fn uninstall_targets(&mut self) -> Result<i32> {
        let script = self.script();
        let compiler = script.compiler()?;
        let cache = script.cache().lock().unwrap();
        for target in self.selected_targets()? {
            target.uninstall(&cache, compiler.as_ref())?;
        }
        Ok(0)
    }

    fn test_targets(&mut self) -> Result<i32> {
        // The free argument is a test-name regex here, not a target list.
        self.build(&[])?;
        let script = self.script();

        let names = self.chosen_target_names();
        let filter = match names.first() {
            Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
                Error::Argument(format!("Invalid test name regex '{pattern}': {e}"))
            })?),
            None => None,
        };

        let tests: Vec<_> = script
            .tests()
            .into_iter()
            .filter(|t| filter.as_ref().map_or(true, |re| re.is_match(&t.name)))
            .collect();
        if tests.is_empty() {
            println!("No tests to run :-(");
            return Ok(0);
        }

        let mut log = std::fs::File::create(self.build_dir.join(MEIQUE_TEST_LOG))?;
        let total = tests.len();
        let mut failures = 0;

        for (i, test) in tests.iter().enumerate() {
            let test_dir = self.build_dir.join(&test.working_dir);
            os::mkdir(&test_dir)?;

            let dots = ".".repeat(48usize.saturating_sub(test.name.len()));
            print!("{:>3}/{}: {} {} ", i + 1, total, test.name, dots);
            let _ = std::io::stdout().flush();

            let start = os::time_in_millis();
            let outcome = os::exec(
                "sh",
                &["-c", test.command.as_str()],
                Some(&test_dir),
                ExecMode::MergeStderr,
            );
            let elapsed = (os::time_in_millis() - start) as f64 / 1000.0;

            let (passed, output) = match outcome {
                Ok(result) => (result.success(), result.output),
                Err(e) => (false, e.to_string()),
            };
            if passed {
                println!("{} {elapsed:.2}s", style("Passed").green());
            } else {
                failures += 1;
                println!("{} {elapsed:.2}s", style("FAILED").red());
            }

            writeln!(log, ":: Running test: {}", test.name)?;
            log.write_all(output.as_bytes())?;
        }

        if failures > 0 {
            println!("{failures} of {total} tests failed, see {MEIQUE_TEST_LOG}.");
        }
        Ok(0)
    }
}

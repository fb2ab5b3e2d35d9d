//! Command-line arguments
//!
//! Free arguments mean different things per mode: the project directory
//! during configure, target names during build, a test-name regex for the
//! test action. Auto help/version are disabled because the state machine
//! owns those printers.

use clap::Parser;
use meique_core::{BuildType, Error, Result};

#[derive(Parser, Debug, Default)]
#[command(name = "meique", disable_help_flag = true, disable_version_flag = true)]
pub struct Args {
    /// Print usage and exit.
    #[arg(long)]
    pub help: bool,

    /// Print the version number and exit.
    #[arg(long)]
    pub version: bool,

    /// Dump the configured project, for IDE integration.
    #[arg(long = "meique-dump-project")]
    pub dump_project: bool,

    /// Create a debug build.
    #[arg(long)]
    pub debug: bool,

    /// Create a release build.
    #[arg(long)]
    pub release: bool,

    /// Directory prepended onto all install directories.
    #[arg(long = "install-prefix", value_name = "PATH")]
    pub install_prefix: Option<String>,

    /// Disable colored output.
    #[arg(short = 'd')]
    pub no_color: bool,

    /// Stop after the configure step.
    #[arg(short = 's')]
    pub stop_after_configure: bool,

    /// Allow N jobs at once, default to number of cores + 1.
    #[arg(short = 'j', value_name = "N")]
    pub jobs: Option<i64>,

    /// Clean chosen targets, or all targets.
    #[arg(short = 'c')]
    pub clean: bool,

    /// Install chosen targets, or all targets.
    #[arg(short = 'i')]
    pub install: bool,

    /// Uninstall chosen targets, or all targets.
    #[arg(short = 'u')]
    pub uninstall: bool,

    /// Run tests matching a regular expression, or all tests.
    #[arg(short = 't')]
    pub test: bool,

    /// Set a project option at configure time.
    #[arg(short = 'o', long = "option", value_name = "NAME=VALUE")]
    pub options: Vec<String>,

    /// Project directory (configure) or target names (build).
    #[arg(value_name = "TARGET")]
    pub free_args: Vec<String>,
}

impl Args {
    pub fn build_type(&self) -> Result<BuildType> {
        if self.debug && self.release {
            return Err(Error::Argument(
                "--debug and --release are mutually exclusive.".to_string(),
            ));
        }
        Ok(if self.debug {
            BuildType::Debug
        } else {
            BuildType::Release
        })
    }

    /// `-o NAME=VALUE` pairs, parsed.
    pub fn user_options(&self) -> Result<Vec<(String, String)>> {
        self.options
            .iter()
            .map(|raw| {
                raw.split_once('=')
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .ok_or_else(|| {
                        Error::Argument(format!("Malformed option '{raw}', expected NAME=VALUE."))
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("meique").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn free_args_collect() {
        let args = parse(&["hello", "world"]);
        assert_eq!(args.free_args, vec!["hello", "world"]);
    }

    #[test]
    fn attached_job_count() {
        assert_eq!(parse(&["-j4"]).jobs, Some(4));
        assert_eq!(parse(&["-j", "8"]).jobs, Some(8));
        assert_eq!(parse(&[]).jobs, None);
    }

    #[test]
    fn build_type_selection() {
        assert_eq!(parse(&[]).build_type().unwrap(), BuildType::Release);
        assert_eq!(parse(&["--debug"]).build_type().unwrap(), BuildType::Debug);
        assert_eq!(
            parse(&["--release"]).build_type().unwrap(),
            BuildType::Release
        );
        assert!(parse(&["--debug", "--release"]).build_type().is_err());
    }

    #[test]
    fn action_flags() {
        let args = parse(&["-c", "hello"]);
        assert!(args.clean);
        assert_eq!(args.free_args, vec!["hello"]);
        assert!(parse(&["-t"]).test);
        assert!(parse(&["-i"]).install);
        assert!(parse(&["-u"]).uninstall);
    }

    #[test]
    fn user_options_parse() {
        let args = parse(&["-o", "renderer=opengl", "--option", "x=1"]);
        assert_eq!(
            args.user_options().unwrap(),
            vec![
                ("renderer".to_string(), "opengl".to_string()),
                ("x".to_string(), "1".to_string())
            ]
        );
        assert!(parse(&["-o", "broken"]).user_options().is_err());
    }
}

//! The GCC toolchain driver

use meique_platform as os;
use meique_platform::ExecMode;
use tracing::debug;

use super::{Compiler, CompilerOptions, Language, LinkType, LinkerOptions};
use crate::job::OsCommandJob;
use crate::{Error, Result};

/// POSIX-style GCC driver: `gcc`/`g++` for compiling and linking,
/// `ar` for archiving static libraries.
#[derive(Debug)]
pub struct Gcc {
    available: bool,
    full_name: String,
    version: String,
    default_include_dirs: Vec<String>,
}

impl Gcc {
    /// Probe the toolchain: `--version` for the banner, `-dumpversion` and
    /// `-dumpmachine` for the implicit include directory layout.
    pub fn probe() -> Self {
        let banner = match os::exec("g++", &["--version"], None, ExecMode::MergeStderr) {
            Ok(result) if result.success() => result.output,
            _ => {
                debug!("g++ not found, gcc backend unavailable");
                return Self::unavailable();
            }
        };
        let full_name = banner.lines().next().unwrap_or_default().to_string();

        let version = probe_value("-dumpversion");
        let machine = probe_value("-dumpmachine");

        Self::from_probe(full_name, version, machine)
    }

    fn from_probe(full_name: String, version: String, machine: String) -> Self {
        let default_include_dirs = vec![
            "/usr/local/include/".to_string(),
            "/usr/include/".to_string(),
            format!("/usr/include/c++/{version}/"),
            format!("/usr/include/c++/{version}/{machine}/"),
            format!("/usr/lib/gcc/{machine}/{version}/include/"),
        ];
        Self {
            available: true,
            full_name,
            version,
            default_include_dirs,
        }
    }

    fn unavailable() -> Self {
        Self {
            available: false,
            full_name: String::new(),
            version: String::new(),
            default_include_dirs: Vec::new(),
        }
    }

    fn driver_for(&self, language: Language) -> &'static str {
        match language {
            Language::C => "gcc",
            Language::CPlusPlus => "g++",
        }
    }
}

#[cfg(test)]
impl Gcc {
    /// Backend with canned probe results, so tests can assemble commands
    /// without a live toolchain.
    pub(crate) fn for_tests() -> Self {
        Self::from_probe(
            "g++ (GCC) 13.2.0".to_string(),
            "13".to_string(),
            "x86_64-pc-linux-gnu".to_string(),
        )
    }
}

fn probe_value(flag: &str) -> String {
    os::exec("g++", &[flag], None, ExecMode::MergeStderr)
        .map(|r| r.output.trim().to_string())
        .unwrap_or_default()
}

impl Compiler for Gcc {
    fn is_available(&self) -> bool {
        self.available
    }

    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn default_include_dirs(&self) -> &[String] {
        &self.default_include_dirs
    }

    fn compile(
        &self,
        source: &str,
        output: &str,
        options: &CompilerOptions,
    ) -> Result<OsCommandJob> {
        let language = Language::from_source_path(source).ok_or_else(|| {
            Error::Config(format!("Unknown programming language used for {source}"))
        })?;

        let mut args = vec![
            "-c".to_string(),
            source.to_string(),
            "-o".to_string(),
            output.to_string(),
        ];
        if options.compile_for_library {
            args.push("-fpic".to_string());
        }
        if options.debug_info {
            args.push("-ggdb".to_string());
        }
        args.extend(options.custom_flags.iter().cloned());
        for path in &options.include_paths {
            args.push(format!("-I{path}"));
        }
        for define in &options.defines {
            args.push(format!("-D{define}"));
        }

        Ok(OsCommandJob::new(self.driver_for(language), args))
    }

    fn link(
        &self,
        output: &str,
        objects: &[String],
        options: &LinkerOptions,
    ) -> Result<OsCommandJob> {
        if options.link_type == LinkType::StaticLibrary {
            let mut args = vec!["-rcs".to_string(), output.to_string()];
            args.extend(objects.iter().cloned());
            return Ok(OsCommandJob::new("ar", args));
        }

        let mut args = Vec::new();
        if options.link_type == LinkType::SharedLibrary {
            args.push("-shared".to_string());
            args.push("-fpic".to_string());
            args.push(format!("-Wl,-soname={output}"));
        }
        args.extend(objects.iter().cloned());
        args.push("-o".to_string());
        args.push(output.to_string());
        args.extend(options.custom_flags.iter().cloned());
        for path in &options.library_paths {
            args.push(format!("-L{path}"));
        }
        for library in &options.libraries {
            args.push(format!("-l{library}"));
        }
        args.extend(options.static_libraries.iter().cloned());

        Ok(OsCommandJob::new(self.driver_for(options.language), args))
    }

    fn name_for_executable(&self, name: &str) -> String {
        name.to_string()
    }

    fn name_for_static_library(&self, name: &str) -> String {
        format!("lib{name}.a")
    }

    fn name_for_shared_library(&self, name: &str) -> String {
        format!("lib{name}.so")
    }
}

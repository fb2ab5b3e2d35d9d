//! In-memory representation of buildable targets
//!
//! Targets are reconstructed from the project description on every run;
//! only their hashes persist. The per-target build routine decides which
//! sources are stale, emits compile jobs for them, and a link job when
//! anything (including a missing artifact) requires it.

use std::path::{Path, PathBuf};

use meique_platform as os;
use tracing::debug;

use crate::cache::{BuildType, MeiqueCache};
use crate::compiler::{Compiler, CompilerOptions, Language, LinkType, LinkerOptions};
use crate::hash::file_hash;
use crate::job::{CacheUpdate, JobId, OsCommandJob, ScheduledJob};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Executable,
    StaticLibrary,
    SharedLibrary,
    Custom,
}

/// A test attached to a target: run `command` in `working_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRule {
    pub name: String,
    pub command: String,
    pub working_dir: String,
}

/// A named buildable artifact and everything resolved for it
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    /// Directory relative to the source root, empty or ending in `/`.
    pub directory: String,
    pub target_type: TargetType,
    /// Source files relative to `directory`.
    pub files: Vec<String>,
    /// Referenced packages, by name; attributes live in the cache.
    pub packages: Vec<String>,
    /// Names of targets that must be built before this one.
    pub dependencies: Vec<String>,
    pub tests: Vec<TestRule>,
    /// Install destinations relative to the install prefix.
    pub install_dirs: Vec<String>,
    pub custom_flags: Vec<String>,
    pub custom_linker_flags: Vec<String>,
    /// For custom targets: the command to run instead of compile+link.
    pub custom_command: Option<String>,
}

impl Target {
    pub fn new(name: &str, target_type: TargetType) -> Self {
        Self {
            name: name.to_string(),
            directory: String::new(),
            target_type,
            files: Vec::new(),
            packages: Vec::new(),
            dependencies: Vec::new(),
            tests: Vec::new(),
            install_dirs: Vec::new(),
            custom_flags: Vec::new(),
            custom_linker_flags: Vec::new(),
            custom_command: None,
        }
    }

    /// Link-time language: C++ as soon as any source is C++.
    pub fn language(&self) -> Language {
        if self
            .files
            .iter()
            .any(|f| Language::from_source_path(f) == Some(Language::CPlusPlus))
        {
            Language::CPlusPlus
        } else {
            Language::C
        }
    }

    pub fn artifact_name(&self, compiler: &dyn Compiler) -> String {
        match self.target_type {
            TargetType::Executable => compiler.name_for_executable(&self.name),
            TargetType::StaticLibrary => compiler.name_for_static_library(&self.name),
            TargetType::SharedLibrary => compiler.name_for_shared_library(&self.name),
            TargetType::Custom => self.name.clone(),
        }
    }

    /// Derive the effective options once per run, folding in every
    /// referenced package's attributes.
    pub(crate) fn build_options(&self, cache: &MeiqueCache) -> (CompilerOptions, LinkerOptions) {
        let link_type = match self.target_type {
            TargetType::StaticLibrary => LinkType::StaticLibrary,
            TargetType::SharedLibrary => LinkType::SharedLibrary,
            TargetType::Executable | TargetType::Custom => LinkType::Executable,
        };

        let mut compiler_options = CompilerOptions::default();
        compiler_options.debug_info = cache.build_type() == BuildType::Debug;
        compiler_options.compile_for_library = matches!(
            self.target_type,
            TargetType::StaticLibrary | TargetType::SharedLibrary
        );
        let mut linker_options = LinkerOptions::new(link_type, self.language());

        for flags in &self.custom_flags {
            compiler_options.add_custom_flags(flags);
        }
        for flags in &self.custom_linker_flags {
            linker_options.add_custom_flags(flags);
        }

        for package in &self.packages {
            let attrs = cache.package(package);
            if let Some(paths) = attrs.get("includePaths") {
                compiler_options.add_include_paths(paths);
            }
            if let Some(flags) = attrs.get("cflags") {
                compiler_options.add_custom_flags(flags);
            }
            if let Some(flags) = attrs.get("linkerFlags") {
                linker_options.add_custom_flags(flags);
            }
            if let Some(paths) = attrs.get("libraryPaths") {
                linker_options.add_library_paths(paths);
            }
            if let Some(libraries) = attrs.get("linkLibraries") {
                linker_options.add_libraries(libraries);
            }
        }

        (compiler_options, linker_options)
    }

    /// Emit this target's jobs for the current run.
    ///
    /// Compile jobs carry their source's observed hash as an on-success
    /// cache update; the link job depends on all of them. Returns an empty
    /// list when nothing is stale.
    pub fn create_jobs(
        &self,
        cache: &MeiqueCache,
        compiler: &dyn Compiler,
        build_dir: &Path,
        next_id: &mut JobId,
    ) -> Result<Vec<ScheduledJob>> {
        if let Some(command) = &self.custom_command {
            let mut job = OsCommandJob::new("sh", vec!["-c".to_string(), command.clone()]);
            job.set_working_directory(build_dir);
            let scheduled = ScheduledJob::new(
                alloc_id(next_id),
                format!("Running {}", self.name),
                Box::new(job),
            );
            return Ok(vec![scheduled]);
        }

        if self.files.is_empty() {
            return Err(Error::Config(format!(
                "Compilable target '{}' has no files!",
                self.name
            )));
        }

        let (compiler_options, linker_options) = self.build_options(cache);
        let source_dir = format!("{}{}", cache.source_dir(), self.directory);

        let mut jobs = Vec::new();
        let mut compile_ids = Vec::new();
        let mut objects = Vec::new();
        let mut need_link = false;

        for file in &self.files {
            let source = format!("{source_dir}{file}");
            if !os::file_exists(&source) {
                return Err(Error::Config(format!(
                    "File {source} from target '{}' does not exist.",
                    self.name
                )));
            }

            let object = format!("{file}.o");
            let object_path = build_dir.join(&object);
            if let Some(parent) = object_path.parent() {
                os::mkdir(parent)?;
            }

            let hash = file_hash(&source);
            if !os::file_exists(&object_path) || hash != cache.file_hash(&source) {
                let mut job = compiler.compile(&source, &object, &compiler_options)?;
                job.set_working_directory(build_dir);
                let mut scheduled = ScheduledJob::new(
                    alloc_id(next_id),
                    format!("Compiling {file}"),
                    Box::new(job),
                );
                scheduled.updates.push(CacheUpdate::FileHash {
                    source: source.clone(),
                    hash: hash.clone(),
                });
                compile_ids.push(scheduled.id);
                jobs.push(scheduled);
                need_link = true;
            }

            objects.push(object);
        }

        let artifact = self.artifact_name(compiler);
        if !os::file_exists(build_dir.join(&artifact)) {
            need_link = true;
        }

        if need_link {
            let mut job = compiler.link(&artifact, &objects, &linker_options)?;
            job.set_working_directory(build_dir);
            let mut scheduled = ScheduledJob::new(
                alloc_id(next_id),
                format!("Linking {artifact}"),
                Box::new(job),
            );
            scheduled.deps = compile_ids;
            jobs.push(scheduled);
        } else {
            debug!(target = %self.name, "up to date");
        }

        Ok(jobs)
    }

    /// Remove this target's outputs and forget their hashes.
    pub fn clean(
        &self,
        cache: &mut MeiqueCache,
        compiler: &dyn Compiler,
        build_dir: &Path,
    ) -> Result<()> {
        if self.custom_command.is_some() {
            return Ok(());
        }

        let source_dir = format!("{}{}", cache.source_dir(), self.directory);
        for file in &self.files {
            let object_path = build_dir.join(format!("{file}.o"));
            remove_if_present(&object_path)?;
            cache.remove_file_hash(&format!("{source_dir}{file}"));
        }

        remove_if_present(&build_dir.join(self.artifact_name(compiler)))?;
        cache.remove_target_hash(&self.name);
        Ok(())
    }

    /// Copy the built artifact into every install destination.
    pub fn install(
        &self,
        cache: &MeiqueCache,
        compiler: &dyn Compiler,
        build_dir: &Path,
    ) -> Result<()> {
        if self.install_dirs.is_empty() || self.target_type == TargetType::Custom {
            return Ok(());
        }

        let artifact = self.artifact_name(compiler);
        let artifact_path = build_dir.join(&artifact);
        if !os::file_exists(&artifact_path) {
            return Err(Error::Build(format!(
                "Target '{}' is not built, nothing to install.",
                self.name
            )));
        }

        for dir in &self.install_dirs {
            let dest_dir = PathBuf::from(format!("{}{dir}", cache.install_prefix()));
            os::mkdir(&dest_dir)?;
            let dest = dest_dir.join(&artifact);
            std::fs::copy(&artifact_path, &dest)?;
            println!("Installing {}", dest.display());
        }
        Ok(())
    }

    /// Remove previously installed copies of the artifact.
    pub fn uninstall(&self, cache: &MeiqueCache, compiler: &dyn Compiler) -> Result<()> {
        if self.install_dirs.is_empty() || self.target_type == TargetType::Custom {
            return Ok(());
        }

        let artifact = self.artifact_name(compiler);
        for dir in &self.install_dirs {
            let dest = PathBuf::from(format!("{}{dir}", cache.install_prefix())).join(&artifact);
            if os::file_exists(&dest) {
                std::fs::remove_file(&dest)?;
                println!("Removing {}", dest.display());
            }
        }
        Ok(())
    }
}

fn alloc_id(next_id: &mut JobId) -> JobId {
    let id = *next_id;
    *next_id += 1;
    id
}

fn remove_if_present(path: &Path) -> Result<()> {
    if os::file_exists(path) {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

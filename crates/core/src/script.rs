//! The script host: evaluating `meique.lua` project descriptions
//!
//! The project description runs against a Lua prelude that collects target
//! tables, plus two host callbacks: `option` (user options, CLI value over
//! cached value over default) and `findPackage` (pkg-config, resolved once
//! and cached verbatim). After evaluation the collected tables are walked
//! back into the typed target model.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use meique_lua::mlua::{self, Lua, Table};
use meique_lua::{with_host_state, LuaRuntime};
use meique_platform as os;
use meique_platform::ExecMode;
use tracing::{debug, info};

use crate::cache::{BuildType, MeiqueCache, MEIQUE_CACHE};
use crate::compiler::{self, Compiler};
use crate::target::{Target, TargetType, TestRule};
use crate::{Error, Result};

const PRELUDE: &str = include_str!("script/prelude.lua");

/// Configure-time choices taken from the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigureOptions {
    pub build_type: BuildType,
    pub install_prefix: Option<String>,
    /// `-o NAME=VALUE` pairs; they win over cached values and defaults.
    pub user_options: Vec<(String, String)>,
}

/// State reached by host callbacks through the interpreter side-channel
struct HostState {
    cache: Arc<Mutex<MeiqueCache>>,
    cli_options: BTreeMap<String, String>,
}

/// An evaluated project description
pub struct MeiqueScript {
    cache: Arc<Mutex<MeiqueCache>>,
    targets: Vec<Target>,
    build_dir: PathBuf,
    cli_options: BTreeMap<String, String>,
}

impl MeiqueScript {
    /// First-run construction: probe a compiler and start a fresh cache.
    ///
    /// The compiler is probed before the cache exists so a missing
    /// toolchain can never leave a half-configured cache behind.
    pub fn configure(
        project_dir: &str,
        options: &ConfigureOptions,
        build_dir: &Path,
    ) -> Result<Self> {
        let source_dir = os::normalize_dir_path(project_dir);
        let (compiler_id, compiler) = compiler::find_compiler()?;
        info!(compiler = %compiler.full_name(), "configuring {source_dir}");

        let mut cache = MeiqueCache::new_at(build_dir.join(MEIQUE_CACHE));
        cache.set_source_dir(&source_dir);
        cache.set_build_type(options.build_type);
        cache.set_compiler_id(&compiler_id);
        if let Some(prefix) = &options.install_prefix {
            cache.set_install_prefix(prefix);
        }
        cache.set_scopes(vec![
            platform_scope().to_string(),
            compiler_id.to_uppercase(),
            options.build_type.as_str().to_uppercase(),
        ]);

        Ok(Self::with_cache(cache, build_dir, options.user_options.clone()))
    }

    /// Later runs: the cache decides where the project lives.
    pub fn open(build_dir: &Path) -> Result<Self> {
        let cache = MeiqueCache::load(&build_dir.join(MEIQUE_CACHE))?;
        Ok(Self::with_cache(cache, build_dir, Vec::new()))
    }

    pub fn with_cache(
        cache: MeiqueCache,
        build_dir: &Path,
        cli_options: Vec<(String, String)>,
    ) -> Self {
        Self {
            cache: Arc::new(Mutex::new(cache)),
            targets: Vec::new(),
            build_dir: build_dir.to_path_buf(),
            cli_options: cli_options.into_iter().collect(),
        }
    }

    /// Evaluate `meique.lua` and collect the declared targets.
    pub fn exec(&mut self) -> Result<()> {
        let (source_dir, build_type, scopes) = {
            let cache = self.cache.lock().unwrap();
            (
                cache.source_dir().to_string(),
                cache.build_type(),
                cache.scopes().to_vec(),
            )
        };

        let project_file = PathBuf::from(format!("{source_dir}meique.lua"));
        if !os::file_exists(&project_file) {
            return Err(Error::Config(format!(
                "{} not found.",
                project_file.display()
            )));
        }

        let runtime = LuaRuntime::new();
        runtime.set_host_state(HostState {
            cache: Arc::clone(&self.cache),
            cli_options: self.cli_options.clone(),
        });
        runtime.register("meiqueOption", read_option)?;
        runtime.register("meiqueFindPackage", find_package)?;

        runtime.set_global("SOURCE_DIR", source_dir.as_str())?;
        runtime.set_global("BUILD_DIR", self.build_dir.to_string_lossy().into_owned())?;
        runtime.set_global("BUILD_TYPE", build_type.as_str())?;
        for scope in &scopes {
            runtime.set_global(scope, true)?;
        }

        runtime
            .exec_source("meique prelude", PRELUDE)
            .map_err(|e| Error::Config(e.to_string()))?;
        runtime
            .exec_file(&project_file)
            .map_err(|e| Error::Config(e.to_string()))?;

        self.targets = read_targets(runtime.lua())?;
        debug!(targets = self.targets.len(), "project evaluated");
        Ok(())
    }

    pub fn cache(&self) -> &Arc<Mutex<MeiqueCache>> {
        &self.cache
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// The backend recorded at configure time.
    pub fn compiler(&self) -> Result<Arc<dyn Compiler>> {
        let id = self.cache.lock().unwrap().compiler_id().to_string();
        compiler::create_compiler(&id)
    }

    /// All test rules, in target declaration order.
    pub fn tests(&self) -> Vec<TestRule> {
        self.targets
            .iter()
            .flat_map(|t| t.tests.iter().cloned())
            .collect()
    }
}

const fn platform_scope() -> &'static str {
    if cfg!(target_os = "macos") {
        "DARWIN"
    } else {
        "LINUX"
    }
}

fn read_option(
    lua: &Lua,
    (name, _description, default): (String, Option<String>, Option<String>),
) -> mlua::Result<String> {
    with_host_state::<HostState, _>(lua, |state| {
        let mut cache = state.cache.lock().unwrap();
        let value = state
            .cli_options
            .get(&name)
            .cloned()
            .or_else(|| cache.user_option(&name).map(str::to_string))
            .or(default.clone())
            .unwrap_or_default();
        cache.set_user_option(&name, &value);
        Ok(value)
    })
}

fn find_package(
    lua: &Lua,
    (name, required): (String, bool),
) -> mlua::Result<Option<Table>> {
    let attrs = with_host_state::<HostState, _>(lua, |state| {
        let mut cache = state.cache.lock().unwrap();
        if cache.has_package(&name) {
            return Ok(Some(cache.package(&name)));
        }
        match probe_pkg_config(&name) {
            Some(attrs) => {
                info!(package = %name, "resolved via pkg-config");
                cache.set_package(&name, attrs.clone());
                Ok(Some(attrs))
            }
            None if required => Err(mlua::Error::RuntimeError(format!(
                "Required package '{name}' not found."
            ))),
            None => Ok(None),
        }
    })?;

    match attrs {
        Some(attrs) => {
            let table = lua.create_table()?;
            table.set("name", name.as_str())?;
            for (key, value) in &attrs {
                table.set(key.as_str(), value.as_str())?;
            }
            Ok(Some(table))
        }
        None => Ok(None),
    }
}

/// Resolve a package's build attributes through pkg-config.
fn probe_pkg_config(name: &str) -> Option<BTreeMap<String, String>> {
    let exists = os::exec("pkg-config", &["--exists", name], None, ExecMode::MergeStderr).ok()?;
    if !exists.success() {
        return None;
    }

    let query = |flag: &str, strip: &str| -> String {
        os::exec("pkg-config", &[flag, name], None, ExecMode::MergeStderr)
            .map(|r| {
                r.output
                    .split_whitespace()
                    .map(|piece| piece.strip_prefix(strip).unwrap_or(piece).to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default()
    };

    let mut attrs = BTreeMap::new();
    attrs.insert("includePaths".to_string(), query("--cflags-only-I", "-I"));
    attrs.insert("cflags".to_string(), query("--cflags-only-other", ""));
    attrs.insert("libraryPaths".to_string(), query("--libs-only-L", "-L"));
    attrs.insert("linkLibraries".to_string(), query("--libs-only-l", "-l"));
    attrs.insert("linkerFlags".to_string(), query("--libs-only-other", ""));
    Some(attrs)
}

fn read_targets(lua: &Lua) -> Result<Vec<Target>> {
    let declared: Table = lua
        .globals()
        .get("_meiqueTargets")
        .map_err(meique_lua::Error::from)?;

    let mut targets = Vec::new();
    for entry in declared.sequence_values::<Table>() {
        let entry = entry.map_err(meique_lua::Error::from)?;
        targets.push(read_target(&entry)?);
    }
    Ok(targets)
}

fn read_target(entry: &Table) -> Result<Target> {
    let name = meique_lua::get_string_field(entry, "_name")?;
    let kind = meique_lua::get_string_field(entry, "_type")?;
    let target_type = match kind.as_str() {
        "executable" => TargetType::Executable,
        "static_library" => TargetType::StaticLibrary,
        "shared_library" => TargetType::SharedLibrary,
        "custom" => TargetType::Custom,
        other => {
            return Err(Error::Config(format!(
                "Target '{name}' has unknown type '{other}'."
            )))
        }
    };

    let mut target = Target::new(&name, target_type);
    target.directory = meique_lua::get_string_field(entry, "_dir")?;
    target.files = read_string_list(entry, "_files")?;
    target.dependencies = read_string_list(entry, "_deps")?;
    target.install_dirs = read_string_list(entry, "_installDirs")?;
    target.custom_flags = read_string_list(entry, "_cflags")?;
    target.custom_linker_flags = read_string_list(entry, "_linkerFlags")?;
    target.custom_command = meique_lua::opt_string_field(entry, "_command")?;

    let packages: Table = entry.get("_packages").map_err(meique_lua::Error::from)?;
    for package in packages.sequence_values::<Table>() {
        let package = package.map_err(meique_lua::Error::from)?;
        target
            .packages
            .push(meique_lua::get_string_field(&package, "name")?);
    }

    let tests: Table = entry.get("_tests").map_err(meique_lua::Error::from)?;
    for test in tests.sequence_values::<Table>() {
        let test = test.map_err(meique_lua::Error::from)?;
        target.tests.push(TestRule {
            name: meique_lua::get_string_field(&test, "name")?,
            command: meique_lua::get_string_field(&test, "command")?,
            working_dir: meique_lua::get_string_field(&test, "dir")?,
        });
    }

    Ok(target)
}

fn read_string_list(entry: &Table, key: &str) -> Result<Vec<String>> {
    let list: Table = entry.get(key).map_err(meique_lua::Error::from)?;
    Ok(meique_lua::table_to_string_list(&list)?)
}

//! The persistent configuration cache
//!
//! Configure-time decisions, resolved packages, scopes, and content hashes
//! are persisted to `meiquecache.lua` in the build directory as a sequence
//! of declarative record invocations. Loading executes the file on a fresh
//! interpreter with one host function registered per record kind; the
//! accumulating cache is reached through the interpreter's host-state
//! side-channel. Anything the file does beyond calling those records is a
//! corruption error.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use meique_lua::mlua::Table;
use meique_lua::{
    get_string_field, mlua, table_to_string_list, table_to_string_map, with_host_state,
    LuaRuntime,
};
use meique_platform as os;
use tracing::{debug, warn};

use crate::job::CacheUpdate;
use crate::{Error, Result};

/// Cache file name, always in the build directory.
pub const MEIQUE_CACHE: &str = "meiquecache.lua";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildType {
    Debug,
    #[default]
    Release,
}

impl BuildType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            BuildType::Debug => "debug",
            BuildType::Release => "release",
        }
    }
}

/// In-memory form of the configuration cache
#[derive(Debug)]
pub struct MeiqueCache {
    path: PathBuf,
    user_options: BTreeMap<String, String>,
    build_type: BuildType,
    compiler_id: String,
    source_dir: String,
    install_prefix: String,
    scopes: Vec<String>,
    packages: BTreeMap<String, BTreeMap<String, String>>,
    target_hashes: BTreeMap<String, String>,
    file_hashes: BTreeMap<String, String>,
    auto_save: bool,
    configured: bool,
}

impl MeiqueCache {
    /// A fresh cache that will persist to `path`.
    pub fn new_at<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            user_options: BTreeMap::new(),
            build_type: BuildType::default(),
            compiler_id: String::new(),
            source_dir: String::new(),
            install_prefix: String::new(),
            scopes: Vec::new(),
            packages: BTreeMap::new(),
            target_hashes: BTreeMap::new(),
            file_hashes: BTreeMap::new(),
            auto_save: true,
            configured: false,
        }
    }

    /// Load a cache file written by a previous run.
    pub fn load(path: &Path) -> Result<Self> {
        let runtime = LuaRuntime::new();
        // Auto-save stays off while accumulating so a failed load can never
        // overwrite the file with a half-read cache.
        let mut accumulator = Self::new_at(path);
        accumulator.auto_save = false;
        runtime.set_host_state(accumulator);

        runtime.register("UserOption", read_user_option)?;
        runtime.register("Config", read_config)?;
        runtime.register("Package", read_package)?;
        runtime.register("Scopes", read_scopes)?;
        runtime.register("TargetHash", read_target_hash)?;
        runtime.register("FileHash", read_file_hash)?;

        runtime.exec_file(path).map_err(|e| corrupted(&e))?;

        let mut cache = runtime
            .take_host_state::<Self>()
            .expect("cache accumulator still attached");
        if !cache.configured {
            return Err(corrupted(&"no Config record"));
        }
        cache.auto_save = true;
        debug!(path = %path.display(), packages = cache.packages.len(), "cache loaded");
        Ok(cache)
    }

    /// Write the cache out as declarative records.
    pub fn save(&self) -> Result<()> {
        let mut out = String::new();

        for (name, value) in &self.user_options {
            // The anonymous default package doesn't need to be saved.
            if name.is_empty() {
                continue;
            }
            let _ = write!(
                out,
                "UserOption {{\n    name = \"{}\",\n    value = \"{}\"\n}}\n\n",
                escape(name),
                escape(value)
            );
        }

        let _ = write!(
            out,
            "Config {{\n    buildType = \"{}\",\n    compiler = \"{}\",\n    sourceDir = \"{}\",\n",
            self.build_type.as_str(),
            escape(&self.compiler_id),
            escape(&self.source_dir)
        );
        if !self.install_prefix.is_empty() {
            let _ = write!(
                out,
                "    installPrefix = \"{}\",\n",
                escape(&self.install_prefix)
            );
        }
        out.push_str("}\n\n");

        out.push_str("Scopes {\n");
        for scope in &self.scopes {
            let _ = write!(out, "    \"{}\",\n", escape(scope));
        }
        out.push_str("}\n\n");

        for (name, attrs) in &self.packages {
            let _ = write!(out, "Package {{\n    name = \"{}\",\n", escape(name));
            for (key, value) in attrs {
                let _ = write!(out, "    {} = \"{}\",\n", key, escape(value));
            }
            out.push_str("}\n\n");
        }

        for (target, hash) in &self.target_hashes {
            let _ = write!(
                out,
                "TargetHash {{\n    target = \"{}\",\n    hash = \"{}\"\n}}\n\n",
                escape(target),
                escape(hash)
            );
        }

        for (file, hash) in &self.file_hashes {
            let _ = write!(
                out,
                "FileHash {{\n    file = \"{}\",\n    hash = \"{}\"\n}}\n\n",
                escape(file),
                escape(hash)
            );
        }

        std::fs::write(&self.path, out)?;
        debug!(path = %self.path.display(), "cache saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn build_type(&self) -> BuildType {
        self.build_type
    }

    pub fn set_build_type(&mut self, build_type: BuildType) {
        self.build_type = build_type;
    }

    pub fn compiler_id(&self) -> &str {
        &self.compiler_id
    }

    pub fn set_compiler_id(&mut self, id: &str) {
        self.compiler_id = id.to_string();
        self.configured = true;
    }

    /// Absolute source root, with a trailing separator.
    pub fn source_dir(&self) -> &str {
        &self.source_dir
    }

    pub fn set_source_dir(&mut self, dir: &str) {
        self.source_dir = os::normalize_dir_path(dir);
    }

    pub fn set_install_prefix(&mut self, prefix: &str) {
        self.install_prefix = prefix.to_string();
    }

    /// Effective install prefix: `DESTDIR` wins, then the configured
    /// prefix, then the OS default.
    pub fn install_prefix(&self) -> String {
        let destdir = os::get_env("DESTDIR");
        if !destdir.is_empty() {
            return os::normalize_dir_path(&destdir);
        }
        if self.install_prefix.is_empty() {
            os::default_install_prefix()
        } else {
            self.install_prefix.clone()
        }
    }

    pub fn user_option(&self, name: &str) -> Option<&str> {
        self.user_options.get(name).map(String::as_str)
    }

    pub fn set_user_option(&mut self, name: &str, value: &str) {
        self.user_options.insert(name.to_string(), value.to_string());
    }

    pub fn user_options(&self) -> &BTreeMap<String, String> {
        &self.user_options
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn set_scopes(&mut self, scopes: Vec<String>) {
        self.scopes = scopes;
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Resolved attributes of a package; empty map if it was never resolved.
    pub fn package(&self, name: &str) -> BTreeMap<String, String> {
        self.packages.get(name).cloned().unwrap_or_default()
    }

    pub fn set_package(&mut self, name: &str, attrs: BTreeMap<String, String>) {
        self.packages.insert(name.to_string(), attrs);
    }

    pub fn file_hash(&self, source: &str) -> &str {
        self.file_hashes.get(source).map(String::as_str).unwrap_or("")
    }

    pub fn set_file_hash(&mut self, source: &str, hash: &str) {
        self.file_hashes.insert(source.to_string(), hash.to_string());
    }

    pub fn remove_file_hash(&mut self, source: &str) {
        self.file_hashes.remove(source);
    }

    pub fn target_hash(&self, target: &str) -> &str {
        self.target_hashes.get(target).map(String::as_str).unwrap_or("")
    }

    pub fn set_target_hash(&mut self, target: &str, hash: &str) {
        self.target_hashes.insert(target.to_string(), hash.to_string());
    }

    pub fn remove_target_hash(&mut self, target: &str) {
        self.target_hashes.remove(target);
    }

    pub fn apply(&mut self, update: &CacheUpdate) {
        match update {
            CacheUpdate::FileHash { source, hash } => self.set_file_hash(source, hash),
            CacheUpdate::TargetHash { target, hash } => self.set_target_hash(target, hash),
        }
    }

    pub fn is_auto_save_enabled(&self) -> bool {
        self.auto_save
    }

    /// Disabled after a configure error so a broken state is not committed.
    pub fn set_auto_save(&mut self, enabled: bool) {
        self.auto_save = enabled;
    }
}

impl Drop for MeiqueCache {
    fn drop(&mut self) {
        if self.auto_save {
            if let Err(e) = self.save() {
                warn!("failed to save {}: {e}", self.path.display());
            }
        }
    }
}

/// Install the process-interrupt hook for the current cache.
///
/// The handler slot holds a single hook, so at most one cache is current;
/// registering a new cache replaces the previous one. On interrupt the
/// cache is saved (unless auto-save was disabled) and the process exits.
pub fn install_interrupt_hook(cache: Arc<Mutex<MeiqueCache>>) -> Result<()> {
    os::set_ctrl_c_handler(move || {
        let cache = cache.lock().unwrap();
        if cache.is_auto_save_enabled() {
            let _ = cache.save();
        }
        std::process::exit(1);
    })?;
    Ok(())
}

fn corrupted(cause: &dyn std::fmt::Display) -> Error {
    Error::CacheCorrupted(format!(
        "{MEIQUE_CACHE} corrupted or created by an older version of meique, \
         please reconfigure ({cause})"
    ))
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn read_user_option(lua: &mlua::Lua, record: Table) -> mlua::Result<()> {
    let name = get_string_field(&record, "name").map_err(mlua::Error::external)?;
    let value = get_string_field(&record, "value").map_err(mlua::Error::external)?;
    with_host_state::<MeiqueCache, _>(lua, |cache| {
        cache.user_options.insert(name.clone(), value.clone());
        Ok(())
    })
}

fn read_config(lua: &mlua::Lua, record: Table) -> mlua::Result<()> {
    let fields = table_to_string_map(&record).map_err(mlua::Error::external)?;
    let missing = || {
        mlua::Error::RuntimeError(format!(
            "{MEIQUE_CACHE} file corrupted or created by an older version of meique."
        ))
    };

    let source_dir = fields.get("sourceDir").ok_or_else(missing)?;
    let build_type = fields.get("buildType").ok_or_else(missing)?;
    let compiler = fields.get("compiler").ok_or_else(missing)?;

    with_host_state::<MeiqueCache, _>(lua, |cache| {
        cache.source_dir = os::normalize_dir_path(source_dir);
        cache.build_type = if build_type == "debug" {
            BuildType::Debug
        } else {
            BuildType::Release
        };
        cache.compiler_id = compiler.clone();
        cache.install_prefix = fields.get("installPrefix").cloned().unwrap_or_default();
        cache.configured = true;
        Ok(())
    })
}

fn read_package(lua: &mlua::Lua, record: Table) -> mlua::Result<()> {
    let mut attrs = table_to_string_map(&record).map_err(mlua::Error::external)?;
    let name = match attrs.remove("name") {
        Some(name) if !name.is_empty() => name,
        _ => {
            return Err(mlua::Error::RuntimeError(
                "Package entry without name.".to_string(),
            ))
        }
    };
    with_host_state::<MeiqueCache, _>(lua, |cache| {
        cache.packages.insert(name.clone(), attrs.clone());
        Ok(())
    })
}

fn read_scopes(lua: &mlua::Lua, record: Table) -> mlua::Result<()> {
    let scopes = table_to_string_list(&record).map_err(mlua::Error::external)?;
    with_host_state::<MeiqueCache, _>(lua, |cache| {
        cache.scopes = scopes.clone();
        Ok(())
    })
}

fn read_target_hash(lua: &mlua::Lua, record: Table) -> mlua::Result<()> {
    let target = get_string_field(&record, "target").map_err(mlua::Error::external)?;
    let hash = get_string_field(&record, "hash").map_err(mlua::Error::external)?;
    with_host_state::<MeiqueCache, _>(lua, |cache| {
        cache.target_hashes.insert(target.clone(), hash.clone());
        Ok(())
    })
}

fn read_file_hash(lua: &mlua::Lua, record: Table) -> mlua::Result<()> {
    let file = get_string_field(&record, "file").map_err(mlua::Error::external)?;
    let hash = get_string_field(&record, "hash").map_err(mlua::Error::external)?;
    with_host_state::<MeiqueCache, _>(lua, |cache| {
        cache.file_hashes.insert(file.clone(), hash.clone());
        Ok(())
    })
}

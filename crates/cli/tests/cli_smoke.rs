//! CLI smoke tests for meique.
//!
//! These cover argument handling and error paths that need no compiler
//! toolchain; the full configure/build/test flow lives in build_flow.rs.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Isolated build directory; meique treats the working directory as the
/// build directory.
struct TestEnv {
    build: TempDir,
}

impl TestEnv {
    fn new() -> Self {
        Self {
            build: TempDir::new().unwrap(),
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("meique").unwrap();
        cmd.current_dir(self.build.path());
        cmd.env_remove("DESTDIR");
        cmd.env_remove("VERBOSE");
        cmd
    }

    /// A project directory holding the given meique.lua.
    fn project(&self, description: &str) -> std::path::PathBuf {
        let dir = self.build.path().join("project");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("meique.lua"), description).unwrap();
        dir
    }
}

#[test]
fn help_flag_prints_usage() {
    TestEnv::new()
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: meique OPTIONS TARGET"));
}

#[test]
fn version_flag_prints_version() {
    TestEnv::new()
        .cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("Meique version"));
}

#[test]
fn no_arguments_without_cache_shows_help() {
    TestEnv::new()
        .cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: meique OPTIONS TARGET"));
}

#[test]
fn nonexistent_project_directory_shows_help() {
    TestEnv::new()
        .cmd()
        .arg("/no/such/project")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn corrupted_cache_asks_for_reconfigure() {
    let env = TestEnv::new();
    std::fs::write(env.build.path().join("meiquecache.lua"), "Config {{{ junk").unwrap();

    env.cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("corrupted"));
}

#[test]
fn cache_with_unknown_record_is_rejected() {
    let env = TestEnv::new();
    std::fs::write(
        env.build.path().join("meiquecache.lua"),
        "Config {\n    buildType = \"release\",\n    compiler = \"gcc\",\n    sourceDir = \"/tmp\",\n}\n\nMystery {\n    a = \"b\",\n}\n",
    )
    .unwrap();

    env.cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("corrupted"));
}

#[test]
fn cache_missing_config_fields_is_rejected() {
    let env = TestEnv::new();
    std::fs::write(
        env.build.path().join("meiquecache.lua"),
        "Config {\n    buildType = \"release\",\n}\n",
    )
    .unwrap();

    env.cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("older version"));
}

#[test]
fn malformed_option_is_an_argument_error() {
    let env = TestEnv::new();
    let project = env.project("hello = Executable(\"hello\")\n");

    env.cmd()
        .arg("-o")
        .arg("not-a-pair")
        .arg(project)
        .assert()
        .failure()
        .stderr(predicate::str::contains("NAME=VALUE"));
}

#[test]
fn debug_and_release_together_are_rejected() {
    let env = TestEnv::new();
    let project = env.project("hello = Executable(\"hello\")\n");

    env.cmd()
        .arg("--debug")
        .arg("--release")
        .arg(project)
        .assert()
        .failure()
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn dump_project_without_cache_fails() {
    TestEnv::new()
        .cmd()
        .arg("--meique-dump-project")
        .assert()
        .failure()
        .stderr(predicate::str::contains("meiquecache.lua not found"));
}

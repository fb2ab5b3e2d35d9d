//! End-to-end configure/build/test flows.
//!
//! These tests drive the real GCC toolchain and are skipped on machines
//! without g++ in PATH.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn gcc_available() -> bool {
    std::process::Command::new("g++")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

macro_rules! require_gcc {
    () => {
        if !gcc_available() {
            eprintln!("g++ not found in PATH, skipping");
            return;
        }
    };
}

struct Project {
    build: TempDir,
    source: TempDir,
}

impl Project {
    fn new(description: &str, files: &[(&str, &str)]) -> Self {
        let build = TempDir::new().unwrap();
        let source = TempDir::new().unwrap();
        std::fs::write(source.path().join("meique.lua"), description).unwrap();
        for (name, contents) in files {
            std::fs::write(source.path().join(name), contents).unwrap();
        }
        Self { build, source }
    }

    fn meique(&self) -> Command {
        let mut cmd = Command::cargo_bin("meique").unwrap();
        cmd.current_dir(self.build.path());
        cmd.env_remove("DESTDIR");
        cmd.env_remove("VERBOSE");
        cmd
    }

    fn configure(&self) {
        self.meique()
            .arg("-s")
            .arg(self.source.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("-- Done!"));
    }

    fn cache_contents(&self) -> String {
        std::fs::read_to_string(self.build.path().join("meiquecache.lua")).unwrap()
    }
}

const HELLO_PROJECT: &str = r#"
hello = Executable("hello")
hello:addFiles("hello.cpp util.cpp")
"#;

const HELLO_CPP: &str = r#"
int greet();
int main() { return greet(); }
"#;

const UTIL_CPP: &str = r#"
int greet() { return 0; }
"#;

fn hello_project() -> Project {
    Project::new(HELLO_PROJECT, &[("hello.cpp", HELLO_CPP), ("util.cpp", UTIL_CPP)])
}

#[test]
fn first_configure_writes_the_cache() {
    require_gcc!();
    let project = hello_project();
    project.configure();

    let cache = project.cache_contents();
    assert!(cache.contains("Config {"), "{cache}");
    assert!(cache.contains("buildType = \"release\""), "{cache}");
    assert!(cache.contains("compiler = \"gcc\""), "{cache}");
    assert!(!cache.contains("TargetHash"), "{cache}");
}

#[test]
fn debug_configure_is_recorded() {
    require_gcc!();
    let project = hello_project();
    project
        .meique()
        .arg("--debug")
        .arg(project.source.path())
        .assert()
        .success();

    assert!(project.cache_contents().contains("buildType = \"debug\""));
}

#[test]
fn configure_error_does_not_leave_a_cache() {
    require_gcc!();
    let project = Project::new("Executable(\"broken\"", &[]);
    project
        .meique()
        .arg(project.source.path())
        .assert()
        .failure();

    assert!(!project.build.path().join("meiquecache.lua").exists());
}

#[test]
fn configure_twice_produces_identical_caches() {
    require_gcc!();
    let project = hello_project();
    project.configure();
    let first = project.cache_contents();

    std::fs::remove_file(project.build.path().join("meiquecache.lua")).unwrap();
    project.configure();
    assert_eq!(first, project.cache_contents());
}

#[test]
fn build_flow_is_incremental() {
    require_gcc!();
    let project = hello_project();
    project.configure();

    // First build compiles both sources and links.
    project
        .meique()
        .assert()
        .success()
        .stdout(predicate::str::contains("Compiling hello.cpp"))
        .stdout(predicate::str::contains("Compiling util.cpp"))
        .stdout(predicate::str::contains("Linking hello"));
    assert!(project.build.path().join("hello").exists());
    assert!(project.build.path().join("hello.cpp.o").exists());

    // No-op rebuild issues zero jobs.
    project
        .meique()
        .assert()
        .success()
        .stdout(predicate::str::contains("Compiling").not())
        .stdout(predicate::str::contains("Linking").not());

    // Editing one source recompiles only it, then relinks.
    std::fs::write(
        project.source.path().join("util.cpp"),
        "int greet() { return 0; } // edited\n",
    )
    .unwrap();
    project
        .meique()
        .assert()
        .success()
        .stdout(predicate::str::contains("Compiling util.cpp"))
        .stdout(predicate::str::contains("Compiling hello.cpp").not())
        .stdout(predicate::str::contains("Linking hello"));
}

#[test]
fn failed_compile_reports_build_error_and_keeps_good_objects() {
    require_gcc!();
    let project = Project::new(
        HELLO_PROJECT,
        &[("hello.cpp", HELLO_CPP), ("util.cpp", "int greet() { syntax error }")],
    );
    project.configure();

    project
        .meique()
        .arg("-j1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Build error"));

    // The good translation unit keeps its object and its hash, so the next
    // run recompiles only the broken one.
    assert!(project.build.path().join("hello.cpp.o").exists());
    std::fs::write(project.source.path().join("util.cpp"), UTIL_CPP).unwrap();
    project
        .meique()
        .assert()
        .success()
        .stdout(predicate::str::contains("Compiling util.cpp"))
        .stdout(predicate::str::contains("Compiling hello.cpp").not());
}

#[test]
fn clean_removes_outputs_and_forces_rebuild() {
    require_gcc!();
    let project = hello_project();
    project.configure();
    project.meique().assert().success();
    assert!(project.build.path().join("hello").exists());

    project
        .meique()
        .arg("-c")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleaning hello"));
    assert!(!project.build.path().join("hello").exists());
    assert!(!project.build.path().join("hello.cpp.o").exists());

    project
        .meique()
        .assert()
        .success()
        .stdout(predicate::str::contains("Compiling hello.cpp"));
}

#[test]
fn job_count_must_be_positive() {
    require_gcc!();
    let project = hello_project();
    project.configure();

    project
        .meique()
        .arg("-j0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("greater than zero"));
}

#[test]
fn stop_after_configure_does_not_build() {
    require_gcc!();
    let project = hello_project();
    project
        .meique()
        .arg("-s")
        .arg(project.source.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("-- Done!"));

    assert!(!project.build.path().join("hello").exists());
}

#[test]
fn static_library_dependency_builds_in_order() {
    require_gcc!();
    let project = Project::new(
        r#"
        util = StaticLibrary("util")
        util:addFiles("util.cpp")

        hello = Executable("hello")
        hello:addFiles("hello.cpp")
        hello:addDependency(util)
        hello:addLinkerFlags("libutil.a")
        "#,
        &[("hello.cpp", HELLO_CPP), ("util.cpp", UTIL_CPP)],
    );
    project.configure();
    project
        .meique()
        .assert()
        .success()
        .stdout(predicate::str::contains("Linking libutil.a"));

    assert!(project.build.path().join("libutil.a").exists());
    assert!(project.build.path().join("hello").exists());
}

#[test]
fn project_options_are_echoed_and_persisted() {
    require_gcc!();
    let project = Project::new(
        r#"
        renderer = option("renderer", "Rendering backend", "software")
        hello = Executable("hello")
        hello:addFiles("hello.cpp util.cpp")
        "#,
        &[("hello.cpp", HELLO_CPP), ("util.cpp", UTIL_CPP)],
    );
    project
        .meique()
        .arg("-o")
        .arg("renderer=opengl")
        .arg(project.source.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("-- Project options:"))
        .stdout(predicate::str::contains("renderer"))
        .stdout(predicate::str::contains("opengl"));

    assert!(project.cache_contents().contains("UserOption"));
    assert!(project.cache_contents().contains("opengl"));
}

#[test]
fn tests_run_report_and_log() {
    require_gcc!();
    let project = Project::new(
        r#"
        hello = Executable("hello")
        hello:addFiles("hello.cpp util.cpp")
        hello:addTest("./hello", "t1")
        hello:addTest("echo failing; exit 1", "t2")
        "#,
        &[("hello.cpp", HELLO_CPP), ("util.cpp", UTIL_CPP)],
    );
    project.configure();

    // Test failures are reported but do not fail the run.
    project
        .meique()
        .arg("-t")
        .assert()
        .success()
        .stdout(predicate::str::contains("1/2: t1"))
        .stdout(predicate::str::contains("Passed"))
        .stdout(predicate::str::contains("2/2: t2"))
        .stdout(predicate::str::contains("FAILED"));

    let log = std::fs::read_to_string(project.build.path().join("meiquetest.log")).unwrap();
    assert!(log.contains(":: Running test: t1"), "{log}");
    assert!(log.contains(":: Running test: t2"), "{log}");
    assert!(log.contains("failing"), "{log}");
}

#[test]
fn test_name_regex_filters() {
    require_gcc!();
    let project = Project::new(
        r#"
        hello = Executable("hello")
        hello:addFiles("hello.cpp util.cpp")
        hello:addTest("./hello", "fast_one")
        hello:addTest("exit 1", "slow_one")
        "#,
        &[("hello.cpp", HELLO_CPP), ("util.cpp", UTIL_CPP)],
    );
    project.configure();

    project
        .meique()
        .arg("-t")
        .arg("^fast")
        .assert()
        .success()
        .stdout(predicate::str::contains("1/1: fast_one"))
        .stdout(predicate::str::contains("slow_one").not());
}

#[test]
fn install_honors_destdir() {
    require_gcc!();
    let project = Project::new(
        r#"
        hello = Executable("hello")
        hello:addFiles("hello.cpp util.cpp")
        hello:install("bin")
        "#,
        &[("hello.cpp", HELLO_CPP), ("util.cpp", UTIL_CPP)],
    );
    project.configure();

    let destdir = TempDir::new().unwrap();
    project
        .meique()
        .arg("-i")
        .env("DESTDIR", destdir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Installing"));
    assert!(destdir.path().join("bin/hello").exists());

    project
        .meique()
        .arg("-u")
        .env("DESTDIR", destdir.path())
        .assert()
        .success();
    assert!(!destdir.path().join("bin/hello").exists());
}

#[test]
fn dump_project_lists_targets() {
    require_gcc!();
    let project = hello_project();
    project.configure();

    project
        .meique()
        .arg("--meique-dump-project")
        .assert()
        .success()
        .stdout(predicate::str::contains("Target: hello"))
        .stdout(predicate::str::contains("files: hello.cpp util.cpp"));
}

#[test]
fn custom_target_runs_its_command() {
    require_gcc!();
    let project = Project::new(
        r#"
        stamp = CustomTarget("stamp", "touch custom.stamp")
        "#,
        &[],
    );
    project.configure();
    project
        .meique()
        .assert()
        .success()
        .stdout(predicate::str::contains("Running stamp"));
    assert!(project.build.path().join("custom.stamp").exists());
}

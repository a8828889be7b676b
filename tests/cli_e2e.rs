//! End-to-end exercise of the `pake` binary against a real `Pakefile.toml`.

use assert_cmd::Command;
use predicates::prelude::*;
use std::sync::Mutex;
use tempfile::TempDir;

static CWD_LOCK: Mutex<()> = Mutex::new(());

#[allow(deprecated)]
fn cmd() -> Command {
    Command::cargo_bin("pake").unwrap()
}

fn write_pakefile(dir: &TempDir, contents: &str) {
    std::fs::write(dir.path().join("Pakefile.toml"), contents).unwrap();
}

#[test]
fn builds_default_target_with_no_arguments() {
    let _guard = CWD_LOCK.lock().unwrap();
    let dir = TempDir::new().unwrap();
    write_pakefile(
        &dir,
        r#"
            [[rule]]
            type = "target"
            name = "out.txt"
            run = "echo built > ${target}"

            [[rule]]
            type = "default"
            target = "out.txt"
        "#,
    );

    cmd().current_dir(dir.path()).assert().success();
    assert!(dir.path().join("out.txt").exists());
}

#[test]
fn missing_pakefile_exits_nonzero_with_a_clear_message() {
    let _guard = CWD_LOCK.lock().unwrap();
    let dir = TempDir::new().unwrap();
    cmd()
        .current_dir(dir.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Pakefile"));
}

#[test]
fn missing_default_target_is_reported() {
    let _guard = CWD_LOCK.lock().unwrap();
    let dir = TempDir::new().unwrap();
    write_pakefile(
        &dir,
        r#"
            [[rule]]
            type = "target"
            name = "out.txt"
            run = "echo built > ${target}"
        "#,
    );

    cmd()
        .current_dir(dir.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("default"));
}

#[test]
fn graph_flag_prints_dependency_tree_without_building() {
    let _guard = CWD_LOCK.lock().unwrap();
    let dir = TempDir::new().unwrap();
    write_pakefile(
        &dir,
        r#"
            [[rule]]
            type = "target"
            name = "out.txt"
            deps = ["in.txt"]
            run = "cp in.txt ${target}"
        "#,
    );
    std::fs::write(dir.path().join("in.txt"), "source").unwrap();

    cmd()
        .current_dir(dir.path())
        .arg("out.txt")
        .arg("--graph")
        .assert()
        .success()
        .stdout(predicate::str::contains("out.txt"))
        .stdout(predicate::str::contains("in.txt"));

    assert!(!dir.path().join("out.txt").exists());
}

#[test]
fn rebuild_flag_forces_a_cached_target_to_rerun() {
    let _guard = CWD_LOCK.lock().unwrap();
    let dir = TempDir::new().unwrap();
    write_pakefile(
        &dir,
        r#"
            [[rule]]
            type = "target"
            name = "out.txt"
            run = "date +%N > ${target}"
        "#,
    );

    cmd().current_dir(dir.path()).arg("out.txt").assert().success();
    let first = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();

    cmd()
        .current_dir(dir.path())
        .arg("out.txt")
        .arg("--rebuild")
        .assert()
        .success();
    let second = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();

    assert_ne!(first, second);
}

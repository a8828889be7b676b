//! A target with no prior state builds exactly once and produces the
//! expected file.

use pake::api::{Console, RebuildMode, Registry};
use std::sync::Mutex;
use tempfile::TempDir;

// File-rule targets resolve relative to the process's current directory,
// so tests in this binary that chdir must not run concurrently.
static CWD_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn builds_a_target_with_no_dependencies() {
    let _guard = CWD_LOCK.lock().unwrap();
    let dir = TempDir::new().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let mut registry = Registry::new(&dir.path().join("state.json"), Console::silent()).unwrap();
    registry
        .target(
            "out.txt",
            vec![],
            Box::new(|target, _inputs| std::fs::write(target, "built").map_err(Into::into)),
        )
        .unwrap();

    registry.update("out.txt", RebuildMode::None).unwrap();

    assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "built");
}

#[test]
fn builds_a_target_with_a_source_file_dependency() {
    let _guard = CWD_LOCK.lock().unwrap();
    let dir = TempDir::new().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();
    std::fs::write(dir.path().join("in.txt"), "source").unwrap();

    let mut registry = Registry::new(&dir.path().join("state.json"), Console::silent()).unwrap();
    registry
        .target(
            "out.txt",
            vec!["in.txt".to_string()],
            Box::new(|target, _inputs| {
                let data = std::fs::read_to_string("in.txt")?;
                std::fs::write(target, data).map_err(Into::into)
            }),
        )
        .unwrap();

    registry.update("out.txt", RebuildMode::None).unwrap();

    assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "source");
}

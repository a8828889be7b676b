//! A second concurrent instance pointed at the same state file fails fast
//! with a user-facing error instead of blocking, and releases the lock
//! once the first instance is dropped.

use pake::api::{Console, Registry};
use tempfile::TempDir;

#[test]
fn second_instance_against_the_same_statefile_fails_immediately() {
    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("state.json");

    let first = Registry::new(&state_path, Console::silent()).unwrap();

    let second = Registry::new(&state_path, Console::silent());
    assert!(second.is_err());
    let message = second.err().unwrap().to_string();
    assert!(message.to_lowercase().contains("already running") || message.to_lowercase().contains("lock"));

    drop(first);
    assert!(Registry::new(&state_path, Console::silent()).is_ok());
}

#[test]
fn lock_is_per_statefile_not_global() {
    let dir = TempDir::new().unwrap();
    let a = Registry::new(&dir.path().join("a-state.json"), Console::silent()).unwrap();
    let b = Registry::new(&dir.path().join("b-state.json"), Console::silent()).unwrap();
    drop(a);
    drop(b);
}

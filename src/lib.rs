//! Pake is a general-purpose incremental build orchestrator: a small rule
//! engine that resolves a requested target against a priority-ordered set
//! of rules, traces its dependencies (detecting cycles), decides whether
//! it is already up to date from content hashes and a persistent locked
//! state file, and runs its recipe only when necessary.
//!
//! Build files are declarative TOML (`Pakefile.toml`, see
//! [`api::load_pakefile`]) or, for embedding directly in another Rust
//! program, registered programmatically through [`api::Registry`].

pub mod api;
mod core;
pub mod spi;

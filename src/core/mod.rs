//! The build engine's internals: path normalization, content hashing, the
//! subprocess helper, verbosity/color console, the built-in rule kinds,
//! the registry and update driver, the locked state store, and the
//! declarative `Pakefile.toml` loader.
//!
//! Nothing here is part of the crate's public surface directly — embedding
//! consumers go through [`crate::api`].

pub mod console;
pub mod declarative;
pub mod hash;
pub mod pathnorm;
pub mod process;
pub mod registry;
pub mod rules;
pub mod state;

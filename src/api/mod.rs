//! The public embedding surface: everything a Rust program needs to load a
//! `Pakefile.toml`, register rules programmatically, and drive a build,
//! without reaching into `core` directly.

pub use crate::core::console::{color, Console};
pub use crate::core::declarative::load_pakefile;
pub use crate::core::process::Command;
pub use crate::core::registry::{print_graph, DepNode, Registry};
pub use crate::core::rules::{PatternRecipe, TargetRecipe, VirtualRecipe};
pub use crate::spi::traits::{MatchToken, RuleImpl};
pub use crate::spi::types::{
    BuildError, Inputs, PakeError, PathError, RebuildMode, RecipeError, StateRecord, UpdateReason,
    Value,
};

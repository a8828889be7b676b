//! Service provider interface: the trait a rule implements and the types
//! it exchanges with the update driver.

pub mod traits;
pub mod types;

pub use traits::{MatchToken, RuleImpl};
pub use types::{
    BuildError, Inputs, PakeError, PathError, RebuildMode, RecipeError, StateRecord,
    UpdateReason, Value,
};

//! Service Provider Interface types: the vocabulary a [`crate::spi::traits::RuleImpl`]
//! implementation and the update driver speak to each other in.

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

/// The small serializable value a rule produces. File-producing rules return
/// a hex digest string; virtual rules may return any JSON-compatible value.
/// `serde_json::Value` is already exactly the `null | bool | number | string
/// | array | object` shape the data model calls for, so it is reused
/// directly rather than re-declared.
pub type Value = serde_json::Value;

/// The `{dep-string: result}` mapping collected while walking a rule's
/// dependencies, keyed by the *verbatim* string the rule declared (not its
/// canonical form).
pub type Inputs = BTreeMap<String, Value>;

/// A rebuild mode, controlling whether the cache is bypassed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildMode {
    /// Use the cache as normal.
    None,
    /// Force re-run of the top-level requested target only; dependencies
    /// still obey the cache.
    Shallow,
    /// Force re-run of the requested target and every target transitively
    /// reached through its dependencies.
    Deep,
}

impl RebuildMode {
    /// Whether a call running under this mode should bypass the cache for
    /// the *current* target.
    pub(crate) fn forces_this(self) -> bool {
        !matches!(self, RebuildMode::None)
    }

    /// The mode dependency calls should recurse with: `Shallow` does not
    /// propagate past the first level, `Deep` propagates indefinitely.
    pub(crate) fn propagated(self) -> RebuildMode {
        match self {
            RebuildMode::Deep => RebuildMode::Deep,
            RebuildMode::Shallow | RebuildMode::None => RebuildMode::None,
        }
    }
}

/// Error a recipe (shell or native) returns to signal failure.
#[derive(Debug)]
pub enum RecipeError {
    /// A deliberate failure raised by the recipe itself (an unmet
    /// precondition, a non-zero exit code). Reported without a cause.
    Rule(String),
    /// Any other failure. Reported with the underlying cause attached so
    /// diagnostics can render it.
    Unexpected(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for RecipeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipeError::Rule(msg) => write!(f, "{msg}"),
            RecipeError::Unexpected(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RecipeError {}

impl From<io::Error> for RecipeError {
    fn from(e: io::Error) -> Self {
        RecipeError::Unexpected(Box::new(e))
    }
}

/// A build error, carrying the ordered target chain from the originally
/// requested target to the one that failed.
#[derive(Debug)]
pub struct BuildError {
    /// The chain of targets, from the top-level request to the failure.
    pub chain: Vec<String>,
    /// A human-readable message.
    pub message: String,
    /// The underlying cause, if this wraps an unexpected recipe failure.
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.chain.join(" -> "), self.message)
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Top-level error type. `User` covers configuration and environment
/// failures reported without a target chain; `Build` covers failures that
/// occurred while resolving or running a target.
#[derive(Debug)]
pub enum PakeError {
    /// A user-facing error with no associated target chain: a missing
    /// build file, lock contention, a missing default target, a malformed
    /// build file.
    User(String),
    /// A failure while building or resolving dependencies.
    Build(BuildError),
}

impl fmt::Display for PakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PakeError::User(msg) => write!(f, "{msg}"),
            PakeError::Build(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PakeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PakeError::User(_) => None,
            PakeError::Build(e) => Some(e),
        }
    }
}

impl From<io::Error> for PakeError {
    fn from(e: io::Error) -> Self {
        PakeError::User(e.to_string())
    }
}

impl PakeError {
    pub(crate) fn build(chain: Vec<String>, message: impl Into<String>) -> PakeError {
        PakeError::Build(BuildError { chain, message: message.into(), cause: None })
    }

    pub(crate) fn build_with_cause(
        chain: Vec<String>,
        message: impl Into<String>,
        cause: Box<dyn std::error::Error + Send + Sync>,
    ) -> PakeError {
        PakeError::Build(BuildError { chain, message: message.into(), cause: Some(cause) })
    }
}

/// A path-normalization failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The supplied string was empty.
    Empty,
    /// The supplied string contained a NUL byte.
    NulByte,
    /// The path resolves outside the working directory.
    Escapes,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::Empty => write!(f, "cannot be empty string"),
            PathError::NulByte => write!(f, "may not contain null bytes"),
            PathError::Escapes => write!(f, "cannot be outside current directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// One recorded state entry: the dependency fingerprint used last time the
/// target was built, and the result that was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRecord {
    /// Dependency fingerprint, keyed by each dependency's verbatim string.
    pub inputs: Inputs,
    /// The result produced the last time this target was built.
    pub result: Value,
}

/// The outcome of comparing a target's current dependency fingerprint to
/// its previously recorded one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateReason {
    /// No prior record exists for this target.
    NotCached,
    /// The new fingerprint includes `always`, which never matches.
    DependsOnAlways,
    /// The set of dependency keys changed.
    DependencyListChanged,
    /// These dependency keys have a different recorded value.
    Changed(Vec<String>),
}

impl fmt::Display for UpdateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateReason::NotCached => write!(f, "not cached"),
            UpdateReason::DependsOnAlways => write!(f, "depends on always"),
            UpdateReason::DependencyListChanged => write!(f, "dependency list changed"),
            UpdateReason::Changed(keys) => write!(f, "dependents changed: {}", keys.join(", ")),
        }
    }
}

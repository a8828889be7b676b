//! The contract every rule implementation satisfies.

use crate::spi::types::{Inputs, PathError, RecipeError, Value};

/// What a successful [`RuleImpl::try_match`] produced: the canonical target
/// name, plus whatever capture state the rule needs to expand dependency
/// templates and run its recipe (a pattern rule's regex captures, most
/// commonly).
#[derive(Debug, Clone)]
pub struct MatchToken {
    /// The canonical (normalized, or otherwise unambiguous) target name.
    pub canonical: String,
    /// Regex capture groups, in order, empty for non-pattern matches.
    pub captures: Vec<String>,
    /// Set when a rule matched unconditionally but the target string
    /// itself failed path normalization; carried here so `run` doesn't
    /// have to normalize the string a second time to recover the error.
    pub path_error: Option<PathError>,
}

impl MatchToken {
    /// A match with no capture groups and no carried path error.
    pub fn plain(canonical: impl Into<String>) -> MatchToken {
        MatchToken { canonical: canonical.into(), captures: Vec::new(), path_error: None }
    }
}

/// A single registered rule. The registry holds a priority-ordered
/// `Vec<Box<dyn RuleImpl>>` and asks each, in turn, whether it matches a
/// requested target name.
pub trait RuleImpl: Send + Sync {
    /// Match priority: lower runs first. Ties are broken by registration
    /// order (stable sort).
    fn priority(&self) -> i64;

    /// A short name for diagnostics (not necessarily unique).
    fn label(&self) -> &str;

    /// Attempt to match `target`. Returns `None` if this rule does not
    /// claim the target at all.
    fn try_match(&self, target: &str) -> Option<MatchToken>;

    /// The dependency strings (unexpanded — pattern backreferences like
    /// `${1}` are resolved by the caller via `matched.captures`) this rule
    /// declares for a match.
    fn deps(&self, matched: &MatchToken) -> Vec<String>;

    /// Whether this rule's *own* non-cache-based criteria say the target
    /// needs rebuilding (a `VirtualRule` always returns `true`; a file
    /// rule compares the file's current content hash against `prior`).
    fn needs_self_update(&self, matched: &MatchToken, prior: Option<&Value>) -> bool;

    /// Run the recipe, returning the value to persist as this target's
    /// result.
    fn run(&self, matched: &MatchToken, inputs: &Inputs) -> Result<Value, RecipeError>;

    /// Whether this is the implicit catch-all rule. The CLI uses this to
    /// detect "no default target defined" without string-matching labels.
    fn is_fallback(&self) -> bool {
        false
    }
}

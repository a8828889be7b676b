//! The built-in rule kinds: `AlwaysRule`, `FallbackRule`, `VirtualRule`,
//! `TargetFileRule`, and `PatternFileRule`.

use regex::Regex;
use std::path::{Path, PathBuf};

use crate::core::hash;
use crate::core::pathnorm::normalize_path;
use crate::spi::traits::{MatchToken, RuleImpl};
use crate::spi::types::{Inputs, PathError, RecipeError, Value};

/// Match priority constants, lowest runs first.
pub mod priority {
    pub const ALWAYS: i64 = i64::MIN;
    pub const VIRTUAL: i64 = 0;
    pub const TARGET: i64 = 10;
    pub const PATTERN: i64 = 20;
    pub const FALLBACK: i64 = i64::MAX;
}

/// A rule run closure for a target (exact-name) rule: receives the
/// canonical target path and its resolved inputs, performs its side
/// effect, and returns nothing — the driver hashes the resulting file
/// itself.
pub type TargetRecipe = Box<dyn Fn(&str, &Inputs) -> Result<(), RecipeError> + Send + Sync>;

/// A rule run closure for a pattern rule: additionally receives the
/// regex capture groups.
pub type PatternRecipe =
    Box<dyn Fn(&str, &Inputs, &[String]) -> Result<(), RecipeError> + Send + Sync>;

/// A rule run closure for a virtual rule: receives its resolved inputs and
/// returns the value to record as the target's result directly.
pub type VirtualRecipe = Box<dyn Fn(&Inputs) -> Result<Value, RecipeError> + Send + Sync>;

/// The implicit rule matching the literal target name `"always"`. It never
/// caches: every build produces a fresh nonce, so anything depending on
/// `always` is unconditionally rebuilt.
pub struct AlwaysRule;

impl RuleImpl for AlwaysRule {
    fn priority(&self) -> i64 {
        priority::ALWAYS
    }

    fn label(&self) -> &str {
        "always"
    }

    fn try_match(&self, target: &str) -> Option<MatchToken> {
        (target == "always").then(|| MatchToken::plain("always"))
    }

    fn deps(&self, _matched: &MatchToken) -> Vec<String> {
        Vec::new()
    }

    fn needs_self_update(&self, _matched: &MatchToken, _prior: Option<&Value>) -> bool {
        true
    }

    fn run(&self, _matched: &MatchToken, _inputs: &Inputs) -> Result<Value, RecipeError> {
        Ok(Value::String(unique()))
    }
}

/// A process-unique nonce, used as `always`'s ever-changing result.
fn unique() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    format!("{pid:x}-{n:x}")
}

/// The implicit catch-all rule, registered with the lowest possible
/// priority so every other rule gets a chance to match first. If the
/// requested name normalizes to a path that exists on disk, it is treated
/// as an already-up-to-date source file; otherwise building it fails with
/// "no rule to build" style diagnostics.
pub struct FallbackRule;

impl RuleImpl for FallbackRule {
    fn priority(&self) -> i64 {
        priority::FALLBACK
    }

    fn label(&self) -> &str {
        "fallback"
    }

    fn try_match(&self, target: &str) -> Option<MatchToken> {
        Some(match normalize_path(target) {
            Ok(canonical) => MatchToken::plain(canonical),
            Err(e) => MatchToken {
                canonical: target.to_string(),
                captures: Vec::new(),
                path_error: Some(e),
            },
        })
    }

    fn deps(&self, _matched: &MatchToken) -> Vec<String> {
        Vec::new()
    }

    fn needs_self_update(&self, _matched: &MatchToken, _prior: Option<&Value>) -> bool {
        true
    }

    fn is_fallback(&self) -> bool {
        true
    }

    fn run(&self, matched: &MatchToken, _inputs: &Inputs) -> Result<Value, RecipeError> {
        if let Some(e) = &matched.path_error {
            return Err(RecipeError::Rule(format!(
                "'{}' is not a valid filepath ({e}) and no rule of that name exists",
                matched.canonical
            )));
        }
        let path = Path::new(&matched.canonical);
        if !path.exists() {
            return Err(RecipeError::Rule(format!(
                "no rule to build '{}' and no such file exists",
                matched.canonical
            )));
        }
        hash::hash_path(path)
            .map(Value::String)
            .map_err(RecipeError::from)
    }
}

/// A virtual rule: has no corresponding file, always considered to need
/// rebuilding by itself (it relies purely on the registry-level "did any
/// dependency change" check to decide whether to skip).
pub struct VirtualRule {
    name: String,
    deps: Vec<String>,
    recipe: VirtualRecipe,
}

impl VirtualRule {
    pub fn new(name: impl Into<String>, deps: Vec<String>, recipe: VirtualRecipe) -> VirtualRule {
        VirtualRule { name: name.into(), deps, recipe }
    }

    /// A group rule: a virtual rule with no recipe of its own, whose
    /// result is simply the snapshot of its dependencies' results.
    pub fn group(name: impl Into<String>, deps: Vec<String>) -> VirtualRule {
        VirtualRule::new(
            name,
            deps,
            Box::new(|inputs: &Inputs| {
                Ok(Value::Object(inputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
            }),
        )
    }
}

impl RuleImpl for VirtualRule {
    fn priority(&self) -> i64 {
        priority::VIRTUAL
    }

    fn label(&self) -> &str {
        &self.name
    }

    fn try_match(&self, target: &str) -> Option<MatchToken> {
        (target == self.name).then(|| MatchToken::plain(self.name.clone()))
    }

    fn deps(&self, _matched: &MatchToken) -> Vec<String> {
        self.deps.clone()
    }

    fn needs_self_update(&self, _matched: &MatchToken, _prior: Option<&Value>) -> bool {
        false
    }

    fn run(&self, _matched: &MatchToken, inputs: &Inputs) -> Result<Value, RecipeError> {
        (self.recipe)(inputs)
    }
}

/// A target rule: produces exactly the file named by `target_path`,
/// normalized once at construction.
pub struct TargetFileRule {
    target_path: String,
    deps: Vec<String>,
    recipe: TargetRecipe,
}

impl TargetFileRule {
    pub fn new(
        target_path: &str,
        deps: Vec<String>,
        recipe: TargetRecipe,
    ) -> Result<TargetFileRule, PathError> {
        let target_path = normalize_path(target_path)?;
        Ok(TargetFileRule { target_path, deps, recipe })
    }
}

impl RuleImpl for TargetFileRule {
    fn priority(&self) -> i64 {
        priority::TARGET
    }

    fn label(&self) -> &str {
        &self.target_path
    }

    fn try_match(&self, target: &str) -> Option<MatchToken> {
        let normalized = normalize_path(target).ok()?;
        (normalized == self.target_path).then(|| MatchToken::plain(self.target_path.clone()))
    }

    fn deps(&self, _matched: &MatchToken) -> Vec<String> {
        self.deps.clone()
    }

    fn needs_self_update(&self, matched: &MatchToken, prior: Option<&Value>) -> bool {
        file_needs_update(&matched.canonical, prior)
    }

    fn run(&self, matched: &MatchToken, inputs: &Inputs) -> Result<Value, RecipeError> {
        run_file_rule(&matched.canonical, inputs, |t, i| (self.recipe)(t, i))
    }
}

/// A pattern rule: matches any target whose (normalized, `./`-stripped)
/// form matches `pattern` as a whole-string regex, anchored so the
/// declared pattern need not itself account for an optional `./` prefix.
pub struct PatternFileRule {
    regex: Regex,
    dep_templates: Vec<String>,
    recipe: PatternRecipe,
}

impl PatternFileRule {
    pub fn new(
        pattern: &str,
        dep_templates: Vec<String>,
        recipe: PatternRecipe,
    ) -> Result<PatternFileRule, regex::Error> {
        let anchored = format!("^(?:\\./)?(?:{pattern})$");
        let regex = Regex::new(&anchored)?;
        Ok(PatternFileRule { regex, dep_templates, recipe })
    }

    /// Expand `${1}`, `${2}`, ... backreferences in `template` against the
    /// regex captures of a match.
    fn expand(template: &str, captures: &[String]) -> String {
        let mut out = String::with_capacity(template.len());
        let bytes = template.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
                if let Some(end) = template[i + 2..].find('}') {
                    let inner = &template[i + 2..i + 2 + end];
                    if let Ok(idx) = inner.parse::<usize>() {
                        if idx >= 1 && idx <= captures.len() {
                            out.push_str(&captures[idx - 1]);
                        }
                        i += 2 + end + 1;
                        continue;
                    }
                }
            }
            let ch = template[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
        out
    }
}

impl RuleImpl for PatternFileRule {
    fn priority(&self) -> i64 {
        priority::PATTERN
    }

    fn label(&self) -> &str {
        self.regex.as_str()
    }

    fn try_match(&self, target: &str) -> Option<MatchToken> {
        let normalized = normalize_path(target).ok()?;
        let stripped = normalized.strip_prefix("./").unwrap_or(&normalized);
        let caps = self.regex.captures(stripped)?;
        let captures = caps
            .iter()
            .skip(1)
            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect();
        Some(MatchToken { canonical: normalized, captures, path_error: None })
    }

    fn deps(&self, matched: &MatchToken) -> Vec<String> {
        self.dep_templates
            .iter()
            .map(|t| Self::expand(t, &matched.captures))
            .collect()
    }

    fn needs_self_update(&self, matched: &MatchToken, prior: Option<&Value>) -> bool {
        file_needs_update(&matched.canonical, prior)
    }

    fn run(&self, matched: &MatchToken, inputs: &Inputs) -> Result<Value, RecipeError> {
        let captures = matched.captures.clone();
        run_file_rule(&matched.canonical, inputs, move |t, i| {
            (self.recipe)(t, i, &captures)
        })
    }
}

fn file_needs_update(canonical: &str, prior: Option<&Value>) -> bool {
    let Some(Value::String(prior_hash)) = prior else {
        return true;
    };
    match hash::hash_path(Path::new(canonical)) {
        Ok(current) => &current != prior_hash,
        Err(_) => true,
    }
}

fn run_file_rule(
    canonical: &str,
    inputs: &Inputs,
    do_run: impl FnOnce(&str, &Inputs) -> Result<(), RecipeError>,
) -> Result<Value, RecipeError> {
    let path = PathBuf::from(canonical);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    do_run(canonical, inputs)?;
    if !path.exists() {
        return Err(RecipeError::Rule(format!(
            "recipe for '{canonical}' did not produce the expected file"
        )));
    }
    hash::hash_path(&path).map(Value::String).map_err(RecipeError::from)
}

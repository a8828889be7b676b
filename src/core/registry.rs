//! The registry: holds the priority-ordered rule list and the locked state
//! store, and drives target resolution and the recursive update algorithm.

use std::collections::BTreeMap;
use std::path::Path;

use crate::core::console::Console;
use crate::core::rules::{
    AlwaysRule, FallbackRule, PatternFileRule, PatternRecipe, TargetFileRule, TargetRecipe,
    VirtualRecipe, VirtualRule,
};
use crate::core::state::StateStore;
use crate::spi::traits::{MatchToken, RuleImpl};
use crate::spi::types::{
    Inputs, PakeError, RebuildMode, RecipeError, StateRecord, UpdateReason, Value,
};

/// One node of a dependency tree, used for `--graph` output.
#[derive(Debug, Clone)]
pub struct DepNode {
    pub name: String,
    pub children: Vec<DepNode>,
}

/// The rule registry and build state for a single invocation.
pub struct Registry {
    rules: Vec<Box<dyn RuleImpl>>,
    state: StateStore,
    console: Console,
}

impl Registry {
    /// Open the state file at `state_path` and seed the two implicit
    /// rules (`always`, and the catch-all fallback), matching
    /// `Registry.__init__`.
    pub fn new(state_path: &Path, console: Console) -> Result<Registry, PakeError> {
        let state = StateStore::open(state_path)?;
        let mut registry = Registry { rules: Vec::new(), state, console };
        registry.register(Box::new(AlwaysRule));
        registry.register(Box::new(FallbackRule));
        Ok(registry)
    }

    /// Register a rule, keeping the rule list sorted by ascending
    /// priority (stable, so registration order breaks ties) — matching
    /// `Registry.register`'s "insert then stable sort" behavior.
    pub fn register(&mut self, rule: Box<dyn RuleImpl>) {
        self.rules.push(rule);
        self.rules.sort_by_key(|r| r.priority());
    }

    /// Declare a target (exact-filename) rule.
    pub fn target(
        &mut self,
        path: &str,
        deps: Vec<String>,
        recipe: TargetRecipe,
    ) -> Result<(), PakeError> {
        let rule = TargetFileRule::new(path, deps, recipe)
            .map_err(|e| PakeError::User(format!("invalid target '{path}': {e}")))?;
        self.register(Box::new(rule));
        Ok(())
    }

    /// Declare a pattern rule.
    pub fn pattern(
        &mut self,
        pattern: &str,
        deps: Vec<String>,
        recipe: PatternRecipe,
    ) -> Result<(), PakeError> {
        let rule = PatternFileRule::new(pattern, deps, recipe)
            .map_err(|e| PakeError::User(format!("invalid pattern '{pattern}': {e}")))?;
        self.register(Box::new(rule));
        Ok(())
    }

    /// Declare a virtual rule with a native recipe.
    pub fn virtual_rule(&mut self, name: &str, deps: Vec<String>, recipe: VirtualRecipe) {
        self.register(Box::new(VirtualRule::new(name, deps, recipe)));
    }

    /// Declare a group: a virtual rule whose result is simply a snapshot
    /// of its dependencies' results.
    pub fn group(&mut self, name: &str, deps: Vec<String>) {
        self.register(Box::new(VirtualRule::group(name, deps)));
    }

    /// Declare `name` as an alias for a single existing target.
    pub fn alias(&mut self, name: &str, target: &str) {
        self.group(name, vec![target.to_string()]);
    }

    /// Declare `target` as the `default` alias.
    pub fn default_alias(&mut self, target: &str) {
        self.alias("default", target);
    }

    /// Declare a virtual rule that additionally always depends on
    /// `always` — the target is therefore rebuilt on every invocation
    /// regardless of its other dependencies.
    pub fn always_virtual(&mut self, name: &str, deps: Vec<String>, recipe: VirtualRecipe) {
        let mut full_deps = vec!["always".to_string()];
        full_deps.extend(deps);
        self.virtual_rule(name, full_deps, recipe);
    }

    /// Print `text` at verbosity level 1, the build-file `log()` entry
    /// point.
    pub fn log(&self, text: &str) {
        self.console.print_at(1, text);
    }

    /// Find the highest-priority rule matching `target`. The implicit
    /// fallback rule guarantees this always succeeds.
    fn resolve(&self, target: &str) -> Result<(usize, MatchToken), PakeError> {
        for (idx, rule) in self.rules.iter().enumerate() {
            if let Some(matched) = rule.try_match(target) {
                self.console.print_at(
                    3,
                    &format!("target '{target}' matched by rule '{}'", rule.label()),
                );
                return Ok((idx, matched));
            }
        }
        Err(PakeError::User(format!("no rule matched target '{target}'")))
    }

    /// Whether `target` resolves to the implicit catch-all rule (i.e., no
    /// explicit rule claims it).
    pub fn resolves_to_fallback(&self, target: &str) -> Result<bool, PakeError> {
        let (idx, _) = self.resolve(target)?;
        Ok(self.rules[idx].is_fallback())
    }

    /// Compare `inputs` against `target`'s previously recorded dependency
    /// fingerprint: no prior record, a dependency on `always`, a changed
    /// key set, or changed values are each reported with their own
    /// reason; `None` means the target is up to date as far as its
    /// inputs are concerned.
    pub fn needs_update(&self, target: &str, inputs: &Inputs) -> Option<UpdateReason> {
        let Some(prior) = self.state.get(target) else {
            return Some(UpdateReason::NotCached);
        };
        if inputs.keys().any(|k| k == "always") {
            return Some(UpdateReason::DependsOnAlways);
        }
        let prior_keys: Vec<&String> = prior.inputs.keys().collect();
        let current_keys: Vec<&String> = inputs.keys().collect();
        if prior_keys != current_keys {
            return Some(UpdateReason::DependencyListChanged);
        }
        let changed: Vec<String> = inputs
            .iter()
            .filter(|(k, v)| prior.inputs.get(*k) != Some(*v))
            .map(|(k, _)| k.clone())
            .collect();
        if changed.is_empty() {
            None
        } else {
            Some(UpdateReason::Changed(changed))
        }
    }

    /// Build `target`, returning its recorded result. `mode` controls
    /// whether the cache is bypassed for the top-level target and (for
    /// `RebuildMode::Deep`) for every transitive dependency.
    pub fn update(&mut self, target: &str, mode: RebuildMode) -> Result<Value, PakeError> {
        self.update_inner(target, mode, &[])
    }

    /// Resolve the full dependency tree of `targets` without running
    /// anything, for `--graph`.
    pub fn get_deps(&self, targets: &[String]) -> Result<Vec<DepNode>, PakeError> {
        targets.iter().map(|t| self.get_deps_one(t, &[])).collect()
    }

    fn get_deps_one(&self, target: &str, chain: &[String]) -> Result<DepNode, PakeError> {
        let (idx, matched) = self.resolve(target)?;
        let canonical = matched.canonical.clone();
        if chain.contains(&canonical) {
            let mut full_chain = chain.to_vec();
            full_chain.push(canonical);
            return Err(PakeError::build(full_chain, "dependency cycle detected"));
        }
        let mut next_chain = chain.to_vec();
        next_chain.push(canonical.clone());

        let deps = self.rules[idx].deps(&matched);
        let children = deps
            .iter()
            .map(|d| self.get_deps_one(d, &next_chain))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DepNode { name: canonical, children })
    }

    fn update_inner(
        &mut self,
        target: &str,
        mode: RebuildMode,
        chain: &[String],
    ) -> Result<Value, PakeError> {
        let (idx, matched) = self.resolve(target)?;
        let canonical = matched.canonical.clone();

        if chain.contains(&canonical) {
            let mut full_chain = chain.to_vec();
            full_chain.push(canonical);
            return Err(PakeError::build(full_chain, "dependency cycle detected"));
        }
        let mut next_chain = chain.to_vec();
        next_chain.push(canonical.clone());

        let deps = self.rules[idx].deps(&matched);

        let mut inputs: Inputs = BTreeMap::new();
        for dep in &deps {
            let result = self.update_inner(dep, mode.propagated(), &next_chain)?;
            inputs.insert(dep.clone(), result);
        }

        let prior = self.state.get(&canonical).cloned();
        let cache_reason = self.needs_update(&canonical, &inputs);

        let needs_update = if mode.forces_this() {
            true
        } else if let Some(reason) = &cache_reason {
            self.console.print_at(2, &format!("'{canonical}' stale: {reason}"));
            true
        } else {
            self.rules[idx].needs_self_update(&matched, prior.as_ref().map(|p| &p.result))
        };

        if !needs_update {
            self.console.print_at(1, &format!("'{canonical}' is up to date"));
            return Ok(prior.expect("cache hit implies a prior record").result);
        }

        self.console.print_at(1, &format!("building '{canonical}'"));
        let value = self.rules[idx].run(&matched, &inputs).map_err(|e| match e {
            RecipeError::Rule(msg) => PakeError::build(next_chain.clone(), msg),
            RecipeError::Unexpected(cause) => {
                PakeError::build_with_cause(next_chain.clone(), "recipe failed", cause)
            }
        })?;
        self.console.print_at(2, &format!("'{canonical}' = {value}"));

        self.state.set(canonical, StateRecord { inputs, result: value.clone() });
        self.state.save()?;

        Ok(value)
    }
}

/// Recursively print a dependency tree: each node's name on its own line,
/// indented two spaces per level, children following depth-first.
pub fn print_graph(nodes: &[DepNode], indent: usize) {
    for node in nodes {
        println!("{}{}", "  ".repeat(indent), node.name);
        print_graph(&node.children, indent + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    // `update` resolves file-rule targets relative to the process's
    // current directory, so tests that need a scratch directory must
    // serialize their `set_current_dir` calls against each other.
    static CWD_LOCK: Mutex<()> = Mutex::new(());

    fn registry(dir: &TempDir) -> Registry {
        Registry::new(&dir.path().join("state.json"), Console::silent()).unwrap()
    }

    #[test]
    fn building_a_fresh_target_runs_its_recipe() {
        let _guard = CWD_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let mut reg = registry(&dir);

        static RAN: AtomicUsize = AtomicUsize::new(0);
        reg.target(
            "out.txt",
            vec![],
            Box::new(|target, _inputs| {
                RAN.fetch_add(1, Ordering::SeqCst);
                std::fs::write(target, "hi").map_err(Into::into)
            }),
        )
        .unwrap();

        let result = reg.update("out.txt", RebuildMode::None).unwrap();
        assert_eq!(RAN.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Value::String(_)));
    }

    #[test]
    fn up_to_date_target_is_not_rerun() {
        let _guard = CWD_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let mut reg = registry(&dir);

        static RAN: AtomicUsize = AtomicUsize::new(0);
        reg.target(
            "out.txt",
            vec![],
            Box::new(|target, _inputs| {
                RAN.fetch_add(1, Ordering::SeqCst);
                std::fs::write(target, "hi").map_err(Into::into)
            }),
        )
        .unwrap();

        reg.update("out.txt", RebuildMode::None).unwrap();
        reg.update("out.txt", RebuildMode::None).unwrap();
        assert_eq!(RAN.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn self_cycle_is_rejected() {
        let _guard = CWD_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let mut reg = registry(&dir);
        reg.virtual_rule("a", vec!["a".to_string()], Box::new(|_| Ok(Value::Null)));
        let err = reg.update("a", RebuildMode::None).unwrap_err();
        assert!(matches!(err, PakeError::Build(_)));
    }

    #[test]
    fn missing_default_is_reported() {
        let _guard = CWD_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let reg = registry(&dir);
        assert!(reg.resolves_to_fallback("default").unwrap());
    }

    #[test]
    fn needs_update_reasons_match_spec_cases() {
        let _guard = CWD_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let mut reg = registry(&dir);

        let mut inputs: Inputs = BTreeMap::new();
        assert_eq!(reg.needs_update("x", &inputs), Some(UpdateReason::NotCached));

        reg.state.set("x".to_string(), StateRecord { inputs: inputs.clone(), result: Value::Null });
        assert_eq!(reg.needs_update("x", &inputs), None);

        inputs.insert("always".to_string(), Value::String("n1".to_string()));
        assert_eq!(reg.needs_update("x", &inputs), Some(UpdateReason::DependsOnAlways));

        let mut inputs2: Inputs = BTreeMap::new();
        inputs2.insert("a".to_string(), Value::String("1".to_string()));
        reg.state.set("y".to_string(), StateRecord { inputs: inputs2.clone(), result: Value::Null });
        let mut changed_keys: Inputs = BTreeMap::new();
        changed_keys.insert("b".to_string(), Value::String("1".to_string()));
        assert_eq!(reg.needs_update("y", &changed_keys), Some(UpdateReason::DependencyListChanged));

        let mut changed_value: Inputs = BTreeMap::new();
        changed_value.insert("a".to_string(), Value::String("2".to_string()));
        assert_eq!(
            reg.needs_update("y", &changed_value),
            Some(UpdateReason::Changed(vec!["a".to_string()]))
        );
    }
}

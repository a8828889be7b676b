//! The declarative `Pakefile.toml` loader: converts a flat, `type`-tagged
//! TOML table per `[[rule]]` into a registered rule.

use serde::Deserialize;

use crate::core::process::Command;
use crate::core::registry::Registry;
use crate::spi::types::{Inputs, PakeError, RecipeError, Value};

/// A single `[[rule]]` table, deserialized flat; which fields are required
/// depends on `rule_type`.
#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(rename = "type")]
    rule_type: String,
    name: String,
    #[serde(default)]
    deps: Vec<String>,
    run: Option<String>,
    target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPakefile {
    #[serde(rename = "rule", default)]
    rules: Vec<RawRule>,
}

/// Parse `contents` as a `Pakefile.toml` and register every declared rule
/// against `registry`.
pub fn load_pakefile(contents: &str, registry: &mut Registry) -> Result<(), PakeError> {
    let raw: RawPakefile =
        toml::from_str(contents).map_err(|e| PakeError::User(format!("malformed Pakefile: {e}")))?;
    for rule in raw.rules {
        apply_rule(rule, registry)?;
    }
    Ok(())
}

fn apply_rule(raw: RawRule, registry: &mut Registry) -> Result<(), PakeError> {
    match raw.rule_type.as_str() {
        "target" => {
            let run = require_run(&raw)?;
            registry.target(
                &raw.name,
                raw.deps,
                Box::new(move |target, inputs| run_shell(&run, target, inputs, &[])),
            )
        }
        "pattern" => {
            let run = require_run(&raw)?;
            registry.pattern(
                &raw.name,
                raw.deps,
                Box::new(move |target, inputs, captures| run_shell(&run, target, inputs, captures)),
            )
        }
        "virtual" => {
            match raw.run {
                Some(run) => registry.virtual_rule(
                    &raw.name,
                    raw.deps,
                    Box::new(move |inputs| run_shell_capture(&run, inputs)),
                ),
                None => registry.group(&raw.name, raw.deps),
            }
            Ok(())
        }
        "group" => {
            if raw.run.is_some() {
                return Err(PakeError::User(format!(
                    "rule '{}': a group rule may not declare 'run' (use type = \"virtual\" instead)",
                    raw.name
                )));
            }
            registry.group(&raw.name, raw.deps);
            Ok(())
        }
        "always" => {
            match raw.run {
                Some(run) => registry.always_virtual(
                    &raw.name,
                    raw.deps,
                    Box::new(move |inputs| run_shell_capture(&run, inputs)),
                ),
                None => registry.always_virtual(&raw.name, raw.deps, Box::new(|_| Ok(Value::Null))),
            }
            Ok(())
        }
        "alias" => {
            let target = raw.target.ok_or_else(|| {
                PakeError::User(format!("rule '{}': alias requires 'target'", raw.name))
            })?;
            registry.alias(&raw.name, &target);
            Ok(())
        }
        "default" => {
            let target = raw
                .target
                .ok_or_else(|| PakeError::User("default rule requires 'target'".to_string()))?;
            registry.default_alias(&target);
            Ok(())
        }
        other => Err(PakeError::User(format!(
            "rule '{}': unknown rule type '{other}'",
            raw.name
        ))),
    }
}

fn require_run(raw: &RawRule) -> Result<String, PakeError> {
    raw.run.clone().ok_or_else(|| {
        PakeError::User(format!("rule '{}': {} rules require 'run'", raw.name, raw.rule_type))
    })
}

/// Substitute `${target}`, `${deps}`, `${dep:NAME}`, and pattern
/// backreferences `${1}`, `${2}`, ... into a recipe template.
fn render(template: &str, target: &str, inputs: &Inputs, captures: &[String]) -> String {
    let mut out = template.replace("${target}", target);

    let deps_joined: Vec<&str> = inputs.keys().map(String::as_str).collect();
    out = out.replace("${deps}", &deps_joined.join(" "));

    for dep in inputs.keys() {
        out = out.replace(&format!("${{dep:{dep}}}"), dep);
    }
    for (i, capture) in captures.iter().enumerate() {
        out = out.replace(&format!("${{{}}}", i + 1), capture);
    }
    out
}

fn run_shell(
    template: &str,
    target: &str,
    inputs: &Inputs,
    captures: &[String],
) -> Result<(), RecipeError> {
    let rendered = render(template, target, inputs, captures);
    Command::shell(rendered).run()
}

fn run_shell_capture(template: &str, inputs: &Inputs) -> Result<Value, RecipeError> {
    let rendered = render(template, "", inputs, &[]);
    let output = Command::shell(rendered).output()?;
    let text = String::from_utf8_lossy(&output).trim().to_string();
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::console::Console;
    use tempfile::TempDir;

    fn fresh_registry(dir: &TempDir) -> Registry {
        Registry::new(&dir.path().join("state.json"), Console::silent()).unwrap()
    }

    #[test]
    fn loads_target_and_alias_rules() {
        let dir = TempDir::new().unwrap();
        let mut registry = fresh_registry(&dir);
        let toml = r#"
            [[rule]]
            type = "target"
            name = "out.txt"
            deps = []
            run = "echo hi > ${target}"

            [[rule]]
            type = "alias"
            name = "build"
            target = "out.txt"

            [[rule]]
            type = "default"
            target = "build"
        "#;
        load_pakefile(toml, &mut registry).unwrap();
        assert!(!registry.resolves_to_fallback("default").unwrap());
        assert!(!registry.resolves_to_fallback("build").unwrap());
        assert!(!registry.resolves_to_fallback("out.txt").unwrap());
    }

    #[test]
    fn group_rule_rejects_a_run_key() {
        let dir = TempDir::new().unwrap();
        let mut registry = fresh_registry(&dir);
        let toml = r#"
            [[rule]]
            type = "group"
            name = "all"
            run = "echo not allowed"
        "#;
        assert!(load_pakefile(toml, &mut registry).is_err());
    }

    #[test]
    fn unknown_rule_type_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut registry = fresh_registry(&dir);
        let toml = r#"
            [[rule]]
            type = "bogus"
            name = "x"
        "#;
        assert!(load_pakefile(toml, &mut registry).is_err());
    }

    #[test]
    fn render_substitutes_target_deps_and_backreferences() {
        let mut inputs = Inputs::new();
        inputs.insert("a.c".to_string(), Value::String("hash-a".to_string()));
        inputs.insert("b.c".to_string(), Value::String("hash-b".to_string()));
        let rendered = render(
            "cc ${deps} -o ${target} # ${dep:a.c} ${1}",
            "out.o",
            &inputs,
            &["main".to_string()],
        );
        assert_eq!(rendered, "cc a.c b.c -o out.o # a.c main");
    }
}

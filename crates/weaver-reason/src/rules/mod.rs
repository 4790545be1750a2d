//! Declarative inference rules.
//!
//! A rule document is data: an ordered list of records
//!
//! ```toml
//! [[rule]]
//! name = "Skill inference"
//! if = [
//!     "(person:Person)-[:WORKS_ON]->(project:Project)",
//!     "(project)-[:USES_TECH]->(tech)",
//! ]
//! where = ["person.active = true"]
//!
//! [[rule.then]]
//! create = "(person)-[:HAS_SKILL]->(tech)"
//! properties = { inferred = true, confidence_score = 0.9 }
//! ```
//!
//! JSON documents are an array of the same records. Every rule is parsed
//! and checked when the document is loaded; a single bad rule fails the
//! whole load.

pub mod engine;
pub mod parse;

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use weaver_core::{PropertyKey, Properties, RelType, Var};
use weaver_graph::MatchPattern;

use crate::error::{ReasonError, Result};

pub use engine::{InferenceReport, RuleEngine, RuleReport};
pub use parse::{parse_create, parse_filters, parse_fragment, CreateTemplate};

// ── Document format ──────────────────────────────────────────────

/// A rule as written in a rule document.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RuleSpec {
    pub name: String,
    #[serde(rename = "if")]
    pub conditions: Vec<String>,
    #[serde(rename = "where", default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,
    pub then: Vec<ActionSpec>,
}

/// One `then` entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ActionSpec {
    pub create: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Deserialize)]
struct TomlDocument {
    #[serde(default)]
    rule: Vec<RuleSpec>,
}

// ── Compiled rules ───────────────────────────────────────────────

/// Create one edge between the nodes bound to `source` and `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeriveAction {
    pub source: Var,
    pub target: Var,
    pub rel_type: RelType,
    pub properties: Properties,
}

/// A parsed and checked rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub pattern: MatchPattern,
    pub actions: Vec<DeriveAction>,
}

impl Rule {
    /// Parse every fragment, filter and template of `spec` and check that
    /// the actions only reference variables the pattern binds.
    pub fn compile(spec: &RuleSpec) -> Result<Self> {
        let misconfigured = |reason: String| ReasonError::RuleConfiguration {
            rule: spec.name.clone(),
            reason,
        };
        let unparsable = |fragment: &str, reason: String| ReasonError::RuleParse {
            rule: spec.name.clone(),
            fragment: fragment.to_string(),
            reason,
        };

        if spec.name.trim().is_empty() {
            return Err(ReasonError::RuleDocument(
                "every rule needs a non-empty name".to_string(),
            ));
        }
        if spec.conditions.is_empty() {
            return Err(misconfigured("`if` has no pattern fragments".to_string()));
        }
        if spec.then.is_empty() {
            return Err(misconfigured("`then` has no actions".to_string()));
        }

        let mut paths = Vec::with_capacity(spec.conditions.len());
        for fragment in &spec.conditions {
            paths.push(parse_fragment(fragment).map_err(|e| unparsable(fragment, e))?);
        }
        let mut filters = Vec::new();
        for expr in &spec.filters {
            filters.extend(parse_filters(expr).map_err(|e| unparsable(expr, e))?);
        }

        let pattern = MatchPattern::new(paths).with_filters(filters);
        pattern
            .validate()
            .map_err(|e| misconfigured(e.to_string()))?;

        let node_vars: HashSet<Var> = pattern.node_vars().into_iter().collect();
        let mut actions = Vec::with_capacity(spec.then.len());
        for action in &spec.then {
            let template =
                parse_create(&action.create).map_err(|e| unparsable(&action.create, e))?;

            for (var, label) in [
                (&template.source, &template.source_label),
                (&template.target, &template.target_label),
            ] {
                if !node_vars.contains(var) {
                    return Err(misconfigured(format!(
                        "`{}` references node variable `{var}`, which no `if` fragment binds",
                        action.create
                    )));
                }
                if let Some(label) = label {
                    if pattern.label_of(var) != Some(label) {
                        return Err(misconfigured(format!(
                            "`{}` labels `{var}` as {label}, which differs from its `if` label",
                            action.create
                        )));
                    }
                }
            }

            for key in action.properties.keys() {
                PropertyKey::parse(key).map_err(|e| misconfigured(e.to_string()))?;
            }

            actions.push(DeriveAction {
                source: template.source,
                target: template.target,
                rel_type: template.rel_type,
                properties: action.properties.clone(),
            });
        }

        Ok(Self {
            name: spec.name.clone(),
            pattern,
            actions,
        })
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Compile a list of specs, rejecting duplicate names.
pub fn compile_rules(specs: &[RuleSpec]) -> Result<Vec<Rule>> {
    let mut names = HashSet::new();
    let mut rules = Vec::with_capacity(specs.len());
    for spec in specs {
        if !names.insert(spec.name.as_str()) {
            return Err(ReasonError::RuleDocument(format!(
                "duplicate rule name {:?}",
                spec.name
            )));
        }
        rules.push(Rule::compile(spec)?);
    }
    Ok(rules)
}

/// Load rules from a TOML document of `[[rule]]` tables.
pub fn load_rules_toml(text: &str) -> Result<Vec<Rule>> {
    let document: TomlDocument =
        toml::from_str(text).map_err(|e| ReasonError::RuleDocument(e.to_string()))?;
    compile_rules(&document.rule)
}

/// Load rules from a JSON array of rule records.
pub fn load_rules_json(text: &str) -> Result<Vec<Rule>> {
    let specs: Vec<RuleSpec> =
        serde_json::from_str(text).map_err(|e| ReasonError::RuleDocument(e.to_string()))?;
    compile_rules(&specs)
}

/// Load a rule file, choosing the format by extension (`.toml` or `.json`).
pub fn load_rules_file(path: impl AsRef<Path>) -> Result<Vec<Rule>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let rules = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => load_rules_toml(&text)?,
        Some("json") => load_rules_json(&text)?,
        _ => {
            return Err(ReasonError::RuleDocument(format!(
                "unsupported rule file {}: expected .toml or .json",
                path.display()
            )))
        }
    };
    tracing::info!(path = %path.display(), count = rules.len(), "Loaded rules");
    Ok(rules)
}

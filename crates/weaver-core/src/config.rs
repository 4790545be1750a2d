//! Configuration management for Weaver services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`WEAVER__` prefix, `__` as section separator)
//! 2. Config file (`weaver.toml`, optional)
//! 3. Defaults
//!
//! The `[neo4j]` section is read by the graph crate; this module owns the
//! `[reasoning]` and `[vocabulary]` sections.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{Label, PropertyValue, RelType};

/// Reasoning and vocabulary settings shared by all Weaver components.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WeaverConfig {
    pub reasoning: ReasoningConfig,
    pub vocabulary: Vocabulary,
}

impl WeaverConfig {
    /// Load from `<file_prefix>.toml` (if present) layered under `WEAVER__*`
    /// environment variables.
    pub fn load(file_prefix: &str) -> Result<Self, CoreError> {
        Self::from_layered(&load_layered(file_prefix)?)
    }

    /// Deserialize from an already-built layered configuration.
    pub fn from_layered(cfg: &config::Config) -> Result<Self, CoreError> {
        let parsed: Self = cfg.clone().try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject identifiers that could never be used in a query.
    pub fn validate(&self) -> Result<(), CoreError> {
        for name in &self.reasoning.functional_relationships {
            RelType::parse(name)?;
        }
        for name in &self.vocabulary.relationship_types {
            RelType::parse(name)?;
        }
        for name in &self.vocabulary.labels {
            Label::parse(name)?;
        }
        if self.reasoning.max_hops == 0 {
            return Err(CoreError::Config(
                "reasoning.max_hops must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Build the layered `config::Config` used by every Weaver binary.
pub fn load_layered(file_prefix: &str) -> Result<config::Config, CoreError> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("WEAVER")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("reasoning.functional_relationships")
                .with_list_parse_key("vocabulary.labels")
                .with_list_parse_key("vocabulary.relationship_types")
                .try_parsing(true),
        )
        .build()?;
    Ok(cfg)
}

/// Settings for the contradiction guard, rule engine and hypothesis generator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// Relationship types a source node may hold at most once.
    pub functional_relationships: Vec<String>,

    /// Disjunction of property equalities that make a node noteworthy.
    pub noteworthy: Vec<NoteworthyCondition>,

    /// Hop bound for hypothesis path search.
    pub max_hops: usize,

    /// Rule document loaded by `weaver infer` when no path is given.
    pub rules_path: Option<String>,
}

/// One `key = value` check of the noteworthy predicate.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NoteworthyCondition {
    pub key: String,
    pub value: PropertyValue,
}

impl NoteworthyCondition {
    pub fn new(key: &str, value: impl Into<PropertyValue>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
        }
    }
}

fn default_functional_relationships() -> Vec<String> {
    vec!["HAS_CEO".to_string(), "HAS_BUDGET".to_string()]
}

fn default_noteworthy() -> Vec<NoteworthyCondition> {
    vec![
        NoteworthyCondition::new("status", "deprecated"),
        NoteworthyCondition::new("sentiment", "negative"),
        NoteworthyCondition::new("stress_level", "high"),
    ]
}

fn default_max_hops() -> usize {
    3
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            functional_relationships: default_functional_relationships(),
            noteworthy: default_noteworthy(),
            max_hops: default_max_hops(),
            rules_path: None,
        }
    }
}

/// Closed set of labels and relationship types a deployment permits.
///
/// An empty list leaves that kind open: any syntactically valid identifier
/// is accepted.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Vocabulary {
    pub labels: Vec<String>,
    pub relationship_types: Vec<String>,
}

impl Vocabulary {
    pub fn permits_label(&self, label: &Label) -> bool {
        self.labels.is_empty() || self.labels.iter().any(|l| l == label.as_str())
    }

    pub fn permits_rel_type(&self, rel_type: &RelType) -> bool {
        self.relationship_types.is_empty()
            || self
                .relationship_types
                .iter()
                .any(|r| r == rel_type.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(text: &str) -> Result<WeaverConfig, CoreError> {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?;
        WeaverConfig::from_layered(&cfg)
    }

    #[test]
    fn test_default_config() {
        let config = WeaverConfig::default();
        assert_eq!(
            config.reasoning.functional_relationships,
            vec!["HAS_CEO", "HAS_BUDGET"]
        );
        assert_eq!(config.reasoning.max_hops, 3);
        assert_eq!(config.reasoning.noteworthy.len(), 3);
        assert!(config.vocabulary.labels.is_empty());
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = from_toml(
            r#"
            [neo4j]
            uri = "bolt://graph:7687"

            [reasoning]
            functional_relationships = ["HAS_CEO", "REPORTS_TO"]
            max_hops = 2
            noteworthy = [{ key = "risk", value = "critical" }]

            [vocabulary]
            labels = ["Person", "Company"]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.reasoning.functional_relationships,
            vec!["HAS_CEO", "REPORTS_TO"]
        );
        assert_eq!(config.reasoning.max_hops, 2);
        assert_eq!(
            config.reasoning.noteworthy,
            vec![NoteworthyCondition::new("risk", "critical")]
        );
        assert_eq!(config.vocabulary.labels, vec!["Person", "Company"]);
        assert!(config.vocabulary.relationship_types.is_empty());
    }

    #[test]
    fn test_invalid_functional_type_rejected() {
        let err = from_toml(
            r#"
            [reasoning]
            functional_relationships = ["HAS CEO"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidIdentifier { .. }));
    }

    #[test]
    fn test_zero_hops_rejected() {
        let err = from_toml("[reasoning]\nmax_hops = 0\n").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_vocabulary_membership() {
        let vocab = Vocabulary {
            labels: vec!["Person".to_string()],
            relationship_types: Vec::new(),
        };
        assert!(vocab.permits_label(&Label::parse("Person").unwrap()));
        assert!(!vocab.permits_label(&Label::parse("Robot").unwrap()));
        assert!(vocab.permits_rel_type(&RelType::parse("ANYTHING").unwrap()));
    }
}

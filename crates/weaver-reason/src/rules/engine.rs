//! One-pass forward chaining over the loaded rules.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use weaver_graph::{Binding, GraphStore, UpsertOutcome};

use super::{load_rules_file, DeriveAction, Rule};
use crate::error::{ReasonError, Result};

/// Outcome of one rule execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleReport {
    pub name: String,
    /// Distinct bindings matched.
    pub bindings: usize,
    /// Edge upserts applied.
    pub derived: usize,
    /// Upserts that found an endpoint gone.
    pub skipped: usize,
    /// Upserts that failed; the rest of the rule still ran.
    pub failed: usize,
}

/// Outcome of a full inference pass.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rules: Vec<RuleReport>,
}

impl InferenceReport {
    pub fn total_derived(&self) -> usize {
        self.rules.iter().map(|r| r.derived).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.rules.iter().map(|r| r.failed).sum()
    }
}

/// Applies rules to the graph, one pass per call.
///
/// Derived edges are written through [`GraphStore::upsert_edge_between`],
/// so re-running over an unchanged graph is a no-op. Derivations are not
/// checked by the contradiction guard.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    store: GraphStore,
    rules: Vec<Rule>,
}

impl RuleEngine {
    /// Build an engine, rejecting rules that use names outside the store's
    /// vocabulary.
    pub fn new(store: GraphStore, rules: Vec<Rule>) -> Result<Self> {
        for rule in &rules {
            let misconfigured = |e: weaver_graph::GraphError| ReasonError::RuleConfiguration {
                rule: rule.name.clone(),
                reason: e.to_string(),
            };
            store.check_pattern(&rule.pattern).map_err(misconfigured)?;
            for action in &rule.actions {
                store
                    .check_rel_type(&action.rel_type)
                    .map_err(misconfigured)?;
            }
        }
        Ok(Self { store, rules })
    }

    pub fn from_file(store: GraphStore, path: impl AsRef<Path>) -> Result<Self> {
        Self::new(store, load_rules_file(path)?)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Execute every rule once, in order. Later rules see the derivations of
    /// earlier ones.
    pub async fn run_inference(&self) -> Result<InferenceReport> {
        let started_at = Utc::now();
        tracing::info!(rules = self.rules.len(), "Starting inference pass");

        let mut reports = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            reports.push(self.execute_rule(rule).await?);
        }

        let report = InferenceReport {
            started_at,
            finished_at: Utc::now(),
            rules: reports,
        };
        tracing::info!(
            derived = report.total_derived(),
            failed = report.total_failed(),
            "Inference pass complete"
        );
        Ok(report)
    }

    /// Match one rule and apply its actions to every binding.
    ///
    /// Fails only if the match itself fails. Individual derivation failures
    /// are logged and counted.
    pub async fn execute_rule(&self, rule: &Rule) -> Result<RuleReport> {
        let bindings = self.store.match_pattern(&rule.pattern).await?;

        let mut report = RuleReport {
            name: rule.name.clone(),
            bindings: bindings.len(),
            ..Default::default()
        };

        for binding in &bindings {
            for action in &rule.actions {
                match self.derive(rule, binding, action).await {
                    Ok(UpsertOutcome::Applied) => report.derived += 1,
                    Ok(UpsertOutcome::MissingEndpoint) => report.skipped += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(
                            rule = %rule.name,
                            rel_type = %action.rel_type,
                            error = %e,
                            "Derivation failed"
                        );
                    }
                }
            }
        }

        tracing::info!(
            rule = %rule.name,
            bindings = report.bindings,
            derived = report.derived,
            skipped = report.skipped,
            failed = report.failed,
            "Rule executed"
        );
        Ok(report)
    }

    async fn derive(
        &self,
        rule: &Rule,
        binding: &Binding,
        action: &DeriveAction,
    ) -> Result<UpsertOutcome> {
        let unbound = |var: &weaver_core::Var| ReasonError::RuleConfiguration {
            rule: rule.name.clone(),
            reason: format!("binding has no node for `{var}`"),
        };
        let source = binding
            .node(&action.source)
            .ok_or_else(|| unbound(&action.source))?;
        let target = binding
            .node(&action.target)
            .ok_or_else(|| unbound(&action.target))?;

        let outcome = self
            .store
            .upsert_edge_between(&source.id, &target.id, &action.rel_type, &action.properties)
            .await?;

        tracing::debug!(
            rule = %rule.name,
            source = %source.name,
            target = %target.name,
            rel_type = %action.rel_type,
            ?outcome,
            "Derived relationship"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::load_rules_toml;
    use weaver_core::{Label, Properties, PropertyValue, RelType, Vocabulary};

    const TRANSITIVE: &str = r#"
        [[rule]]
        name = "Manager chain"
        if = ["(a:Person)-[:REPORTS_TO]->(b:Person)", "(b)-[:REPORTS_TO]->(c:Person)"]
        [[rule.then]]
        create = "(a)-[:SKIP_LEVEL]->(c)"

        [[rule]]
        name = "Skip-level visibility"
        if = ["(c:Person)<-[:SKIP_LEVEL]-(a:Person)"]
        [[rule.then]]
        create = "(c)-[:CAN_SEE]->(a)"
    "#;

    async fn person_chain(store: &GraphStore, names: &[&str]) {
        let person = Label::parse("Person").unwrap();
        for name in names {
            store.upsert_node(name, &person, &Properties::new()).await.unwrap();
        }
        for pair in names.windows(2) {
            store
                .upsert_edge(
                    pair[0],
                    &person,
                    pair[1],
                    &person,
                    &RelType::parse("REPORTS_TO").unwrap(),
                    &Properties::new(),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_later_rules_see_earlier_derivations() {
        let store = GraphStore::in_memory();
        person_chain(&store, &["Ann", "Bob", "Cat"]).await;

        let engine = RuleEngine::new(store.clone(), load_rules_toml(TRANSITIVE).unwrap()).unwrap();
        let report = engine.run_inference().await.unwrap();

        assert_eq!(report.rules[0].derived, 1);
        assert_eq!(report.rules[1].derived, 1);
        let visible = store
            .outgoing("Cat", &Label::parse("Person").unwrap(), &RelType::parse("CAN_SEE").unwrap())
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "Ann");
    }

    #[tokio::test]
    async fn test_no_bindings_derives_nothing() {
        let store = GraphStore::in_memory();
        let engine = RuleEngine::new(store, load_rules_toml(TRANSITIVE).unwrap()).unwrap();
        let report = engine.run_inference().await.unwrap();
        assert_eq!(report.total_derived(), 0);
        assert!(report.rules.iter().all(|r| r.bindings == 0));
    }

    #[test]
    fn test_vocabulary_checked_at_construction() {
        let store = GraphStore::in_memory().with_vocabulary(Vocabulary {
            labels: Vec::new(),
            relationship_types: vec!["REPORTS_TO".to_string(), "SKIP_LEVEL".to_string()],
        });
        let err = RuleEngine::new(store, load_rules_toml(TRANSITIVE).unwrap()).unwrap_err();
        match err {
            ReasonError::RuleConfiguration { rule, reason } => {
                assert_eq!(rule, "Skip-level visibility");
                assert!(reason.contains("CAN_SEE"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_where_filter_excludes_binding() {
        let rules = load_rules_toml(
            r#"
            [[rule]]
            name = "Senior reviewers approve"
            if = ["(p:Person)-[:REVIEWS]->(c:Change)"]
            where = ["p.years >= 5"]
            [[rule.then]]
            create = "(p)-[:CAN_APPROVE]->(c)"
            "#,
        )
        .unwrap();

        let store = GraphStore::in_memory();
        let person = Label::parse("Person").unwrap();
        let change = Label::parse("Change").unwrap();
        let reviews = RelType::parse("REVIEWS").unwrap();
        store.upsert_node("PR-12", &change, &Properties::new()).await.unwrap();
        for (name, years) in [("Grace", 9), ("Ivan", 1)] {
            let props = Properties::from([("years".to_string(), PropertyValue::Int(years))]);
            store.upsert_node(name, &person, &props).await.unwrap();
            store
                .upsert_edge(name, &person, "PR-12", &change, &reviews, &Properties::new())
                .await
                .unwrap();
        }

        let engine = RuleEngine::new(store.clone(), rules).unwrap();
        let report = engine.run_inference().await.unwrap();
        assert_eq!(report.rules[0].bindings, 1);
        assert_eq!(report.rules[0].derived, 1);

        let can_approve = RelType::parse("CAN_APPROVE").unwrap();
        let senior = store.outgoing("Grace", &person, &can_approve).await.unwrap();
        assert_eq!(senior.len(), 1);
        assert_eq!(senior[0].name, "PR-12");
        assert!(store.outgoing("Ivan", &person, &can_approve).await.unwrap().is_empty());
    }
}

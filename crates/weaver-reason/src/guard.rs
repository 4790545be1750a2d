//! Functional-relationship contradiction checks.
//!
//! The guard is read-only. Callers run [`ContradictionGuard::check`] before
//! writing a fact and decide what to do with a conflict; the check and the
//! write are not atomic.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use weaver_core::{Label, NodeSnapshot, RelType, ReasoningConfig};
use weaver_graph::GraphStore;

use crate::error::Result;

/// A printable `(subject)-[:TYPE]->(target)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fact {
    pub subject: String,
    pub subject_label: Label,
    pub rel_type: RelType,
    pub target: String,
    pub target_label: Label,
}

impl Fact {
    pub fn new(
        subject: &str,
        subject_label: Label,
        rel_type: RelType,
        target: &str,
        target_label: Label,
    ) -> Self {
        Self {
            subject: subject.to_string(),
            subject_label,
            rel_type,
            target: target.to_string(),
            target_label,
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-[:{}]->({})", self.subject, self.rel_type, self.target)
    }
}

/// Why a proposed fact was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictDescriptor {
    /// The rejected fact, e.g. `(Apple)-[:HAS_CEO]->(Tim Cook)`.
    pub new_fact: String,
    /// The stored fact it contradicts.
    pub conflicting_fact: String,
    pub rel_type: String,
    /// The subject already held several edges of a functional type before
    /// this check.
    pub pre_existing_violation: bool,
}

impl fmt::Display for ConflictDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} contradicts existing fact {}",
            self.new_fact, self.conflicting_fact
        )?;
        if self.pre_existing_violation {
            f.write_str(" (relationship was already multi-valued)")?;
        }
        Ok(())
    }
}

/// Gatekeeper for single-valued relationship types.
#[derive(Debug, Clone)]
pub struct ContradictionGuard {
    store: GraphStore,
    functional: BTreeSet<RelType>,
}

impl ContradictionGuard {
    pub fn new(store: GraphStore, functional: impl IntoIterator<Item = RelType>) -> Self {
        Self {
            store,
            functional: functional.into_iter().collect(),
        }
    }

    pub fn from_config(store: GraphStore, config: &ReasoningConfig) -> Result<Self> {
        let functional = config
            .functional_relationships
            .iter()
            .map(|name| RelType::parse(name))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::new(store, functional))
    }

    pub fn is_functional(&self, rel_type: &RelType) -> bool {
        self.functional.contains(rel_type)
    }

    pub fn functional_types(&self) -> impl Iterator<Item = &RelType> {
        self.functional.iter()
    }

    /// Check a proposed `(subject)-[:rel_type]->(target)` against stored facts.
    ///
    /// Targets are compared by name only. Returns `None` when the fact may
    /// be written.
    pub async fn check(
        &self,
        subject: &str,
        subject_label: &Label,
        rel_type: &RelType,
        proposed_target: &str,
    ) -> Result<Option<ConflictDescriptor>> {
        self.check_target(subject, subject_label, rel_type, proposed_target, None)
            .await
    }

    /// Check a fact whose target is identified by (label, name).
    ///
    /// A stored target with the same name under another label is a
    /// different node, so it conflicts.
    pub async fn check_fact(&self, fact: &Fact) -> Result<Option<ConflictDescriptor>> {
        self.check_target(
            &fact.subject,
            &fact.subject_label,
            &fact.rel_type,
            &fact.target,
            Some(&fact.target_label),
        )
        .await
    }

    async fn check_target(
        &self,
        subject: &str,
        subject_label: &Label,
        rel_type: &RelType,
        proposed_target: &str,
        proposed_label: Option<&Label>,
    ) -> Result<Option<ConflictDescriptor>> {
        if !self.is_functional(rel_type) {
            return Ok(None);
        }

        let existing = self.store.outgoing(subject, subject_label, rel_type).await?;
        let pre_existing_violation = existing.len() > 1;

        let differs = |n: &NodeSnapshot| {
            n.name != proposed_target || proposed_label.is_some_and(|l| !n.has_label(l))
        };
        let Some(conflicting) = existing.iter().find(|n| differs(n)) else {
            return Ok(None);
        };

        // Same name, other label: qualify both sides so the facts read apart.
        let (new_target, old_target) = match proposed_label {
            Some(label) if conflicting.name == proposed_target => (
                format!("{proposed_target}:{label}"),
                format!("{}:{}", conflicting.name, conflicting.labels.join(":")),
            ),
            _ => (proposed_target.to_string(), conflicting.name.clone()),
        };

        let conflict = ConflictDescriptor {
            new_fact: format!("({subject})-[:{rel_type}]->({new_target})"),
            conflicting_fact: format!("({subject})-[:{rel_type}]->({old_target})"),
            rel_type: rel_type.to_string(),
            pre_existing_violation,
        };
        tracing::warn!(
            new_fact = %conflict.new_fact,
            conflicting_fact = %conflict.conflicting_fact,
            pre_existing_violation,
            "Contradiction detected"
        );
        Ok(Some(conflict))
    }
}

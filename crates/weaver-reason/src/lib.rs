//! Weaver Reason: reasoning over the knowledge graph.
//!
//! - [`ContradictionGuard`] refuses facts that would give a source node a
//!   second edge of a single-valued relationship type.
//! - [`RuleEngine`] runs declarative inference rules in one forward pass.
//! - [`HypothesisGenerator`] explains questions with short paths to
//!   noteworthy nodes.
//! - [`Ingestor`] writes facts and free text through the guard.

pub mod error;
pub mod guard;
pub mod hypothesis;
pub mod ingest;
pub mod nlp;
pub mod rules;

pub use error::{ReasonError, Result};
pub use guard::{ConflictDescriptor, ContradictionGuard, Fact};
pub use hypothesis::{HypothesisGenerator, NO_HYPOTHESES, NO_KEY_TERMS};
pub use ingest::{AssertOutcome, IngestReport, Ingestor};
pub use nlp::{Entity, EntityExtractor, HeuristicExtractor, StaticExtractor};
pub use rules::{
    load_rules_file, load_rules_json, load_rules_toml, DeriveAction, InferenceReport, Rule,
    RuleEngine, RuleReport, RuleSpec,
};

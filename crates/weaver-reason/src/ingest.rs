//! Guarded ingestion of facts and free text.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use weaver_core::{Label, Properties, PropertyValue, RelType};
use weaver_graph::GraphStore;

use crate::error::Result;
use crate::guard::{ConflictDescriptor, ContradictionGuard, Fact};
use crate::nlp::EntityExtractor;

const SOURCE_LABEL: &str = "Source";
const CONCEPT_LABEL: &str = "Concept";
const MENTIONED_IN: &str = "MENTIONED_IN";
const CONTAINS: &str = "CONTAINS";

/// Result of a guarded write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssertOutcome {
    Written,
    Rejected { conflict: ConflictDescriptor },
}

/// Summary of one `ingest_text` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub source: String,
    /// Outcome of the structured fact, when one was supplied.
    pub fact: Option<AssertOutcome>,
    /// True when the fact was rejected and the text was not linked.
    pub halted: bool,
    pub entities: usize,
    pub concepts: usize,
    /// Entity categories that could not be used as labels.
    pub skipped: Vec<String>,
}

/// Writes external facts into the graph, consulting the contradiction guard
/// first.
pub struct Ingestor {
    store: GraphStore,
    guard: ContradictionGuard,
    extractor: Arc<dyn EntityExtractor>,
}

impl Ingestor {
    pub fn new(
        store: GraphStore,
        guard: ContradictionGuard,
        extractor: Arc<dyn EntityExtractor>,
    ) -> Self {
        Self {
            store,
            guard,
            extractor,
        }
    }

    /// Check `fact` and write it (both endpoints and the edge) if it does
    /// not contradict a stored functional fact.
    pub async fn assert_fact(&self, fact: &Fact, properties: &Properties) -> Result<AssertOutcome> {
        if let Some(conflict) = self.guard.check_fact(fact).await? {
            tracing::warn!(fact = %fact, conflict = %conflict, "Fact rejected");
            return Ok(AssertOutcome::Rejected { conflict });
        }

        let none = Properties::new();
        self.store
            .upsert_node(&fact.subject, &fact.subject_label, &none)
            .await?;
        self.store
            .upsert_node(&fact.target, &fact.target_label, &none)
            .await?;
        self.store
            .upsert_edge(
                &fact.subject,
                &fact.subject_label,
                &fact.target,
                &fact.target_label,
                &fact.rel_type,
                properties,
            )
            .await?;

        tracing::info!(fact = %fact, "Fact written");
        Ok(AssertOutcome::Written)
    }

    /// Link the entities and concepts of `text` to a `Source` node.
    ///
    /// A supplied `fact` is checked and written first; if it is rejected
    /// nothing else is written. Fails before any write when the vocabulary
    /// forbids the `Source` or `Concept` labels or the link types.
    pub async fn ingest_text(
        &self,
        text: &str,
        source: &str,
        properties: &Properties,
        fact: Option<&Fact>,
    ) -> Result<IngestReport> {
        let source_label = Label::parse(SOURCE_LABEL)?;
        let concept_label = Label::parse(CONCEPT_LABEL)?;
        let mentioned_in = RelType::parse(MENTIONED_IN)?;
        let contains = RelType::parse(CONTAINS)?;
        self.store.check_label(&source_label)?;
        self.store.check_label(&concept_label)?;
        self.store.check_rel_type(&mentioned_in)?;
        self.store.check_rel_type(&contains)?;

        let mut report = IngestReport {
            source: source.to_string(),
            fact: None,
            halted: false,
            entities: 0,
            concepts: 0,
            skipped: Vec::new(),
        };

        if let Some(fact) = fact {
            let outcome = self.assert_fact(fact, properties).await?;
            report.halted = matches!(outcome, AssertOutcome::Rejected { .. });
            report.fact = Some(outcome);
            if report.halted {
                tracing::warn!(source, "Ingestion halted due to contradiction");
                return Ok(report);
            }
        }

        let entities = self.extractor.extract_entities(text).await?;
        let concepts = self.extractor.extract_concepts(text).await?;

        let mut link = properties.clone();
        link.insert("source".to_string(), PropertyValue::from(source));
        link.insert(
            "last_seen".to_string(),
            PropertyValue::from(Utc::now().to_rfc3339()),
        );

        self.store
            .upsert_node(source, &source_label, &Properties::new())
            .await?;

        for entity in &entities {
            let Ok(label) = Label::parse(&entity.category) else {
                tracing::warn!(
                    entity = %entity.text,
                    category = %entity.category,
                    "Skipping entity with unusable category"
                );
                report.skipped.push(entity.category.clone());
                continue;
            };
            if let Err(e) = self.store.check_label(&label) {
                tracing::warn!(entity = %entity.text, error = %e, "Skipping entity");
                report.skipped.push(entity.category.clone());
                continue;
            }

            self.store
                .upsert_node(&entity.text, &label, &Properties::new())
                .await?;
            self.store
                .upsert_edge(
                    &entity.text,
                    &label,
                    source,
                    &source_label,
                    &mentioned_in,
                    &link,
                )
                .await?;
            report.entities += 1;
        }

        for concept in &concepts {
            self.store
                .upsert_node(concept, &concept_label, &Properties::new())
                .await?;
            self.store
                .upsert_edge(
                    concept,
                    &concept_label,
                    source,
                    &source_label,
                    &contains,
                    &link,
                )
                .await?;
            report.concepts += 1;
        }

        tracing::info!(
            source,
            entities = report.entities,
            concepts = report.concepts,
            skipped = report.skipped.len(),
            "Text ingested"
        );
        Ok(report)
    }
}

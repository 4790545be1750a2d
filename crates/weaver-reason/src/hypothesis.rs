//! Heuristic explanations for open questions.
//!
//! Key terms are pulled from the question, then every shortest path (up to
//! a hop bound, ignoring edge direction) from a node named like the term to
//! a noteworthy node is rendered as one hypothesis string. Every returned
//! hypothesis corresponds to a real path; completeness is not attempted.

use std::sync::Arc;

use weaver_core::ReasoningConfig;
use weaver_graph::{GraphPath, GraphStore, NoteworthyPredicate};

use crate::error::Result;
use crate::nlp::EntityExtractor;

/// Returned alone when the question yields no key terms.
pub const NO_KEY_TERMS: &str = "Could not identify any key terms in the question.";

/// Returned alone when no path reaches a noteworthy node.
pub const NO_HYPOTHESES: &str = "No clear hypotheses found based on the available data.";

pub struct HypothesisGenerator {
    store: GraphStore,
    extractor: Arc<dyn EntityExtractor>,
    predicate: NoteworthyPredicate,
    max_hops: usize,
}

impl HypothesisGenerator {
    pub fn new(
        store: GraphStore,
        extractor: Arc<dyn EntityExtractor>,
        predicate: NoteworthyPredicate,
        max_hops: usize,
    ) -> Self {
        Self {
            store,
            extractor,
            predicate,
            max_hops,
        }
    }

    pub fn from_config(
        store: GraphStore,
        extractor: Arc<dyn EntityExtractor>,
        config: &ReasoningConfig,
    ) -> Result<Self> {
        let predicate = NoteworthyPredicate::from_config(&config.noteworthy)?;
        Ok(Self::new(store, extractor, predicate, config.max_hops))
    }

    /// Entities first, then concepts, de-duplicated in first-seen order.
    pub async fn key_terms(&self, question: &str) -> Result<Vec<String>> {
        let entities = self.extractor.extract_entities(question).await?;
        let concepts = self.extractor.extract_concepts(question).await?;

        let mut terms: Vec<String> = Vec::new();
        let candidates = entities.into_iter().map(|e| e.text).chain(concepts);
        for term in candidates {
            let term = term.trim().to_string();
            if !term.is_empty() && !terms.contains(&term) {
                terms.push(term);
            }
        }
        Ok(terms)
    }

    /// Explain `question` with paths to noteworthy nodes.
    ///
    /// Never returns an empty list: a sentinel string stands in when there
    /// are no key terms or no hypotheses.
    pub async fn generate_hypotheses(&self, question: &str) -> Result<Vec<String>> {
        let terms = self.key_terms(question).await?;
        if terms.is_empty() {
            tracing::info!(question, "No key terms found");
            return Ok(vec![NO_KEY_TERMS.to_string()]);
        }
        tracing::debug!(?terms, "Extracted key terms");

        let mut hypotheses = Vec::new();
        for term in &terms {
            let paths = self
                .store
                .shortest_paths(term, &self.predicate, self.max_hops)
                .await?;
            tracing::debug!(term = %term, paths = paths.len(), "Searched paths");
            hypotheses.extend(paths.iter().map(|p| render(p, &self.predicate)));
        }

        if hypotheses.is_empty() {
            return Ok(vec![NO_HYPOTHESES.to_string()]);
        }
        Ok(hypotheses)
    }
}

/// `Hypothesis: A path exists from 'A' -[T]-> 'B' <-[U]- 'C', where 'C' has
/// notable properties: key = value.`
pub fn render(path: &GraphPath, predicate: &NoteworthyPredicate) -> String {
    let mut route = format!("'{}'", path.start.name);
    for step in &path.steps {
        if step.forward {
            route.push_str(&format!(" -[{}]-> '{}'", step.rel_type, step.node.name));
        } else {
            route.push_str(&format!(" <-[{}]- '{}'", step.rel_type, step.node.name));
        }
    }

    let end = path.end();
    let notable: Vec<String> = predicate
        .notable(&end.properties)
        .iter()
        .map(|(k, v)| format!("{k} = {v}"))
        .collect();

    format!(
        "Hypothesis: A path exists from {route}, where '{}' has notable properties: {}.",
        end.name,
        notable.join(", ")
    )
}

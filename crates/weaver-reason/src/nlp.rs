//! Entity and concept extraction.
//!
//! Hypothesis generation and text ingestion depend only on the
//! [`EntityExtractor`] trait. [`HeuristicExtractor`] is a dependency-free
//! fallback: capitalized runs become entities and determiner-led noun
//! phrases become concepts.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// A named entity found in text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    /// Surface text, e.g. `Project X`.
    pub text: String,
    /// Category used as the node label, e.g. `Organization`.
    pub category: String,
}

impl Entity {
    pub fn new(text: &str, category: &str) -> Self {
        Self {
            text: text.to_string(),
            category: category.to_string(),
        }
    }
}

#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract_entities(&self, text: &str) -> Result<Vec<Entity>>;

    async fn extract_concepts(&self, text: &str) -> Result<Vec<String>>;
}

/// Words that never start or continue an entity even when capitalized.
const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "an", "and", "any", "are", "as", "at", "be", "been", "before",
    "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he",
    "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "me", "my", "no", "not",
    "of", "on", "or", "our", "she", "should", "so", "some", "tell", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "those", "to", "was", "we",
    "were", "what", "when", "where", "which", "who", "whom", "why", "will", "with", "would",
    "you", "your",
];

const DETERMINERS: &[&str] = &[
    "a", "an", "the", "this", "that", "these", "those", "its", "their", "our", "my", "your",
    "his", "her",
];

/// Longest noun phrase kept after a determiner.
const MAX_CONCEPT_WORDS: usize = 3;

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word.to_lowercase().as_str())
}

/// Split on whitespace, recording whether punctuation ended the token.
fn tokens(text: &str) -> Vec<(&str, bool)> {
    text.split_whitespace()
        .filter_map(|raw| {
            let word = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_');
            let boundary = raw
                .chars()
                .last()
                .is_some_and(|c| matches!(c, '.' | ',' | ';' | ':' | '?' | '!' | ')'));
            (!word.is_empty()).then_some((word, boundary))
        })
        .collect()
}

fn push_unique(out: &mut Vec<String>, item: String) {
    if !out.contains(&item) {
        out.push(item);
    }
}

/// Rule-based extractor used when no NLP service is configured.
#[derive(Debug, Clone)]
pub struct HeuristicExtractor {
    category: String,
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self {
            category: "Entity".to_string(),
        }
    }
}

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Category assigned to every extracted entity.
    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    fn entities(&self, text: &str) -> Vec<Entity> {
        let mut found = Vec::new();
        let mut run: Vec<&str> = Vec::new();

        let mut flush = |run: &mut Vec<&str>| {
            if !run.is_empty() {
                push_unique(&mut found, run.join(" "));
                run.clear();
            }
        };

        for (word, boundary) in tokens(text) {
            let capitalized = word.chars().next().is_some_and(char::is_uppercase);
            if capitalized && !is_stopword(word) {
                run.push(word);
            } else {
                flush(&mut run);
            }
            if boundary {
                flush(&mut run);
            }
        }
        flush(&mut run);

        found
            .into_iter()
            .map(|text| Entity::new(&text, &self.category))
            .collect()
    }

    fn concepts(&self, text: &str) -> Vec<String> {
        let words = tokens(text);
        let mut found = Vec::new();

        for (i, (word, boundary)) in words.iter().enumerate() {
            if *boundary || !DETERMINERS.contains(&word.to_lowercase().as_str()) {
                continue;
            }
            let mut phrase = Vec::new();
            for (next, next_boundary) in &words[i + 1..] {
                let lowercase = next.chars().next().is_some_and(char::is_lowercase);
                if !lowercase || is_stopword(next) {
                    break;
                }
                phrase.push(*next);
                if *next_boundary || phrase.len() == MAX_CONCEPT_WORDS {
                    break;
                }
            }
            if !phrase.is_empty() {
                push_unique(&mut found, phrase.join(" "));
            }
        }
        found
    }
}

#[async_trait]
impl EntityExtractor for HeuristicExtractor {
    async fn extract_entities(&self, text: &str) -> Result<Vec<Entity>> {
        Ok(self.entities(text))
    }

    async fn extract_concepts(&self, text: &str) -> Result<Vec<String>> {
        Ok(self.concepts(text))
    }
}

/// Fixed answers, for tests and for callers that already know the terms.
#[derive(Debug, Clone, Default)]
pub struct StaticExtractor {
    pub entities: Vec<Entity>,
    pub concepts: Vec<String>,
}

#[async_trait]
impl EntityExtractor for StaticExtractor {
    async fn extract_entities(&self, _text: &str) -> Result<Vec<Entity>> {
        Ok(self.entities.clone())
    }

    async fn extract_concepts(&self, _text: &str) -> Result<Vec<String>> {
        Ok(self.concepts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalized_runs_become_entities() {
        let extractor = HeuristicExtractor::new();
        let entities = extractor.entities("Why are there potential issues with Project X?");
        assert_eq!(entities, vec![Entity::new("Project X", "Entity")]);

        let entities =
            extractor.entities("I had a meeting with Elon Musk about SpaceX, Tesla and Neo4j.");
        let texts: Vec<_> = entities.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["Elon Musk", "SpaceX", "Tesla", "Neo4j"]);
    }

    #[test]
    fn test_entities_deduplicated() {
        let entities = HeuristicExtractor::new()
            .with_category("Organization")
            .entities("Apple hired Tim Cook. Apple grew.");
        let texts: Vec<_> = entities.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["Apple", "Tim Cook"]);
        assert!(entities.iter().all(|e| e.category == "Organization"));
    }

    #[test]
    fn test_determiner_led_concepts() {
        let concepts = HeuristicExtractor::new()
            .concepts("GraphQL is used for this API and the future of space exploration.");
        assert_eq!(concepts, vec!["future"]);

        let concepts = HeuristicExtractor::new().concepts("We discussed the release schedule.");
        assert_eq!(concepts, vec!["release schedule"]);
    }

    #[test]
    fn test_no_terms() {
        let extractor = HeuristicExtractor::new();
        assert!(extractor.entities("what about it?").is_empty());
        assert!(extractor.concepts("what about it?").is_empty());
    }
}

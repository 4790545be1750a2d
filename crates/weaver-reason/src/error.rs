//! Error types for the weaver-reason crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReasonError {
    #[error("Graph error: {0}")]
    Graph(#[from] weaver_graph::GraphError),

    #[error("Invalid identifier: {0}")]
    Identifier(#[from] weaver_core::CoreError),

    #[error("Rule {rule:?}: cannot parse `{fragment}`: {reason}")]
    RuleParse {
        rule: String,
        fragment: String,
        reason: String,
    },

    #[error("Rule {rule:?} is misconfigured: {reason}")]
    RuleConfiguration { rule: String, reason: String },

    #[error("Rule document error: {0}")]
    RuleDocument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReasonError>;

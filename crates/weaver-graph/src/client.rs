//! Neo4j connection management and shared graph client.

use neo4rs::{ConfigBuilder, Graph, Query, Row};
use serde::Deserialize;

use weaver_core::CoreError;

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Node not found: {label} named {name:?}")]
    NotFound { label: String, name: String },

    #[error("Label {0:?} is not in the configured vocabulary")]
    UnknownLabel(String),

    #[error("Relationship type {0:?} is not in the configured vocabulary")]
    UnknownRelType(String),

    #[error("Invalid match pattern: {0}")]
    InvalidPattern(String),

    #[error(transparent)]
    Identifier(#[from] CoreError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GraphError {
    /// True when the underlying engine could not be reached or refused the
    /// call. Callers own the retry policy.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GraphError::Connection(_) | GraphError::Query(_))
    }
}

/// Configuration for connecting to Neo4j.
///
/// Loaded from the `[neo4j]` section of `weaver.toml` or `WEAVER__NEO4J__*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    /// Target database; the server default when unset.
    pub database: Option<String>,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://127.0.0.1:7687".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
            database: None,
            max_connections: 16,
            fetch_size: 256,
        }
    }
}

impl GraphConfig {
    fn to_neo4rs(&self) -> Result<neo4rs::Config, GraphError> {
        let mut builder = ConfigBuilder::default()
            .uri(&self.uri)
            .user(&self.user)
            .password(&self.password)
            .max_connections(self.max_connections as usize)
            .fetch_size(self.fetch_size);
        if let Some(db) = &self.database {
            builder = builder.db(db.as_str());
        }
        builder
            .build()
            .map_err(|e| GraphError::Connection(format!("invalid configuration: {e}")))
    }
}

/// Pooled Neo4j handle implementing [`GraphBackend`](crate::GraphBackend).
///
/// Clone is cheap (inner Arc). Each component receives its own handle; there
/// is no process-wide connection.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let graph = Graph::connect(config.to_neo4rs()?)
            .await
            .map_err(|e| GraphError::Connection(format!("{}: {e}", config.uri)))?;

        tracing::info!(
            uri = %config.uri,
            database = config.database.as_deref().unwrap_or("<default>"),
            "Connected to Neo4j"
        );
        Ok(Self { graph })
    }

    /// Run a statement and discard its result.
    pub async fn run(&self, statement: Query) -> Result<(), GraphError> {
        self.graph.run(statement).await?;
        Ok(())
    }

    /// Drain every row of a statement's result stream.
    pub async fn fetch_all(&self, statement: Query) -> Result<Vec<Row>, GraphError> {
        let mut rows = Vec::new();
        let mut stream = self.graph.execute(statement).await?;
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// First row of a statement's result, if any.
    pub async fn fetch_first(&self, statement: Query) -> Result<Option<Row>, GraphError> {
        Ok(self.graph.execute(statement).await?.next().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_classification() {
        assert!(GraphError::Connection("refused".into()).is_unavailable());
        assert!(!GraphError::NotFound {
            label: "Person".into(),
            name: "Anna".into(),
        }
        .is_unavailable());
        assert!(!GraphError::UnknownLabel("Alien".into()).is_unavailable());
    }

    #[test]
    fn test_default_config_targets_local_bolt() {
        let config = GraphConfig::default();
        assert!(config.uri.starts_with("bolt://"));
        assert!(config.max_connections > 0);
    }
}

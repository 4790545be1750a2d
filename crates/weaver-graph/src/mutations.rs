//! Write operations against Neo4j.
//!
//! All mutations use MERGE (upsert) semantics. Nodes are identified by
//! (label, name); relationships by (source, target, type). Labels, types and
//! property keys are spliced into Cypher only after identifier validation and
//! always backtick-quoted; every value travels as a query parameter.

use neo4rs::{query, Query, Row};

use weaver_core::{Label, NodeId, Properties, PropertyKey, PropertyValue, RelType};

use crate::backend::{NodeRef, UpsertOutcome};
use crate::client::{GraphClient, GraphError};

impl GraphClient {
    /// Upsert a node keyed on (label, name) and merge its properties.
    pub async fn merge_named_node(
        &self,
        label: &Label,
        name: &str,
        properties: &Properties,
    ) -> Result<NodeId, GraphError> {
        let (set_clause, params) = set_assignments("n", properties)?;
        let cypher = format!(
            "MERGE (n:{label} {{name: $name}})
             {set_clause}
             RETURN elementId(n) AS id",
            label = quoted(label.as_str()),
        );

        let q = bind_all(query(&cypher).param("name", name), &params);

        match self.fetch_first(q).await? {
            Some(row) => {
                let id: String = row.get("id").map_err(|e| {
                    GraphError::Serialization(format!("Failed to read node id: {e}"))
                })?;
                Ok(NodeId(id))
            }
            None => Err(GraphError::Serialization(
                "MERGE returned no row".to_string(),
            )),
        }
    }

    /// Upsert a relationship between two existing nodes.
    ///
    /// Endpoints are matched, never merged: when either is absent the query
    /// matches zero rows and nothing is written.
    pub async fn merge_relationship(
        &self,
        source: &NodeRef,
        target: &NodeRef,
        rel_type: &RelType,
        properties: &Properties,
    ) -> Result<UpsertOutcome, GraphError> {
        let (match_a, param_a) = match_endpoint("a", source);
        let (match_b, param_b) = match_endpoint("b", target);
        let (set_clause, params) = set_assignments("r", properties)?;

        let cypher = format!(
            "{match_a}
             {match_b}
             MERGE (a)-[r:{rel_type}]->(b)
             {set_clause}
             RETURN count(r) AS cnt",
            rel_type = quoted(rel_type.as_str()),
        );

        let q = query(&cypher)
            .param(param_a.0, param_a.1)
            .param(param_b.0, param_b.1);
        let q = bind_all(q, &params);

        edge_outcome(self.fetch_first(q).await?.as_ref())
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Backtick-quote an identifier that has already been validated.
pub(crate) fn quoted(ident: &str) -> String {
    format!("`{ident}`")
}

/// Build `SET alias.k0 = $alias_p0, ...` for a property map.
///
/// Returns an empty clause for an empty map.
pub(crate) fn set_assignments(
    alias: &str,
    properties: &Properties,
) -> Result<(String, Vec<(String, PropertyValue)>), GraphError> {
    let mut assignments = Vec::with_capacity(properties.len());
    let mut params = Vec::with_capacity(properties.len());

    for (i, (key, value)) in properties.iter().enumerate() {
        let key = PropertyKey::parse(key)?;
        let param = format!("{alias}_p{i}");
        assignments.push(format!("{alias}.{} = ${param}", quoted(key.as_str())));
        params.push((param, value.clone()));
    }

    if assignments.is_empty() {
        Ok((String::new(), params))
    } else {
        Ok((format!("SET {}", assignments.join(", ")), params))
    }
}

/// Attach a scalar property value as a query parameter.
pub(crate) fn bind_value(q: Query, name: &str, value: &PropertyValue) -> Query {
    match value {
        PropertyValue::Bool(b) => q.param(name, *b),
        PropertyValue::Int(i) => q.param(name, *i),
        PropertyValue::Float(f) => q.param(name, *f),
        PropertyValue::Str(s) => q.param(name, s.clone()),
    }
}

pub(crate) fn bind_all(q: Query, params: &[(String, PropertyValue)]) -> Query {
    params
        .iter()
        .fold(q, |q, (name, value)| bind_value(q, name, value))
}

/// Read the `cnt` column of an edge merge. Zero rows or a zero count means
/// an endpoint was missing.
fn edge_outcome(row: Option<&Row>) -> Result<UpsertOutcome, GraphError> {
    let written = match row {
        Some(row) => row.get::<i64>("cnt").map_err(|e| {
            GraphError::Serialization(format!("Failed to read merge count: {e}"))
        })?,
        None => 0,
    };

    if written > 0 {
        Ok(UpsertOutcome::Applied)
    } else {
        Ok(UpsertOutcome::MissingEndpoint)
    }
}

/// `MATCH` clause locating one edge endpoint, plus its parameter.
fn match_endpoint(alias: &str, node: &NodeRef) -> (String, (&'static str, String)) {
    let param = if alias == "a" { "a_ref" } else { "b_ref" };
    match node {
        NodeRef::Id(id) => (
            format!("MATCH ({alias}) WHERE elementId({alias}) = ${param}"),
            (param, id.0.clone()),
        ),
        NodeRef::Key { label, name } => (
            format!(
                "MATCH ({alias}:{label} {{name: ${param}}})",
                label = quoted(label.as_str())
            ),
            (param, name.clone()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_assignments_quotes_keys() {
        let mut props = Properties::new();
        props.insert("confidence_score".into(), 0.9.into());
        props.insert("inferred".into(), true.into());

        let (clause, params) = set_assignments("r", &props).unwrap();
        assert_eq!(
            clause,
            "SET r.`confidence_score` = $r_p0, r.`inferred` = $r_p1"
        );
        assert_eq!(params.len(), 2);
        assert_eq!(params[1], ("r_p1".to_string(), PropertyValue::Bool(true)));
    }

    #[test]
    fn test_set_assignments_empty() {
        let (clause, params) = set_assignments("n", &Properties::new()).unwrap();
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_set_assignments_rejects_bad_key() {
        let mut props = Properties::new();
        props.insert("bad key`} DETACH DELETE n //".into(), 1.into());
        assert!(set_assignments("n", &props).is_err());
    }

    #[test]
    fn test_match_endpoint_by_id_and_key() {
        let (clause, (param, value)) = match_endpoint("a", &NodeRef::Id(NodeId("4:x:1".into())));
        assert_eq!(clause, "MATCH (a) WHERE elementId(a) = $a_ref");
        assert_eq!(param, "a_ref");
        assert_eq!(value, "4:x:1");

        let (clause, (_, value)) = match_endpoint(
            "b",
            &NodeRef::key(Label::parse("Person").unwrap(), "Steve Jobs"),
        );
        assert_eq!(clause, "MATCH (b:`Person` {name: $b_ref})");
        assert_eq!(value, "Steve Jobs");
    }

    fn count_row(value: neo4rs::BoltType) -> Row {
        Row::new(
            neo4rs::BoltList::from(vec![neo4rs::BoltType::from("cnt")]),
            neo4rs::BoltList::from(vec![value]),
        )
    }

    #[test]
    fn test_edge_outcome_from_count() {
        let applied = count_row(neo4rs::BoltType::from(1_i64));
        assert_eq!(edge_outcome(Some(&applied)).unwrap(), UpsertOutcome::Applied);

        let missing = count_row(neo4rs::BoltType::from(0_i64));
        assert_eq!(
            edge_outcome(Some(&missing)).unwrap(),
            UpsertOutcome::MissingEndpoint
        );
        assert_eq!(edge_outcome(None).unwrap(), UpsertOutcome::MissingEndpoint);
    }

    #[test]
    fn test_edge_outcome_undecodable_count_is_an_error() {
        let garbled = count_row(neo4rs::BoltType::from("three"));
        assert!(matches!(
            edge_outcome(Some(&garbled)),
            Err(GraphError::Serialization(_))
        ));
    }
}

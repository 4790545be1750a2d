//! Read operations and the Cypher compiler for match patterns.

use std::collections::{BTreeMap, HashSet};

use neo4rs::query;
use serde::Deserialize;

use weaver_core::{
    properties_from_json, Direction, Label, NodeId, NodeSnapshot, PropertyKey, PropertyValue, Var,
};

use crate::client::{GraphClient, GraphError};
use crate::mutations::{bind_all, quoted};
use crate::pattern::{
    Binding, EdgePattern, GraphPath, MatchPattern, Neighbor, NodePattern, NoteworthyPredicate,
    Operand, PathStep, PropertyRef,
};

/// A node as returned inside list comprehensions.
#[derive(Debug, Deserialize)]
struct NodeRow {
    id: String,
    labels: Vec<String>,
    props: BTreeMap<String, serde_json::Value>,
}

impl NodeRow {
    fn into_snapshot(self) -> NodeSnapshot {
        snapshot(self.id, self.labels, &self.props)
    }
}

/// A relationship as returned inside list comprehensions.
#[derive(Debug, Deserialize)]
struct RelRow {
    rel_type: String,
    source: String,
}

impl GraphClient {
    // ── Single Node Lookups ──────────────────────────────────────

    /// Find a node by its (label, name) key.
    pub async fn find_named_node(
        &self,
        label: &Label,
        name: &str,
    ) -> Result<Option<NodeSnapshot>, GraphError> {
        let cypher = format!(
            "MATCH (n:{label} {{name: $name}})
             RETURN elementId(n) AS id, labels(n) AS labels, properties(n) AS props
             LIMIT 1",
            label = quoted(label.as_str()),
        );

        let q = query(&cypher).param("name", name);

        match self.fetch_first(q).await? {
            Some(row) => Ok(Some(read_node(&row, "id", "labels", "props")?)),
            None => Ok(None),
        }
    }

    // ── Neighbor Queries ─────────────────────────────────────────

    /// Get all neighbors of a node (any direction, any relationship type).
    pub async fn get_neighbors(
        &self,
        label: &Label,
        name: &str,
    ) -> Result<Vec<Neighbor>, GraphError> {
        let cypher = format!(
            "MATCH (a:{label} {{name: $name}})-[r]-(b)
             RETURN elementId(b) AS id, coalesce(b.name, '') AS name, labels(b) AS labels,
                    type(r) AS rel_type, properties(r) AS props,
                    startNode(r) = a AS outgoing",
            label = quoted(label.as_str()),
        );

        let q = query(&cypher).param("name", name);

        let rows = self.fetch_all(q).await?;
        let mut results = Vec::with_capacity(rows.len());

        for row in rows {
            let id: String = row.get("id").map_err(|e| {
                GraphError::Serialization(format!("Failed to get neighbor id: {e}"))
            })?;
            let props: BTreeMap<String, serde_json::Value> =
                row.get("props").unwrap_or_default();
            let outgoing: bool = row.get("outgoing").unwrap_or(true);

            results.push(Neighbor {
                node_id: NodeId(id),
                name: row.get("name").unwrap_or_default(),
                labels: row.get("labels").unwrap_or_default(),
                relationship_type: row.get("rel_type").unwrap_or_default(),
                properties: properties_from_json(&props),
                direction: if outgoing {
                    Direction::Outgoing
                } else {
                    Direction::Incoming
                },
            });
        }
        Ok(results)
    }

    // ── Pattern Matching ─────────────────────────────────────────

    /// Return all distinct bindings of the pattern's node variables.
    pub async fn match_bindings(&self, pattern: &MatchPattern) -> Result<Vec<Binding>, GraphError> {
        pattern.validate()?;
        let compiled = compile_match(pattern);
        tracing::debug!(cypher = %compiled.cypher, "Matching pattern");

        let q = bind_all(query(&compiled.cypher), &compiled.params);
        let rows = self.fetch_all(q).await?;

        let mut bindings = Vec::with_capacity(rows.len());
        for row in rows {
            let mut binding = Binding::default();
            for var in &compiled.node_vars {
                let node = read_node(
                    &row,
                    &format!("{var}__id"),
                    &format!("{var}__labels"),
                    &format!("{var}__props"),
                )?;
                binding.nodes.insert(var.clone(), node);
            }
            bindings.push(binding);
        }
        Ok(bindings)
    }

    // ── Path Queries ─────────────────────────────────────────────

    /// All shortest undirected paths from nodes named `start_name` to
    /// noteworthy nodes within `max_hops`.
    pub async fn all_shortest_paths(
        &self,
        start_name: &str,
        target: &NoteworthyPredicate,
        max_hops: usize,
    ) -> Result<Vec<GraphPath>, GraphError> {
        if target.conditions.is_empty() || max_hops == 0 {
            return Ok(Vec::new());
        }

        let mut params = Vec::with_capacity(target.conditions.len());
        let mut disjuncts = Vec::with_capacity(target.conditions.len());
        for (i, (key, value)) in target.conditions.iter().enumerate() {
            let param = format!("n{i}");
            disjuncts.push(format!("target.{} = ${param}", quoted(key.as_str())));
            params.push((param, value.clone()));
        }

        let cypher = format!(
            "MATCH (start {{name: $term}})
             MATCH (target) WHERE ({predicate}) AND target <> start
             MATCH p = allShortestPaths((start)-[*..{max_hops}]-(target))
             RETURN [n IN nodes(p) | {{id: elementId(n), labels: labels(n), props: properties(n)}}] AS nodes,
                    [r IN relationships(p) | {{rel_type: type(r), source: elementId(startNode(r))}}] AS rels",
            predicate = disjuncts.join(" OR "),
        );

        let q = bind_all(query(&cypher).param("term", start_name), &params);
        let rows = self.fetch_all(q).await?;

        let mut paths = Vec::with_capacity(rows.len());
        for row in rows {
            let nodes: Vec<NodeRow> = row.get("nodes").map_err(|e| {
                GraphError::Serialization(format!("Failed to read path nodes: {e}"))
            })?;
            let rels: Vec<RelRow> = row.get("rels").map_err(|e| {
                GraphError::Serialization(format!("Failed to read path relationships: {e}"))
            })?;
            if let Some(path) = assemble_path(nodes, rels) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

// ── Cypher Compilation ───────────────────────────────────────────

/// A match pattern rendered to Cypher, with its parameters.
#[derive(Debug)]
pub(crate) struct CompiledMatch {
    pub cypher: String,
    pub params: Vec<(String, PropertyValue)>,
    pub node_vars: Vec<Var>,
}

/// Render a validated pattern into a single `MATCH ... WHERE ... RETURN
/// DISTINCT` query. One MATCH clause keeps relationship uniqueness across
/// every fragment.
pub(crate) fn compile_match(pattern: &MatchPattern) -> CompiledMatch {
    let mut params = Vec::new();
    let edge_vars: HashSet<Var> = pattern.edge_vars().into_iter().collect();

    let fragments: Vec<String> = pattern
        .paths
        .iter()
        .map(|path| {
            let mut text = node_text(&path.start, &mut params);
            for (edge, node) in &path.hops {
                text.push_str(&edge_text(edge, &mut params));
                text.push_str(&node_text(node, &mut params));
            }
            text
        })
        .collect();

    let mut cypher = format!("MATCH {}", fragments.join(", "));

    if !pattern.filters.is_empty() {
        let conditions: Vec<String> = pattern
            .filters
            .iter()
            .map(|f| {
                let lhs = ref_text(&f.lhs, &edge_vars);
                let rhs = match &f.rhs {
                    Operand::Property(r) => ref_text(r, &edge_vars),
                    Operand::Literal(value) => push_param(&mut params, value),
                };
                format!("{lhs} {} {rhs}", f.op.as_cypher())
            })
            .collect();
        cypher.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
    }

    let node_vars = pattern.node_vars();
    let returns: Vec<String> = node_vars
        .iter()
        .map(|v| {
            format!(
                "elementId(n_{v}) AS {v}__id, labels(n_{v}) AS {v}__labels, properties(n_{v}) AS {v}__props"
            )
        })
        .collect();
    cypher.push_str(&format!(" RETURN DISTINCT {}", returns.join(", ")));

    CompiledMatch {
        cypher,
        params,
        node_vars,
    }
}

fn push_param(params: &mut Vec<(String, PropertyValue)>, value: &PropertyValue) -> String {
    let name = format!("c{}", params.len());
    params.push((name.clone(), value.clone()));
    format!("${name}")
}

fn inline_properties(
    constraints: &[(PropertyKey, PropertyValue)],
    params: &mut Vec<(String, PropertyValue)>,
) -> String {
    if constraints.is_empty() {
        return String::new();
    }
    let entries: Vec<String> = constraints
        .iter()
        .map(|(k, v)| format!("{}: {}", quoted(k.as_str()), push_param(params, v)))
        .collect();
    format!(" {{{}}}", entries.join(", "))
}

fn node_text(node: &NodePattern, params: &mut Vec<(String, PropertyValue)>) -> String {
    let label = node
        .label
        .as_ref()
        .map(|l| format!(":{}", quoted(l.as_str())))
        .unwrap_or_default();
    let props = inline_properties(&node.properties, params);
    format!("(n_{}{label}{props})", node.var)
}

fn edge_text(edge: &EdgePattern, params: &mut Vec<(String, PropertyValue)>) -> String {
    let var = edge
        .var
        .as_ref()
        .map(|v| format!("e_{v}"))
        .unwrap_or_default();
    let rel_type = edge
        .rel_type
        .as_ref()
        .map(|t| format!(":{}", quoted(t.as_str())))
        .unwrap_or_default();
    let props = inline_properties(&edge.properties, params);
    let body = format!("[{var}{rel_type}{props}]");
    match edge.direction {
        Direction::Outgoing => format!("-{body}->"),
        Direction::Incoming => format!("<-{body}-"),
        Direction::Either => format!("-{body}-"),
    }
}

fn ref_text(r: &PropertyRef, edge_vars: &HashSet<Var>) -> String {
    let prefix = if edge_vars.contains(&r.var) { "e" } else { "n" };
    format!("{prefix}_{}.{}", r.var, quoted(r.key.as_str()))
}

// ── Row Conversion ───────────────────────────────────────────────

fn snapshot(
    id: String,
    labels: Vec<String>,
    raw: &BTreeMap<String, serde_json::Value>,
) -> NodeSnapshot {
    let properties = properties_from_json(raw);
    let name = properties
        .get("name")
        .and_then(PropertyValue::as_str)
        .unwrap_or_default()
        .to_string();
    NodeSnapshot {
        id: NodeId(id),
        labels,
        name,
        properties,
    }
}

fn read_node(
    row: &neo4rs::Row,
    id_col: &str,
    labels_col: &str,
    props_col: &str,
) -> Result<NodeSnapshot, GraphError> {
    let id: String = row
        .get(id_col)
        .map_err(|e| GraphError::Serialization(format!("Failed to read {id_col}: {e}")))?;
    let labels: Vec<String> = row.get(labels_col).unwrap_or_default();
    let props: BTreeMap<String, serde_json::Value> = row.get(props_col).unwrap_or_default();
    Ok(snapshot(id, labels, &props))
}

/// Pair path nodes with the relationships between them. `forward` records
/// whether the stored edge starts at the preceding node.
fn assemble_path(nodes: Vec<NodeRow>, rels: Vec<RelRow>) -> Option<GraphPath> {
    if nodes.len() != rels.len() + 1 {
        return None;
    }
    let mut nodes = nodes.into_iter().map(NodeRow::into_snapshot);
    let start = nodes.next()?;

    let mut steps = Vec::with_capacity(rels.len());
    let mut previous = start.id.clone();
    for (rel, node) in rels.into_iter().zip(nodes) {
        let forward = rel.source == previous.0;
        previous = node.id.clone();
        steps.push(PathStep {
            rel_type: rel.rel_type,
            forward,
            node,
        });
    }
    Some(GraphPath { start, steps })
}

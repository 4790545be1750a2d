//! Typed match requests and the records returned from traversals.
//!
//! A [`MatchPattern`] is a conjunction of path fragments plus comparison
//! filters. Fragments are joined by variable identity: a variable that
//! appears in several fragments binds the same element in all of them, and
//! fragments that share no variable form a cross product. Within one binding
//! an edge is traversed at most once.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use weaver_core::{
    Direction, Label, NodeId, NodeSnapshot, NoteworthyCondition, Properties, PropertyKey,
    PropertyValue, RelType, Var,
};

use crate::client::GraphError;

/// `(var:Label {key: value, ...})`
#[derive(Debug, Clone, PartialEq)]
pub struct NodePattern {
    pub var: Var,
    pub label: Option<Label>,
    pub properties: Vec<(PropertyKey, PropertyValue)>,
}

impl NodePattern {
    pub fn new(var: Var) -> Self {
        Self {
            var,
            label: None,
            properties: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_property(mut self, key: PropertyKey, value: PropertyValue) -> Self {
        self.properties.push((key, value));
        self
    }

    /// Label and inline property constraints, ignoring the variable.
    pub fn accepts(&self, node: &NodeSnapshot) -> bool {
        self.label.as_ref().map_or(true, |l| node.has_label(l))
            && constraints_hold(&self.properties, &node.properties)
    }
}

/// `-[var:TYPE {key: value}]->`, `<-[...]-` or `-[...]-`
#[derive(Debug, Clone, PartialEq)]
pub struct EdgePattern {
    pub var: Option<Var>,
    pub rel_type: Option<RelType>,
    pub direction: Direction,
    pub properties: Vec<(PropertyKey, PropertyValue)>,
}

impl EdgePattern {
    pub fn new(rel_type: Option<RelType>, direction: Direction) -> Self {
        Self {
            var: None,
            rel_type,
            direction,
            properties: Vec::new(),
        }
    }

    pub fn accepts(&self, rel_type: &RelType, properties: &Properties) -> bool {
        self.rel_type.as_ref().map_or(true, |t| t == rel_type)
            && constraints_hold(&self.properties, properties)
    }
}

/// One comma-separated fragment: a start node followed by zero or more hops.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    pub start: NodePattern,
    pub hops: Vec<(EdgePattern, NodePattern)>,
}

impl PathPattern {
    pub fn node(start: NodePattern) -> Self {
        Self {
            start,
            hops: Vec::new(),
        }
    }

    pub fn hop(mut self, edge: EdgePattern, node: NodePattern) -> Self {
        self.hops.push((edge, node));
        self
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodePattern> {
        std::iter::once(&self.start).chain(self.hops.iter().map(|(_, n)| n))
    }
}

/// Comparison operators permitted in filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn as_cypher(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    /// Evaluate with graph-engine null semantics: a missing property or an
    /// incomparable pair never satisfies the filter.
    pub fn eval(&self, lhs: Option<&PropertyValue>, rhs: Option<&PropertyValue>) -> bool {
        let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
            return false;
        };
        match self {
            CmpOp::Eq => lhs.matches(rhs),
            CmpOp::Ne => !lhs.matches(rhs),
            CmpOp::Lt => lhs.compare(rhs).is_some_and(|o| o.is_lt()),
            CmpOp::Le => lhs.compare(rhs).is_some_and(|o| o.is_le()),
            CmpOp::Gt => lhs.compare(rhs).is_some_and(|o| o.is_gt()),
            CmpOp::Ge => lhs.compare(rhs).is_some_and(|o| o.is_ge()),
        }
    }
}

/// `var.key`
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRef {
    pub var: Var,
    pub key: PropertyKey,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(PropertyValue),
    Property(PropertyRef),
}

/// `lhs OP rhs` over bound variables' properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub lhs: PropertyRef,
    pub op: CmpOp,
    pub rhs: Operand,
}

/// A combined match request: fragments (conjunction) plus filters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchPattern {
    pub paths: Vec<PathPattern>,
    pub filters: Vec<Filter>,
}

impl MatchPattern {
    pub fn new(paths: Vec<PathPattern>) -> Self {
        Self {
            paths,
            filters: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    /// Node variables in order of first appearance.
    pub fn node_vars(&self) -> Vec<Var> {
        let mut seen = HashSet::new();
        self.paths
            .iter()
            .flat_map(|p| p.nodes())
            .filter(|n| seen.insert(n.var.clone()))
            .map(|n| n.var.clone())
            .collect()
    }

    /// Named edge variables in order of first appearance.
    pub fn edge_vars(&self) -> Vec<Var> {
        let mut seen = HashSet::new();
        self.paths
            .iter()
            .flat_map(|p| p.hops.iter())
            .filter_map(|(e, _)| e.var.clone())
            .filter(|v| seen.insert(v.clone()))
            .collect()
    }

    /// The label a node variable is declared with, if any fragment gives one.
    pub fn label_of(&self, var: &Var) -> Option<&Label> {
        self.paths
            .iter()
            .flat_map(|p| p.nodes())
            .filter(|n| &n.var == var)
            .find_map(|n| n.label.as_ref())
    }

    /// Structural checks shared by every backend.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.paths.is_empty() {
            return Err(GraphError::InvalidPattern(
                "a match pattern needs at least one fragment".to_string(),
            ));
        }

        let node_vars: HashSet<Var> = self.node_vars().into_iter().collect();
        let edge_vars: HashSet<Var> = self.edge_vars().into_iter().collect();

        let edge_var_uses = self
            .paths
            .iter()
            .flat_map(|p| p.hops.iter())
            .filter(|(e, _)| e.var.is_some())
            .count();
        if edge_var_uses != edge_vars.len() {
            return Err(GraphError::InvalidPattern(
                "an edge variable may appear only once".to_string(),
            ));
        }
        if let Some(clash) = node_vars.intersection(&edge_vars).next() {
            return Err(GraphError::InvalidPattern(format!(
                "variable `{clash}` is used for both a node and an edge"
            )));
        }

        for filter in &self.filters {
            let mut refs = vec![&filter.lhs];
            if let Operand::Property(rhs) = &filter.rhs {
                refs.push(rhs);
            }
            for r in refs {
                if !node_vars.contains(&r.var) && !edge_vars.contains(&r.var) {
                    return Err(GraphError::InvalidPattern(format!(
                        "filter references unbound variable `{}`",
                        r.var
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One distinct assignment of node variables to concrete nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Binding {
    pub nodes: BTreeMap<Var, NodeSnapshot>,
}

impl Binding {
    pub fn node(&self, var: &Var) -> Option<&NodeSnapshot> {
        self.nodes.get(var)
    }

    /// The assignment as node identities, used for de-duplication.
    pub fn identity(&self) -> Vec<(Var, NodeId)> {
        self.nodes
            .iter()
            .map(|(v, n)| (v.clone(), n.id.clone()))
            .collect()
    }
}

/// An edge incident to a queried node, seen from that node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub node_id: NodeId,
    pub name: String,
    pub labels: Vec<String>,
    pub relationship_type: String,
    /// Properties of the connecting edge.
    pub properties: Properties,
    /// `Outgoing` when the queried node is the edge's source.
    pub direction: Direction,
}

/// One hop of a discovered path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStep {
    pub rel_type: String,
    /// True when the stored edge points along the direction of traversal.
    pub forward: bool,
    pub node: NodeSnapshot,
}

/// A path discovered by shortest-path search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphPath {
    pub start: NodeSnapshot,
    pub steps: Vec<PathStep>,
}

impl GraphPath {
    pub fn end(&self) -> &NodeSnapshot {
        self.steps.last().map(|s| &s.node).unwrap_or(&self.start)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Disjunction of property equalities that makes a node worth explaining.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteworthyPredicate {
    pub conditions: Vec<(PropertyKey, PropertyValue)>,
}

impl NoteworthyPredicate {
    pub fn new(conditions: Vec<(PropertyKey, PropertyValue)>) -> Self {
        Self { conditions }
    }

    pub fn from_config(conditions: &[NoteworthyCondition]) -> Result<Self, GraphError> {
        let conditions = conditions
            .iter()
            .map(|c| Ok((PropertyKey::parse(&c.key)?, c.value.clone())))
            .collect::<Result<Vec<_>, GraphError>>()?;
        Ok(Self { conditions })
    }

    pub fn matches(&self, properties: &Properties) -> bool {
        !self.notable(properties).is_empty()
    }

    /// The satisfied conditions, in configured order.
    pub fn notable(&self, properties: &Properties) -> Vec<(PropertyKey, PropertyValue)> {
        self.conditions
            .iter()
            .filter(|(k, v)| properties.get(k.as_str()).is_some_and(|p| p.matches(v)))
            .cloned()
            .collect()
    }
}

fn constraints_hold(constraints: &[(PropertyKey, PropertyValue)], properties: &Properties) -> bool {
    constraints
        .iter()
        .all(|(k, v)| properties.get(k.as_str()).is_some_and(|p| p.matches(v)))
}

//! Weaver Graph: the single read/write point for the knowledge graph.
//!
//! All graph reads and writes flow through [`GraphStore`], which validates
//! names against the configured vocabulary and delegates to a
//! [`GraphBackend`]: either Neo4j ([`GraphClient`]) or the in-process
//! [`MemoryGraph`].

pub mod backend;
pub mod client;
pub mod memory;
pub mod mutations;
pub mod pattern;
pub mod queries;
pub mod store;

pub use backend::{GraphBackend, NodeRef, UpsertOutcome};
pub use client::{GraphClient, GraphConfig, GraphError};
pub use memory::MemoryGraph;
pub use pattern::{
    Binding, CmpOp, EdgePattern, Filter, GraphPath, MatchPattern, Neighbor, NodePattern,
    NoteworthyPredicate, Operand, PathPattern, PathStep, PropertyRef,
};
pub use store::GraphStore;

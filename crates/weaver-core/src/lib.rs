//! weaver-core: Shared types, configuration, and error handling for Weaver.
//!
//! This crate provides the foundational types used across all Weaver components:
//! - Validated identifiers (labels, relationship types, property keys, rule variables)
//! - Scalar property values and node snapshots
//! - Reasoning and vocabulary configuration
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::{NoteworthyCondition, ReasoningConfig, Vocabulary, WeaverConfig};
pub use error::CoreError;
pub use types::{
    properties_from_json, Direction, Label, NodeId, NodeSnapshot, Properties, PropertyKey,
    PropertyValue, RelType, Var,
};

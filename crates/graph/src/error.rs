use crate::types::{EdgeType, NodeId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    /// `add_edge` was called before one of its endpoints was added.
    #[error("Cannot add {edge_type} edge {from} -> {to}: endpoint {missing} does not exist")]
    MissingEndpoint {
        from: NodeId,
        to: NodeId,
        edge_type: EdgeType,
        missing: NodeId,
    },

    #[error("Schema provider used before it was loaded")]
    SchemaNotLoaded,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    pub fn missing_endpoint(from: &NodeId, to: &NodeId, edge_type: EdgeType, missing: &NodeId) -> Self {
        Self::MissingEndpoint {
            from: from.clone(),
            to: to.clone(),
            edge_type,
            missing: missing.clone(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

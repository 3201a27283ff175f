//! Error types for ChaosKVS
//!
//! This module defines all error types used throughout the crate.
//! Uses `thiserror` for ergonomic error definitions.

use std::io;
use thiserror::Error;

/// Main error type for ChaosKVS operations
#[derive(Error, Debug)]
pub enum ChaosKvsError {
    /// Start called on a node that is already running
    #[error("node {0} is already running")]
    AlreadyRunning(String),

    /// Stop called on a node that is already stopped
    #[error("node {0} is already stopped")]
    AlreadyStopped(String),

    /// Data operation or transition requiring a running node
    #[error("node {0} is not running")]
    NotRunning(String),

    /// Resume called on a node that is not suspended
    #[error("node {0} is not suspended")]
    NotSuspended(String),

    /// Start called on a suspended node (resume is the only way back)
    #[error("node {0} is suspended")]
    Suspended(String),

    /// Node id collision on cluster registration
    #[error("node {0} already exists in cluster")]
    NodeExists(String),

    /// Lookup of an unknown node id
    #[error("node {0} not found in cluster")]
    NodeNotFound(String),

    /// Aggregate failure from a cluster-wide start fan-out
    #[error("failed to start {failed} nodes")]
    StartAll {
        /// Number of nodes whose start failed.
        failed: usize,
    },

    /// A scenario engine only supports one run at a time
    #[error("scenario is already running")]
    ScenarioRunning,

    /// Configuration parsing or validation error
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for ChaosKVS operations
pub type Result<T> = std::result::Result<T, ChaosKvsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_carry_node_id() {
        assert_eq!(
            ChaosKvsError::AlreadyRunning("node-1".to_string()).to_string(),
            "node node-1 is already running"
        );
        assert_eq!(
            ChaosKvsError::NotRunning("node-2".to_string()).to_string(),
            "node node-2 is not running"
        );
        assert_eq!(
            ChaosKvsError::NodeNotFound("ghost".to_string()).to_string(),
            "node ghost not found in cluster"
        );
    }

    #[test]
    fn test_start_all_reports_count() {
        let err = ChaosKvsError::StartAll { failed: 3 };
        assert_eq!(err.to_string(), "failed to start 3 nodes");
    }
}

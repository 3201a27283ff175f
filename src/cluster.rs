//! Cluster registry and fan-out lifecycle operations.
//!
//! A [`Cluster`] owns the node population for one scenario run. The registry
//! map sits behind a reader-writer lock; membership changes are rare, reads
//! (snapshots, lookups, counts) are frequent. Fleet-wide start/stop fan out
//! one task per node and join them all.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{ChaosKvsError, Result};
use crate::node::{Node, NodeStatus};

/// Thread-safe population of uniquely named nodes.
pub struct Cluster {
    nodes: RwLock<HashMap<String, Arc<Node>>>,
}

impl Cluster {
    /// Create an empty cluster.
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Register a node. Fails if the id is already taken.
    pub fn add_node(&self, node: Arc<Node>) -> Result<()> {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(node.id()) {
            return Err(ChaosKvsError::NodeExists(node.id().to_string()));
        }
        let id = node.id().to_string();
        nodes.insert(id.clone(), node);
        drop(nodes);

        info!(node = %id, "node added to cluster");
        Ok(())
    }

    /// Remove a node, stopping it first if it is running.
    pub fn remove_node(&self, id: &str) -> Result<()> {
        let node = self
            .nodes
            .write()
            .remove(id)
            .ok_or_else(|| ChaosKvsError::NodeNotFound(id.to_string()))?;

        if node.status() == NodeStatus::Running {
            let _ = node.stop();
        }

        info!(node = %id, "node removed from cluster");
        Ok(())
    }

    /// Look up a node by id.
    pub fn get_node(&self, id: &str) -> Option<Arc<Node>> {
        self.nodes.read().get(id).cloned()
    }

    /// Snapshot of all nodes. Callers iterate without holding the registry lock.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().values().cloned().collect()
    }

    /// Start every node concurrently and wait for all of them.
    ///
    /// Individual failures are logged; the aggregate failure count is
    /// surfaced as [`ChaosKvsError::StartAll`].
    pub async fn start_all(&self) -> Result<()> {
        let nodes = self.nodes();
        info!(count = nodes.len(), "starting all nodes in cluster");

        let mut set = JoinSet::new();
        for node in nodes {
            set.spawn(async move { node.start() });
        }

        let mut failed = 0usize;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(error = %e, "node start failed");
                    failed += 1;
                }
                Err(e) => {
                    debug!(error = %e, "node start task panicked");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            error!(failed, "failed to start nodes");
            return Err(ChaosKvsError::StartAll { failed });
        }

        info!("all nodes started");
        Ok(())
    }

    /// Stop every node concurrently and wait for all of them.
    ///
    /// Already-stopped nodes are non-fatal; failures are logged at warn.
    pub async fn stop_all(&self) {
        let nodes = self.nodes();
        info!(count = nodes.len(), "stopping all nodes in cluster");

        let mut set = JoinSet::new();
        for node in nodes {
            set.spawn(async move { node.stop() });
        }

        let mut failed = 0usize;
        while let Some(joined) = set.join_next().await {
            if !matches!(joined, Ok(Ok(()))) {
                failed += 1;
            }
        }

        if failed > 0 {
            warn!(failed, "some nodes failed to stop (may already be stopped)");
        }
        info!("all nodes stopped");
    }

    /// Number of registered nodes.
    pub fn size(&self) -> usize {
        self.nodes.read().len()
    }

    /// Number of nodes currently running.
    ///
    /// Each node's status is read under its own lock, so the count is a
    /// point-in-time approximation, not a linearizable view.
    pub fn running_count(&self) -> usize {
        self.count_status(NodeStatus::Running)
    }

    /// Number of nodes currently stopped.
    pub fn stopped_count(&self) -> usize {
        self.count_status(NodeStatus::Stopped)
    }

    /// Number of nodes currently suspended.
    pub fn suspended_count(&self) -> usize {
        self.count_status(NodeStatus::Suspended)
    }

    /// Create `count` nodes named `{prefix}-1 … {prefix}-count` and add them.
    pub fn create_nodes(&self, count: usize, prefix: &str) -> Result<()> {
        info!(count, prefix, "creating nodes");
        for i in 1..=count {
            self.add_node(Arc::new(Node::new(format!("{prefix}-{i}"))))?;
        }
        Ok(())
    }

    fn count_status(&self, status: NodeStatus) -> usize {
        self.nodes
            .read()
            .values()
            .filter(|n| n.status() == status)
            .count()
    }
}

impl Default for Cluster {
    fn default() -> Self {
        Self::new()
    }
}

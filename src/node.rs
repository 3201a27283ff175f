//! Single-node in-memory key-value store with a chaos-friendly lifecycle.
//!
//! A [`Node`] is one member of the simulated fleet: a string-keyed store of
//! [`Bytes`] values behind a three-state lifecycle (stopped / running /
//! suspended) plus an injectable latency knob. The chaos injector flips the
//! lifecycle and the delay; the recovery supervisor flips them back; the load
//! generator only ever calls the data operations.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::error::{ChaosKvsError, Result};

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Node is down; the store is retained in memory but inaccessible.
    Stopped,
    /// Node is serving reads and writes.
    Running,
    /// Node is paused; data operations fail, data is preserved.
    Suspended,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Stopped => write!(f, "stopped"),
            NodeStatus::Running => write!(f, "running"),
            NodeStatus::Suspended => write!(f, "suspended"),
        }
    }
}

/// State, store, and delay share one lock: transitions and writes take it
/// exclusively, status reads and gets take it shared.
struct NodeInner {
    status: NodeStatus,
    data: HashMap<String, Bytes>,
    delay: Duration,
}

/// A single in-memory KVS node.
///
/// All operations are safe to call from any task. The injected delay is
/// applied on the `get`/`set` paths *before* the status check and outside
/// the lock, so one sleeping operation does not serialize the others.
pub struct Node {
    id: String,
    inner: RwLock<NodeInner>,
}

impl Node {
    /// Create a new node in the `Stopped` state.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inner: RwLock::new(NodeInner {
                status: NodeStatus::Stopped,
                data: HashMap::new(),
                delay: Duration::ZERO,
            }),
        }
    }

    /// The node's identity, unique within its cluster.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Transition `Stopped → Running`.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.status {
            NodeStatus::Running => return Err(ChaosKvsError::AlreadyRunning(self.id.clone())),
            NodeStatus::Suspended => return Err(ChaosKvsError::Suspended(self.id.clone())),
            NodeStatus::Stopped => {}
        }
        inner.status = NodeStatus::Running;
        drop(inner);

        info!(node = %self.id, "node started");
        Ok(())
    }

    /// Transition `Running | Suspended → Stopped`.
    ///
    /// Stopping a suspended node is allowed; only stop-from-stopped fails.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.status == NodeStatus::Stopped {
            return Err(ChaosKvsError::AlreadyStopped(self.id.clone()));
        }
        inner.status = NodeStatus::Stopped;
        drop(inner);

        info!(node = %self.id, "node stopped");
        Ok(())
    }

    /// Transition `Running → Suspended`.
    pub fn suspend(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.status != NodeStatus::Running {
            return Err(ChaosKvsError::NotRunning(self.id.clone()));
        }
        inner.status = NodeStatus::Suspended;
        drop(inner);

        info!(node = %self.id, "node suspended");
        Ok(())
    }

    /// Transition `Suspended → Running`.
    pub fn resume(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.status != NodeStatus::Suspended {
            return Err(ChaosKvsError::NotSuspended(self.id.clone()));
        }
        inner.status = NodeStatus::Running;
        drop(inner);

        info!(node = %self.id, "node resumed");
        Ok(())
    }

    /// Current lifecycle state.
    pub fn status(&self) -> NodeStatus {
        self.inner.read().status
    }

    /// Set the injected latency applied to `get`/`set`. Zero clears it.
    ///
    /// The knob is mutable in any lifecycle state.
    pub fn set_delay(&self, delay: Duration) {
        self.inner.write().delay = delay;
    }

    /// Currently injected latency.
    pub fn delay(&self) -> Duration {
        self.inner.read().delay
    }

    /// Read a value. Returns `None` on a missing key or a non-running node.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.apply_delay().await;

        let inner = self.inner.read();
        if inner.status != NodeStatus::Running {
            return None;
        }
        inner.data.get(key).cloned()
    }

    /// Write a value. Fails unless the node is running.
    ///
    /// Values are shared by reference ([`Bytes`] clones are cheap); callers
    /// must not expect copy-on-write semantics.
    pub async fn set(&self, key: impl Into<String>, value: Bytes) -> Result<()> {
        self.apply_delay().await;

        let mut inner = self.inner.write();
        if inner.status != NodeStatus::Running {
            return Err(ChaosKvsError::NotRunning(self.id.clone()));
        }
        inner.data.insert(key.into(), value);
        Ok(())
    }

    /// Delete a key. Fails unless the node is running. Not delayed.
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.status != NodeStatus::Running {
            return Err(ChaosKvsError::NotRunning(self.id.clone()));
        }
        inner.data.remove(key);
        Ok(())
    }

    /// Unordered snapshot of the keys currently present.
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().data.keys().cloned().collect()
    }

    /// Number of keys in the store.
    pub fn len(&self) -> usize {
        self.inner.read().data.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().data.is_empty()
    }

    // The sleep happens outside the lock so delayed operations on the same
    // node do not queue behind a single sleeper.
    async fn apply_delay(&self) {
        let delay = self.inner.read().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

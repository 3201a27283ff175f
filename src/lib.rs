//! # ChaosKVS
//!
//! A single-process chaos-engineering simulator for a fleet of independent
//! in-memory key-value nodes. A load generator hammers the fleet while a
//! chaos injector breaks nodes (kill / suspend / delay) and a recovery
//! supervisor repairs them; an event bus couples the control plane to
//! observers and a metrics aggregator tracks every request.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Scenario Engine                        │
//! │  ┌────────────┐   ┌───────────┐   ┌────────────────────┐    │
//! │  │ LoadGen    │   │ Injector  │   │ Recovery Supervisor│    │
//! │  │ (traffic)  │   │ (attacks) │   │ (repairs)          │    │
//! │  └─────┬──────┘   └─────┬─────┘   └──────────┬─────────┘    │
//! │        │                │    EventBus        │              │
//! │        ▼                ▼                    ▼              │
//! │  ┌───────────────────────────────────────────────────┐      │
//! │  │       Cluster: node-1 … node-N (in-memory KVS)    │      │
//! │  └───────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod chaos;
pub mod client;
pub mod cluster;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod node;
pub mod recovery;
pub mod scenario;
pub mod worker;

pub use error::{ChaosKvsError, Result};

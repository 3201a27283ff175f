//! Chaos and recovery event envelope plus a non-blocking fan-out bus.
//!
//! Every attack and every repair publishes an [`Event`]; observers subscribe
//! to the [`EventBus`] and receive their own buffered stream. Delivery is
//! load-shedding by design: a publish never blocks, and a subscriber whose
//! buffer is full misses that event. Tests and dashboards must not assume
//! lossless delivery under queue pressure.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ChaosKvsError;

const DEFAULT_BUFFER_SIZE: usize = 100;

/// Kind of event flowing over the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A chaos attack was executed against a node.
    ChaosAttack,
    /// A suspended node was auto-resumed by the injector.
    ChaosResume,
    /// The supervisor is attempting to restore a node.
    RecoveryStart,
    /// The supervisor restored a node.
    RecoverySuccess,
    /// The supervisor failed to restore a node.
    RecoveryFailed,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::ChaosAttack => write!(f, "chaos_attack"),
            EventType::ChaosResume => write!(f, "chaos_resume"),
            EventType::RecoveryStart => write!(f, "recovery_start"),
            EventType::RecoverySuccess => write!(f, "recovery_success"),
            EventType::RecoveryFailed => write!(f, "recovery_failed"),
        }
    }
}

/// Kind of chaos attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackType {
    /// Destructive stop; the store survives in memory but is inaccessible.
    Kill,
    /// Reversible pause without data loss.
    Suspend,
    /// Latency injection on the data path.
    Delay,
}

impl fmt::Display for AttackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttackType::Kill => write!(f, "kill"),
            AttackType::Suspend => write!(f, "suspend"),
            AttackType::Delay => write!(f, "delay"),
        }
    }
}

impl FromStr for AttackType {
    type Err = ChaosKvsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kill" => Ok(AttackType::Kill),
            "suspend" => Ok(AttackType::Suspend),
            "delay" => Ok(AttackType::Delay),
            other => Err(ChaosKvsError::Config(format!(
                "unknown attack type: {other}"
            ))),
        }
    }
}

/// Event-specific payload; all fields optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventData {
    /// Attack kind for `chaos_attack` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_type: Option<AttackType>,
    /// Injected delay, rendered as a human-readable duration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_duration: Option<String>,
    /// Retry attempt number for `recovery_start` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Error message for `recovery_failed` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A chaos or recovery event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// What happened.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Which node it happened to.
    pub node_id: String,
    /// Event-specific payload, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<EventData>,
}

impl Event {
    fn new(event_type: EventType, node_id: impl Into<String>, data: Option<EventData>) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            node_id: node_id.into(),
            data,
        }
    }

    /// A kill or suspend attack against `node_id`.
    pub fn chaos_attack(node_id: impl Into<String>, attack: AttackType) -> Self {
        Self::new(
            EventType::ChaosAttack,
            node_id,
            Some(EventData {
                attack_type: Some(attack),
                ..EventData::default()
            }),
        )
    }

    /// A delay-injection attack against `node_id`.
    pub fn chaos_delay(node_id: impl Into<String>, delay: Duration) -> Self {
        Self::new(
            EventType::ChaosAttack,
            node_id,
            Some(EventData {
                attack_type: Some(AttackType::Delay),
                delay_duration: Some(humantime::format_duration(delay).to_string()),
                ..EventData::default()
            }),
        )
    }

    /// The injector auto-resumed `node_id`.
    pub fn chaos_resume(node_id: impl Into<String>) -> Self {
        Self::new(EventType::ChaosResume, node_id, None)
    }

    /// The supervisor began recovery attempt `attempt` on `node_id`.
    pub fn recovery_start(node_id: impl Into<String>, attempt: u32) -> Self {
        Self::new(
            EventType::RecoveryStart,
            node_id,
            Some(EventData {
                attempt: Some(attempt),
                ..EventData::default()
            }),
        )
    }

    /// The supervisor restored `node_id`.
    pub fn recovery_success(node_id: impl Into<String>) -> Self {
        Self::new(EventType::RecoverySuccess, node_id, None)
    }

    /// The supervisor failed to restore `node_id`.
    pub fn recovery_failed(node_id: impl Into<String>, error: &ChaosKvsError) -> Self {
        Self::new(
            EventType::RecoveryFailed,
            node_id,
            Some(EventData {
                error: Some(error.to_string()),
                ..EventData::default()
            }),
        )
    }
}

/// A subscriber's end of the bus: a buffered, ordered event stream.
pub struct EventSubscriber {
    id: u64,
    rx: mpsc::Receiver<Event>,
}

impl EventSubscriber {
    /// Identity used for [`EventBus::unsubscribe`].
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receive the next event; `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

/// Non-blocking fan-out pub/sub bus.
///
/// Publishing iterates the subscriber set under a read lock and try-sends to
/// each buffered channel. Per-subscriber ordering matches publish order; no
/// cross-subscriber ordering is promised.
pub struct EventBus {
    subscribers: RwLock<HashMap<u64, mpsc::Sender<Event>>>,
    next_id: AtomicU64,
    buffer_size: usize,
}

impl EventBus {
    /// Create a bus with the default per-subscriber buffer of 100 events.
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER_SIZE)
    }

    /// Create a bus with an explicit per-subscriber buffer size.
    pub fn with_buffer(buffer_size: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Register a new subscriber and return its stream.
    pub fn subscribe(&self) -> EventSubscriber {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().insert(id, tx);
        EventSubscriber { id, rx }
    }

    /// Remove a subscriber; its stream ends.
    pub fn unsubscribe(&self, subscriber: &EventSubscriber) {
        self.subscribers.write().remove(&subscriber.id);
    }

    /// Deliver an event to every subscriber that has buffer space.
    ///
    /// Never blocks; a full subscriber buffer drops the event for that
    /// subscriber only.
    pub fn publish(&self, event: Event) {
        let subscribers = self.subscribers.read();
        for tx in subscribers.values() {
            let _ = tx.try_send(event.clone());
        }
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Drop every subscriber, signaling end-of-stream on each.
    pub fn close(&self) {
        self.subscribers.write().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

//! FlowBus pub/sub for mount lifecycle events.
//!
//! The registry publishes a [`MountFlow`] whenever a mountpoint is added or
//! removed. UI and process-messaging collaborators subscribe with NATS-style
//! subject patterns.
//!
//! # Pattern Matching
//!
//! Patterns use dot-separated tokens with wildcards:
//! - `*` matches exactly one token: `mount.*` matches `mount.added`
//! - `>` matches one or more tokens (only at end): `mount.>` matches `mount.added`
//! - Exact match: `mount.removed` only matches `mount.removed`
//!
//! # Example
//!
//! ```ignore
//! let bus = shared_mount_flow_bus(64);
//! let mut sub = bus.subscribe("mount.added");
//!
//! registry.add(params).await?;
//!
//! while let Some(msg) = sub.recv().await {
//!     println!("mounted {}", msg.payload.name());
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ============================================================================
// Pattern Matching
// ============================================================================

/// Check if a subject matches a pattern.
///
/// Patterns use NATS-style wildcards:
/// - `*` matches exactly one token
/// - `>` matches one or more tokens (only at end)
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    let pattern_tokens: Vec<&str> = pattern.split('.').collect();
    let subject_tokens: Vec<&str> = subject.split('.').collect();

    let mut pi = 0;
    let mut si = 0;

    while pi < pattern_tokens.len() && si < subject_tokens.len() {
        match pattern_tokens[pi] {
            ">" => {
                // `>` must be last and swallows the rest
                return pi == pattern_tokens.len() - 1;
            }
            "*" => {
                pi += 1;
                si += 1;
            }
            token => {
                if token != subject_tokens[si] {
                    return false;
                }
                pi += 1;
                si += 1;
            }
        }
    }

    pi == pattern_tokens.len() && si == subject_tokens.len()
}

// ============================================================================
// Flow Message Types
// ============================================================================

/// Trait for payloads that know their subject.
pub trait HasSubject {
    fn subject(&self) -> &str;
}

/// A message published to the flow bus.
#[derive(Clone, Debug)]
pub struct FlowMessage<T> {
    /// The subject (derived from payload).
    pub subject: String,
    pub payload: T,
    /// When this message was created.
    pub timestamp: Instant,
}

impl<T: HasSubject> FlowMessage<T> {
    pub fn new(payload: T) -> Self {
        let subject = payload.subject().to_string();
        Self {
            subject,
            payload,
            timestamp: Instant::now(),
        }
    }
}

// ============================================================================
// Mount Flow Events
// ============================================================================

/// Where a mountpoint registration came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountSource {
    /// Static configuration or a registration queued before init.
    #[default]
    Boot,
    /// A runtime `add`/`remove` call.
    Runtime,
}

/// Mount lifecycle events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MountFlow {
    /// A mountpoint joined the registry.
    Added { name: String, source: MountSource },
    /// A mountpoint was unmounted and left the registry.
    Removed { name: String, source: MountSource },
}

impl MountFlow {
    /// Get the subject string for this event.
    pub fn subject(&self) -> &'static str {
        match self {
            MountFlow::Added { .. } => "mount.added",
            MountFlow::Removed { .. } => "mount.removed",
        }
    }

    /// Name of the mountpoint this event is about.
    pub fn name(&self) -> &str {
        match self {
            MountFlow::Added { name, .. } | MountFlow::Removed { name, .. } => name,
        }
    }

    pub fn source(&self) -> MountSource {
        match self {
            MountFlow::Added { source, .. } | MountFlow::Removed { source, .. } => *source,
        }
    }
}

impl HasSubject for MountFlow {
    fn subject(&self) -> &str {
        MountFlow::subject(self)
    }
}

// ============================================================================
// FlowBus
// ============================================================================

/// Type-parameterized pub/sub bus.
///
/// Uses a broadcast channel internally for multi-subscriber delivery.
/// Subscribers receive only messages matching their pattern.
#[derive(Debug)]
pub struct FlowBus<T: Clone + Send + 'static> {
    tx: broadcast::Sender<FlowMessage<T>>,
    capacity: usize,
}

impl<T: Clone + Send + 'static> FlowBus<T> {
    /// Create a new flow bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Send + HasSubject + 'static> FlowBus<T> {
    /// Publish a payload to the bus.
    ///
    /// Returns the number of subscribers that received the message. Publishing
    /// with no subscribers is not an error.
    pub fn publish(&self, payload: T) -> usize {
        let msg = FlowMessage::new(payload);
        self.tx.send(msg).unwrap_or(0)
    }

    /// Subscribe to messages matching a pattern.
    pub fn subscribe(&self, pattern: &str) -> Subscription<T> {
        Subscription {
            pattern: pattern.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone + Send + 'static> Clone for FlowBus<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// A subscription to a FlowBus with pattern filtering.
pub struct Subscription<T: Clone> {
    pattern: String,
    rx: broadcast::Receiver<FlowMessage<T>>,
}

impl<T: Clone> Subscription<T> {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Receive the next matching message, waiting if necessary.
    ///
    /// Returns None if the channel is closed.
    pub async fn recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => {
                    if matches_pattern(&self.pattern, &msg.subject) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        pattern = %self.pattern,
                        lagged = n,
                        "Flow subscription lagged behind"
                    );
                }
            }
        }
    }

    /// Try to receive the next matching message without blocking.
    pub fn try_recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => {
                    if matches_pattern(&self.pattern, &msg.subject) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(
                        pattern = %self.pattern,
                        lagged = n,
                        "Flow subscription lagged behind"
                    );
                }
            }
        }
    }
}

impl<T: Clone> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Shared FlowBus Handle
// ============================================================================

/// Shared mount event bus.
pub type SharedMountFlowBus = Arc<FlowBus<MountFlow>>;

/// Create a shared mount event bus.
pub fn shared_mount_flow_bus(capacity: usize) -> SharedMountFlowBus {
    Arc::new(FlowBus::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching_exact() {
        assert!(matches_pattern("mount.added", "mount.added"));
        assert!(!matches_pattern("mount.added", "mount.removed"));
        assert!(!matches_pattern("mount.added", "mount.added.extra"));
    }

    #[test]
    fn test_pattern_matching_wildcards() {
        assert!(matches_pattern("mount.*", "mount.added"));
        assert!(matches_pattern("mount.*", "mount.removed"));
        assert!(!matches_pattern("mount.*", "mount.a.b"));
        assert!(matches_pattern("mount.>", "mount.a.b"));
        assert!(!matches_pattern("mount.>", "mount"));
        assert!(matches_pattern("*.removed", "mount.removed"));
    }

    #[test]
    fn test_mount_flow_subjects() {
        let added = MountFlow::Added {
            name: "home".into(),
            source: MountSource::Runtime,
        };
        assert_eq!(added.subject(), "mount.added");
        assert_eq!(added.name(), "home");
        assert_eq!(added.source(), MountSource::Runtime);

        let removed = MountFlow::Removed {
            name: "home".into(),
            source: MountSource::Boot,
        };
        assert_eq!(removed.subject(), "mount.removed");
    }

    #[tokio::test]
    async fn test_subscription_filters() {
        let bus = shared_mount_flow_bus(16);
        let mut removed = bus.subscribe("mount.removed");
        let mut all = bus.subscribe("mount.*");

        bus.publish(MountFlow::Added {
            name: "a".into(),
            source: MountSource::Boot,
        });
        bus.publish(MountFlow::Removed {
            name: "a".into(),
            source: MountSource::Runtime,
        });

        let msg = removed.recv().await.unwrap();
        assert_eq!(msg.subject, "mount.removed");
        assert!(removed.try_recv().is_none());

        assert_eq!(all.try_recv().unwrap().subject, "mount.added");
        assert_eq!(all.try_recv().unwrap().subject, "mount.removed");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = FlowBus::<MountFlow>::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        let delivered = bus.publish(MountFlow::Added {
            name: "x".into(),
            source: MountSource::Boot,
        });
        assert_eq!(delivered, 0);
    }
}

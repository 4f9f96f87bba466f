//! Upcalls from a node to the application, and the lookup service a joining
//! node depends on.
use std::sync::Arc;

use crate::ddll::DdllKey;
use crate::ddll::Link;

/// Used to notify the application of events that occur at a node.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NodeEvent {
    /// The node became a member.
    Inserted,
    /// The node left the list.
    Deleted,
    /// A join was refused and will be retried.
    JoinRetry {
        /// Number of refusals so far.
        attempt: u32,
    },
    /// The left link was rebuilt around a failed member.
    Repaired {
        /// The new predecessor.
        pred: Link,
    },
    /// No live neighbor was left to rebuild the left link.
    RepairFailed {
        /// The failed predecessor.
        failed: Link,
    },
    /// A join had to be looked up again and the lookup found nothing.
    ResolveFailed,
}

/// Any object that implements this trait can observe nodes.
pub trait NodeObserver {
    /// Invoked after the node handled the action producing the event.
    fn on_event(&self, node: &Link, event: &NodeEvent);
}

/// Shared [NodeObserver] trait object.
pub type SharedNodeObserver = Arc<dyn NodeObserver + Send + Sync>;

/// Resolve the position of a key: the member that should be its left
/// neighbor, and that member's current right neighbor.
pub trait Resolver {
    fn resolve(&self, key: &DdllKey) -> Option<(Link, Link)>;
}

/// Shared [Resolver] trait object.
pub type SharedResolver = Arc<dyn Resolver + Send + Sync>;

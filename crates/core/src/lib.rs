//! Distributed Doubly-Linked List (DDLL).
//!
//! DDLL keeps a single sorted, circular linked list whose members live in
//! independent processes. Each member only knows its left (`pred`) and right
//! (`succ`) neighbor. Members join, leave and fail concurrently; the list is
//! kept consistent with a three-way `SetR`/`SetRAck`/`SetRNak` handshake,
//! `SetL` left-link updates fenced by [LinkNum](ddll::LinkNum), and a bounded
//! set of leftward neighbors used for failure repair.
//!
//! This crate holds the protocol only. The [Node](ddll::Node) state machine
//! returns [NodeAction](ddll::NodeAction)s which a [Dispatcher](dispatcher::Dispatcher)
//! delivers, so the same logic runs inside a discrete-event simulator and on
//! real sockets.

pub mod config;
pub mod consts;
pub mod ddll;
pub mod dispatcher;
pub mod error;
pub mod future;
pub mod message;
pub mod observer;

#[cfg(test)]
mod tests;

pub use config::DdllConfig;
pub use config::RetryPolicy;
pub use error::Error;
pub use error::Result;

//! Message handlers of the DDLL node.
//!
//! Each message type has its own [HandleMsg] implementation on
//! [Node]; [Node::handle_payload] is the single dispatch point.

use super::Message;
use super::MessagePayload;
use crate::ddll::Node;
use crate::ddll::NodeAction;

/// Handlers of `Ping` and `Pong`.
pub mod ping;
/// Handlers of `SetL` and `PropagateNeighbors`.
pub mod setl;
/// Handlers of `SetR`, `SetRAck` and `SetRNak`.
pub mod setr;

/// Generic trait for handle message, inspired by Actor-Model.
pub trait HandleMsg<T> {
    /// Message handler. `ctx` is the whole payload, `msg` its message.
    fn handle(&mut self, ctx: &MessagePayload, msg: &T) -> NodeAction;
}

impl Node {
    /// Handle a message delivered to this node.
    pub fn handle_payload(&mut self, payload: &MessagePayload) -> NodeAction {
        if payload.target.key != self.me.key {
            tracing::warn!(
                "{} dropped {} addressed to {}",
                self.me,
                payload.message.kind(),
                payload.target
            );
            return NodeAction::None;
        }
        tracing::debug!(
            "{} [{}] got {} from {}",
            self.me,
            self.mode,
            payload.message.kind(),
            payload.sender
        );
        match &payload.message {
            Message::SetR(msg) => self.handle(payload, msg),
            Message::SetRAck(msg) => self.handle(payload, msg),
            Message::SetRNak(msg) => self.handle(payload, msg),
            Message::SetL(msg) => self.handle(payload, msg),
            Message::PropagateNeighbors(msg) => self.handle(payload, msg),
            Message::Ping(msg) => self.handle(payload, msg),
            Message::Pong(msg) => self.handle(payload, msg),
        }
    }
}

//! The seam between the protocol and whatever carries it.
use std::time::Duration;

use crate::ddll::Link;
use crate::ddll::NodeAction;
use crate::ddll::Timer;
use crate::message::MessagePayload;
use crate::observer::NodeEvent;

/// Carries out [NodeAction]s.
///
/// Implementations must not call back into the node synchronously: messages,
/// timers and lookups are queued and handled later, one at a time per node.
pub trait Dispatcher {
    /// Deliver a message, possibly late, twice or never.
    fn send(&mut self, payload: MessagePayload);

    /// Fire `timer` at `node` after `after`.
    fn schedule(&mut self, node: &Link, after: Duration, timer: Timer);

    /// Look up the position of `node` and pass it to
    /// [Node::on_resolved](crate::ddll::Node::on_resolved).
    fn resolve(&mut self, node: &Link);

    /// Report an event of `node`.
    fn notify(&mut self, node: &Link, event: NodeEvent);

    /// Flatten and carry out an action of `node`.
    fn dispatch(&mut self, node: &Link, action: NodeAction) {
        match action {
            NodeAction::None => {}
            NodeAction::Send(payload) => self.send(payload),
            NodeAction::Schedule { after, timer } => self.schedule(node, after, timer),
            NodeAction::Resolve => self.resolve(node),
            NodeAction::Event(event) => self.notify(node, event),
            NodeAction::MultiActions(acts) => {
                for act in acts {
                    self.dispatch(node, act)
                }
            }
        }
    }
}

use crate::ddll::Mode;
use crate::ddll::Node;
use crate::ddll::NodeAction;
use crate::message::HandleMsg;
use crate::message::Message;
use crate::message::MessagePayload;
use crate::message::PropagateNeighbors;
use crate::message::SetL;

impl HandleMsg<SetL> for Node {
    fn handle(&mut self, _ctx: &MessagePayload, msg: &SetL) -> NodeAction {
        if self.mode == Mode::Out {
            tracing::debug!("{} is out, ignored SetL {}", self.me, msg.l_new);
            return NodeAction::None;
        }
        self.apply_setl(&msg.l_new, msg.new_seq, &msg.neighbors)
    }
}

impl HandleMsg<PropagateNeighbors> for Node {
    fn handle(&mut self, ctx: &MessagePayload, msg: &PropagateNeighbors) -> NodeAction {
        if !self.mode.is_member() || ctx.sender.key != self.pred.key {
            tracing::debug!(
                "{} ignored neighbors from {}, pred is {}",
                self.me,
                ctx.sender,
                self.pred
            );
            return NodeAction::None;
        }
        match self.neighbors.receive_neighbors(
            &msg.src,
            msg.neighbors.clone(),
            &self.succ,
            &msg.limit,
        ) {
            Some(next) => self.send(&self.succ, Message::PropagateNeighbors(next)),
            None => NodeAction::None,
        }
    }
}

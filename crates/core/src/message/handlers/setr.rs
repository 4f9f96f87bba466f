use crate::ddll::node::Op;
use crate::ddll::is_between;
use crate::ddll::Link;
use crate::ddll::LinkNum;
use crate::ddll::Mode;
use crate::ddll::Node;
use crate::ddll::NodeAction;
use crate::message::HandleMsg;
use crate::message::Message;
use crate::message::MessagePayload;
use crate::message::SetL;
use crate::message::SetR;
use crate::message::SetRAck;
use crate::message::SetRKind;
use crate::message::SetRNak;
use crate::observer::NodeEvent;

impl Node {
    fn is_insertion(requester: &Link, msg: &SetR) -> bool {
        msg.kind == SetRKind::Normal && msg.r_new.key == requester.key
    }

    fn is_deletion(requester: &Link, msg: &SetR) -> bool {
        msg.kind == SetRKind::Normal && msg.r_cur.key == requester.key
    }

    /// Only an `IN` node accepts; a `DEL` node refuses so a stale deletion
    /// cannot bypass a member linked after it.
    fn may_accept(&self, msg: &SetR) -> bool {
        if self.mode != Mode::In {
            return false;
        }
        match &msg.kind {
            SetRKind::Normal => self.succ.is_identical(&msg.r_cur),
            SetRKind::Repair { suspected } => {
                self.succ.is_identical(&msg.r_cur)
                    || suspected.iter().any(|l| l.key == self.succ.key)
            }
        }
    }

    fn ack(&self, requester: &Link, req: u64, new_seq: LinkNum, neighbors: Vec<Link>) -> NodeAction {
        self.send(
            requester,
            Message::SetRAck(SetRAck {
                req,
                new_seq,
                neighbors,
            }),
        )
    }

    /// Tell `target` its left link is now `l_new`.
    fn link_left(
        &mut self,
        target: &Link,
        l_new: Link,
        new_seq: LinkNum,
        neighbors: Vec<Link>,
    ) -> NodeAction {
        if target.key == self.me.key {
            return self.apply_setl(&l_new, new_seq, &neighbors);
        }
        self.send(
            target,
            Message::SetL(SetL {
                l_new,
                new_seq,
                neighbors,
            }),
        )
    }

    fn accept_setr(&mut self, requester: &Link, msg: &SetR) -> NodeAction {
        let new_seq = self.next_rseq(msg.r_new_seq);
        let insertion = Self::is_insertion(requester, msg);
        let deletion = Self::is_deletion(requester, msg);
        match &msg.kind {
            SetRKind::Normal if insertion => {
                self.neighbors.add(msg.r_new.clone());
            }
            SetRKind::Normal => {
                self.neighbors.remove(&msg.r_cur.key);
            }
            SetRKind::Repair { suspected } => {
                self.neighbors.remove(&msg.r_cur.key);
                for s in suspected {
                    self.neighbors.remove(&s.key);
                }
                self.neighbors.add(msg.r_new.clone());
            }
        }
        tracing::info!(
            "{} right link {} -> {} ({})",
            self.me,
            self.succ,
            msg.r_new,
            new_seq
        );
        self.succ = msg.r_new.clone();
        self.rseq = new_seq;
        let for_right = self.neighbors.compute_for_right(&msg.r_new);
        let setl = if insertion {
            self.link_left(&msg.r_cur, msg.r_new.clone(), new_seq, for_right.clone())
        } else if deletion {
            let me = self.me.clone();
            self.link_left(&msg.r_new, me, new_seq, for_right.clone())
        } else {
            NodeAction::None
        };
        let neighbors = if deletion { vec![] } else { for_right };
        vec![setl, self.ack(requester, msg.req, new_seq, neighbors)].into()
    }
}

impl HandleMsg<SetR> for Node {
    fn handle(&mut self, ctx: &MessagePayload, msg: &SetR) -> NodeAction {
        let requester = &ctx.sender;
        // A retransmitted request whose change is already in place.
        if self.mode.is_member() && self.succ.is_identical(&msg.r_new) {
            tracing::debug!("{} acks {} again for request {}", self.me, requester, msg.req);
            let neighbors = if Self::is_deletion(requester, msg) {
                vec![]
            } else {
                self.neighbors.compute_for_right(&msg.r_new)
            };
            return self.ack(requester, msg.req, self.rseq, neighbors);
        }
        if self.may_accept(msg) {
            return self.accept_setr(requester, msg);
        }
        let (hint_pred, hint_succ) = self.nak_hint(&msg.r_new, &msg.r_cur);
        tracing::debug!(
            "{} [{}] refused {} (r_cur {}, succ {})",
            self.me,
            self.mode,
            requester,
            msg.r_cur,
            self.succ
        );
        self.send(
            requester,
            Message::SetRNak(SetRNak {
                req: msg.req,
                hint_pred,
                hint_succ,
            }),
        )
    }
}

impl HandleMsg<SetRAck> for Node {
    fn handle(&mut self, ctx: &MessagePayload, msg: &SetRAck) -> NodeAction {
        let Some(pending) = self.take_pending(msg.req) else {
            return NodeAction::None;
        };
        match pending.op {
            Op::Insert => {
                if msg.new_seq > self.lseq {
                    self.pred = ctx.sender.clone();
                    self.lseq = msg.new_seq;
                    self.neighbors.set(msg.neighbors.iter().cloned());
                }
                self.neighbors.add(ctx.sender.clone());
                self.rseq = msg.new_seq;
                self.mode = Mode::In;
                self.joining = false;
                tracing::info!("{} inserted between {} and {}", self.me, self.pred, self.succ);
                vec![NodeAction::Event(NodeEvent::Inserted), self.arm_ping()].into()
            }
            Op::Delete => {
                self.mode = Mode::Out;
                self.leaving = false;
                tracing::info!("{} deleted", self.me);
                NodeAction::Event(NodeEvent::Deleted)
            }
            Op::Repair(state) => {
                if msg.new_seq > self.lseq {
                    self.pred = ctx.sender.clone();
                    self.lseq = msg.new_seq;
                    self.neighbors.set(msg.neighbors.iter().cloned());
                }
                self.neighbors.add(ctx.sender.clone());
                self.suspected.clear();
                tracing::info!("{} repaired around {}, pred {}", self.me, state.failed, self.pred);
                let propagate = self
                    .neighbors
                    .send_right(&self.me, &self.succ, &state.failed.key)
                    .map(|m| self.send(&self.succ, Message::PropagateNeighbors(m)))
                    .unwrap_or(NodeAction::None);
                vec![
                    NodeAction::Event(NodeEvent::Repaired {
                        pred: self.pred.clone(),
                    }),
                    propagate,
                    self.arm_ping(),
                ]
                .into()
            }
        }
    }
}

impl HandleMsg<SetRNak> for Node {
    fn handle(&mut self, _ctx: &MessagePayload, msg: &SetRNak) -> NodeAction {
        let Some(pending) = self.take_pending(msg.req) else {
            return NodeAction::None;
        };
        match pending.op {
            Op::Insert => {
                self.mode = Mode::Out;
                self.join_attempts += 1;
                tracing::debug!(
                    "{} join refused by {}, hint ({}, {})",
                    self.me,
                    self.pred,
                    msg.hint_pred,
                    msg.hint_succ
                );
                vec![
                    NodeAction::Event(NodeEvent::JoinRetry {
                        attempt: self.join_attempts,
                    }),
                    self.join_retry(msg.hint_pred.clone(), msg.hint_succ.clone()),
                ]
                .into()
            }
            Op::Delete => {
                self.mode = Mode::In;
                tracing::debug!("{} leave refused by {}", self.me, self.pred);
                self.leave_retry()
            }
            Op::Repair(mut state) => {
                let hint = is_between(&state.candidate.key, &msg.hint_pred.key, &self.me.key)
                    .then(|| msg.hint_pred.clone());
                state.tried.push(state.candidate.clone());
                self.next_repair_candidate(state, hint)
            }
        }
    }
}

use crate::ddll::Mode;
use crate::ddll::Node;
use crate::ddll::NodeAction;
use crate::message::HandleMsg;
use crate::message::Message;
use crate::message::MessagePayload;
use crate::message::Ping;
use crate::message::Pong;

impl HandleMsg<Ping> for Node {
    fn handle(&mut self, ctx: &MessagePayload, msg: &Ping) -> NodeAction {
        if self.mode == Mode::Out {
            return NodeAction::None;
        }
        self.send(
            &ctx.sender,
            Message::Pong(Pong {
                nonce: msg.nonce,
                succ: self.succ.clone(),
                rseq: self.rseq,
            }),
        )
    }
}

impl HandleMsg<Pong> for Node {
    fn handle(&mut self, ctx: &MessagePayload, msg: &Pong) -> NodeAction {
        if self.ping.as_ref().map(|p| p.nonce) != Some(msg.nonce) {
            return NodeAction::None;
        }
        self.ping = None;
        let fix = self.on_probe_answer(&ctx.sender, &msg.succ, msg.rseq);
        vec![fix, self.arm_ping()].into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddll::link::tests::link;
    use crate::ddll::node::tests::config;
    use crate::ddll::node::tests::events;
    use crate::ddll::node::tests::member;
    use crate::ddll::node::tests::node;
    use crate::ddll::node::tests::sends;
    use crate::ddll::node::tests::timers;
    use crate::ddll::Link;
    use crate::ddll::LinkNum;
    use crate::ddll::Mode;
    use crate::ddll::Timer;
    use crate::message::SetR;
    use crate::observer::NodeEvent;

    fn probing(v: i64, pred: i64, succ: i64) -> Node {
        let mut n = member(v, pred, succ);
        n.config = config().ping_interval_ms(50);
        n
    }

    fn pong(from: i64, to: i64, nonce: u64, succ: i64, rseq: LinkNum) -> MessagePayload {
        MessagePayload::new(
            link(from),
            link(to),
            Message::Pong(Pong {
                nonce,
                succ: link(succ),
                rseq,
            }),
        )
    }

    /// Probe and return the target and nonce of the `Ping`.
    fn ping(n: &mut Node) -> (Link, u64) {
        let sent = sends(n.on_timer(Timer::Ping));
        match &sent[0].message {
            Message::Ping(p) => (sent[0].target.clone(), p.nonce),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_out_node_ignores_ping() {
        let mut n = node(3);
        let payload = MessagePayload::new(link(4), link(3), Message::Ping(Ping { nonce: 1 }));
        assert!(n.handle_payload(&payload).is_none());

        n.initial().unwrap();
        let sent = sends(n.handle_payload(&payload));
        assert!(sent[0].target.is_identical(&link(4)));
        match &sent[0].message {
            Message::Pong(p) => {
                assert_eq!(p.nonce, 1);
                assert!(p.succ.is_identical(&link(3)));
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_pong_clears_probe() {
        let mut n = Node::new(link(3), config().ping_interval_ms(50));
        n.initial().unwrap();
        n.pred = link(1);
        let (_, nonce) = ping(&mut n);

        assert!(n.handle_payload(&pong(1, 3, 99, 3, LinkNum::ZERO)).is_none());
        assert_eq!(n.ping.as_ref().map(|p| p.nonce), Some(nonce));

        let act = n.handle_payload(&pong(1, 3, nonce, 3, LinkNum::ZERO));
        assert!(n.ping.is_none());
        assert_eq!(timers(act), vec![(
            std::time::Duration::from_millis(50),
            Timer::Ping
        )]);
        // The matching timeout arriving late only re-arms.
        assert!(sends(n.on_timer(Timer::PingTimeout { nonce })).is_empty());
    }

    #[test]
    fn test_single_lost_pong_is_tolerated() {
        let mut n = probing(5, 3, 6);
        n.neighbors.add(link(2));
        let (_, nonce) = ping(&mut n);
        let act = n.on_timer(Timer::PingTimeout { nonce });
        assert!(sends(act).is_empty());
        assert!(!n.is_pending());
        assert_eq!(n.missed, 1);

        // The next probe is answered.
        let (target, nonce) = ping(&mut n);
        assert!(target.is_identical(&link(3)));
        n.handle_payload(&pong(3, 5, nonce, 5, LinkNum::ZERO));
        assert_eq!(n.missed, 0);
        assert!(n.pred().is_identical(&link(3)));
    }

    #[test]
    fn test_pong_leads_to_missed_left_link() {
        let mut n = probing(5, 3, 6);
        let (_, nonce) = ping(&mut n);
        // 3 accepted 4 but the SetL to 5 was lost.
        let act = n.handle_payload(&pong(3, 5, nonce, 4, LinkNum::new(0, 2)));
        assert!(sends(act).is_empty());
        assert!(n.pred().is_identical(&link(3)));

        let (target, nonce) = ping(&mut n);
        assert!(target.is_identical(&link(4)));
        n.handle_payload(&pong(4, 5, nonce, 5, LinkNum::new(0, 2)));
        assert!(n.pred().is_identical(&link(4)));
        assert_eq!(n.lseq(), LinkNum::new(0, 2));
        assert!(n.neighbors().contains(&link(4).key));

        // The lost SetL showing up late changes nothing.
        let (target, nonce) = ping(&mut n);
        assert!(target.is_identical(&link(4)));
        n.handle_payload(&pong(4, 5, nonce, 5, LinkNum::new(0, 2)));
        assert_eq!(n.lseq(), LinkNum::new(0, 2));
    }

    #[test]
    fn test_bypassed_member_joins_again() {
        let mut n = probing(5, 3, 6);
        let (_, nonce) = ping(&mut n);
        let sent = sends(n.handle_payload(&pong(3, 5, nonce, 6, LinkNum::new(1, 0))));
        assert_eq!(n.mode(), Mode::Ins);
        assert!(sent[0].target.is_identical(&link(3)));
        match &sent[0].message {
            Message::SetR(SetR { r_new, r_cur, .. }) => {
                assert!(r_new.is_identical(&link(5)));
                assert!(r_cur.is_identical(&link(6)));
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_bypassed_leaver_is_deleted() {
        let mut n = probing(5, 3, 6);
        n.leaving = true;
        let (_, nonce) = ping(&mut n);
        let act = n.handle_payload(&pong(3, 5, nonce, 6, LinkNum::new(0, 1)));
        assert_eq!(events(act), vec![NodeEvent::Deleted]);
        assert_eq!(n.mode(), Mode::Out);
    }
}

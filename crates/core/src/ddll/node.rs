//! The DDLL node state machine.
//!
//! A [Node] never performs IO. Every entry point returns a [NodeAction]
//! describing messages to send, timers to arm, lookups to start and events to
//! report; a [Dispatcher](crate::dispatcher::Dispatcher) carries them out.
//! Handlers of incoming messages live in [crate::message::handlers].
use std::cmp::max;
use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use super::key::is_between;
use super::Link;
use super::LinkNum;
use super::NeighborSet;
use crate::config::DdllConfig;
use crate::config::RetryPolicy;
use crate::error::Error;
use crate::error::Result;
use crate::message::Message;
use crate::message::MessagePayload;
use crate::message::Ping;
use crate::message::SetR;
use crate::message::SetRKind;
use crate::observer::NodeEvent;

/// Membership state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Not a member.
    Out,
    /// Insertion in flight.
    Ins,
    /// Deletion in flight.
    Del,
    /// Stable member.
    In,
}

impl Mode {
    /// Whether the node is linked into the list.
    pub fn is_member(&self) -> bool {
        matches!(self, Mode::In | Mode::Del)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Mode::Out => "OUT",
            Mode::Ins => "INS",
            Mode::Del => "DEL",
            Mode::In => "IN",
        };
        write!(f, "{s}")
    }
}

/// Timers a node asks its dispatcher to fire back at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timer {
    /// Retry a refused join at the given position.
    JoinRetry { pred: Link, succ: Link },
    /// Retry a refused leave.
    LeaveRetry,
    /// No answer to the `SetR` numbered `req`.
    SetRTimeout { req: u64 },
    /// Probe the predecessor.
    Ping,
    /// No `Pong` for the probe `nonce`.
    PingTimeout { nonce: u64 },
}

/// What a node wants done after handling an input.
#[derive(Debug, Clone)]
pub enum NodeAction {
    /// Nothing to do.
    None,
    /// Deliver a message.
    Send(MessagePayload),
    /// Fire a timer back at the node.
    Schedule { after: Duration, timer: Timer },
    /// Look up the node's position and pass it to [Node::on_resolved].
    Resolve,
    /// Report an event to observers.
    Event(NodeEvent),
    /// Several of the above, in order.
    MultiActions(Vec<NodeAction>),
}

impl NodeAction {
    /// The leaf actions in order, `None` dropped.
    pub fn flatten(self) -> Vec<NodeAction> {
        match self {
            NodeAction::None => vec![],
            NodeAction::MultiActions(acts) => acts.into_iter().flat_map(|a| a.flatten()).collect(),
            act => vec![act],
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, NodeAction::None)
    }
}

impl From<Vec<NodeAction>> for NodeAction {
    fn from(mut acts: Vec<NodeAction>) -> Self {
        acts.retain(|a| !a.is_none());
        match acts.len() {
            0 => NodeAction::None,
            1 => acts.remove(0),
            _ => NodeAction::MultiActions(acts),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RepairState {
    pub(crate) failed: Link,
    pub(crate) candidate: Link,
    pub(crate) tried: Vec<Link>,
}

#[derive(Debug, Clone)]
pub(crate) enum Op {
    Insert,
    Delete,
    Repair(RepairState),
}

/// The `SetR` this node is waiting an answer for.
#[derive(Debug, Clone)]
pub(crate) struct Pending {
    pub(crate) req: u64,
    pub(crate) op: Op,
    pub(crate) target: Link,
    /// Sent again as is on timeout, so a late or repeated reply still matches.
    pub(crate) setr: SetR,
    pub(crate) resent: u32,
}

/// An outstanding `Ping`.
#[derive(Debug, Clone)]
pub(crate) struct Probe {
    pub(crate) nonce: u64,
    pub(crate) target: Link,
}

/// A member, or would-be member, of one list.
pub struct Node {
    pub(crate) me: Link,
    pub(crate) mode: Mode,
    pub(crate) pred: Link,
    pub(crate) succ: Link,
    pub(crate) lseq: LinkNum,
    pub(crate) rseq: LinkNum,
    pub(crate) neighbors: NeighborSet,
    pub(crate) config: DdllConfig,
    pub(crate) rng: StdRng,
    pub(crate) next_req: u64,
    pub(crate) pending: Option<Pending>,
    pub(crate) joining: bool,
    pub(crate) leaving: bool,
    pub(crate) join_attempts: u32,
    pub(crate) ping: Option<Probe>,
    pub(crate) next_nonce: u64,
    pub(crate) ping_armed: bool,
    /// Probes of the predecessor left unanswered in a row.
    pub(crate) missed: u32,
    /// Probed once instead of the predecessor.
    pub(crate) probe_next: Option<Link>,
    /// Members believed to have failed, cleared by a successful repair.
    pub(crate) suspected: Vec<Link>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Node")
            .field("me", &self.me)
            .field("mode", &self.mode)
            .field("pred", &self.pred)
            .field("succ", &self.succ)
            .field("lseq", &self.lseq)
            .field("rseq", &self.rseq)
            .finish()
    }
}

impl Node {
    /// Create a node in mode `OUT`.
    pub fn new(me: Link, config: DdllConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            neighbors: NeighborSet::new(me.clone(), config.neighbor_set_size),
            pred: me.clone(),
            succ: me.clone(),
            me,
            mode: Mode::Out,
            lseq: LinkNum::ZERO,
            rseq: LinkNum::ZERO,
            config,
            rng,
            next_req: 1,
            pending: None,
            joining: false,
            leaving: false,
            join_attempts: 0,
            ping: None,
            next_nonce: 1,
            ping_armed: false,
            missed: 0,
            probe_next: None,
            suspected: vec![],
        }
    }

    pub fn me(&self) -> &Link {
        &self.me
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pred(&self) -> &Link {
        &self.pred
    }

    pub fn succ(&self) -> &Link {
        &self.succ
    }

    pub fn lseq(&self) -> LinkNum {
        self.lseq
    }

    pub fn rseq(&self) -> LinkNum {
        self.rseq
    }

    pub fn neighbors(&self) -> &NeighborSet {
        &self.neighbors
    }

    pub fn config(&self) -> &DdllConfig {
        &self.config
    }

    /// Number of refused joins since the last call to [Node::join].
    pub fn join_attempts(&self) -> u32 {
        self.join_attempts
    }

    /// Whether a `SetR` of this node awaits an answer.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn expect_mode(&self, expected: Mode) -> Result<()> {
        if self.mode != expected {
            return Err(Error::InvalidMode {
                key: self.me.key.clone(),
                expected,
                actual: self.mode,
            });
        }
        Ok(())
    }

    fn reset_links(&mut self) {
        self.lseq = LinkNum::ZERO;
        self.rseq = LinkNum::ZERO;
        self.neighbors.clear();
        self.suspected.clear();
        self.ping = None;
        self.missed = 0;
        self.probe_next = None;
    }

    /// Become the first member of a new list.
    pub fn initial(&mut self) -> Result<NodeAction> {
        self.expect_mode(Mode::Out)?;
        self.reset_links();
        self.pred = self.me.clone();
        self.succ = self.me.clone();
        self.mode = Mode::In;
        self.joining = false;
        self.leaving = false;
        tracing::info!("{} created the list", self.me);
        Ok(vec![NodeAction::Event(NodeEvent::Inserted), self.arm_ping()].into())
    }

    /// Insert between `pred` and `succ`, as returned by a lookup.
    pub fn join(&mut self, pred: Link, succ: Link) -> Result<NodeAction> {
        self.expect_mode(Mode::Out)?;
        if self.pending.is_some() {
            return Err(Error::RequestInFlight(self.me.key.clone()));
        }
        self.reset_links();
        self.joining = true;
        self.leaving = false;
        self.join_attempts = 0;
        Ok(self.send_join(pred, succ))
    }

    /// Remove this node from the list.
    pub fn leave(&mut self) -> Result<NodeAction> {
        self.expect_mode(Mode::In)?;
        if self.pending.is_some() {
            return Err(Error::RequestInFlight(self.me.key.clone()));
        }
        self.leaving = true;
        Ok(self.send_leave())
    }

    /// Continue a join with the outcome of the lookup asked by
    /// [NodeAction::Resolve].
    pub fn on_resolved(&mut self, found: Option<(Link, Link)>) -> NodeAction {
        if self.mode != Mode::Out || !self.joining {
            return NodeAction::None;
        }
        match found {
            Some((pred, succ)) => self.send_join(pred, succ),
            None => {
                tracing::warn!("{} could not resolve its position", self.me);
                self.joining = false;
                NodeAction::Event(NodeEvent::ResolveFailed)
            }
        }
    }

    pub fn on_timer(&mut self, timer: Timer) -> NodeAction {
        match timer {
            Timer::JoinRetry { pred, succ } => {
                if self.mode == Mode::Out && self.joining {
                    self.send_join(pred, succ)
                } else {
                    NodeAction::None
                }
            }
            Timer::LeaveRetry => self.on_leave_retry(),
            Timer::SetRTimeout { req } => self.on_setr_timeout(req),
            Timer::Ping => self.on_ping_timer(),
            Timer::PingTimeout { nonce } => self.on_ping_timeout(nonce),
        }
    }

    pub(crate) fn send(&self, to: &Link, message: Message) -> NodeAction {
        NodeAction::Send(MessagePayload::new(self.me.clone(), to.clone(), message))
    }

    /// Number `setr`, send it to `target` and wait for its answer.
    fn request(&mut self, op: Op, target: &Link, mut setr: SetR) -> NodeAction {
        let req = self.next_req;
        self.next_req += 1;
        setr.req = req;
        let send = self.send(target, Message::SetR(setr.clone()));
        self.pending = Some(Pending {
            req,
            op,
            target: target.clone(),
            setr,
            resent: 0,
        });
        vec![send, self.setr_timeout(req)].into()
    }

    fn setr_timeout(&self, req: u64) -> NodeAction {
        NodeAction::Schedule {
            after: self.config.setr_timeout(),
            timer: Timer::SetRTimeout { req },
        }
    }

    /// Take the pending request if `req` answers it.
    pub(crate) fn take_pending(&mut self, req: u64) -> Option<Pending> {
        match &self.pending {
            Some(p) if p.req == req => self.pending.take(),
            _ => {
                tracing::debug!("{} dropped stale reply to request {}", self.me, req);
                None
            }
        }
    }

    fn send_join(&mut self, pred: Link, succ: Link) -> NodeAction {
        if pred.key == self.me.key {
            return NodeAction::Resolve;
        }
        // `pred` already links to this node: its answer to an earlier attempt
        // was lost. Asking again with the old successor gets it re-acked.
        let succ = if succ.key == self.me.key {
            self.succ.clone()
        } else {
            succ
        };
        if succ.key == self.me.key {
            tracing::warn!("{} is linked by {} but knows no successor", self.me, pred);
            self.joining = false;
            return NodeAction::Event(NodeEvent::ResolveFailed);
        }
        self.mode = Mode::Ins;
        self.pred = pred.clone();
        self.succ = succ.clone();
        tracing::debug!("{} asks {} to insert it before {}", self.me, pred, succ);
        let setr = SetR {
            req: 0,
            r_new: self.me.clone(),
            r_cur: succ,
            r_new_seq: LinkNum::ZERO,
            kind: SetRKind::Normal,
        };
        self.request(Op::Insert, &pred, setr)
    }

    fn send_leave(&mut self) -> NodeAction {
        if self.pred.key == self.me.key {
            self.mode = Mode::Out;
            self.leaving = false;
            tracing::info!("{} left as the last member", self.me);
            return NodeAction::Event(NodeEvent::Deleted);
        }
        self.mode = Mode::Del;
        tracing::debug!("{} asks {} to bypass it", self.me, self.pred);
        let pred = self.pred.clone();
        let setr = SetR {
            req: 0,
            r_new: self.succ.clone(),
            r_cur: self.me.clone(),
            r_new_seq: self.rseq.next(),
            kind: SetRKind::Normal,
        };
        self.request(Op::Delete, &pred, setr)
    }

    fn on_leave_retry(&mut self) -> NodeAction {
        if !self.leaving || self.mode != Mode::In {
            return NodeAction::None;
        }
        if self.pending.is_some() {
            return self.leave_retry();
        }
        if self.is_suspected(&self.pred) {
            // Relink around a failed predecessor before leaving.
            let failed = self.pred.clone();
            return vec![self.start_repair(failed), self.leave_retry()].into();
        }
        self.send_leave()
    }

    pub(crate) fn leave_retry(&mut self) -> NodeAction {
        let delay = self.rng.gen_range(0..=self.config.leave_retry_max_ms);
        NodeAction::Schedule {
            after: Duration::from_millis(delay),
            timer: Timer::LeaveRetry,
        }
    }

    /// Schedule the next join attempt after a refusal hinting
    /// `(hint_pred, hint_succ)`.
    pub(crate) fn join_retry(&mut self, hint_pred: Link, hint_succ: Link) -> NodeAction {
        if hint_pred.key == self.me.key || hint_succ.key == self.me.key {
            return NodeAction::Resolve;
        }
        let after = match self.config.join_retry {
            RetryPolicy::Immediate => Duration::ZERO,
            RetryPolicy::RandomDelay { max_ms } => {
                Duration::from_millis(self.rng.gen_range(0..=max_ms))
            }
            RetryPolicy::ConstantDelay { delay_ms } => Duration::from_millis(delay_ms),
            RetryPolicy::UseHint => {
                if !hint_pred.is_identical(&self.pred) {
                    return NodeAction::Resolve;
                }
                Duration::ZERO
            }
        };
        NodeAction::Schedule {
            after,
            timer: Timer::JoinRetry {
                pred: hint_pred,
                succ: hint_succ,
            },
        }
    }

    fn on_setr_timeout(&mut self, req: u64) -> NodeAction {
        let Some(mut pending) = self.take_pending(req) else {
            return NodeAction::None;
        };
        if pending.resent < self.config.setr_retries {
            pending.resent += 1;
            tracing::debug!(
                "{} sends request {} to {} again ({})",
                self.me,
                req,
                pending.target,
                pending.resent
            );
            let setr = self.send(&pending.target, Message::SetR(pending.setr.clone()));
            self.pending = Some(pending);
            return vec![setr, self.setr_timeout(req)].into();
        }
        match pending.op {
            Op::Insert => {
                tracing::warn!("{} got no answer from {}, resolving again", self.me, self.pred);
                self.mode = Mode::Out;
                NodeAction::Resolve
            }
            Op::Delete => {
                // Only a failed probe makes the predecessor suspected.
                tracing::warn!("{} got no answer from {} while leaving", self.me, self.pred);
                self.mode = Mode::In;
                self.leave_retry()
            }
            Op::Repair(mut state) => {
                tracing::warn!(
                    "{} got no answer from repair candidate {}",
                    self.me,
                    state.candidate
                );
                // A silent candidate is treated as failed too.
                self.suspect(&state.candidate);
                state.tried.push(state.candidate.clone());
                self.next_repair_candidate(state, None)
            }
        }
    }

    pub(crate) fn suspect(&mut self, link: &Link) {
        if !self.is_suspected(link) {
            self.suspected.push(link.clone());
        }
    }

    fn is_suspected(&self, link: &Link) -> bool {
        self.suspected.iter().any(|l| l.key == link.key)
    }

    /// Relink around `failed`, which was this node's predecessor.
    pub(crate) fn start_repair(&mut self, failed: Link) -> NodeAction {
        if failed.key == self.me.key {
            return NodeAction::None;
        }
        self.suspect(&failed);
        if self.mode != Mode::In || self.pending.is_some() {
            return NodeAction::None;
        }
        tracing::warn!("{} starts repair around {}", self.me, failed);
        let state = RepairState {
            candidate: failed.clone(),
            failed,
            tried: vec![],
        };
        self.next_repair_candidate(state, None)
    }

    /// Ask the next candidate, preferring `hint` when it is not excluded.
    pub(crate) fn next_repair_candidate(
        &mut self,
        mut state: RepairState,
        hint: Option<Link>,
    ) -> NodeAction {
        let excluded = |l: &Link, state: &RepairState, suspected: &[Link]| {
            l.key == state.failed.key
                || state.tried.iter().chain(suspected).any(|e| e.key == l.key)
        };
        let next = match hint {
            Some(h) if h.key != self.me.key && !excluded(&h, &state, &self.suspected) => Some(h),
            _ => {
                let exclude: Vec<Link> = self
                    .suspected
                    .iter()
                    .chain(state.tried.iter())
                    .cloned()
                    .collect();
                self.neighbors.repair_candidate(&state.failed, &exclude)
            }
        };
        match next {
            Some(candidate) => {
                state.candidate = candidate.clone();
                tracing::debug!("{} asks {} to link to it", self.me, candidate);
                let setr = SetR {
                    req: 0,
                    r_new: self.me.clone(),
                    r_cur: state.failed.clone(),
                    r_new_seq: self.lseq.next_repair(),
                    kind: SetRKind::Repair {
                        suspected: self.suspected.clone(),
                    },
                };
                self.request(Op::Repair(state), &candidate, setr)
            }
            None => self.repair_exhausted(state.failed),
        }
    }

    fn repair_exhausted(&mut self, failed: Link) -> NodeAction {
        if self.suspected.iter().any(|l| l.key == self.succ.key) {
            // Every other member is gone.
            tracing::warn!("{} is the only live member left", self.me);
            self.lseq = self.lseq.next_repair();
            self.rseq = self.lseq;
            self.pred = self.me.clone();
            self.succ = self.me.clone();
            self.neighbors.clear();
            self.suspected.clear();
            return NodeAction::Event(NodeEvent::Repaired {
                pred: self.me.clone(),
            });
        }
        tracing::error!("{} found no live neighbor to repair {}", self.me, failed);
        NodeAction::Event(NodeEvent::RepairFailed { failed })
    }

    pub(crate) fn arm_ping(&mut self) -> NodeAction {
        match self.config.ping_interval() {
            Some(after) if !self.ping_armed => {
                self.ping_armed = true;
                NodeAction::Schedule {
                    after,
                    timer: Timer::Ping,
                }
            }
            _ => NodeAction::None,
        }
    }

    fn on_ping_timer(&mut self) -> NodeAction {
        self.ping_armed = false;
        if self.mode == Mode::Out {
            return NodeAction::None;
        }
        if !self.mode.is_member() || self.pred.key == self.me.key || self.ping.is_some() {
            return self.arm_ping();
        }
        let target = self.probe_next.take().unwrap_or_else(|| self.pred.clone());
        let nonce = self.next_nonce;
        self.next_nonce += 1;
        let ping = self.send(&target, Message::Ping(Ping { nonce }));
        self.ping = Some(Probe { nonce, target });
        vec![ping, NodeAction::Schedule {
            after: self.config.ping_timeout(),
            timer: Timer::PingTimeout { nonce },
        }]
        .into()
    }

    fn on_ping_timeout(&mut self, nonce: u64) -> NodeAction {
        let probe = match self.ping.take() {
            Some(p) if p.nonce == nonce => p,
            other => {
                self.ping = other;
                return self.arm_ping();
            }
        };
        if !self.mode.is_member() {
            return NodeAction::None;
        }
        if probe.target.key != self.pred.key {
            return self.arm_ping();
        }
        self.missed += 1;
        if self.missed < self.config.ping_misses {
            tracing::debug!("{} got no pong from {} ({} in a row)", self.me, self.pred, self.missed);
            return self.arm_ping();
        }
        self.missed = 0;
        tracing::warn!("{} suspects its predecessor {}", self.me, self.pred);
        let failed = self.pred.clone();
        vec![self.start_repair(failed), self.arm_ping()].into()
    }

    /// Check the right link `succ`/`rseq` reported by the probed node `from`
    /// against this node's left link.
    pub(crate) fn on_probe_answer(&mut self, from: &Link, succ: &Link, rseq: LinkNum) -> NodeAction {
        if !self.mode.is_member() {
            return NodeAction::None;
        }
        if from.key == self.pred.key {
            self.missed = 0;
        }
        if succ.is_identical(&self.me) {
            if rseq <= self.lseq {
                return NodeAction::None;
            }
            // The SetL carrying this link was lost.
            tracing::info!("{} takes {} as pred from its pong", self.me, from);
            let neighbors = self.neighbors.list();
            return self.apply_setl(from, rseq, &neighbors);
        }
        if from.key != self.pred.key {
            return NodeAction::None;
        }
        if is_between(&from.key, &succ.key, &self.me.key) {
            tracing::debug!("{} will probe {}, which follows {}", self.me, succ, from);
            self.probe_next = Some(succ.clone());
            return NodeAction::None;
        }
        // The predecessor links past this node with a link newer than ours.
        if self.pending.is_some() || rseq <= self.lseq {
            return NodeAction::None;
        }
        if self.leaving {
            tracing::info!("{} was bypassed by {} while leaving", self.me, from);
            self.mode = Mode::Out;
            self.leaving = false;
            return NodeAction::Event(NodeEvent::Deleted);
        }
        if self.mode != Mode::In {
            return NodeAction::None;
        }
        tracing::warn!("{} was cut out by {}, joining again", self.me, from);
        self.mode = Mode::Out;
        match self.join(from.clone(), succ.clone()) {
            Ok(act) => act,
            Err(e) => {
                tracing::error!("{} could not join again: {}", self.me, e);
                NodeAction::None
            }
        }
    }

    /// Take `l_new` as the left link if `new_seq` is fresh, then diffuse the
    /// neighbor set rightward up to the previous predecessor.
    pub(crate) fn apply_setl(
        &mut self,
        l_new: &Link,
        new_seq: LinkNum,
        neighbors: &[Link],
    ) -> NodeAction {
        if new_seq <= self.lseq {
            tracing::debug!(
                "{} ignored SetL {} with {} <= {}",
                self.me,
                l_new,
                new_seq,
                self.lseq
            );
            return NodeAction::None;
        }
        let old_pred = std::mem::replace(&mut self.pred, l_new.clone());
        self.lseq = new_seq;
        self.neighbors.set(neighbors.iter().cloned());
        self.neighbors.add(l_new.clone());
        self.ping = None;
        self.missed = 0;
        self.probe_next = None;
        tracing::debug!("{} left link {} -> {} ({})", self.me, old_pred, l_new, new_seq);
        let propagate = self
            .neighbors
            .send_right(&self.me, &self.succ, &old_pred.key)
            .map(|msg| self.send(&self.succ, Message::PropagateNeighbors(msg)))
            .unwrap_or(NodeAction::None);
        vec![propagate, self.arm_ping()].into()
    }

    /// The `(pred, succ)` to suggest to a refused requester.
    pub(crate) fn nak_hint(&self, r_new: &Link, r_cur: &Link) -> (Link, Link) {
        if is_between(&self.me.key, &r_new.key, &self.succ.key) {
            if self.mode == Mode::In {
                (self.me.clone(), self.succ.clone())
            } else {
                (self.pred.clone(), self.succ.clone())
            }
        } else {
            (self.succ.clone(), r_cur.clone())
        }
    }

    /// Number of the right link replacing the current one.
    pub(crate) fn next_rseq(&self, requested: LinkNum) -> LinkNum {
        max(self.rseq.next(), requested)
    }
}

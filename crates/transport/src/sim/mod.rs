//! A discrete-event simulator running many nodes in one process.
//!
//! Time is virtual. Messages, timers and lookups are events in a priority
//! queue; one event is handled at a time, so a node never sees two inputs at
//! once. Latency, duplication and loss are drawn from a seeded random source,
//! so a run is reproducible from its [SimConfig].
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

use ddll_core::ddll::DdllKey;
use ddll_core::ddll::Endpoint;
use ddll_core::ddll::Link;
use ddll_core::ddll::Mode;
use ddll_core::ddll::Node;
use ddll_core::ddll::NodeAction;
use ddll_core::ddll::Timer;
use ddll_core::dispatcher::Dispatcher;
use ddll_core::message::MessagePayload;
use ddll_core::observer::NodeEvent;
use ddll_core::observer::Resolver;
use ddll_core::observer::SharedNodeObserver;
use ddll_core::DdllConfig;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

mod config;
mod queue;

pub use self::config::SimConfig;
use self::queue::EventQueue;
use self::queue::SimEvent;
use crate::error::Error;
use crate::error::Result;

/// Upper bound of events handled by [Simulator::run_until_idle].
pub const MAX_STEPS: u64 = 1_000_000;

/// An event reported by a simulated node.
#[derive(Debug, Clone)]
pub struct Record {
    pub at: Duration,
    pub node: Link,
    pub event: NodeEvent,
}

pub struct Simulator {
    now: Duration,
    queue: EventQueue,
    nodes: BTreeMap<DdllKey, Node>,
    crashed: BTreeSet<DdllKey>,
    rng: StdRng,
    config: SimConfig,
    node_config: DdllConfig,
    observers: Vec<SharedNodeObserver>,
    records: Vec<Record>,
    /// Messages to lose, by kind and target.
    losses: Vec<(&'static str, DdllKey)>,
    sent: u64,
    dropped: u64,
}

impl Simulator {
    pub fn new(config: SimConfig, node_config: DdllConfig) -> Self {
        Self {
            now: Duration::ZERO,
            queue: EventQueue::default(),
            nodes: BTreeMap::new(),
            crashed: BTreeSet::new(),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            node_config,
            observers: vec![],
            records: vec![],
            losses: vec![],
            sent: 0,
            dropped: 0,
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn add_observer(&mut self, observer: SharedNodeObserver) {
        self.observers.push(observer);
    }

    /// Every event reported so far, in order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn events_of(&self, key: &DdllKey) -> Vec<NodeEvent> {
        self.records
            .iter()
            .filter(|r| &r.node.key == key)
            .map(|r| r.event.clone())
            .collect()
    }

    /// Messages sent and messages lost so far.
    pub fn stats(&self) -> (u64, u64) {
        (self.sent, self.dropped)
    }

    /// Lose the next `kind` message (as named by `Message::kind`) sent to
    /// `target`, whatever the drop rate.
    pub fn lose_next(&mut self, kind: &'static str, target: &DdllKey) {
        self.losses.push((kind, target.clone()));
    }

    pub fn node(&self, key: &DdllKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: &DdllKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Events waiting in the queue.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn is_crashed(&self, key: &DdllKey) -> bool {
        self.crashed.contains(key)
    }

    /// Create a node in mode `OUT` with its own endpoint.
    pub fn add_node(&mut self, key: DdllKey) -> Result<Link> {
        self.add_node_with(key, self.node_config.clone())
    }

    pub fn add_node_with(&mut self, key: DdllKey, config: DdllConfig) -> Result<Link> {
        if self.nodes.contains_key(&key) {
            return Err(Error::NodeAlreadyExists(key.to_string()));
        }
        let config = match config.seed {
            Some(_) => config,
            None => config.seed(self.rng.gen()),
        };
        let link = Link::new(Endpoint::new(format!("sim://{}", self.nodes.len())), key.clone());
        self.nodes.insert(key, Node::new(link.clone(), config));
        Ok(link)
    }

    fn live_node_mut(&mut self, key: &DdllKey) -> Result<&mut Node> {
        if self.crashed.contains(key) {
            return Err(Error::NodeCrashed(key.to_string()));
        }
        self.nodes
            .get_mut(key)
            .ok_or_else(|| Error::NodeNotFound(key.to_string()))
    }

    fn apply(&mut self, key: &DdllKey, f: impl FnOnce(&mut Node) -> ddll_core::Result<NodeAction>) -> Result<()> {
        let node = self.live_node_mut(key)?;
        let act = f(node)?;
        let me = node.me().clone();
        self.dispatch(&me, act);
        Ok(())
    }

    /// Create a node and make it the first member of the list.
    pub fn initial(&mut self, key: DdllKey) -> Result<Link> {
        let link = self.add_node(key.clone())?;
        self.apply(&key, |n| n.initial())?;
        Ok(link)
    }

    /// Start inserting a node where the registry says. The node is created
    /// unless it exists and is `OUT`.
    pub fn join(&mut self, key: DdllKey) -> Result<Link> {
        let link = match self.nodes.get(&key) {
            Some(n) if n.mode() == Mode::Out => n.me().clone(),
            _ => self.add_node(key.clone())?,
        };
        let (pred, succ) = self
            .lookup(&key)
            .ok_or_else(|| Error::ResolveFailed(key.to_string()))?;
        self.apply(&key, |n| n.join(pred, succ))?;
        Ok(link)
    }

    /// Create a node and start inserting it between two given members,
    /// whatever their current links are.
    pub fn join_at(&mut self, key: DdllKey, pred: &DdllKey, succ: &DdllKey) -> Result<Link> {
        let pred = self.link_of(pred)?;
        let succ = self.link_of(succ)?;
        let link = self.add_node(key.clone())?;
        self.apply(&key, |n| n.join(pred, succ))?;
        Ok(link)
    }

    pub fn leave(&mut self, key: &DdllKey) -> Result<()> {
        self.apply(key, |n| n.leave())
    }

    /// Stop a node without notice: it handles nothing from now on.
    pub fn crash(&mut self, key: &DdllKey) -> Result<()> {
        if !self.nodes.contains_key(key) {
            return Err(Error::NodeNotFound(key.to_string()));
        }
        tracing::info!("{} crashed at {:?}", key, self.now);
        self.crashed.insert(key.clone());
        Ok(())
    }

    fn link_of(&self, key: &DdllKey) -> Result<Link> {
        self.nodes
            .get(key)
            .map(|n| n.me().clone())
            .ok_or_else(|| Error::NodeNotFound(key.to_string()))
    }

    fn latency(&mut self) -> Duration {
        Duration::from_millis(self.rng.gen_range(self.config.latency()))
    }

    fn roll(&mut self, rate: f64) -> bool {
        rate > 0.0 && self.rng.gen_bool(rate.min(1.0))
    }

    /// Handle the next event. Returns false when nothing is left.
    pub fn step(&mut self) -> bool {
        let Some((at, event)) = self.queue.pop() else {
            return false;
        };
        self.now = at;
        let key = match &event {
            SimEvent::Deliver(p) => p.target.key.clone(),
            SimEvent::Timer { key, .. } | SimEvent::Resolve { key } => key.clone(),
        };
        if self.crashed.contains(&key) {
            return true;
        }
        let found = match &event {
            SimEvent::Resolve { key } => self.lookup(key),
            _ => None,
        };
        let Some(node) = self.nodes.get_mut(&key) else {
            tracing::warn!("event for unknown node {}", key);
            return true;
        };
        let act = match event {
            SimEvent::Deliver(p) => node.handle_payload(&p),
            SimEvent::Timer { timer, .. } => node.on_timer(timer),
            SimEvent::Resolve { .. } => node.on_resolved(found),
        };
        let me = node.me().clone();
        self.dispatch(&me, act);
        true
    }

    /// Handle events until the queue is empty.
    /// Fails if probing keeps the queue busy past [MAX_STEPS].
    pub fn run_until_idle(&mut self) -> Result<u64> {
        let mut steps = 0;
        while self.step() {
            steps += 1;
            if steps >= MAX_STEPS {
                return Err(Error::NotIdle(steps));
            }
        }
        Ok(steps)
    }

    /// Handle every event due within `d` and advance the clock by `d`.
    pub fn run_for(&mut self, d: Duration) -> u64 {
        let until = self.now + d;
        let mut steps = 0;
        while self.queue.peek_time().is_some_and(|at| at <= until) {
            self.step();
            steps += 1;
        }
        self.now = until;
        steps
    }

    /// Keys met walking right links from `start`, `start` first.
    /// Stops on a loop, a crashed node or an unknown node.
    pub fn ring(&self, start: &DdllKey) -> Vec<DdllKey> {
        let mut keys = vec![];
        let mut cur = start.clone();
        while keys.len() <= self.nodes.len() {
            let Some(node) = self.nodes.get(&cur) else {
                break;
            };
            if self.crashed.contains(&cur) {
                break;
            }
            keys.push(cur.clone());
            cur = node.succ().key.clone();
            if &cur == start {
                break;
            }
        }
        keys
    }

    /// The live `IN` member with the greatest key below `key`, wrapping
    /// around, and its right link.
    pub fn lookup(&self, key: &DdllKey) -> Option<(Link, Link)> {
        let members = self.nodes.iter().filter(|(k, n)| {
            *k != key && n.mode() == Mode::In && !self.crashed.contains(*k)
        });
        let mut below = None;
        let mut last = None;
        for (k, n) in members {
            if k < key {
                below = Some(n);
            }
            last = Some(n);
        }
        below.or(last).map(|n| (n.me().clone(), n.succ().clone()))
    }

    /// Live members sorted by key.
    pub fn members(&self) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| n.mode().is_member() && !self.crashed.contains(&n.me().key))
            .collect()
    }

    /// Check that the live members form one sorted ring with matching links
    /// and that no live node is stuck inserting or deleting.
    pub fn check_consistency(&self) -> Result<()> {
        for n in self.nodes.values() {
            if self.crashed.contains(&n.me().key) {
                continue;
            }
            if matches!(n.mode(), Mode::Ins | Mode::Del) || n.is_pending() {
                return Err(Error::Inconsistent(format!(
                    "{} is {} with pending {}",
                    n.me(),
                    n.mode(),
                    n.is_pending()
                )));
            }
        }
        let members = self.members();
        for (i, n) in members.iter().enumerate() {
            let next = members[(i + 1) % members.len()];
            if !n.succ().is_identical(next.me()) {
                return Err(Error::Inconsistent(format!(
                    "succ of {} is {}, expected {}",
                    n.me(),
                    n.succ(),
                    next.me()
                )));
            }
            if !next.pred().is_identical(n.me()) {
                return Err(Error::Inconsistent(format!(
                    "pred of {} is {}, expected {}",
                    next.me(),
                    next.pred(),
                    n.me()
                )));
            }
            if n.rseq() != next.lseq() {
                return Err(Error::Inconsistent(format!(
                    "link {} -> {} numbered {} and {}",
                    n.me(),
                    next.me(),
                    n.rseq(),
                    next.lseq()
                )));
            }
        }
        Ok(())
    }
}

impl Resolver for Simulator {
    fn resolve(&self, key: &DdllKey) -> Option<(Link, Link)> {
        self.lookup(key)
    }
}

impl Dispatcher for Simulator {
    fn send(&mut self, payload: MessagePayload) {
        self.sent += 1;
        let planned = self
            .losses
            .iter()
            .position(|(kind, target)| {
                *kind == payload.message.kind() && *target == payload.target.key
            })
            .map(|i| self.losses.remove(i))
            .is_some();
        if planned || self.roll(self.config.drop_rate) {
            self.dropped += 1;
            tracing::debug!(
                "lost {} {} -> {}",
                payload.message.kind(),
                payload.sender,
                payload.target
            );
            return;
        }
        if self.roll(self.config.dup_rate) {
            let at = self.now + self.latency();
            self.queue.push(at, SimEvent::Deliver(payload.clone()));
        }
        let at = self.now + self.latency();
        self.queue.push(at, SimEvent::Deliver(payload));
    }

    fn schedule(&mut self, node: &Link, after: Duration, timer: Timer) {
        self.queue.push(self.now + after, SimEvent::Timer {
            key: node.key.clone(),
            timer,
        });
    }

    fn resolve(&mut self, node: &Link) {
        let at = self.now + self.latency();
        self.queue.push(at, SimEvent::Resolve {
            key: node.key.clone(),
        });
    }

    fn notify(&mut self, node: &Link, event: NodeEvent) {
        tracing::debug!("{} {:?} at {:?}", node, event, self.now);
        for o in &self.observers {
            o.on_event(node, &event);
        }
        self.records.push(Record {
            at: self.now,
            node: node.clone(),
            event,
        });
    }
}

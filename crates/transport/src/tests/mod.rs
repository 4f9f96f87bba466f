use std::sync::Arc;
use std::sync::Mutex;

use ddll_core::ddll::DdllKey;
use ddll_core::ddll::Link;
use ddll_core::ddll::UniqId;
use ddll_core::observer::NodeEvent;
use ddll_core::observer::NodeObserver;

use crate::logging::init_logging;
use crate::logging::LogLevel;

mod test_sim;

#[allow(dead_code)]
pub fn setup_tracing() {
    init_logging(LogLevel::Debug);
}

pub fn key(v: i64) -> DdllKey {
    DdllKey::new(v, UniqId::new("sim", v as u64), "list")
}

pub fn keys(vs: &[i64]) -> Vec<DdllKey> {
    vs.iter().map(|v| key(*v)).collect()
}

/// Collects every reported event.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<(Link, NodeEvent)>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self, event: &NodeEvent) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| e == event)
            .count()
    }
}

impl NodeObserver for EventLog {
    fn on_event(&self, node: &Link, event: &NodeEvent) {
        self.events
            .lock()
            .unwrap()
            .push((node.clone(), event.clone()));
    }
}

use std::cmp::Ordering;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use ddll_core::ddll::DdllKey;
use ddll_core::ddll::Timer;
use ddll_core::message::MessagePayload;

#[derive(Debug, Clone)]
pub(crate) enum SimEvent {
    Deliver(MessagePayload),
    Timer { key: DdllKey, timer: Timer },
    Resolve { key: DdllKey },
}

#[derive(Debug)]
struct Scheduled {
    at: Duration,
    seq: u64,
    event: SimEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

/// Events ordered by time, then by insertion.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    seq: u64,
}

impl EventQueue {
    pub(crate) fn push(&mut self, at: Duration, event: SimEvent) {
        self.seq += 1;
        self.heap.push(Reverse(Scheduled {
            at,
            seq: self.seq,
            event,
        }));
    }

    pub(crate) fn peek_time(&self) -> Option<Duration> {
        self.heap.peek().map(|Reverse(s)| s.at)
    }

    pub(crate) fn pop(&mut self) -> Option<(Duration, SimEvent)> {
        self.heap.pop().map(|Reverse(s)| (s.at, s.event))
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: i64) -> DdllKey {
        DdllKey::new(v, ddll_core::ddll::UniqId::new("t", v as u64), "list")
    }

    #[test]
    fn test_time_then_fifo() {
        let mut q = EventQueue::default();
        let ms = Duration::from_millis;
        q.push(ms(5), SimEvent::Resolve { key: key(1) });
        q.push(ms(2), SimEvent::Resolve { key: key(2) });
        q.push(ms(5), SimEvent::Resolve { key: key(3) });
        q.push(ms(2), SimEvent::Resolve { key: key(4) });
        assert_eq!(q.peek_time(), Some(ms(2)));
        let order: Vec<_> = std::iter::from_fn(|| q.pop())
            .map(|(at, e)| match e {
                SimEvent::Resolve { key } => (at, key),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(order, vec![
            (ms(2), key(2)),
            (ms(2), key(4)),
            (ms(5), key(1)),
            (ms(5), key(3)),
        ]);
        assert_eq!(q.len(), 0);
    }
}

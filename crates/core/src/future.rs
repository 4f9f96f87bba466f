//! Token-indexed one-shot rendezvous between an asynchronous reply and a
//! blocked caller.
//!
//! A caller reserves a token with [FutureValues::new_future], starts the
//! asynchronous work carrying the token, and waits in [FutureValues::get].
//! Whoever sees the reply calls [FutureValues::set]. Tokens are never 0.
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crossbeam_channel as cbc;
use dashmap::DashMap;

use crate::consts::NO_FUTURE;
use crate::error::Error;
use crate::error::Result;

struct Slot<V> {
    tx: cbc::Sender<V>,
    rx: cbc::Receiver<V>,
}

/// Registry of pending futures.
pub struct FutureValues<V> {
    slots: DashMap<u64, Slot<V>>,
    next: AtomicU64,
}

impl<V> Default for FutureValues<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FutureValues<V> {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            next: AtomicU64::new(NO_FUTURE + 1),
        }
    }

    /// Reserve a slot and return its token.
    pub fn new_future(&self) -> u64 {
        let mut token = self.next.fetch_add(1, Ordering::Relaxed);
        if token == NO_FUTURE {
            token = self.next.fetch_add(1, Ordering::Relaxed);
        }
        let (tx, rx) = cbc::bounded(1);
        self.slots.insert(token, Slot { tx, rx });
        token
    }

    /// Record the value of `token` and wake its waiter.
    /// Unknown or expired tokens are ignored.
    pub fn set(&self, token: u64, value: V) {
        let Some(slot) = self.slots.get(&token) else {
            tracing::debug!("future {} is expired, value dropped", token);
            return;
        };
        match slot.tx.try_send(value) {
            Ok(()) => {}
            Err(cbc::TrySendError::Full(_)) => {
                tracing::debug!("future {} already has a value", token);
            }
            Err(cbc::TrySendError::Disconnected(_)) => {
                tracing::debug!("future {} has no waiter", token);
            }
        }
    }

    /// Wait up to `timeout` for the value of `token`.
    /// The slot is released whatever the outcome.
    pub fn get(&self, token: u64, timeout: Duration) -> Result<V> {
        // Clone the receiver so no map guard is held while blocking.
        let rx = match self.slots.get(&token) {
            Some(slot) => slot.rx.clone(),
            None => return Err(Error::FutureTimeout(token)),
        };
        let received = rx.recv_timeout(timeout);
        self.discard_future(token);
        received.map_err(|_| Error::FutureTimeout(token))
    }

    pub fn discard_future(&self, token: u64) {
        self.slots.remove(&token);
    }

    /// Whether the slot of `token` is gone.
    pub fn expired(&self, token: u64) -> bool {
        !self.slots.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_tokens_skip_zero() {
        let fv = FutureValues::<u32>::new();
        let a = fv.new_future();
        let b = fv.new_future();
        assert_ne!(a, NO_FUTURE);
        assert_ne!(a, b);
        assert_eq!(fv.len(), 2);
    }

    #[test]
    fn test_set_then_get() {
        let fv = FutureValues::new();
        let t = fv.new_future();
        fv.set(t, "done");
        assert_eq!(fv.get(t, Duration::from_millis(10)).unwrap(), "done");
        assert!(fv.expired(t));
    }

    #[test]
    fn test_get_wakes_on_set_from_other_thread() {
        let fv = Arc::new(FutureValues::new());
        let t = fv.new_future();
        let setter = {
            let fv = fv.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                fv.set(t, 42u64);
            })
        };
        assert_eq!(fv.get(t, Duration::from_secs(5)).unwrap(), 42);
        setter.join().unwrap();
    }

    #[test]
    fn test_timeout_discards_slot() {
        let fv = FutureValues::<u8>::new();
        let t = fv.new_future();
        assert!(matches!(
            fv.get(t, Duration::from_millis(5)),
            Err(Error::FutureTimeout(x)) if x == t
        ));
        assert!(fv.expired(t));
        // A late value has no effect.
        fv.set(t, 1);
        assert!(fv.is_empty());
        assert!(matches!(
            fv.get(t, Duration::from_millis(1)),
            Err(Error::FutureTimeout(_))
        ));
    }

    #[test]
    fn test_discard() {
        let fv = FutureValues::<u8>::new();
        let t = fv.new_future();
        assert!(!fv.expired(t));
        fv.discard_future(t);
        assert!(fv.expired(t));
        fv.set(12345, 1);
        assert!(fv.is_empty());
    }

    #[test]
    fn test_second_value_is_dropped() {
        let fv = FutureValues::new();
        let t = fv.new_future();
        fv.set(t, 1u8);
        fv.set(t, 2u8);
        assert_eq!(fv.get(t, Duration::from_millis(10)).unwrap(), 1);
    }

    #[test]
    fn test_concurrent_waiters_on_distinct_tokens() {
        let fv = Arc::new(FutureValues::new());
        let tokens: Vec<u64> = (0..4).map(|_| fv.new_future()).collect();
        let waiters: Vec<_> = tokens
            .iter()
            .map(|t| {
                let fv = fv.clone();
                let t = *t;
                thread::spawn(move || fv.get(t, Duration::from_secs(5)))
            })
            .collect();
        for t in tokens.iter().rev() {
            fv.set(*t, *t);
        }
        for (w, t) in waiters.into_iter().zip(tokens) {
            assert_eq!(w.join().unwrap().unwrap(), t);
        }
        assert!(fv.is_empty());
    }
}

//! Configuration of a DDLL node.
//!
//! Every field carries a default so a partial YAML document is accepted:
//!
//! ```yaml
//! neighbor_set_size: 8
//! ping_interval_ms: 3000
//! join_retry:
//!   type: constant_delay
//!   delay_ms: 50
//! ```
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::consts::DEFAULT_JOIN_RETRY_MAX_MS;
use crate::consts::DEFAULT_LEAVE_RETRY_MAX_MS;
use crate::consts::DEFAULT_NEIGHBOR_SET_SIZE;
use crate::consts::DEFAULT_PING_INTERVAL_MS;
use crate::consts::DEFAULT_PING_MISSES;
use crate::consts::DEFAULT_PING_TIMEOUT_MS;
use crate::consts::DEFAULT_SETR_RETRIES;
use crate::consts::DEFAULT_SETR_TIMEOUT_MS;
use crate::error::Result;

/// How a joining node retries after its `SetR` was refused with `SetRNak`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Retry with the hint of the NAK right away.
    Immediate,
    /// Retry with the hint after a uniformly random delay in `[0, max_ms]`.
    RandomDelay {
        /// Upper bound of the delay.
        max_ms: u64,
    },
    /// Retry with the hint after a fixed delay.
    ConstantDelay {
        /// The delay.
        delay_ms: u64,
    },
    /// Retry at once with the hint if the hinted predecessor is the one that
    /// was tried, otherwise look the position up again.
    UseHint,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::RandomDelay {
            max_ms: DEFAULT_JOIN_RETRY_MAX_MS,
        }
    }
}

/// Node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DdllConfig {
    /// Capacity of the leftward neighbor set.
    pub neighbor_set_size: usize,
    /// Interval of predecessor probing, 0 disables probing.
    pub ping_interval_ms: u64,
    /// Bound on the wait for a `Pong`.
    pub ping_timeout_ms: u64,
    /// Unanswered probes in a row that make the predecessor suspected.
    pub ping_misses: u32,
    /// Bound on the wait for a `SetRAck`/`SetRNak`.
    pub setr_timeout_ms: u64,
    /// Resends of the same `SetR` before its operation is given up.
    pub setr_retries: u32,
    /// Retry policy of a refused join.
    pub join_retry: RetryPolicy,
    /// Upper bound of the random delay before a refused leave is retried.
    pub leave_retry_max_ms: u64,
    /// Seed of the node's random source, entropy if missing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for DdllConfig {
    fn default() -> Self {
        Self {
            neighbor_set_size: DEFAULT_NEIGHBOR_SET_SIZE,
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            ping_timeout_ms: DEFAULT_PING_TIMEOUT_MS,
            ping_misses: DEFAULT_PING_MISSES,
            setr_timeout_ms: DEFAULT_SETR_TIMEOUT_MS,
            setr_retries: DEFAULT_SETR_RETRIES,
            join_retry: RetryPolicy::default(),
            leave_retry_max_ms: DEFAULT_LEAVE_RETRY_MAX_MS,
            seed: None,
        }
    }
}

impl DdllConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Read and parse a YAML file.
    pub fn load<P>(path: P) -> Result<Self>
    where P: AsRef<Path> {
        let s = fs::read_to_string(path)?;
        Self::from_yaml_str(&s)
    }

    /// Dump as YAML.
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        match self.ping_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn setr_timeout(&self) -> Duration {
        Duration::from_millis(self.setr_timeout_ms)
    }

    /// Builder style setter of the join retry policy.
    pub fn join_retry(mut self, policy: RetryPolicy) -> Self {
        self.join_retry = policy;
        self
    }

    /// Builder style setter of the neighbor set capacity.
    pub fn neighbor_set_size(mut self, size: usize) -> Self {
        self.neighbor_set_size = size;
        self
    }

    /// Builder style setter of the probing interval.
    pub fn ping_interval_ms(mut self, ms: u64) -> Self {
        self.ping_interval_ms = ms;
        self
    }

    /// Builder style setter of the `SetR` timeout.
    pub fn setr_timeout_ms(mut self, ms: u64) -> Self {
        self.setr_timeout_ms = ms;
        self
    }

    pub fn setr_retries(mut self, retries: u32) -> Self {
        self.setr_retries = retries;
        self
    }

    pub fn ping_misses(mut self, misses: u32) -> Self {
        self.ping_misses = misses.max(1);
        self
    }

    /// Builder style setter of the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

use std::ops::RangeInclusive;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;

/// Network model of the simulator.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimConfig {
    /// Lower bound of the one-way delay.
    pub latency_min_ms: u64,
    /// Upper bound of the one-way delay.
    pub latency_max_ms: u64,
    /// Probability a message is delivered twice.
    pub dup_rate: f64,
    /// Probability a message is lost.
    pub drop_rate: f64,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            latency_min_ms: 1,
            latency_max_ms: 10,
            dup_rate: 0.0,
            drop_rate: 0.0,
            seed: 0,
        }
    }
}

impl SimConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn latency(&self) -> RangeInclusive<u64> {
        let min = self.latency_min_ms.min(self.latency_max_ms);
        min..=self.latency_max_ms.max(min)
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn latency_ms(mut self, min: u64, max: u64) -> Self {
        self.latency_min_ms = min;
        self.latency_max_ms = max;
        self
    }

    pub fn dup_rate(mut self, rate: f64) -> Self {
        self.dup_rate = rate;
        self
    }

    pub fn drop_rate(mut self, rate: f64) -> Self {
        self.drop_rate = rate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml() {
        let cfg = SimConfig::from_yaml_str("latency_max_ms: 50\ndup_rate: 0.1\n").unwrap();
        assert_eq!(cfg.latency(), 1..=50);
        assert_eq!(cfg.dup_rate, 0.1);
        assert_eq!(cfg.drop_rate, 0.0);
    }

    #[test]
    fn test_inverted_bounds() {
        let cfg = SimConfig::default().latency_ms(9, 3);
        assert_eq!(cfg.latency(), 3..=9);
    }
}

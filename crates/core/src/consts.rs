//! Constant variables.

/// Default capacity of a [NeighborSet](crate::ddll::NeighborSet).
pub const DEFAULT_NEIGHBOR_SET_SIZE: usize = 4;
/// Liveness probing is disabled by default.
pub const DEFAULT_PING_INTERVAL_MS: u64 = 0;
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 1000;
/// Bound on the wait for `SetRAck`/`SetRNak`.
pub const DEFAULT_SETR_TIMEOUT_MS: u64 = 5000;
/// Times an unanswered `SetR` is sent again before giving up on it.
pub const DEFAULT_SETR_RETRIES: u32 = 3;
/// Consecutive unanswered probes before the predecessor is suspected.
pub const DEFAULT_PING_MISSES: u32 = 3;
pub const DEFAULT_JOIN_RETRY_MAX_MS: u64 = 100;
pub const DEFAULT_LEAVE_RETRY_MAX_MS: u64 = 100;
/// Token 0 means "no future".
pub const NO_FUTURE: u64 = 0;

//! [LinkNum] fences stale protocol messages.
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// A `(repair generation, sequence)` pair, compared lexicographically.
///
/// A node only takes a new left or right link if the carried number is
/// strictly greater than the stored one for that side.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LinkNum {
    /// Incremented by every repair.
    pub repair: u32,
    /// Incremented by every ordinary link change.
    pub seq: u32,
}

impl LinkNum {
    pub const ZERO: LinkNum = LinkNum { repair: 0, seq: 0 };

    pub fn new(repair: u32, seq: u32) -> Self {
        Self { repair, seq }
    }

    /// Number of the next ordinary link change.
    pub fn next(self) -> Self {
        Self {
            repair: self.repair,
            seq: self.seq + 1,
        }
    }

    /// Number of the link established by the next repair.
    pub fn next_repair(self) -> Self {
        Self {
            repair: self.repair + 1,
            seq: 0,
        }
    }
}

impl fmt::Display for LinkNum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.repair, self.seq)
    }
}

//! [Link] pairs the address of a list member with its key.
use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use super::key::DdllKey;

/// Address of a peer as understood by the transport, e.g. `127.0.0.1:4000`
/// or `sim://3`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Endpoint {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A list member: where it is and what key it holds.
///
/// `Eq` and `Ord` only look at the key. Use [Link::is_identical] when the
/// endpoint must match too.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Link {
    /// Address of the hosting peer.
    pub addr: Endpoint,
    /// Key of the member.
    pub key: DdllKey,
}

impl Link {
    pub fn new(addr: Endpoint, key: DdllKey) -> Self {
        Self { addr, key }
    }

    /// Compare by value, endpoint included.
    pub fn is_identical(&self, other: &Link) -> bool {
        self.key == other.key && self.addr == other.addr
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.key, self.addr)
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Link {}

impl PartialOrd for Link {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Link {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl std::hash::Hash for Link {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state)
    }
}

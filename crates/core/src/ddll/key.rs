//! Keys of the distributed list.
//!
//! A [DdllKey] is ordered by its primary key and broken by [UniqId], so two
//! nodes may register the same primary key. The list id says which list the
//! key belongs to, one physical peer may join several lists.
//!
//! The list is circular. The helpers [is_ordered] and [is_between] answer
//! clockwise questions on it, the way a ring position is compared with a bias.
use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;

use serde::Deserialize;
use serde::Serialize;

/// The opaque, totally ordered part of a key.
/// Values of different variants compare by variant first.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrimaryKey {
    /// Signed integer key.
    Int(i64),
    /// Text key, ordered lexicographically.
    Text(String),
    /// Raw bytes key, ordered lexicographically.
    Bytes(Vec<u8>),
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => {
                write!(f, "0x")?;
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for PrimaryKey {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<&str> for PrimaryKey {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for PrimaryKey {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

/// Identity of the node instance owning a key, breaks ties between equal
/// primary keys.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UniqId {
    /// Id of the peer hosting the node.
    pub peer: String,
    /// Per peer instance counter.
    pub seq: u64,
}

impl UniqId {
    pub fn new(peer: impl Into<String>, seq: u64) -> Self {
        Self {
            peer: peer.into(),
            seq,
        }
    }
}

impl fmt::Display for UniqId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.peer, self.seq)
    }
}

/// Key of a list member. Immutable.
///
/// Order: primary key, uniq id, then list id. The list id only takes part so
/// that `Ord` stays consistent with `Eq`, keys of one list never differ in it.
/// `app_data` never takes part in comparison.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DdllKey {
    primary: PrimaryKey,
    uniq: UniqId,
    id: String,
    app_data: Option<Vec<u8>>,
}

/// The part of a [DdllKey] that ignores list identity, usable as a map key
/// when looking a node up across lists.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyIdent {
    /// Primary key.
    pub primary: PrimaryKey,
    /// Uniq id.
    pub uniq: UniqId,
}

impl DdllKey {
    pub fn new(primary: impl Into<PrimaryKey>, uniq: UniqId, id: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            uniq,
            id: id.into(),
            app_data: None,
        }
    }

    /// Attach an opaque payload, such as a membership vector.
    pub fn with_app_data(mut self, data: Vec<u8>) -> Self {
        self.app_data = Some(data);
        self
    }

    pub fn primary(&self) -> &PrimaryKey {
        &self.primary
    }

    pub fn uniq(&self) -> &UniqId {
        &self.uniq
    }

    /// The list this key belongs to.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn app_data(&self) -> Option<&[u8]> {
        self.app_data.as_deref()
    }

    /// Identity without the list id.
    pub fn ident(&self) -> KeyIdent {
        KeyIdent {
            primary: self.primary.clone(),
            uniq: self.uniq.clone(),
        }
    }
}

impl fmt::Display for DdllKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})@{}", self.primary, self.uniq, self.id)
    }
}

impl PartialEq for DdllKey {
    fn eq(&self, other: &Self) -> bool {
        self.primary == other.primary && self.uniq == other.uniq && self.id == other.id
    }
}

impl Eq for DdllKey {}

impl Hash for DdllKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.primary.hash(state);
        self.uniq.hash(state);
        self.id.hash(state);
    }
}

impl PartialOrd for DdllKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DdllKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.primary
            .cmp(&other.primary)
            .then_with(|| self.uniq.cmp(&other.uniq))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Test `b` in `[a, c]` walking clockwise from `a`.
/// When `a == c` the range is the whole ring.
pub fn is_ordered<T: Ord>(a: &T, b: &T, c: &T) -> bool {
    match a.cmp(c) {
        Ordering::Less => a <= b && b <= c,
        Ordering::Greater => a <= b || b <= c,
        Ordering::Equal => true,
    }
}

/// Test `b` in `(a, c)` walking clockwise from `a`.
/// When `a == c` every value but `a` is inside.
pub fn is_between<T: Ord>(a: &T, b: &T, c: &T) -> bool {
    match a.cmp(c) {
        Ordering::Less => a < b && b < c,
        Ordering::Greater => a < b || b < c,
        Ordering::Equal => b != a,
    }
}

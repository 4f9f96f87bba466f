#![warn(missing_docs)]
//! This module defines the DDLL protocol messages.
//! `SetR` is answered by exactly one of `SetRAck`/`SetRNak`, `Ping` by `Pong`.
//! `SetL` and `PropagateNeighbors` are one-way.

use serde::Deserialize;
use serde::Serialize;

use crate::ddll::DdllKey;
use crate::ddll::Link;
use crate::ddll::LinkNum;

/// Kind of a [SetR] request.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub enum SetRKind {
    /// Insertion or deletion of a member.
    Normal,
    /// Relink around a failed member.
    Repair {
        /// Members the requester believes to have failed.
        suspected: Vec<Link>,
    },
}

/// Ask the receiver to replace its right link `r_cur` with `r_new`.
/// An insertion has `r_new` equal to the requester, a deletion has `r_cur`
/// equal to the requester.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SetR {
    /// Request number, echoed by the reply.
    pub req: u64,
    /// The new right link.
    pub r_new: Link,
    /// The right link the requester expects the receiver to hold.
    pub r_cur: Link,
    /// Lower bound of the number of the new link.
    pub r_new_seq: LinkNum,
    /// Kind of request.
    pub kind: SetRKind,
}

/// Positive answer of [SetR].
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SetRAck {
    /// Request number of the [SetR].
    pub req: u64,
    /// Number of the new link.
    pub new_seq: LinkNum,
    /// Neighbor set computed for the requester, empty for a deletion.
    pub neighbors: Vec<Link>,
}

/// Negative answer of [SetR], with hints for a retry.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SetRNak {
    /// Request number of the [SetR].
    pub req: u64,
    /// Suggested predecessor.
    pub hint_pred: Link,
    /// Suggested successor.
    pub hint_succ: Link,
}

/// Tell the receiver its left link is now `l_new`.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SetL {
    /// The new left link.
    pub l_new: Link,
    /// Number of the new link.
    pub new_seq: LinkNum,
    /// Neighbor set for the receiver, `l_new` excluded.
    pub neighbors: Vec<Link>,
}

/// A neighbor set diffusing rightward.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PropagateNeighbors {
    /// The member where this diffusion started.
    pub src: Link,
    /// Neighbor set for the receiver.
    pub neighbors: Vec<Link>,
    /// Diffusion stops before reaching this key.
    pub limit: DdllKey,
}

/// Liveness probe.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct Ping {
    /// Echoed by [Pong].
    pub nonce: u64,
}

/// Answer of [Ping], with the responder's right link so the prober can
/// catch up with a `SetL` it missed.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Pong {
    /// Nonce of the [Ping].
    pub nonce: u64,
    /// Right link of the responder.
    pub succ: Link,
    /// Number of that link.
    pub rseq: LinkNum,
}

/// A collection MessageType use for unified management.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[non_exhaustive]
pub enum Message {
    /// Change a right link.
    SetR(SetR),
    /// Accepted SetR.
    SetRAck(SetRAck),
    /// Refused SetR.
    SetRNak(SetRNak),
    /// Change a left link.
    SetL(SetL),
    /// Neighbor set diffusion.
    PropagateNeighbors(PropagateNeighbors),
    /// Liveness probe.
    Ping(Ping),
    /// Response of Ping.
    Pong(Pong),
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Message {
    /// Short name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::SetR(_) => "SetR",
            Message::SetRAck(_) => "SetRAck",
            Message::SetRNak(_) => "SetRNak",
            Message::SetL(_) => "SetL",
            Message::PropagateNeighbors(_) => "PropagateNeighbors",
            Message::Ping(_) => "Ping",
            Message::Pong(_) => "Pong",
        }
    }
}

//! Implementation of the Distributed Doubly-Linked List.
//!
//! Members of a list form a ring sorted by [DdllKey]. A member changes its
//! neighbors' links only by messages: a right link changes through the
//! `SetR` handshake at the left member, a left link through `SetL`. Both are
//! fenced, so out of order or duplicated delivery is refused and never
//! reordered.

pub mod key;
pub mod link;
pub mod link_num;
pub mod neighbors;
pub(crate) mod node;

pub use key::is_between;
pub use key::is_ordered;
pub use key::DdllKey;
pub use key::KeyIdent;
pub use key::PrimaryKey;
pub use key::UniqId;
pub use link::Endpoint;
pub use link::Link;
pub use link_num::LinkNum;
pub use neighbors::NeighborSet;
pub use node::Mode;
pub use node::Node;
pub use node::NodeAction;
pub use node::Timer;

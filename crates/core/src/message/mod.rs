//! Protocol messages and their handlers.
mod payload;
pub use payload::MessagePayload;

pub mod types;
pub use types::*;

pub mod handlers;
pub use handlers::HandleMsg;

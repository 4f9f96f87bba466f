#![doc = include_str!("../README.md")]
pub mod error;
pub mod logging;
pub mod native;
pub mod sim;

#[cfg(test)]
mod tests;

pub use error::Error;
pub use error::Result;

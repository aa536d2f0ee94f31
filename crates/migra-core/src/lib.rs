pub mod adapter;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod io;
pub mod paths;
pub mod state;
pub mod tenant;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{MigraError, Result};

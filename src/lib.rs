//! # respool
//!
//! The transport core of a Redis client: a bounded connection pool, the
//! RESP2 wire codec, reply coercion into native types, and a struct
//! marshaller for hash commands.
//!
//! ## Features
//!
//! - `test-utils` - exposes [`testing::MockServer`] for integration tests
//!
//! ## Example
//!
//! ```no_run
//! use respool::{Client, Cmd};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::open("redis://localhost:6379")?;
//!     let _ = client.ping().await?;
//!     let hits = client.int64(&Cmd::new("INCR").arg("hits")).await?;
//!     println!("hits = {}", hits);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod core;
pub mod marshal;
pub mod proto;

#[cfg(test)]
mod stress;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export high-level client types for convenience
pub use crate::core::builder::ClientBuilder;
pub use crate::core::command::Cmd;
pub use crate::core::pool::{Pool, PoolConfig, PoolStats, PooledConnection};
pub use crate::core::{Client, Error, Result};
pub use crate::marshal::{Flatten, RedisFields};
pub use crate::proto::arg::Arg;
pub use crate::proto::frame::Frame;

//! RESP (Redis Serialization Protocol) wire layer.
//!
//! ## Modules
//!
//! - [`arg`] - Command argument values
//! - [`codec`] - Encoder and decoder for the protocol
//! - [`error`] - Error types shared by the whole crate
//! - [`frame`] - Raw reply shapes

pub mod arg;
/// RESP encoder and decoder.
pub mod codec;
/// Error types.
pub mod error;
/// Raw reply frames.
pub mod frame;

//! RESP protocol encoder and decoder.
//!
//! This module provides encoding of requests and decoding of replies for the
//! Redis Serialization Protocol (RESP2).
//!
//! # Modules
//!
//! - [`encoder`] - Command and frame encoding to bytes
//! - [`decoder`] - Streaming frame decoder from bytes

/// Incremental frame decoder.
pub mod decoder;
/// Command and frame encoder.
pub mod encoder;

pub use decoder::Decoder;
pub use encoder::{encode_command, Encoder};

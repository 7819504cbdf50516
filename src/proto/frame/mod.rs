//! RESP frame types.
//!
//! This module defines the raw reply shapes of the Redis protocol:
//! status, error, integer, bulk (possibly nil) and array replies.

/// Frame type definitions.
pub mod types;

pub use types::Frame;

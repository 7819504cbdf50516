//! Struct marshalling for hash commands.
//!
//! A struct opts in with [`redis_fields!`](crate::redis_fields), which
//! generates a [`FieldTable`] of getter/setter pairs keyed by wire tag. The
//! table is built once per type and cached by `TypeId`.
//!
//! - [`flatten()`] turns a struct or map into `tag, value, ...` arguments
//!   for `HMSET`.
//! - [`scan_pairs`] and [`scan_fields`] fill a struct from `HGETALL` and
//!   `HMGET` replies.

/// Flattening into `key, value, ...` arguments.
pub mod flatten;
/// Filling structs from hash replies.
pub mod scan;
/// Per-type field tables and the `redis_fields!` macro.
pub mod table;
/// Leaf field value conversions.
pub mod value;

pub use flatten::{flatten, flatten_fields, Flatten};
pub use scan::{scan_fields, scan_pairs, scan_struct};
pub use table::{cached_table, FieldBinding, FieldTable, RedisFields};
pub use value::FieldValue;

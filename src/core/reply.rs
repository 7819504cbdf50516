//! Coercion of raw replies into native values.
//!
//! Every function takes the `Result<Frame>` straight from a send, so
//! transport errors pass through untouched. A top-level error reply always
//! becomes [`Error::Server`]. A top-level nil becomes [`Error::Nil`] for
//! scalar and collection targets alike, while nil *elements* inside an array
//! become the empty string.
//!
//! ```
//! use respool::core::reply;
//! use respool::proto::frame::Frame;
//!
//! assert_eq!(reply::int64(Ok(Frame::bulk("42"))).unwrap(), 42);
//! assert!(reply::string(Ok(Frame::Bulk(None))).unwrap_err().is_nil());
//! assert_eq!(
//!     reply::strings(Ok(Frame::Array(vec![Frame::bulk("a"), Frame::Bulk(None)]))).unwrap(),
//!     vec!["a".to_string(), String::new()]
//! );
//! ```

use std::collections::HashMap;
use std::str::FromStr;

use bytes::Bytes;

use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

/// Maps the shapes no target accepts: error replies, nils, and anything
/// else that fell through.
fn mismatch(frame: Frame, target: &str) -> Error {
    match frame {
        Frame::Error(message) => Error::Server { message },
        frame if frame.is_nil() => Error::Nil,
        frame => Error::unexpected(format!("cannot convert {} reply to {}", frame.kind(), target)),
    }
}

fn utf8(data: &[u8], target: &str) -> Result<String> {
    String::from_utf8(data.to_vec())
        .map_err(|_| Error::unexpected(format!("{} reply is not valid UTF-8", target)))
}

fn parse_text<T>(data: &[u8], target: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let text = std::str::from_utf8(data)
        .map_err(|_| Error::unexpected(format!("{} reply is not valid UTF-8", target)))?;
    text.parse()
        .map_err(|e| Error::unexpected(format!("cannot parse {:?} as {}: {}", text, target, e)))
}

/// Parses the boolean spellings Redis commands and callers use.
pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}

/// Integer replies pass through; bulk replies are parsed as decimal text.
pub fn int64(reply: Result<Frame>) -> Result<i64> {
    match reply? {
        Frame::Integer(n) => Ok(n),
        Frame::Bulk(Some(data)) => parse_text(&data, "int64"),
        frame => Err(mismatch(frame, "int64")),
    }
}

/// Integer replies are widened; bulk replies are parsed (`inf` accepted).
pub fn float64(reply: Result<Frame>) -> Result<f64> {
    match reply? {
        Frame::Integer(n) => Ok(n as f64),
        Frame::Bulk(Some(data)) => parse_text(&data, "float64"),
        frame => Err(mismatch(frame, "float64")),
    }
}

/// Bulk and status replies as text; integers in decimal.
pub fn string(reply: Result<Frame>) -> Result<String> {
    match reply? {
        Frame::Bulk(Some(data)) => utf8(&data, "string"),
        Frame::Status(text) => Ok(text),
        Frame::Integer(n) => Ok(n.to_string()),
        frame => Err(mismatch(frame, "string")),
    }
}

/// Raw payload of a bulk reply. Status and integer replies yield their text.
pub fn bytes(reply: Result<Frame>) -> Result<Bytes> {
    match reply? {
        Frame::Bulk(Some(data)) => Ok(data),
        Frame::Status(text) => Ok(Bytes::from(text)),
        Frame::Integer(n) => Ok(Bytes::from(n.to_string())),
        frame => Err(mismatch(frame, "bytes")),
    }
}

/// Integers are true when non-zero; bulk replies accept `1`, `0`, `t`, `f`,
/// `true` and `false` in any case.
///
/// Status replies are rejected. Use [`status_ok`] for commands that answer
/// `+OK` or nil.
pub fn boolean(reply: Result<Frame>) -> Result<bool> {
    match reply? {
        Frame::Integer(n) => Ok(n != 0),
        Frame::Bulk(Some(data)) => {
            let text = utf8(&data, "bool")?;
            parse_bool(&text)
                .ok_or_else(|| Error::unexpected(format!("cannot parse {:?} as bool", text)))
        }
        frame => Err(mismatch(frame, "bool")),
    }
}

/// For `SET .. NX`-style commands: `+OK` is true, nil is false.
/// Integer replies count as true when non-zero.
pub fn status_ok(reply: Result<Frame>) -> Result<bool> {
    match reply? {
        Frame::Status(text) => Ok(text == "OK"),
        Frame::Integer(n) => Ok(n != 0),
        frame if frame.is_nil() => Ok(false),
        frame => Err(mismatch(frame, "status")),
    }
}

fn element_string(frame: Frame) -> Result<String> {
    match frame {
        Frame::Bulk(Some(data)) => utf8(&data, "string"),
        Frame::Bulk(None) | Frame::Null => Ok(String::new()),
        Frame::Status(text) => Ok(text),
        Frame::Integer(n) => Ok(n.to_string()),
        Frame::Error(message) => Err(Error::Server { message }),
        frame @ Frame::Array(_) => Err(Error::unexpected(format!(
            "cannot convert nested {} to string",
            frame.kind()
        ))),
    }
}

/// Each array element as a string; nil elements become `""`.
pub fn strings(reply: Result<Frame>) -> Result<Vec<String>> {
    match reply? {
        Frame::Array(items) => items.into_iter().map(element_string).collect(),
        frame => Err(mismatch(frame, "strings")),
    }
}

/// An array of alternating keys and values as a map. Nil values become `""`.
///
/// # Errors
///
/// [`Error::UnexpectedReply`] when the array has an odd number of elements.
pub fn string_map(reply: Result<Frame>) -> Result<HashMap<String, String>> {
    let items = match reply? {
        Frame::Array(items) => items,
        frame => return Err(mismatch(frame, "string map")),
    };
    if items.len() % 2 != 0 {
        return Err(Error::unexpected(format!(
            "string map reply has odd number of elements ({})",
            items.len()
        )));
    }

    let mut map = HashMap::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        map.insert(element_string(key)?, element_string(value)?);
    }
    Ok(map)
}

/// Array elements as raw frames. Nil is empty; any other scalar is a
/// one-element list.
pub fn values(reply: Result<Frame>) -> Result<Vec<Frame>> {
    match reply? {
        Frame::Array(items) => Ok(items),
        Frame::Error(message) => Err(Error::Server { message }),
        frame if frame.is_nil() => Ok(Vec::new()),
        frame => Ok(vec![frame]),
    }
}

/// Turns the nil sentinel into `None`.
///
/// ```
/// use respool::core::reply::{self, optional};
/// use respool::proto::frame::Frame;
///
/// assert_eq!(optional(reply::string(Ok(Frame::Bulk(None)))).unwrap(), None);
/// ```
pub fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::Nil) => Ok(None),
        Err(e) => Err(e),
    }
}

use std::fmt;

use bytes::Bytes;

/// A raw RESP reply as produced by the decoder.
///
/// Every typed value handed to callers is derived from one of these:
/// - Status: single-line status text such as `OK`
/// - Error: single-line error text sent by the server
/// - Integer: signed 64-bit integer
/// - Bulk: length-prefixed binary payload, `None` for the nil bulk (`$-1`)
/// - Array: ordered replies, nested to any depth
/// - Null: the nil array (`*-1`)
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Status reply (+OK).
    Status(String),
    /// Error reply (-ERR).
    Error(String),
    /// Integer reply (:1000).
    Integer(i64),
    /// Bulk string ($6\r\nfoobar), `None` for `$-1`.
    Bulk(Option<Bytes>),
    /// Array (*2\r\n...).
    Array(Vec<Frame>),
    /// Nil array (*-1).
    Null,
}

impl Frame {
    /// Builds a present bulk frame.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::Bulk(Some(data.into()))
    }

    /// Builds a status frame.
    pub fn status(text: impl Into<String>) -> Self {
        Frame::Status(text.into())
    }

    /// Returns true for the nil bulk and the nil array.
    pub fn is_nil(&self) -> bool {
        matches!(self, Frame::Bulk(None) | Frame::Null)
    }

    /// Short name of the reply shape, used in coercion error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Status(_) => "status",
            Frame::Error(_) => "error",
            Frame::Integer(_) => "integer",
            Frame::Bulk(Some(_)) => "bulk",
            Frame::Bulk(None) => "nil bulk",
            Frame::Array(_) => "array",
            Frame::Null => "nil array",
        }
    }
}

impl PartialEq<&str> for Frame {
    fn eq(&self, other: &&str) -> bool {
        match self {
            Frame::Status(s) => s == other,
            Frame::Bulk(Some(b)) => b.as_ref() == other.as_bytes(),
            _ => false,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Status(s) => s.fmt(f),
            Frame::Error(msg) => write!(f, "(error) {}", msg),
            Frame::Integer(n) => write!(f, "(integer) {}", n),
            Frame::Bulk(Some(b)) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "{:?}", b),
            },
            Frame::Bulk(None) | Frame::Null => "(nil)".fmt(f),
            Frame::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt(f)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_display() {
        assert_eq!(Frame::status("OK").to_string(), "OK");
        assert_eq!(Frame::Integer(42).to_string(), "(integer) 42");
        assert_eq!(Frame::Bulk(None).to_string(), "(nil)");
        assert_eq!(Frame::Null.to_string(), "(nil)");
        assert_eq!(
            Frame::Error("ERR boom".to_string()).to_string(),
            "(error) ERR boom"
        );
    }

    #[test]
    fn test_frame_array_display() {
        let frame = Frame::Array(vec![
            Frame::Integer(1),
            Frame::bulk("test"),
            Frame::Array(vec![Frame::Bulk(None)]),
        ]);
        assert_eq!(frame.to_string(), "[(integer) 1, \"test\", [(nil)]]");
    }

    #[test]
    fn test_frame_is_nil() {
        assert!(Frame::Null.is_nil());
        assert!(Frame::Bulk(None).is_nil());
        assert!(!Frame::bulk("").is_nil());
        assert!(!Frame::Integer(0).is_nil());
    }

    #[test]
    fn test_frame_eq_str() {
        assert_eq!(Frame::status("OK"), "OK");
        assert_eq!(Frame::bulk("hello"), "hello");
        assert_ne!(Frame::Integer(1), "1");
    }

    #[test]
    fn test_frame_kind() {
        assert_eq!(Frame::Bulk(None).kind(), "nil bulk");
        assert_eq!(Frame::Array(vec![]).kind(), "array");
    }
}

//! Command arguments.
//!
//! [`Arg`] is the closed set of values that can travel in a request. Every
//! variant has a single textual or binary wire form; anything else (booleans,
//! nested collections) has no `From` conversion and is rejected at compile
//! time.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// A single positional command argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// UTF-8 text.
    Text(String),
    /// Signed integer, sent as decimal text.
    Int(i64),
    /// Floating point number, sent as its shortest round-trip decimal text.
    Float(f64),
    /// Arbitrary binary payload, sent verbatim.
    Bytes(Bytes),
}

impl Arg {
    /// Length of the wire form in bytes.
    pub fn wire_len(&self) -> usize {
        match self {
            Arg::Text(s) => s.len(),
            Arg::Bytes(b) => b.len(),
            Arg::Int(n) => n.to_string().len(),
            Arg::Float(f) => format_float(*f).len(),
        }
    }

    /// Appends the wire form (without any framing) to `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) {
        match self {
            Arg::Text(s) => buf.put_slice(s.as_bytes()),
            Arg::Bytes(b) => buf.put_slice(b),
            Arg::Int(n) => buf.put_slice(n.to_string().as_bytes()),
            Arg::Float(f) => buf.put_slice(format_float(*f).as_bytes()),
        }
    }

    /// Returns the wire form as an owned buffer.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Arg::Bytes(b) => b.clone(),
            other => {
                let mut buf = BytesMut::with_capacity(other.wire_len());
                other.write_to(&mut buf);
                buf.freeze()
            }
        }
    }
}

/// Formats a float the way Redis parses it back (`inf`, `-inf` for infinities).
pub(crate) fn format_float(value: f64) -> String {
    if value.is_infinite() {
        if value.is_sign_positive() {
            "inf".to_string()
        } else {
            "-inf".to_string()
        }
    } else {
        value.to_string()
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Text(s) => s.fmt(f),
            Arg::Int(n) => n.fmt(f),
            Arg::Float(v) => format_float(*v).fmt(f),
            Arg::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Text(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Text(value)
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Arg::Text(value.clone())
    }
}

impl From<Bytes> for Arg {
    fn from(value: Bytes) -> Self {
        Arg::Bytes(value)
    }
}

impl From<&Bytes> for Arg {
    fn from(value: &Bytes) -> Self {
        Arg::Bytes(value.clone())
    }
}

impl From<Vec<u8>> for Arg {
    fn from(value: Vec<u8>) -> Self {
        Arg::Bytes(Bytes::from(value))
    }
}

impl From<&[u8]> for Arg {
    fn from(value: &[u8]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(value))
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

impl From<f32> for Arg {
    fn from(value: f32) -> Self {
        Arg::Float(f64::from(value))
    }
}

macro_rules! int_arg {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Int(i64::from(value))
                }
            }
        )*
    };
}

int_arg!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! wide_int_arg {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    match i64::try_from(value) {
                        Ok(n) => Arg::Int(n),
                        Err(_) => Arg::Text(value.to_string()),
                    }
                }
            }
        )*
    };
}

wide_int_arg!(u64, usize, isize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_wire_forms() {
        assert_eq!(Arg::from("key").to_bytes(), Bytes::from("key"));
        assert_eq!(Arg::from(-42i64).to_bytes(), Bytes::from("-42"));
        assert_eq!(Arg::from(2.5f64).to_bytes(), Bytes::from("2.5"));
        assert_eq!(Arg::from(3.0f64).to_bytes(), Bytes::from("3"));
        assert_eq!(Arg::from(f64::INFINITY).to_bytes(), Bytes::from("inf"));
        assert_eq!(Arg::from(f64::NEG_INFINITY).to_bytes(), Bytes::from("-inf"));
        assert_eq!(
            Arg::from(vec![0u8, 255, b'\r', b'\n']).to_bytes(),
            Bytes::from_static(&[0, 255, b'\r', b'\n'])
        );
    }

    #[test]
    fn test_wide_integers_fall_back_to_text() {
        assert_eq!(Arg::from(7u64), Arg::Int(7));
        assert_eq!(
            Arg::from(u64::MAX),
            Arg::Text("18446744073709551615".to_string())
        );
    }

    #[test]
    fn test_wire_len_matches_bytes() {
        for arg in [
            Arg::from("hello"),
            Arg::from(123456i64),
            Arg::from(0.125f64),
            Arg::from(Bytes::from_static(b"\x00\x01")),
        ] {
            assert_eq!(arg.wire_len(), arg.to_bytes().len());
        }
    }
}

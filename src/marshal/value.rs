use bytes::Bytes;

use crate::core::reply::parse_bool;
use crate::proto::arg::Arg;

/// A leaf value that can live in a hash field.
///
/// `to_arg` gives the wire form used when flattening; `None` means the field
/// is left out of the command. `from_wire` parses a present (non-nil) bulk
/// payload and reports failures as plain text, which the scanner attaches to
/// the field name.
pub trait FieldValue: Sized {
    /// Wire form of the value, or `None` to skip the field.
    fn to_arg(&self) -> Option<Arg>;

    /// Parses the raw payload of a field.
    fn from_wire(raw: &[u8]) -> Result<Self, String>;
}

fn text(raw: &[u8]) -> Result<&str, String> {
    std::str::from_utf8(raw).map_err(|e| e.to_string())
}

impl FieldValue for String {
    fn to_arg(&self) -> Option<Arg> {
        Some(Arg::Text(self.clone()))
    }

    fn from_wire(raw: &[u8]) -> Result<Self, String> {
        text(raw).map(str::to_string)
    }
}

macro_rules! parsed_field_value {
    ($($ty:ty),*) => {
        $(
            impl FieldValue for $ty {
                fn to_arg(&self) -> Option<Arg> {
                    Some(Arg::from(*self))
                }

                fn from_wire(raw: &[u8]) -> Result<Self, String> {
                    let text = text(raw)?;
                    text.parse::<$ty>()
                        .map_err(|e| format!("cannot parse {:?}: {}", text, e))
                }
            }
        )*
    };
}

parsed_field_value!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl FieldValue for bool {
    fn to_arg(&self) -> Option<Arg> {
        Some(Arg::Int(i64::from(*self)))
    }

    fn from_wire(raw: &[u8]) -> Result<Self, String> {
        let text = text(raw)?;
        parse_bool(text).ok_or_else(|| format!("cannot parse {:?} as bool", text))
    }
}

impl FieldValue for Bytes {
    fn to_arg(&self) -> Option<Arg> {
        Some(Arg::Bytes(self.clone()))
    }

    fn from_wire(raw: &[u8]) -> Result<Self, String> {
        Ok(Bytes::copy_from_slice(raw))
    }
}

impl FieldValue for Vec<u8> {
    fn to_arg(&self) -> Option<Arg> {
        Some(Arg::Bytes(Bytes::copy_from_slice(self)))
    }

    fn from_wire(raw: &[u8]) -> Result<Self, String> {
        Ok(raw.to_vec())
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn to_arg(&self) -> Option<Arg> {
        self.as_ref().and_then(T::to_arg)
    }

    fn from_wire(raw: &[u8]) -> Result<Self, String> {
        T::from_wire(raw).map(Some)
    }
}

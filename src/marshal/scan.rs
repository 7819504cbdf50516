use bytes::Bytes;

use crate::marshal::table::{FieldTable, RedisFields};
use crate::proto::error::{Error, FieldError, Result};
use crate::proto::frame::Frame;

/// Payload of one reply element. `Ok(None)` is a nil.
fn element_payload(frame: &Frame) -> Result<Option<Bytes>> {
    match frame {
        Frame::Bulk(Some(data)) => Ok(Some(data.clone())),
        Frame::Bulk(None) | Frame::Null => Ok(None),
        Frame::Status(text) => Ok(Some(Bytes::from(text.clone()))),
        Frame::Integer(n) => Ok(Some(Bytes::from(n.to_string()))),
        Frame::Error(message) => Err(Error::Server {
            message: message.clone(),
        }),
        Frame::Array(_) => Err(Error::unexpected("nested array in field reply")),
    }
}

fn assign<T>(
    table: &FieldTable<T>,
    name: &[u8],
    value: &Frame,
    dest: &mut T,
    errors: &mut Vec<FieldError>,
) -> Result<()> {
    let Ok(name) = std::str::from_utf8(name) else {
        return Ok(());
    };
    let Some(binding) = table.get(name) else {
        return Ok(());
    };
    if let Some(raw) = element_payload(value)? {
        if let Err(message) = (binding.set)(dest, &raw) {
            errors.push(FieldError {
                field: binding.tag.to_string(),
                message,
            });
        }
    }
    Ok(())
}

fn finish(errors: Vec<FieldError>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Scan { errors })
    }
}

/// Fills `dest` from alternating name/value elements, as returned by
/// `HGETALL`.
///
/// Unknown names are ignored and nil values leave the field at its current
/// value. Conversion failures do not stop the scan; they are collected and
/// reported together as [`Error::Scan`].
///
/// # Errors
///
/// - [`Error::Nil`] when `values` is empty
/// - [`Error::UnexpectedReply`] when `values` has an odd length
/// - [`Error::Server`] when an element is an error reply
pub fn scan_pairs<T: RedisFields>(values: &[Frame], dest: &mut T) -> Result<()> {
    if values.is_empty() {
        return Err(Error::Nil);
    }
    if values.len() % 2 != 0 {
        return Err(Error::unexpected(format!(
            "expected name/value pairs, got {} elements",
            values.len()
        )));
    }

    let table = T::field_table();
    let mut errors = Vec::new();
    for pair in values.chunks_exact(2) {
        let Some(name) = element_payload(&pair[0])? else {
            continue;
        };
        assign(table, &name, &pair[1], dest, &mut errors)?;
    }
    finish(errors)
}

/// Fills `dest` from values aligned with `names`, as returned by `HMGET`.
///
/// Same rules as [`scan_pairs`]; the lengths of `values` and `names` must
/// match.
pub fn scan_fields<T, N>(values: &[Frame], names: &[N], dest: &mut T) -> Result<()>
where
    T: RedisFields,
    N: AsRef<str>,
{
    if values.is_empty() {
        return Err(Error::Nil);
    }
    if values.len() != names.len() {
        return Err(Error::unexpected(format!(
            "got {} values for {} fields",
            values.len(),
            names.len()
        )));
    }

    let table = T::field_table();
    let mut errors = Vec::new();
    for (name, value) in names.iter().zip(values) {
        assign(table, name.as_ref().as_bytes(), value, dest, &mut errors)?;
    }
    finish(errors)
}

/// Builds a `T` from an `HGETALL`-style reply.
pub fn scan_struct<T: RedisFields>(reply: Result<Frame>) -> Result<T> {
    let values = crate::core::reply::values(reply)?;
    let mut dest = T::default();
    scan_pairs(&values, &mut dest)?;
    Ok(dest)
}

use bytes::{BufMut, Bytes, BytesMut};

use crate::proto::arg::Arg;
use crate::proto::frame::Frame;

/// A RESP encoder that turns commands and [`Frame`]s into bytes.
///
/// The encoder accumulates data in an internal buffer and can be used
/// to encode several commands back to back.
///
/// # Example
///
/// ```
/// use respool::proto::arg::Arg;
/// use respool::proto::codec::Encoder;
///
/// let mut encoder = Encoder::new();
/// encoder.encode_command("SET", &[Arg::from("k"), Arg::from("v")]);
/// assert_eq!(&encoder.take()[..], b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
/// ```
#[derive(Debug)]
pub struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    /// Creates a new encoder with an empty buffer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Encodes a request: an array of bulk strings, verb first.
    ///
    /// # Arguments
    ///
    /// * `name` - The command verb (e.g. `HMSET`)
    /// * `args` - Positional arguments, written in the given order
    pub fn encode_command(&mut self, name: &str, args: &[Arg]) {
        self.put_header(b'*', (args.len() + 1) as i64);
        self.put_bulk(name.as_bytes());
        for arg in args {
            self.put_header(b'$', arg.wire_len() as i64);
            arg.write_to(&mut self.buf);
            self.buf.put_slice(b"\r\n");
        }
    }

    /// Encodes a frame into the internal buffer.
    ///
    /// This is the reply direction of the protocol; clients only ever send
    /// arrays of bulk strings, see [`encode_command`](Encoder::encode_command).
    pub fn encode(&mut self, frame: &Frame) {
        match frame {
            Frame::Status(s) => {
                self.buf.put_u8(b'+');
                self.buf.put_slice(s.as_bytes());
                self.buf.put_slice(b"\r\n");
            }
            Frame::Error(e) => {
                self.buf.put_u8(b'-');
                self.buf.put_slice(e.as_bytes());
                self.buf.put_slice(b"\r\n");
            }
            Frame::Integer(n) => self.put_header(b':', *n),
            Frame::Bulk(Some(data)) => self.put_bulk(data),
            Frame::Bulk(None) => self.put_header(b'$', -1),
            Frame::Array(items) => {
                self.put_header(b'*', items.len() as i64);
                for item in items {
                    self.encode(item);
                }
            }
            Frame::Null => self.put_header(b'*', -1),
        }
    }

    /// Takes the encoded data from the buffer, leaving it empty.
    pub fn take(&mut self) -> BytesMut {
        self.buf.split()
    }

    fn put_header(&mut self, marker: u8, n: i64) {
        self.buf.put_u8(marker);
        self.buf.put_slice(n.to_string().as_bytes());
        self.buf.put_slice(b"\r\n");
    }

    fn put_bulk(&mut self, data: &[u8]) {
        self.put_header(b'$', data.len() as i64);
        self.buf.put_slice(data);
        self.buf.put_slice(b"\r\n");
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes a single command into a standalone buffer.
pub fn encode_command(name: &str, args: &[Arg]) -> Bytes {
    let mut encoder = Encoder::new();
    encoder.encode_command(name, args);
    encoder.take().freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_command_set() {
        let data = encode_command("SET", &[Arg::from("k"), Arg::from("v")]);
        assert_eq!(&data[..], b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
    }

    #[test]
    fn test_encode_command_no_args() {
        let data = encode_command("PING", &[]);
        assert_eq!(&data[..], b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn test_encode_command_mixed_args_in_order() {
        let data = encode_command(
            "HINCRBYFLOAT",
            &[Arg::from("h"), Arg::from(10i64), Arg::from(2.5f64)],
        );
        assert_eq!(
            &data[..],
            b"*4\r\n$12\r\nHINCRBYFLOAT\r\n$1\r\nh\r\n$2\r\n10\r\n$3\r\n2.5\r\n"
        );
    }

    #[test]
    fn test_encode_command_binary_payload() {
        let payload = Bytes::from_static(b"a\r\n$3\r\nb");
        let data = encode_command("SET", &[Arg::from("k"), Arg::from(payload)]);
        assert_eq!(&data[..], b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$8\r\na\r\n$3\r\nb\r\n");
    }

    #[test]
    fn test_encode_command_repeated_args_kept() {
        let data = encode_command("SADD", &[Arg::from("s"), Arg::from("x"), Arg::from("x")]);
        assert_eq!(
            &data[..],
            b"*4\r\n$4\r\nSADD\r\n$1\r\ns\r\n$1\r\nx\r\n$1\r\nx\r\n"
        );
    }

    #[test]
    fn test_encode_status() {
        let mut encoder = Encoder::new();
        encoder.encode(&Frame::status("OK"));
        assert_eq!(&encoder.take()[..], b"+OK\r\n");
    }

    #[test]
    fn test_encode_error() {
        let mut encoder = Encoder::new();
        encoder.encode(&Frame::Error("ERR".to_string()));
        assert_eq!(&encoder.take()[..], b"-ERR\r\n");
    }

    #[test]
    fn test_encode_integer() {
        let mut encoder = Encoder::new();
        encoder.encode(&Frame::Integer(-42));
        assert_eq!(&encoder.take()[..], b":-42\r\n");
    }

    #[test]
    fn test_encode_bulk_nil_and_null() {
        let mut encoder = Encoder::new();
        encoder.encode(&Frame::Bulk(None));
        encoder.encode(&Frame::Null);
        assert_eq!(&encoder.take()[..], b"$-1\r\n*-1\r\n");
    }

    #[test]
    fn test_encode_nested_array() {
        let mut encoder = Encoder::new();
        encoder.encode(&Frame::Array(vec![
            Frame::bulk("foo"),
            Frame::Array(vec![Frame::Integer(1)]),
        ]));
        assert_eq!(&encoder.take()[..], b"*2\r\n$3\r\nfoo\r\n*1\r\n:1\r\n");
    }
}

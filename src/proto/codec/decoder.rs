use bytes::{Buf, Bytes, BytesMut};

use crate::proto::error::DecodeError;
use crate::proto::frame::Frame;

const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024; // 512 MB default

/// Maximum number of arrays open at once while decoding a frame.
pub const MAX_NESTING_DEPTH: usize = 1024;

/// A RESP decoder that converts bytes to [`Frame`] values.
///
/// The decoder handles streaming input. Call [`append`](Decoder::append) to
/// add data, then [`decode`](Decoder::decode) to parse frames. Nothing is
/// consumed from the buffer until a complete frame is available, so a frame
/// split across any number of reads decodes exactly once.
///
/// Progress through a partially received frame is kept between calls: the
/// elements of an unfinished array are decoded once and never re-parsed when
/// more data arrives.
///
/// # Example
///
/// ```
/// use respool::proto::codec::Decoder;
/// use respool::proto::frame::Frame;
///
/// let mut decoder = Decoder::new();
/// decoder.append(b"+OK\r\n");
/// let frame = decoder.decode().unwrap().unwrap();
/// assert_eq!(frame, Frame::Status("OK".to_string()));
/// ```
#[derive(Debug)]
pub struct Decoder {
    buf: BytesMut,
    max_frame_size: usize,
    /// Offset of the first byte not yet parsed into a frame or array header.
    pos: usize,
    /// Arrays whose headers are parsed but whose elements are still arriving.
    open: Vec<PartialArray>,
}

#[derive(Debug)]
struct PartialArray {
    remaining: usize,
    items: Vec<Frame>,
}

/// One parsed token: a finished value or the header of a non-empty array.
enum Token {
    Value(Frame),
    ArrayStart(usize),
}

impl Decoder {
    /// Creates a new decoder with an empty buffer.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates a new decoder with a custom maximum frame size.
    ///
    /// # Arguments
    ///
    /// * `max_frame_size` - Maximum size in bytes for a single frame
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            max_frame_size,
            pos: 0,
            open: Vec::new(),
        }
    }

    /// Appends raw bytes to the internal buffer.
    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Direct access to the read buffer, for reading from a socket in place.
    ///
    /// Callers may only append to it.
    pub(crate) fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Number of buffered bytes not yet consumed by a decoded frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Attempts to decode one frame from the buffer.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, and `Err(..)` if the data is
    /// malformed. After an error the buffer content is undefined and the
    /// stream must be abandoned.
    pub fn decode(&mut self) -> Result<Option<Frame>, DecodeError> {
        loop {
            let (token, next) = match self.token(self.pos)? {
                Some(parsed) => parsed,
                None => {
                    if self.buf.len() > self.max_frame_size {
                        return Err(DecodeError::invalid(
                            "buffer size exceeded maximum frame size",
                        ));
                    }
                    return Ok(None);
                }
            };
            self.pos = next;

            let mut value = match token {
                Token::ArrayStart(len) => {
                    if self.open.len() >= MAX_NESTING_DEPTH {
                        return Err(DecodeError::invalid(format!(
                            "arrays nested deeper than {} levels",
                            MAX_NESTING_DEPTH
                        )));
                    }
                    self.open.push(PartialArray {
                        remaining: len,
                        items: Vec::with_capacity(len.min(1024)),
                    });
                    continue;
                }
                Token::Value(frame) => frame,
            };

            // Fold the finished value into its parents, closing every array
            // it completes.
            loop {
                let Some(top) = self.open.last_mut() else {
                    self.buf.advance(self.pos);
                    self.pos = 0;
                    return Ok(Some(value));
                };
                top.items.push(value);
                top.remaining -= 1;
                if top.remaining > 0 {
                    break;
                }
                match self.open.pop() {
                    Some(done) => value = Frame::Array(done.items),
                    None => break,
                }
            }
        }
    }

    /// Parses one token starting at `pos`, returning it with the offset
    /// just past it, or `None` if the token is not fully buffered.
    fn token(&self, pos: usize) -> Result<Option<(Token, usize)>, DecodeError> {
        let marker = match self.buf.get(pos) {
            Some(b) => *b,
            None => return Ok(None),
        };
        let mut pos = pos + 1;

        let token = match marker {
            b'+' => self.line_text(&mut pos)?.map(|s| Token::Value(Frame::Status(s))),
            b'-' => self.line_text(&mut pos)?.map(|s| Token::Value(Frame::Error(s))),
            b':' => self.line_int(&mut pos)?.map(|n| Token::Value(Frame::Integer(n))),
            b'$' => self.parse_bulk(&mut pos)?.map(Token::Value),
            b'*' => self.parse_array_header(&mut pos)?,
            other => {
                return Err(DecodeError::invalid(format!(
                    "unknown frame type: {:?}",
                    other as char
                )))
            }
        };
        Ok(token.map(|token| (token, pos)))
    }

    fn parse_bulk(&self, pos: &mut usize) -> Result<Option<Frame>, DecodeError> {
        let len = match self.line_int(pos)? {
            Some(len) => len,
            None => return Ok(None),
        };
        if len == -1 {
            return Ok(Some(Frame::Bulk(None)));
        }
        if len < 0 {
            return Err(DecodeError::invalid(format!(
                "invalid bulk string length {}",
                len
            )));
        }

        let len = len as usize;
        if len > self.max_frame_size {
            return Err(DecodeError::invalid(
                "bulk string length exceeds maximum frame size",
            ));
        }

        let start = *pos;
        if self.buf.len() < start + len + 2 {
            return Ok(None);
        }
        if &self.buf[start + len..start + len + 2] != b"\r\n" {
            return Err(DecodeError::invalid("bulk string not terminated by CRLF"));
        }

        *pos = start + len + 2;
        let data = Bytes::copy_from_slice(&self.buf[start..start + len]);
        Ok(Some(Frame::Bulk(Some(data))))
    }

    fn parse_array_header(&self, pos: &mut usize) -> Result<Option<Token>, DecodeError> {
        let len = match self.line_int(pos)? {
            Some(len) => len,
            None => return Ok(None),
        };
        if len == -1 {
            return Ok(Some(Token::Value(Frame::Null)));
        }
        if len < 0 {
            return Err(DecodeError::invalid(format!("invalid array length {}", len)));
        }

        let len = len as usize;
        // Every element needs at least three bytes ("+\r\n").
        if len > self.max_frame_size / 3 {
            return Err(DecodeError::invalid(
                "array length exceeds maximum frame size",
            ));
        }
        if len == 0 {
            return Ok(Some(Token::Value(Frame::Array(Vec::new()))));
        }
        Ok(Some(Token::ArrayStart(len)))
    }

    fn line_text(&self, pos: &mut usize) -> Result<Option<String>, DecodeError> {
        Ok(self
            .line(pos)
            .map(|line| String::from_utf8_lossy(line).into_owned()))
    }

    fn line_int(&self, pos: &mut usize) -> Result<Option<i64>, DecodeError> {
        let line = match self.line(pos) {
            Some(line) => line,
            None => return Ok(None),
        };
        let text = std::str::from_utf8(line)
            .map_err(|_| DecodeError::invalid("integer is not valid UTF-8"))?;
        text.parse::<i64>()
            .map(Some)
            .map_err(|e| DecodeError::invalid(format!("invalid integer {:?}: {}", text, e)))
    }

    /// Returns the bytes up to the next CRLF and moves `pos` past it.
    fn line(&self, pos: &mut usize) -> Option<&[u8]> {
        let start = *pos;
        let rest = self.buf.get(start..)?;
        let end = rest.windows(2).position(|w| w == b"\r\n")?;
        *pos = start + end + 2;
        Some(&rest[..end])
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

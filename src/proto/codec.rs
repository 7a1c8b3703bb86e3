use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// A RESP encoder that converts [`Frame`] values to bytes.
///
/// Data accumulates in an internal buffer; [`take`](Encoder::take) drains it
/// so the encoder can be reused across commands.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    /// Creates a new encoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes a frame into the internal buffer.
    pub fn encode(&mut self, frame: &Frame) {
        match frame {
            Frame::SimpleString(s) => {
                self.buf.put_u8(b'+');
                self.buf.extend_from_slice(s);
                self.buf.extend_from_slice(b"\r\n");
            }
            Frame::Error(e) => {
                self.buf.put_u8(b'-');
                self.buf.extend_from_slice(e);
                self.buf.extend_from_slice(b"\r\n");
            }
            Frame::Integer(n) => {
                self.buf.put_u8(b':');
                self.buf.extend_from_slice(n.to_string().as_bytes());
                self.buf.extend_from_slice(b"\r\n");
            }
            Frame::BulkString(Some(data)) => {
                self.buf.put_u8(b'$');
                self.buf
                    .extend_from_slice(data.len().to_string().as_bytes());
                self.buf.extend_from_slice(b"\r\n");
                self.buf.extend_from_slice(data);
                self.buf.extend_from_slice(b"\r\n");
            }
            Frame::BulkString(None) | Frame::Null => {
                self.buf.extend_from_slice(b"$-1\r\n");
            }
            Frame::Array(items) => {
                self.buf.put_u8(b'*');
                self.buf
                    .extend_from_slice(items.len().to_string().as_bytes());
                self.buf.extend_from_slice(b"\r\n");
                for item in items {
                    self.encode(item);
                }
            }
        }
    }

    /// Takes the encoded bytes, leaving the buffer empty for reuse.
    pub fn take(&mut self) -> BytesMut {
        self.buf.split()
    }
}

/// An incremental RESP decoder.
///
/// Feed raw bytes with [`append`](Decoder::append), then call
/// [`decode`](Decoder::decode). A frame is consumed from the buffer only once
/// it is complete, so partially received input (including a partially
/// received element deep inside a nested array) costs nothing to retry.
#[derive(Debug)]
pub struct Decoder {
    buf: BytesMut,
    max_frame_size: usize,
}

impl Decoder {
    /// Creates a new decoder with the default frame-size limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates a new decoder with a custom maximum frame size in bytes.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Appends raw bytes received from the network.
    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Attempts to decode one frame.
    ///
    /// Returns `Ok(Some(frame))` when a complete frame was parsed,
    /// `Ok(None)` when more input is needed, and an error on malformed or
    /// oversized input.
    pub fn decode(&mut self) -> Result<Option<Frame>> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        if self.buf.len() > self.max_frame_size {
            return Err(protocol("frame exceeds maximum size"));
        }
        match self.parse(&self.buf)? {
            Some((frame, consumed)) => {
                self.buf.advance(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    fn parse(&self, input: &[u8]) -> Result<Option<(Frame, usize)>> {
        let Some(&marker) = input.first() else {
            return Ok(None);
        };
        match marker {
            b'+' | b'-' | b':' => {
                let Some(end) = find_crlf(input) else {
                    return Ok(None);
                };
                let line = &input[1..end];
                let frame = match marker {
                    b'+' => Frame::SimpleString(line.to_vec()),
                    b'-' => Frame::Error(line.to_vec()),
                    _ => Frame::Integer(parse_int(line)?),
                };
                Ok(Some((frame, end + 2)))
            }
            b'$' => {
                let Some(end) = find_crlf(input) else {
                    return Ok(None);
                };
                let len = parse_int(&input[1..end])?;
                let header = end + 2;
                if len == -1 {
                    return Ok(Some((Frame::BulkString(None), header)));
                }
                let len = usize::try_from(len)
                    .map_err(|_| protocol("negative bulk string length"))?;
                if len > self.max_frame_size {
                    return Err(protocol("bulk string exceeds maximum frame size"));
                }
                if input.len() < header + len + 2 {
                    return Ok(None);
                }
                let data = Bytes::copy_from_slice(&input[header..header + len]);
                Ok(Some((Frame::BulkString(Some(data)), header + len + 2)))
            }
            b'*' => {
                let Some(end) = find_crlf(input) else {
                    return Ok(None);
                };
                let len = parse_int(&input[1..end])?;
                let mut consumed = end + 2;
                if len == -1 {
                    return Ok(Some((Frame::Null, consumed)));
                }
                let len =
                    usize::try_from(len).map_err(|_| protocol("negative array length"))?;
                if len > self.max_frame_size / 16 {
                    return Err(protocol("array length exceeds maximum"));
                }
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    match self.parse(&input[consumed..])? {
                        Some((frame, n)) => {
                            items.push(frame);
                            consumed += n;
                        }
                        None => return Ok(None),
                    }
                }
                Ok(Some((Frame::Array(items), consumed)))
            }
            other => Err(protocol(format!("unknown frame type: {}", other as char))),
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn protocol(message: impl Into<String>) -> Error {
    Error::Protocol {
        message: message.into(),
    }
}

fn parse_int(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| protocol("malformed integer"))
}

/// Index of the `\r` of the first CRLF, or None if not yet buffered.
fn find_crlf(input: &[u8]) -> Option<usize> {
    input.windows(2).position(|w| w == b"\r\n")
}

use bytes::Bytes;

/// A RESP (REdis Serialization Protocol) frame.
///
/// This is the unit of exchange with every node: commands are encoded as
/// arrays of bulk strings, replies are any of the variants below.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Status reply such as `+OK`.
    SimpleString(Vec<u8>),
    /// Error reply; the message is classified further by the connection layer.
    Error(Vec<u8>),
    /// Numeric reply.
    Integer(i64),
    /// Binary-safe string; `None` is the null bulk string.
    BulkString(Option<Bytes>),
    /// Aggregate reply, also the encoding of outgoing commands.
    Array(Vec<Frame>),
    /// Null array reply.
    Null,
}

impl Frame {
    /// Renders the frame as text where a textual rendering exists.
    pub fn to_string_lossy(&self) -> Option<String> {
        match self {
            Frame::SimpleString(s) => Some(String::from_utf8_lossy(s).into_owned()),
            Frame::Error(e) => Some(String::from_utf8_lossy(e).into_owned()),
            Frame::Integer(i) => Some(i.to_string()),
            Frame::BulkString(b) => b.as_ref().map(|s| String::from_utf8_lossy(s).into_owned()),
            Frame::Array(_) | Frame::Null => None,
        }
    }

    /// Extracts the bulk string payload, if this is a bulk string.
    pub fn to_bulk_string(&self) -> Option<Bytes> {
        match self {
            Frame::BulkString(b) => b.clone(),
            _ => None,
        }
    }

    /// Extracts the elements, if this is an array.
    pub fn to_array(&self) -> Option<&[Frame]> {
        match self {
            Frame::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Extracts the integer value, if this is an integer reply.
    pub fn to_int(&self) -> Option<i64> {
        match self {
            Frame::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns true if this frame is a null reply (either flavor).
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null | Frame::BulkString(None))
    }
}

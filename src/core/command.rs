use bytes::Bytes;

use crate::proto::frame::Frame;

/// A single command argument.
///
/// Commands accept heterogeneous arguments: strings, raw bytes, numbers, and
/// nested sequences (e.g. a `Vec` of fields for a multi-field write). On the
/// wire everything flattens to bulk strings; the structure only matters for
/// routing-key extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// UTF-8 text argument.
    Str(String),
    /// Binary-safe argument.
    Bytes(Bytes),
    /// Integer argument, rendered in decimal.
    Int(i64),
    /// Float argument, rendered with `Display`.
    Float(f64),
    /// Ordered sequence, flattened in order.
    List(Vec<Arg>),
    /// Key/value pairs, flattened as key value key value.
    Map(Vec<(Arg, Arg)>),
}

impl Arg {
    fn flatten_into(&self, out: &mut Vec<Frame>) {
        match self {
            Arg::Str(s) => out.push(Frame::BulkString(Some(Bytes::copy_from_slice(
                s.as_bytes(),
            )))),
            Arg::Bytes(b) => out.push(Frame::BulkString(Some(b.clone()))),
            Arg::Int(i) => out.push(Frame::BulkString(Some(Bytes::from(i.to_string())))),
            Arg::Float(f) => out.push(Frame::BulkString(Some(Bytes::from(f.to_string())))),
            Arg::List(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
            Arg::Map(pairs) => {
                for (k, v) in pairs {
                    k.flatten_into(out);
                    v.flatten_into(out);
                }
            }
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<Bytes> for Arg {
    fn from(b: Bytes) -> Self {
        Arg::Bytes(b)
    }
}

impl From<&[u8]> for Arg {
    fn from(b: &[u8]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<i64> for Arg {
    fn from(i: i64) -> Self {
        Arg::Int(i)
    }
}

impl From<f64> for Arg {
    fn from(f: f64) -> Self {
        Arg::Float(f)
    }
}

impl<T: Into<Arg>> From<Vec<T>> for Arg {
    fn from(items: Vec<T>) -> Self {
        Arg::List(items.into_iter().map(Into::into).collect())
    }
}

/// A command ready to be sent to a node.
///
/// Built with the builder pattern and converted to a RESP array frame for
/// transmission. Cloneable so the cluster can re-issue it while following
/// redirects.
///
/// # Example
///
/// ```
/// use shoal::core::command::Cmd;
///
/// let cmd = Cmd::new("SET").arg("key").arg("value");
/// assert_eq!(cmd.name(), b"SET".as_slice());
/// ```
#[derive(Debug, Clone)]
pub struct Cmd {
    name: Bytes,
    args: Vec<Arg>,
}

impl Cmd {
    /// Creates a new command with the given name.
    #[inline]
    pub fn new(name: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument to the command.
    #[inline]
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The command name as raw bytes.
    #[inline]
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// The command arguments in order, structure preserved.
    #[inline]
    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Flattens the command to a RESP array frame.
    pub fn into_frame(self) -> Frame {
        let mut parts = vec![Frame::BulkString(Some(self.name))];
        for arg in &self.args {
            arg.flatten_into(&mut parts);
        }
        Frame::Array(parts)
    }
}

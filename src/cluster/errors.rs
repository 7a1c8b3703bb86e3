//! Classification of error replies.
//!
//! Nodes signal resharding through special error replies:
//! - `MOVED <slot> <host>:<port>`: the slot's owner changed for good
//! - `ASK <slot> <host>:<port>`: redirect this one request only, after an
//!   `ASKING` preamble
//!
//! Everything else is an ordinary application error and is handed back to
//! the caller untouched.

use crate::proto::error::Error;

/// Classifies an error-reply message into a typed [`Error`].
///
/// # Panics
///
/// A reply that names a redirect but carries a malformed slot number or is
/// missing the address means the server is emitting garbage; that is an
/// invariant violation, not a recoverable condition, and this function
/// panics.
pub(crate) fn classify_reply_error(msg: &[u8]) -> Error {
    let text = String::from_utf8_lossy(msg);
    if let Some(rest) = text.strip_prefix("MOVED ") {
        let (slot, address) = redirect_info(rest);
        return Error::Moved { slot, address };
    }
    if let Some(rest) = text.strip_prefix("ASK ") {
        let (slot, address) = redirect_info(rest);
        return Error::Ask { slot, address };
    }
    Error::Server {
        message: text.into_owned(),
    }
}

/// Parses `"<slot> <host>:<port>"` out of a redirect reply.
fn redirect_info(rest: &str) -> (u16, String) {
    let mut parts = rest.split_whitespace();
    let slot = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or_else(|| panic!("malformed redirect slot in reply: {rest:?}"));
    let address = parts
        .next()
        .unwrap_or_else(|| panic!("redirect reply missing address: {rest:?}"))
        .to_string();
    (slot, address)
}

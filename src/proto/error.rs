use std::io;

use thiserror::Error;

/// Result type alias for shoal operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by connections, pools and the cluster coordinator.
///
/// Server replies are folded into this enum as well: an error reply whose
/// message carries a redirect becomes [`Error::Moved`] or [`Error::Ask`],
/// anything else the server complains about becomes [`Error::Server`].
#[derive(Debug, Error)]
pub enum Error {
    /// An IO error occurred.
    #[error("IO error: {source}")]
    Io {
        /// The underlying IO error.
        #[from]
        source: io::Error,
    },

    /// A protocol error occurred.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the error.
        message: String,
    },

    /// The server returned an application-level error.
    #[error("server error: {message}")]
    Server {
        /// Error message from server.
        message: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of invalid argument.
        message: String,
    },

    /// No routing key could be derived from the command arguments.
    #[error("bad command, no key")]
    NoKey,

    /// The slot has permanently moved to another node.
    #[error("MOVED {slot} {address}")]
    Moved {
        /// Hash slot being redirected.
        slot: u16,
        /// Address of the node now owning the slot.
        address: String,
    },

    /// The slot is migrating; retry once against the given node after ASKING.
    #[error("ASK {slot} {address}")]
    Ask {
        /// Hash slot being redirected.
        slot: u16,
        /// Address of the node to ask.
        address: String,
    },

    /// Every connection of the pool is checked out and the cap is reached.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// The cluster has no registered pools to borrow from.
    #[error("no pools to pull from")]
    NoPools,

    /// The cluster has been closed; no further operations are possible.
    #[error("cluster has been closed")]
    ClusterClosed,
}

impl Error {
    /// Returns true for network-level failures, the kind the retry ladder
    /// treats as "try another connection" rather than a final answer.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io { .. })
    }

    /// Returns true if this error is a MOVED or ASK redirect.
    pub fn is_redirect(&self) -> bool {
        matches!(self, Error::Moved { .. } | Error::Ask { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        let error = Error::Io { source: io_err };
        assert!(error.to_string().contains("IO error"));
    }

    #[test]
    fn test_error_display_server() {
        let error = Error::Server {
            message: "ERR wrong type".to_string(),
        };
        assert_eq!(error.to_string(), "server error: ERR wrong type");
    }

    #[test]
    fn test_error_display_moved() {
        let error = Error::Moved {
            slot: 3999,
            address: "10.0.0.2:6379".to_string(),
        };
        assert_eq!(error.to_string(), "MOVED 3999 10.0.0.2:6379");
    }

    #[test]
    fn test_error_display_no_key() {
        assert_eq!(Error::NoKey.to_string(), "bad command, no key");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::Other, "test");
        let error: Error = io_err.into();
        assert!(error.is_io());
    }

    #[test]
    fn test_is_redirect() {
        assert!(Error::Ask {
            slot: 1,
            address: "a:1".to_string()
        }
        .is_redirect());
        assert!(!Error::PoolExhausted.is_redirect());
        assert!(!Error::NoPools.is_io());
    }
}

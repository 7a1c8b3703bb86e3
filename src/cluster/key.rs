//! Routing-key extraction.
//!
//! Commands carry heterogeneous arguments; the cluster routes on the first
//! of them. Sequences descend to their first leaf (a multi-key command is
//! routed by its first key), maps are rejected outright because their order
//! carries no meaning, and plain scalars route by their textual rendering.

use crate::core::command::Arg;
use crate::proto::error::{Error, Result};

/// Derives the routing key from a command's argument list.
///
/// Returns [`Error::NoKey`] when the list is empty, descends into an empty
/// sequence, or starts with a map.
pub fn key_from_args(args: &[Arg]) -> Result<String> {
    match args.first() {
        Some(arg) => key_from_arg(arg),
        None => Err(Error::NoKey),
    }
}

fn key_from_arg(arg: &Arg) -> Result<String> {
    match arg {
        Arg::Str(s) => Ok(s.clone()),
        Arg::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
        Arg::List(items) => match items.first() {
            Some(first) => key_from_arg(first),
            None => Err(Error::NoKey),
        },
        Arg::Map(_) => Err(Error::NoKey),
        Arg::Int(i) => Ok(i.to_string()),
        Arg::Float(f) => Ok(f.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_string_key() {
        let args = [Arg::from("mykey"), Arg::from("value")];
        assert_eq!(key_from_args(&args).unwrap(), "mykey");
    }

    #[test]
    fn test_bytes_key() {
        let args = [Arg::Bytes(Bytes::from("raw")), Arg::from(1i64)];
        assert_eq!(key_from_args(&args).unwrap(), "raw");
    }

    #[test]
    fn test_empty_args() {
        assert!(matches!(key_from_args(&[]), Err(Error::NoKey)));
    }

    #[test]
    fn test_sequence_descends_to_first_leaf() {
        let args = [Arg::from(vec!["k1", "k2", "k3"])];
        assert_eq!(key_from_args(&args).unwrap(), "k1");

        let nested = [Arg::List(vec![Arg::List(vec![Arg::from("deep")])])];
        assert_eq!(key_from_args(&nested).unwrap(), "deep");
    }

    #[test]
    fn test_empty_sequence_fails() {
        let args = [Arg::List(Vec::new())];
        assert!(matches!(key_from_args(&args), Err(Error::NoKey)));
    }

    #[test]
    fn test_map_fails() {
        let args = [Arg::Map(vec![(Arg::from("f"), Arg::from("v"))])];
        assert!(matches!(key_from_args(&args), Err(Error::NoKey)));
    }

    #[test]
    fn test_scalar_stringified() {
        assert_eq!(key_from_args(&[Arg::from(42i64)]).unwrap(), "42");
        assert_eq!(key_from_args(&[Arg::from(1.5f64)]).unwrap(), "1.5");
    }

    #[test]
    fn test_extraction_is_stable() {
        let args = [Arg::from(vec!["a", "b"]), Arg::from("x")];
        assert_eq!(
            key_from_args(&args).unwrap(),
            key_from_args(&args).unwrap()
        );
    }
}

//! Hash-slot calculation.
//!
//! The cluster partitions the key space into 16384 slots; a key maps to a
//! slot by CRC16 modulo the slot count, with hash tags letting callers pin
//! related keys to the same slot.

use crc::{Crc, CRC_16_XMODEM};

/// Number of hash slots in the cluster.
pub const SLOT_COUNT: u16 = 16384;

/// CRC-16/XMODEM, the checksum the cluster uses for slot assignment.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Calculates the hash slot for a key.
///
/// If the key contains `{...}`, only the content between the first `{` and
/// the next `}` is hashed, so `{user1000}.following` and
/// `{user1000}.followers` land on the same node.
///
/// # Examples
///
/// ```
/// use shoal::cluster::key_slot;
///
/// assert_eq!(key_slot("{user1000}.following"), key_slot("{user1000}.followers"));
/// assert!(key_slot("anything") < 16384);
/// ```
pub fn key_slot(key: &str) -> u16 {
    CRC16.checksum(hash_tag(key).as_bytes()) % SLOT_COUNT
}

/// Extracts the hash tag from a key.
///
/// The tag is the substring strictly between the first `{` and the next
/// `}` after it. An empty tag is still a tag: `"{}abc"` hashes the empty
/// string. A key without a complete brace pair hashes whole.
fn hash_tag(key: &str) -> &str {
    if let Some(start) = key.find('{') {
        if let Some(len) = key[start + 1..].find('}') {
            return &key[start + 1..start + 1 + len];
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_in_range() {
        assert!(key_slot("mykey") < SLOT_COUNT);
        assert!(key_slot("") < SLOT_COUNT);
    }

    #[test]
    fn test_slot_stable() {
        assert_eq!(key_slot("user:1000"), key_slot("user:1000"));
    }

    #[test]
    fn test_known_slot_values() {
        // Reference values from the CRC-16/XMODEM slot assignment.
        assert_eq!(key_slot("foo"), 12182);
        assert_eq!(key_slot("bar"), 5061);
        assert_eq!(key_slot(""), 0);
    }

    #[test]
    fn test_hash_tag_groups_keys() {
        let a = key_slot("{user1000}.following");
        let b = key_slot("{user1000}.followers");
        assert_eq!(a, b);
        assert_eq!(a, key_slot("user1000"));
    }

    #[test]
    fn test_hash_tag_extraction() {
        assert_eq!(hash_tag("foo{bar}"), "bar");
        assert_eq!(hash_tag("{user1000}.following"), "user1000");
        assert_eq!(hash_tag("prefix{tag}suffix"), "tag");
        assert_eq!(hash_tag("no_braces"), "no_braces");
    }

    #[test]
    fn test_first_tag_wins() {
        assert_eq!(hash_tag("foo{bar}baz{qux}"), "bar");
        assert_eq!(key_slot("foo{bar}baz{qux}"), key_slot("bar"));
    }

    #[test]
    fn test_empty_tag_hashes_empty_string() {
        // Known edge: a leading "{}" selects the empty tag, so all such keys
        // collapse onto slot 0.
        assert_eq!(hash_tag("{}abc"), "");
        assert_eq!(key_slot("{}abc"), key_slot(""));
    }

    #[test]
    fn test_unmatched_braces_hash_whole_key() {
        assert_eq!(hash_tag("foo{bar"), "foo{bar");
        assert_eq!(hash_tag("foo}bar"), "foo}bar");
        assert_eq!(hash_tag("}{"), "}{");
    }

    #[test]
    fn test_distribution() {
        let slots: std::collections::HashSet<u16> =
            (0..100).map(|i| key_slot(&format!("key{i}"))).collect();
        assert!(slots.len() >= 50, "keys should spread across slots");
    }
}

//! Block identifiers
//!
//! A block id is `<creation time>-<suffix>`: a 14-digit local timestamp
//! followed by seven lowercase alphanumerics, e.g. `20240101120000-a1b2c3d`.
//! The creation time of any block is therefore recoverable from its id.

use crate::clock::TIMESTAMP_FORMAT;
use chrono::Local;
use uuid::Uuid;

/// Stable unique identifier of a block
pub type BlockId = String;

const SUFFIX_LEN: usize = 7;

/// Generate a fresh block id stamped with the current local time
pub fn new_block_id() -> BlockId {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}",
        Local::now().format(TIMESTAMP_FORMAT),
        &suffix[..SUFFIX_LEN]
    )
}

/// Creation timestamp encoded in `id`, if it has the canonical shape
pub fn time_from_id(id: &str) -> Option<&str> {
    if !is_valid_block_id(id) {
        return None;
    }
    Some(&id[..14])
}

/// Whether `id` has the canonical `<14 digits>-<7 alphanumerics>` shape
pub fn is_valid_block_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    if bytes.len() != 14 + 1 + SUFFIX_LEN || bytes[14] != b'-' {
        return false;
    }
    bytes[..14].iter().all(u8::is_ascii_digit)
        && bytes[15..]
            .iter()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_id_shape() {
        let id = new_block_id();
        assert!(is_valid_block_id(&id), "bad id {}", id);
        assert_eq!(time_from_id(&id).map(str::len), Some(14));
    }

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<_> = (0..1000).map(|_| new_block_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_time_from_foreign_id() {
        assert_eq!(time_from_id("p1"), None);
        assert_eq!(time_from_id("20240101120000-ABCDEFG"), None);
        assert_eq!(
            time_from_id("20240101120000-abc1234"),
            Some("20240101120000")
        );
    }
}

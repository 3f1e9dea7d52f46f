/// Card id generation.
///
/// Ids are a base-36 millisecond timestamp joined with 8 hex chars taken
/// from a SHA-256 of an intra-process counter and the nanosecond clock.
/// The timestamp keeps ids roughly creation-ordered; the hash suffix keeps
/// ids created within the same millisecond apart.
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut n: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Generate a new card id, e.g. `lx3k9a2f-1a2b3c4d`.
pub fn generate_card_id() -> String {
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let since_epoch = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(seq.to_le_bytes());
    hasher.update(since_epoch.as_nanos().to_le_bytes());
    let hash = hasher.finalize();

    format!(
        "{}-{}",
        to_base36(since_epoch.as_millis()),
        hex::encode(&hash[..4])
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_generate_card_id_format() {
        let id = generate_card_id();
        let (ts, suffix) = id.split_once('-').unwrap();
        assert!(!ts.is_empty());
        assert!(ts.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_card_id_unique_in_burst() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_card_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}

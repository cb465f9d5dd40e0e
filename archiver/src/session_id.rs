//! Session identifiers are 64-bit and time-ordered: the high bits embed the
//! creation timestamp in milliseconds, the low bits a per-generator
//! sequence. Decoding is diagnostic-only in this service.

use chrono::{DateTime, Utc};

const TIMESTAMP_SHIFT: u32 = 23;
const SHARD_COUNT: u64 = 16;

/// Creation time embedded in the identifier.
pub fn start_time(session_id: u64) -> DateTime<Utc> {
    let millis = (session_id >> TIMESTAMP_SHIFT) as i64;
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Diagnostic shard of a session (identifier modulo 16).
pub fn shard(session_id: u64) -> u64 {
    session_id % SHARD_COUNT
}

#[cfg(test)]
mod tests {
    use super::{shard, start_time};

    #[test]
    fn extracts_embedded_timestamp() {
        let millis: u64 = 1_700_000_000_000;
        let session_id = millis << super::TIMESTAMP_SHIFT;
        assert_eq!(start_time(session_id).timestamp_millis(), millis as i64);
    }

    #[test]
    fn low_bits_do_not_disturb_timestamp() {
        let millis: u64 = 1_700_000_000_000;
        let session_id = (millis << super::TIMESTAMP_SHIFT) | 0x7A_FF01;
        assert_eq!(start_time(session_id).timestamp_millis(), millis as i64);
    }

    #[test]
    fn shard_is_modulo_sixteen() {
        assert_eq!(shard(0), 0);
        assert_eq!(shard(33), 1);
        assert_eq!(shard(u64::MAX), 15);
    }
}

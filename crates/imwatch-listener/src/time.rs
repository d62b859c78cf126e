//! Conversion between the Messages store's timestamps and UTC instants.
//!
//! The store counts seconds since 2001-01-01 00:00:00 UTC. Since macOS 10.13
//! the same column holds nanoseconds instead ("packed" values). Zero means the
//! timestamp is absent.

use chrono::{DateTime, Utc};

/// Seconds between the Unix epoch and the store's epoch (2001-01-01 UTC).
pub const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Floors a packed value back to seconds. Unpacked values yield zero.
pub fn unpack(native: i64) -> i64 {
    native.div_euclid(NANOS_PER_SECOND)
}

pub fn pack(seconds: i64) -> i64 {
    seconds.saturating_mul(NANOS_PER_SECOND)
}

/// Decodes a raw store timestamp.
///
/// Packed values are detected by magnitude: anything that unpacks to a
/// nonzero count of seconds is treated as nanoseconds. Zero and values that
/// fall outside chrono's range decode to `None`.
pub fn decode(native: i64) -> Option<DateTime<Utc>> {
    if native == 0 {
        return None;
    }

    let unpacked = unpack(native);
    let seconds = if unpacked != 0 { unpacked } else { native };

    let unix = seconds.checked_add(APPLE_EPOCH_OFFSET)?;
    DateTime::from_timestamp(unix, 0)
}

/// Unpacked store seconds for an instant. Sub-second precision is floored.
pub fn encode(instant: DateTime<Utc>) -> i64 {
    instant.timestamp() - APPLE_EPOCH_OFFSET
}

/// The store-native timestamp for `instant`, packed when asked.
pub fn now_native_at(instant: DateTime<Utc>, packed: bool) -> i64 {
    let seconds = encode(instant);
    if packed { pack(seconds) } else { seconds }
}

pub fn now_native(packed: bool) -> i64 {
    now_native_at(Utc::now(), packed)
}

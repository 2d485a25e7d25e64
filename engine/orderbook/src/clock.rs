//! Wall-clock source for event timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

use protocol::Timestamp;

/// UTC nanoseconds since the UNIX epoch. Saturates to 0 if the system clock
/// is set before the epoch.
#[inline]
pub fn utc_now_ns() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

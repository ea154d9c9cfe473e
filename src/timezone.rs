//! Time zone resolution for per-subscriber scheduling.
//!
//! Subscribers are scheduled against either a named IANA zone or a fixed
//! UTC offset taken from the weather provider's live `timezone` field.
//! A fixed offset does not observe DST, so the 07:00 wall-clock target
//! drifts by the DST delta twice a year for such zones. That drift is a
//! documented property of offset-based resolution, not corrected here.

use chrono::{DateTime, FixedOffset, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Westernmost valid UTC offset (UTC-12)
pub const MIN_UTC_OFFSET_SECS: i32 = -12 * 3600;
/// Easternmost valid UTC offset (UTC+14)
pub const MAX_UTC_OFFSET_SECS: i32 = 14 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("UTC offset {0}s is outside the valid range (-12h to +14h)")]
pub struct InvalidOffset(pub i32);

/// A time zone a subscriber can be scheduled in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeZoneIdentity {
    /// Named IANA zone, DST-aware
    Named(Tz),
    /// Constant UTC offset, no DST rules
    Fixed(FixedOffset),
}

impl TimeZoneIdentity {
    /// Resolve a named IANA zone (e.g. "Europe/Warsaw")
    pub fn from_name(name: &str) -> Option<Self> {
        name.parse::<Tz>().ok().map(TimeZoneIdentity::Named)
    }

    /// UTC offset in seconds at the given instant
    pub fn offset_seconds(&self, at: DateTime<Utc>) -> i32 {
        match self {
            TimeZoneIdentity::Named(tz) => tz
                .offset_from_utc_datetime(&at.naive_utc())
                .fix()
                .local_minus_utc(),
            TimeZoneIdentity::Fixed(offset) => offset.local_minus_utc(),
        }
    }

    /// Local wall-clock (hour, minute, second) at the given instant
    pub fn local_hms(&self, at: DateTime<Utc>) -> (u32, u32, u32) {
        match self {
            TimeZoneIdentity::Named(tz) => {
                let local = at.with_timezone(tz);
                (local.hour(), local.minute(), local.second())
            }
            TimeZoneIdentity::Fixed(offset) => {
                let local = at.with_timezone(offset);
                (local.hour(), local.minute(), local.second())
            }
        }
    }
}

impl std::fmt::Display for TimeZoneIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeZoneIdentity::Named(tz) => write!(f, "{}", tz.name()),
            TimeZoneIdentity::Fixed(offset) => {
                let secs = offset.local_minus_utc();
                let sign = if secs < 0 { '-' } else { '+' };
                let abs = secs.unsigned_abs();
                let hours = abs / 3600;
                let minutes = (abs % 3600) / 60;
                if minutes == 0 {
                    write!(f, "UTC{}{}", sign, hours)
                } else {
                    write!(f, "UTC{}{}:{:02}", sign, hours, minutes)
                }
            }
        }
    }
}

/// Resolve a raw UTC offset in seconds into a fixed-offset zone.
/// Offsets outside -12h..=+14h are rejected.
pub fn resolve(raw_offset_seconds: i32) -> Result<TimeZoneIdentity, InvalidOffset> {
    if !(MIN_UTC_OFFSET_SECS..=MAX_UTC_OFFSET_SECS).contains(&raw_offset_seconds) {
        return Err(InvalidOffset(raw_offset_seconds));
    }
    let offset =
        FixedOffset::east_opt(raw_offset_seconds).ok_or(InvalidOffset(raw_offset_seconds))?;
    Ok(TimeZoneIdentity::Fixed(offset))
}



/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    #[kani::proof]
    fn resolve_rejects_everything_out_of_range() {
        let offset: i32 = kani::any();
        kani::assume(offset < MIN_UTC_OFFSET_SECS || offset > MAX_UTC_OFFSET_SECS);
        kani::assert(resolve(offset).is_err(), "out-of-range offset must be rejected");
    }

    #[kani::proof]
    fn resolve_accepts_valid_range() {
        let offset: i32 = kani::any();
        kani::assume(offset >= MIN_UTC_OFFSET_SECS && offset <= MAX_UTC_OFFSET_SECS);
        kani::assert(resolve(offset).is_ok(), "in-range offset must resolve");
    }
}

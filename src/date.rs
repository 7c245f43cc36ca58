//! Calendar time: the clock the method-writer stamps history with and the
//! ISO-8601 rendering `crate::marshal`'s `NanoTime` annotation needs in
//! the text/JSON dialects (§4.4, §4.7 "clock determinism").
//!
//! The harness (§4.7) needs a clock it can pin and single-step
//! deterministically; production code needs the real wall clock. Both
//! sides of that split implement the same trait so `MethodWriter`'s
//! history stamping doesn't know or care which one it was handed.

use std::sync::atomic::{AtomicI64, Ordering};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{Error, Result};

/// A source of the current time, denominated in nanoseconds since the
/// Unix epoch.
pub trait Clock: Send + Sync {
    fn now_nanos(&self) -> i64;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        OffsetDateTime::now_utc().unix_timestamp_nanos() as i64
    }
}

/// A clock the test harness pins to a fixed instant and single-steps by a
/// fixed increment on every read (§4.7: "a typical setup auto-increments
/// by 1 µs per read"), so two runs of the same corpus produce byte-identical
/// history stamps.
#[derive(Debug)]
pub struct SettableClock {
    next: AtomicI64,
    step_nanos: i64,
}

impl SettableClock {
    pub fn new(start_nanos: i64) -> SettableClock {
        SettableClock {
            next: AtomicI64::new(start_nanos),
            step_nanos: 1_000,
        }
    }

    /// Builds a clock that starts at the Unix epoch and advances by one
    /// microsecond per read, the harness's default.
    pub fn epoch() -> SettableClock {
        SettableClock::new(0)
    }

    pub fn with_step_nanos(mut self, step_nanos: i64) -> SettableClock {
        self.step_nanos = step_nanos;
        self
    }

    /// Rewinds the clock to `nanos` without touching its step size.
    pub fn set(&self, nanos: i64) {
        self.next.store(nanos, Ordering::SeqCst);
    }
}

impl Clock for SettableClock {
    fn now_nanos(&self) -> i64 {
        self.next.fetch_add(self.step_nanos, Ordering::SeqCst)
    }
}

/// Renders a nanosecond Unix timestamp as RFC 3339 / ISO-8601 with
/// nanosecond precision, the form `NanoTime`-annotated fields take in the
/// text and JSON dialects (§4.4).
pub fn format_nanos_iso8601(nanos: i64) -> Result<String> {
    let dt = OffsetDateTime::from_unix_timestamp_nanos(nanos as i128)
        .map_err(|e| Error::invalid_marshallable(format!("timestamp out of range: {}", e)))?;
    dt.format(&Rfc3339)
        .map_err(|e| Error::invalid_marshallable(format!("failed to format timestamp: {}", e)))
}

/// The inverse of `format_nanos_iso8601`, used when a `NanoTime` field is
/// read back out of the text or JSON dialects.
pub fn parse_nanos_iso8601(text: &str) -> Result<i64> {
    let dt = OffsetDateTime::parse(text, &Rfc3339)
        .map_err(|e| Error::protocol_violation(format!("invalid timestamp {:?}: {}", text, e)))?;
    Ok(dt.unix_timestamp_nanos() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settable_clock_auto_increments_by_one_microsecond() {
        let clock = SettableClock::epoch();
        assert_eq!(clock.now_nanos(), 0);
        assert_eq!(clock.now_nanos(), 1_000);
        assert_eq!(clock.now_nanos(), 2_000);
    }

    #[test]
    fn settable_clock_can_be_rewound() {
        let clock = SettableClock::epoch();
        clock.now_nanos();
        clock.set(0);
        assert_eq!(clock.now_nanos(), 0);
    }

    #[test]
    fn iso8601_round_trips_nanosecond_precision() {
        let nanos = 1_700_000_000_123_456_789i64;
        let text = format_nanos_iso8601(nanos).unwrap();
        assert_eq!(parse_nanos_iso8601(&text).unwrap(), nanos);
    }
}

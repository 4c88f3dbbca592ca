//! Clock policy: the single notion of "today" used for daily resets.
//!
//! The wall clock sits behind a trait so tests can drive day boundaries
//! deterministically. The timezone is configuration, not the machine's: a
//! deployment can pin resets to UTC or a fixed offset regardless of where the
//! process runs. Clock rollback is explicitly out of scope.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Utc};

use crate::{errors::Error, Result};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// The real clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Which timezone defines the day boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeZonePolicy {
    /// The host's local timezone (default).
    HostLocal,
    /// A fixed UTC offset, e.g. `+09:00` or `utc`.
    Fixed(FixedOffset),
}

impl TimeZonePolicy {
    /// Parse a configuration string: `local`, `utc`, or `±HH:MM`.
    pub fn parse(raw: &str) -> Result<Self> {
        let s = raw.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("local") {
            return Ok(Self::HostLocal);
        }
        if s.eq_ignore_ascii_case("utc") {
            return Ok(Self::Fixed(utc_offset()));
        }

        let (sign, rest) = match s.as_bytes().first() {
            Some(b'+') => (1i32, &s[1..]),
            Some(b'-') => (-1i32, &s[1..]),
            _ => return Err(Error::Config(format!("invalid timezone: {raw}"))),
        };
        let Some((hh, mm)) = rest.split_once(':') else {
            return Err(Error::Config(format!("invalid timezone: {raw}")));
        };
        // Unsigned on purpose: the sign was consumed above, so a stray inner
        // sign like "+-01:30" fails to parse instead of sneaking through.
        let hours: u32 = hh
            .parse()
            .map_err(|_| Error::Config(format!("invalid timezone: {raw}")))?;
        let minutes: u32 = mm
            .parse()
            .map_err(|_| Error::Config(format!("invalid timezone: {raw}")))?;
        if hours > 23 || minutes > 59 {
            return Err(Error::Config(format!("invalid timezone: {raw}")));
        }

        let secs = sign * (hours as i32 * 3600 + minutes as i32 * 60);
        FixedOffset::east_opt(secs)
            .map(Self::Fixed)
            .ok_or_else(|| Error::Config(format!("invalid timezone: {raw}")))
    }
}

fn utc_offset() -> FixedOffset {
    FixedOffset::east_opt(0).expect("zero offset is valid")
}

/// A clock plus a timezone: everything date-related the tracker needs.
#[derive(Clone)]
pub struct ClockPolicy {
    clock: Arc<dyn Clock>,
    tz: TimeZonePolicy,
}

impl ClockPolicy {
    pub fn system(tz: TimeZonePolicy) -> Self {
        Self::with_clock(Arc::new(SystemClock), tz)
    }

    pub fn with_clock(clock: Arc<dyn Clock>, tz: TimeZonePolicy) -> Self {
        Self { clock, tz }
    }

    /// The current logical date. Pure with respect to the underlying clock.
    pub fn today(&self) -> NaiveDate {
        self.naive_now().date()
    }

    /// Time until the next day boundary, i.e. the `retry_after` for a denied
    /// request.
    pub fn until_day_end(&self) -> Duration {
        let now = self.naive_now();
        let Some(tomorrow) = now.date().succ_opt() else {
            return Duration::ZERO;
        };
        let Some(midnight) = tomorrow.and_hms_opt(0, 0, 0) else {
            return Duration::ZERO;
        };
        (midnight - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// RFC3339 timestamp of "now" in the policy timezone.
    pub fn timestamp(&self) -> String {
        let utc = self.clock.now_utc();
        match self.tz {
            TimeZonePolicy::HostLocal => utc.with_timezone(&Local).to_rfc3339(),
            TimeZonePolicy::Fixed(off) => utc.with_timezone(&off).to_rfc3339(),
        }
    }

    fn naive_now(&self) -> NaiveDateTime {
        let utc = self.clock.now_utc();
        match self.tz {
            TimeZonePolicy::HostLocal => utc.with_timezone(&Local).naive_local(),
            TimeZonePolicy::Fixed(off) => utc.with_timezone(&off).naive_local(),
        }
    }
}

/// Deterministic clock for tests: starts at a fixed instant and only moves
/// when told to.
#[cfg(test)]
pub struct FakeClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl FakeClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn at_ymd_hms(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> Self {
        use chrono::TimeZone;
        Self::at(Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap())
    }

    pub fn advance_days(&self, days: i64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::days(days);
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::seconds(secs);
    }
}

#[cfg(test)]
impl Clock for FakeClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

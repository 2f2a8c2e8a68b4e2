//! Instants, sampling steps, and sampling grids.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::{DAYS_PER_CENTURY, J2000_JD, MAX_STEP_SECONDS, UNIX_EPOCH_JD};

static STEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*(m|min|h|d|w)\s*$").unwrap());

/// Parse an instant from RFC 3339, `YYYY-MM-DDTHH:MM[:SS]`, or a bare date
/// (midnight UTC).
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default()));
    }
    Err(format!("unrecognized instant '{raw}' (expected YYYY-MM-DD or RFC 3339)"))
}

/// Julian day number (UT) of an instant.
pub fn julian_day(instant: DateTime<Utc>) -> f64 {
    let secs = instant.timestamp() as f64 + instant.timestamp_subsec_nanos() as f64 * 1e-9;
    UNIX_EPOCH_JD + secs / 86_400.0
}

/// Julian centuries elapsed since J2000.0.
pub fn centuries_since_j2000(instant: DateTime<Utc>) -> f64 {
    (julian_day(instant) - J2000_JD) / DAYS_PER_CENTURY
}

/// Fractional days from `anchor` to `instant` (negative before the anchor).
pub fn days_between(anchor: DateTime<Utc>, instant: DateTime<Utc>) -> f64 {
    (instant - anchor).num_seconds() as f64 / 86_400.0
}

/// Positive sampling interval, written as `<n><unit>` (`30m`, `6h`, `1d`, `2w`),
/// at most one century long.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Step {
    seconds: i64,
}

impl Step {
    pub fn from_seconds(seconds: i64) -> Result<Self, String> {
        if seconds <= 0 {
            return Err(format!("sampling step must be positive, got {seconds}s"));
        }
        if seconds > MAX_STEP_SECONDS {
            return Err(format!(
                "sampling step of {seconds}s exceeds the maximum of {}d",
                MAX_STEP_SECONDS / 86_400
            ));
        }
        Ok(Self { seconds })
    }

    pub fn minutes(n: i64) -> Result<Self, String> {
        Self::from_seconds(n.saturating_mul(60))
    }

    pub fn hours(n: i64) -> Result<Self, String> {
        Self::from_seconds(n.saturating_mul(3_600))
    }

    pub fn days(n: i64) -> Result<Self, String> {
        Self::from_seconds(n.saturating_mul(86_400))
    }

    pub fn daily() -> Self {
        Self { seconds: 86_400 }
    }

    pub fn seconds(self) -> i64 {
        self.seconds
    }

    pub fn duration(self) -> Duration {
        Duration::try_seconds(self.seconds).unwrap_or(Duration::MAX)
    }

    /// How many steps fit in `span`, fractional.
    pub fn steps_in(self, span: Duration) -> f64 {
        span.num_seconds() as f64 / self.seconds as f64
    }
}

impl Default for Step {
    fn default() -> Self {
        Self::daily()
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.seconds;
        if s % 604_800 == 0 {
            write!(f, "{}w", s / 604_800)
        } else if s % 86_400 == 0 {
            write!(f, "{}d", s / 86_400)
        } else if s % 3_600 == 0 {
            write!(f, "{}h", s / 3_600)
        } else if s % 60 == 0 {
            write!(f, "{}m", s / 60)
        } else {
            write!(f, "{s}s")
        }
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(secs) = s.trim().strip_suffix('s').and_then(|n| n.parse::<i64>().ok()) {
            return Self::from_seconds(secs);
        }
        let caps = STEP_RE
            .captures(s)
            .ok_or_else(|| format!("invalid step '{s}' (expected e.g. 30m, 6h, 1d, 1w)"))?;
        let n: i64 = caps[1]
            .parse()
            .map_err(|e| format!("invalid step count in '{s}': {e}"))?;
        let unit = match &caps[2] {
            "m" | "min" => 60,
            "h" => 3_600,
            "d" => 86_400,
            _ => 604_800,
        };
        Self::from_seconds(n.saturating_mul(unit))
    }
}

impl TryFrom<String> for Step {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Step> for String {
    fn from(step: Step) -> Self {
        step.to_string()
    }
}

/// Inclusive date range of an analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window spanning `days_before` before and `days_after` after `anchor`.
    /// `None` when either end falls outside the representable calendar.
    pub fn around(anchor: DateTime<Utc>, days_before: i64, days_after: i64) -> Option<Self> {
        let start = anchor.checked_sub_signed(Duration::try_days(days_before)?)?;
        let end = anchor.checked_add_signed(Duration::try_days(days_after)?)?;
        Some(Self { start, end })
    }

    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }
}

/// Evenly spaced sampling instants over an inclusive range.
///
/// Iteration is lazy and the grid can be walked any number of times.
#[derive(Clone, Copy, Debug)]
pub struct SampleGrid {
    start: DateTime<Utc>,
    step: Step,
    len: usize,
}

impl SampleGrid {
    /// An inverted range yields an empty grid; `start == end` yields one instant.
    pub fn new(range: DateRange, step: Step) -> Self {
        let len = if range.is_ordered() {
            (range.span().num_seconds() / step.seconds()) as usize + 1
        } else {
            0
        };
        Self {
            start: range.start,
            step,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn instant(&self, index: usize) -> Option<DateTime<Utc>> {
        if index >= self.len {
            return None;
        }
        let offset = self.step.seconds().checked_mul(i64::try_from(index).ok()?)?;
        self.start.checked_add_signed(Duration::try_seconds(offset)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = DateTime<Utc>> + Clone + '_ {
        (0..self.len).filter_map(|i| self.instant(i))
    }
}

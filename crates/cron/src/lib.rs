//! 5-field cron evaluator (min hour dom month dow).
//!
//! Field grammar: `*`, `*/n` (step from the field minimum), `a-b`
//! (inclusive), comma lists of any of those, or a single value. Day-of-month
//! and day-of-week combine with OR when **both** are restricted; otherwise
//! only the restricted one applies.
//!
//! Each field keeps an explicit `any` flag — a value set that happens to
//! cover the whole range (e.g. `0-59` minutes) still counts as restricted,
//! which matters for the day-field OR rule.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Timelike, Utc};

use ag_domain::{Error, Result};

/// Search bound for [`CronExpr::next_after`] — roughly five years of
/// minutes. Guarantees termination on impossible expressions
/// (e.g. `0 0 31 2 *`).
const MAX_SCAN_MINUTES: i64 = 5 * 366 * 24 * 60;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CronField
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One parsed cron field: the `*` flag plus the admitted value set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronField {
    any: bool,
    values: BTreeSet<u32>,
}

impl CronField {
    fn parse(spec: &str, min: u32, max: u32) -> Result<Self> {
        if spec.is_empty() {
            return Err(Error::Validation("empty cron field".into()));
        }
        let mut any = false;
        let mut values = BTreeSet::new();

        for part in spec.split(',') {
            if part == "*" {
                any = true;
                continue;
            }
            if let Some(step) = part.strip_prefix("*/") {
                let n: u32 = step.parse().map_err(|_| {
                    Error::Validation(format!("bad cron step: {part:?}"))
                })?;
                if n == 0 {
                    return Err(Error::Validation("cron step must be > 0".into()));
                }
                let mut v = min;
                while v <= max {
                    values.insert(v);
                    v += n;
                }
                continue;
            }
            if let Some((lo_s, hi_s)) = part.split_once('-') {
                let lo: u32 = lo_s.parse().map_err(|_| {
                    Error::Validation(format!("bad cron range: {part:?}"))
                })?;
                let hi: u32 = hi_s.parse().map_err(|_| {
                    Error::Validation(format!("bad cron range: {part:?}"))
                })?;
                if lo > hi {
                    return Err(Error::Validation(format!(
                        "cron range start exceeds end: {part:?}"
                    )));
                }
                if lo < min || hi > max {
                    return Err(Error::Validation(format!(
                        "cron value out of range {min}-{max}: {part:?}"
                    )));
                }
                values.extend(lo..=hi);
                continue;
            }
            let v: u32 = part.parse().map_err(|_| {
                Error::Validation(format!("bad cron value: {part:?}"))
            })?;
            if v < min || v > max {
                return Err(Error::Validation(format!(
                    "cron value out of range {min}-{max}: {v}"
                )));
            }
            values.insert(v);
        }

        Ok(Self { any, values })
    }

    /// Whether the field was written as (or includes) `*`.
    pub fn is_any(&self) -> bool {
        self.any
    }

    pub fn matches(&self, value: u32) -> bool {
        self.any || self.values.contains(&value)
    }

    /// Admitted values (empty when the field is `*`).
    pub fn values(&self) -> &BTreeSet<u32> {
        &self.values
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CronExpr
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A parsed 5-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    pub minute: CronField,
    pub hour: CronField,
    pub day_of_month: CronField,
    pub month: CronField,
    pub day_of_week: CronField,
    source: String,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(Error::Validation(format!(
                "cron expression must have 5 fields, got {}: {expr:?}",
                fields.len()
            )));
        }
        Ok(Self {
            minute: CronField::parse(fields[0], 0, 59)?,
            hour: CronField::parse(fields[1], 0, 23)?,
            day_of_month: CronField::parse(fields[2], 1, 31)?,
            month: CronField::parse(fields[3], 1, 12)?,
            day_of_week: CronField::parse(fields[4], 0, 6)?,
            source: expr.trim().to_string(),
        })
    }

    /// The expression as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether a wall-clock minute matches.
    pub fn matches_naive(&self, t: &NaiveDateTime) -> bool {
        if !self.minute.matches(t.minute())
            || !self.hour.matches(t.hour())
            || !self.month.matches(t.month())
        {
            return false;
        }
        self.day_matches(t)
    }

    /// UTC shorthand for [`CronExpr::matches_naive`].
    pub fn matches(&self, t: &DateTime<Utc>) -> bool {
        self.matches_naive(&t.naive_utc())
    }

    /// Vixie-cron day rule: when both day fields are restricted a time
    /// matches if **either** does; otherwise only the restricted field
    /// applies.
    fn day_matches(&self, t: &NaiveDateTime) -> bool {
        let dom = t.day();
        let dow = t.weekday().num_days_from_sunday();
        match (self.day_of_month.is_any(), self.day_of_week.is_any()) {
            (true, true) => true,
            (false, true) => self.day_of_month.matches(dom),
            (true, false) => self.day_of_week.matches(dow),
            (false, false) => {
                self.day_of_month.matches(dom) || self.day_of_week.matches(dow)
            }
        }
    }

    /// Next matching wall-clock minute strictly after `after`.
    ///
    /// Truncates to the minute, advances one minute, then scans
    /// minute-by-minute, bounded at [`MAX_SCAN_MINUTES`].
    pub fn next_after_naive(&self, after: &NaiveDateTime) -> Option<NaiveDateTime> {
        let mut candidate = after
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(*after)
            + Duration::minutes(1);
        for _ in 0..MAX_SCAN_MINUTES {
            if self.matches_naive(&candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }

    /// UTC shorthand for [`CronExpr::next_after_naive`].
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_after_naive(&after.naive_utc())
            .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
    }
}

impl FromStr for CronExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

//! A pure, 5-field cron parser: `minute hour day month day_of_week`.
//!
//! Each field is `*`, a bare integer, a range `a-b`, a comma list
//! `a,b,c`, or a step `*/n`. `matches` is a field-by-field check against
//! an instant truncated to the minute; `next` walks forward minute by
//! minute, bounded at one year out so a malformed or unsatisfiable
//! expression fails fast instead of looping forever.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use stagekit_error::StagekitError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Any,
    Values(Vec<u32>),
}

impl Field {
    fn matches(&self, value: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Values(values) => values.contains(&value),
        }
    }

    fn parse(raw: &str, min: u32, max: u32) -> Result<Self, StagekitError> {
        if raw == "*" {
            return Ok(Self::Any);
        }

        if let Some(step_part) = raw.strip_prefix("*/") {
            let step: u32 = step_part
                .parse()
                .map_err(|_| invalid(raw))?;
            if step == 0 {
                return Err(invalid(raw));
            }
            let values = (min..=max).step_by(step as usize).collect();
            return Ok(Self::Values(values));
        }

        let mut values = Vec::new();
        for part in raw.split(',') {
            if let Some((lo, hi)) = part.split_once('-') {
                let lo: u32 = lo.parse().map_err(|_| invalid(raw))?;
                let hi: u32 = hi.parse().map_err(|_| invalid(raw))?;
                if lo > hi || lo < min || hi > max {
                    return Err(invalid(raw));
                }
                values.extend(lo..=hi);
            } else {
                let value: u32 = part.parse().map_err(|_| invalid(raw))?;
                if value < min || value > max {
                    return Err(invalid(raw));
                }
                values.push(value);
            }
        }
        values.sort_unstable();
        values.dedup();
        Ok(Self::Values(values))
    }
}

fn invalid(raw: &str) -> StagekitError {
    StagekitError::other(format!("invalid cron field '{raw}'"), false)
}

/// A parsed 5-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
    source: String,
}

impl CronSchedule {
    /// Parse `"minute hour day month day_of_week"`.
    pub fn parse(expr: &str) -> Result<Self, StagekitError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow]: [&str; 5] = fields
            .try_into()
            .map_err(|_| StagekitError::other(format!("cron expression '{expr}' must have 5 fields"), false))?;

        Ok(Self {
            minute: Field::parse(minute, 0, 59)?,
            hour: Field::parse(hour, 0, 23)?,
            day_of_month: Field::parse(dom, 1, 31)?,
            month: Field::parse(month, 1, 12)?,
            day_of_week: Field::parse(dow, 0, 6)?,
            source: expr.to_string(),
        })
    }

    /// The original expression text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether `instant`, truncated to the minute, satisfies every field.
    #[must_use]
    pub fn matches(&self, instant: DateTime<Utc>) -> bool {
        let dow = instant.weekday().num_days_from_sunday();
        self.minute.matches(instant.minute())
            && self.hour.matches(instant.hour())
            && self.day_of_month.matches(instant.day())
            && self.month.matches(instant.month())
            && self.day_of_week.matches(dow)
    }

    /// The next minute-aligned instant strictly after `after` that
    /// matches this schedule, walking forward up to one year.
    #[must_use]
    pub fn next(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = truncate_to_minute(after) + Duration::minutes(1);
        let limit = start + Duration::days(366);
        let mut candidate = start;
        while candidate < limit {
            if self.matches(candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

fn truncate_to_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .with_second(0)
        .and_then(|i| i.with_nanosecond(0))
        .unwrap_or(instant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn wildcard_matches_everything() {
        let cron = CronSchedule::parse("* * * * *").unwrap();
        assert!(cron.matches(at(2026, 7, 28, 13, 37)));
    }

    #[test]
    fn step_field_matches_multiples() {
        let cron = CronSchedule::parse("*/5 * * * *").unwrap();
        assert!(cron.matches(at(2026, 1, 1, 0, 0)));
        assert!(cron.matches(at(2026, 1, 1, 0, 5)));
        assert!(!cron.matches(at(2026, 1, 1, 0, 7)));
    }

    #[test]
    fn s7_twelve_firings_per_hour() {
        let cron = CronSchedule::parse("*/5 * * * *").unwrap();
        let mut instant = at(2026, 1, 1, 0, 0) - Duration::minutes(1);
        let mut fired = Vec::new();
        for _ in 0..60 {
            instant += Duration::minutes(1);
            if cron.matches(instant) {
                fired.push(instant.minute());
            }
        }
        assert_eq!(fired, vec![0, 5, 10, 15, 20, 25, 30, 35, 40, 45, 50, 55]);
    }

    #[test]
    fn invariant_8_next_matches_and_nothing_between() {
        let cron = CronSchedule::parse("*/5 * * * *").unwrap();
        let t = at(2026, 1, 1, 0, 2);
        let next = cron.next(t).unwrap();
        assert!(cron.matches(next));
        let mut cursor = t + Duration::minutes(1);
        while cursor < next {
            assert!(!cron.matches(cursor));
            cursor += Duration::minutes(1);
        }
    }

    #[test]
    fn range_and_list_fields() {
        let cron = CronSchedule::parse("0 9-17 * * 1,3,5").unwrap();
        assert!(cron.matches(at(2026, 7, 27, 9, 0))); // Monday
        assert!(!cron.matches(at(2026, 7, 28, 9, 0))); // Tuesday
        assert!(!cron.matches(at(2026, 7, 27, 18, 0)));
    }

    #[test]
    fn rejects_malformed_expression() {
        assert!(CronSchedule::parse("not a cron").is_err());
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(CronSchedule::parse("60 * * * *").is_err());
    }
}

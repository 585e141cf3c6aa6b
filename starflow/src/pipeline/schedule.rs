//! Schedules and DAG-level defaults.

use super::retry::{RetryPolicy, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY_MS};
use crate::errors::StarflowError;
use chrono::{DateTime, DurationRound, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How often the pipeline runs.
///
/// Only the cadences the pipeline needs are understood: hourly, daily, and
/// fixed intervals written `@every 30m`. Other cron expressions are
/// rejected rather than approximated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Schedule {
    /// Top of every hour (`@hourly`, `0 * * * *`).
    #[default]
    Hourly,
    /// Midnight UTC (`@daily`, `0 0 * * *`).
    Daily,
    /// A fixed interval, aligned to the Unix epoch.
    Every(Duration),
}

impl Schedule {
    /// Parses a schedule expression.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unsupported expressions.
    pub fn parse(expr: &str) -> Result<Self, StarflowError> {
        let normalized = expr.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.as_str() {
            "@hourly" | "0 * * * *" => Ok(Self::Hourly),
            "@daily" | "@midnight" | "0 0 * * *" => Ok(Self::Daily),
            other => match other.strip_prefix("@every ") {
                Some(interval) => parse_interval(interval).map(Self::Every),
                None => Err(StarflowError::config(format!(
                    "Unsupported schedule '{expr}'; use @hourly, @daily or @every <n>s|m|h"
                ))),
            },
        }
    }

    /// Returns the length of one schedule interval.
    #[must_use]
    pub fn interval(&self) -> TimeDelta {
        match self {
            Self::Hourly => TimeDelta::hours(1),
            Self::Daily => TimeDelta::days(1),
            Self::Every(d) => TimeDelta::from_std(*d).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Returns the slot boundary at or before `ts`.
    #[must_use]
    pub fn floor(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        ts.duration_trunc(self.interval()).unwrap_or(ts)
    }

    /// Returns the first slot boundary strictly after `ts`, or `None` if it
    /// falls outside the representable date range.
    #[must_use]
    pub fn next_after(&self, ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.floor(ts).checked_add_signed(self.interval())
    }
}

/// Longest accepted `@every` interval.
pub const MAX_INTERVAL: Duration = Duration::from_secs(366 * 24 * 3600);

fn parse_interval(raw: &str) -> Result<Duration, StarflowError> {
    let raw = raw.trim();
    let invalid = || StarflowError::config(format!("Invalid interval '{raw}'"));

    let split = raw.len().checked_sub(1).ok_or_else(invalid)?;
    let (value, unit) = raw.split_at(split);
    let value: u64 = value.parse().map_err(|_| invalid())?;
    if value == 0 {
        return Err(invalid());
    }
    let secs = match unit {
        "s" => Some(value),
        "m" => value.checked_mul(60),
        "h" => value.checked_mul(3600),
        _ => return Err(invalid()),
    };
    let interval = secs.map(Duration::from_secs).filter(|d| *d <= MAX_INTERVAL).ok_or_else(|| {
        StarflowError::config(format!(
            "Interval '{raw}' exceeds the maximum of {} days",
            MAX_INTERVAL.as_secs() / 86_400
        ))
    })?;
    Ok(interval)
}

impl TryFrom<String> for Schedule {
    type Error = StarflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Schedule> for String {
    fn from(value: Schedule) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hourly => write!(f, "0 * * * *"),
            Self::Daily => write!(f, "0 0 * * *"),
            Self::Every(d) => write!(f, "@every {}s", d.as_secs()),
        }
    }
}

/// DAG-level defaults applied to every node and to run planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DagDefaults {
    /// Owner shown in run metadata.
    pub owner: String,
    /// First logical date the DAG covers.
    pub start_date: DateTime<Utc>,
    /// Whether a run waits for the previous run's success.
    pub depends_on_past: bool,
    /// Retries per node.
    pub retries: u32,
    /// Delay between retries in milliseconds.
    pub retry_delay_ms: u64,
    /// Whether to notify on retry.
    pub email_on_retry: bool,
    /// Whether to run every missed slot since the last run or only the latest.
    pub catchup: bool,
    /// Run cadence.
    pub schedule: Schedule,
}

impl Default for DagDefaults {
    fn default() -> Self {
        Self {
            owner: "udacity".to_string(),
            start_date: Utc.with_ymd_and_hms(2021, 1, 12, 0, 0, 0).single().unwrap_or_default(),
            depends_on_past: false,
            retries: DEFAULT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            email_on_retry: false,
            catchup: false,
            schedule: Schedule::Hourly,
        }
    }
}

impl DagDefaults {
    /// Returns the node retry policy these defaults describe.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_retries(self.retries)
            .with_retry_delay(Duration::from_millis(self.retry_delay_ms))
    }

    /// Returns the logical dates due at `now`.
    ///
    /// A slot is due once its interval has fully elapsed. Slots start at
    /// `start_date`, or after `last_run` if given. Without catchup only the
    /// most recent due slot is returned.
    #[must_use]
    pub fn due_logical_dates(&self, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let interval = self.schedule.interval();
        let first_start = {
            let start = self.schedule.floor(self.start_date);
            if start < self.start_date {
                start.checked_add_signed(interval)
            } else {
                Some(start)
            }
        };
        let mut slot = match (last_run, first_start) {
            (_, None) => None,
            (Some(last), Some(first)) => last.checked_add_signed(interval).map(|next| next.max(first)),
            (None, first) => first,
        };

        let mut due = Vec::new();
        while let Some(current) = slot {
            match current.checked_add_signed(interval) {
                Some(end) if end <= now => {
                    due.push(current);
                    slot = Some(end);
                }
                _ => break,
            }
        }

        if !self.catchup && due.len() > 1 {
            due.drain(..due.len() - 1);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 12, h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_supported_schedules() {
        assert_eq!(Schedule::parse("0 * * * *").unwrap(), Schedule::Hourly);
        assert_eq!(Schedule::parse("  0  *  * * *").unwrap(), Schedule::Hourly);
        assert_eq!(Schedule::parse("@hourly").unwrap(), Schedule::Hourly);
        assert_eq!(Schedule::parse("0 0 * * *").unwrap(), Schedule::Daily);
        assert_eq!(
            Schedule::parse("@every 15m").unwrap(),
            Schedule::Every(Duration::from_secs(900))
        );
    }

    #[test]
    fn test_parse_rejects_other_cron() {
        for expr in ["*/5 * * * *", "0 12 * * MON", "@every 0m", "@every 5d", "@every m", ""] {
            assert!(
                matches!(Schedule::parse(expr), Err(StarflowError::Config(_))),
                "{expr} should be rejected"
            );
        }
    }

    #[test]
    fn test_next_after() {
        assert_eq!(Schedule::Hourly.next_after(at(10, 0)), Some(at(11, 0)));
        assert_eq!(Schedule::Hourly.next_after(at(10, 59)), Some(at(11, 0)));
        assert_eq!(
            Schedule::Daily.next_after(at(10, 30)),
            Some(Utc.with_ymd_and_hms(2021, 1, 13, 0, 0, 0).unwrap())
        );
        assert_eq!(
            Schedule::Every(Duration::from_secs(900)).next_after(at(10, 20)),
            Some(at(10, 30))
        );
    }

    #[test]
    fn test_parse_rejects_oversized_intervals() {
        for expr in ["@every 18446744073709551615s", "@every 18446744073709551615h", "@every 9000h"] {
            assert!(
                matches!(Schedule::parse(expr), Err(StarflowError::Config(_))),
                "{expr} should be rejected"
            );
        }
        assert_eq!(Schedule::parse("@every 8784h").unwrap(), Schedule::Every(MAX_INTERVAL));
    }

    #[test]
    fn test_huge_interval_does_not_overflow() {
        let schedule = Schedule::Every(Duration::from_secs(u64::MAX));
        assert_eq!(schedule.next_after(DateTime::<Utc>::MAX_UTC), None);

        let defaults = DagDefaults {
            schedule,
            catchup: true,
            ..DagDefaults::default()
        };
        assert!(defaults.due_logical_dates(None, at(3, 0)).is_empty());
        assert!(defaults.due_logical_dates(Some(at(1, 0)), at(3, 0)).is_empty());
    }

    #[test]
    fn test_schedule_serde() {
        let schedule: Schedule = serde_json::from_str(r#""@daily""#).unwrap();
        assert_eq!(schedule, Schedule::Daily);
        assert_eq!(serde_json::to_string(&Schedule::Hourly).unwrap(), r#""0 * * * *""#);
        assert!(serde_json::from_str::<Schedule>(r#""*/5 * * * *""#).is_err());
    }

    #[test]
    fn test_dag_defaults() {
        let defaults = DagDefaults::default();
        assert_eq!(defaults.owner, "udacity");
        assert_eq!(defaults.start_date, at(0, 0));
        assert!(!defaults.depends_on_past);
        assert!(!defaults.email_on_retry);
        assert!(!defaults.catchup);
        assert_eq!(defaults.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_due_logical_dates_without_catchup() {
        let defaults = DagDefaults::default();
        assert_eq!(defaults.due_logical_dates(None, at(3, 10)), vec![at(2, 0)]);
        assert!(defaults.due_logical_dates(Some(at(2, 0)), at(3, 10)).is_empty());
        assert!(defaults.due_logical_dates(None, at(0, 30)).is_empty());
    }

    #[test]
    fn test_due_logical_dates_with_catchup() {
        let defaults = DagDefaults {
            catchup: true,
            ..DagDefaults::default()
        };
        assert_eq!(
            defaults.due_logical_dates(None, at(3, 0)),
            vec![at(0, 0), at(1, 0), at(2, 0)]
        );
        assert_eq!(defaults.due_logical_dates(Some(at(0, 0)), at(2, 30)), vec![at(1, 0)]);
    }
}

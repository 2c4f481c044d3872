//! Delivery schedule evaluation.
//!
//! A channel's `time_to_notify` is either the `@immediately` sentinel or a cron
//! expression in the `cron` crate grammar
//! (`sec min hour day-of-month month day-of-week [year]`, plus the `@hourly`,
//! `@daily`, `@weekly`, `@monthly` and `@yearly` shorthands).
//!
//! The delivery loop ticks once a minute, so a schedule is "due" when its next
//! fire time lands in a 61 second window that starts one second before the
//! current minute:
//!
//! ```text
//! window_start = truncate_to_minute(now) - 1s
//! window_end   = window_start + 61s
//! due          = window_start <= next_fire(after window_start) <= window_end
//! ```
//!
//! The extra second keeps a fire time sitting exactly on a minute boundary from
//! slipping between two ticks. A fire time can still match on two consecutive
//! ticks at the boundary; dispatch claims and the store's delivered flag
//! prevent double sends.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Sentinel expression for channels that bypass the schedule
pub const SEND_IMMEDIATELY: &str = "@immediately";

/// Width of the delivery window in seconds
const WINDOW_SECONDS: i64 = 61;

/// Errors produced while parsing a schedule expression
#[derive(Debug, Clone, Error)]
pub enum ScheduleError {
    #[error("invalid schedule expression '{expression}': {reason}")]
    Invalid { expression: String, reason: String },
}

/// Parsed delivery schedule of a channel
#[derive(Debug, Clone)]
pub enum DeliverySchedule {
    /// Deliver at ingestion time; always due
    Immediate,
    /// Deliver when the cron schedule fires inside the current window
    Cron(Box<cron::Schedule>),
}

impl DeliverySchedule {
    /// Parse a schedule expression.
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let expression = expression.trim();
        if expression == SEND_IMMEDIATELY {
            return Ok(Self::Immediate);
        }

        cron::Schedule::from_str(expression)
            .map(|schedule| Self::Cron(Box::new(schedule)))
            .map_err(|e| ScheduleError::Invalid {
                expression: expression.to_string(),
                reason: e.to_string(),
            })
    }

    /// Check whether an expression is the sentinel or a parsable cron expression.
    pub fn is_valid(expression: &str) -> bool {
        Self::parse(expression).is_ok()
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediate)
    }

    /// Decide whether `now` falls inside this schedule's delivery window.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let schedule = match self {
            Self::Immediate => return true,
            Self::Cron(schedule) => schedule,
        };

        let Some((window_start, window_end)) = delivery_window(now) else {
            return false;
        };

        schedule
            .after(&window_start)
            .next()
            .is_some_and(|next| next >= window_start && next <= window_end)
    }

    /// Next fire time strictly after `after`, `None` for immediate or exhausted schedules.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Immediate => None,
            Self::Cron(schedule) => schedule.after(&after).next(),
        }
    }
}

/// Compute the `[start, end]` delivery window around `now`.
pub fn delivery_window(now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let minute_start = now.timestamp().div_euclid(60) * 60;
    let start = DateTime::<Utc>::from_timestamp(minute_start - 1, 0)?;
    Some((start, start + Duration::seconds(WINDOW_SECONDS)))
}

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::CommandError;

lazy_static! {
    static ref SPAN_REGEX: Regex = Regex::new(r"^(\d+)([mhd])$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Minutes,
    Hours,
    Days,
}

/// A mute length such as `30m`, `2h` or `1d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub amount: u32,
    pub unit: Unit,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match (self.unit, self.amount) {
            (Unit::Minutes, 1) => "minute",
            (Unit::Minutes, _) => "minutes",
            (Unit::Hours, 1) => "hour",
            (Unit::Hours, _) => "hours",
            (Unit::Days, 1) => "day",
            (Unit::Days, _) => "days",
        };
        write!(f, "{} {unit}", self.amount)
    }
}

/// Restrictions running out later than this are treated as permanent by
/// the platform, as are those running out within 30 seconds.
const LONGEST_DAYS: i64 = 366;

fn out_of_range(arg: &str) -> CommandError {
    CommandError::MalformedArgument(format!(
        "“{arg}” is out of range, a mute lasts from 1m up to {LONGEST_DAYS}d"
    ))
}

fn malformed(arg: &str) -> CommandError {
    CommandError::MalformedArgument(format!(
        "“{arg}” is not a duration, use e.g. 30m, 2h or 1d"
    ))
}

impl Span {
    pub fn parse(arg: &str) -> Result<Span, CommandError> {
        let lower = arg.to_lowercase();
        let captures = SPAN_REGEX.captures(&lower).ok_or_else(|| malformed(arg))?;
        let amount = captures[1].parse().map_err(|_| malformed(arg))?;
        let unit = match &captures[2] {
            "m" => Unit::Minutes,
            "h" => Unit::Hours,
            _ => Unit::Days,
        };
        Ok(Span { amount, unit })
    }

    fn delta(self) -> Option<TimeDelta> {
        let amount = i64::from(self.amount);
        match self.unit {
            Unit::Minutes => TimeDelta::try_minutes(amount),
            Unit::Hours => TimeDelta::try_hours(amount),
            Unit::Days => TimeDelta::try_days(amount),
        }
    }

    /// `None` when the span is zero or longer than the platform keeps a
    /// timed restriction.
    pub fn expiry(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let delta = self.delta()?;
        if self.amount == 0 || delta > TimeDelta::try_days(LONGEST_DAYS)? {
            return None;
        }
        now.checked_add_signed(delta)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub span: Span,
    pub until: DateTime<Utc>,
}

/// Turns the optional duration argument of a mute into an absolute expiry.
/// `None` means the mute lasts until a moderator lifts it.
pub fn mute_until(arg: Option<&str>, now: DateTime<Utc>) -> Result<Option<Expiry>, CommandError> {
    let Some(arg) = arg else {
        return Ok(None);
    };

    let span = Span::parse(arg)?;
    let until = span.expiry(now).ok_or_else(|| out_of_range(arg))?;
    Ok(Some(Expiry { span, until }))
}

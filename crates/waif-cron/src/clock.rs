//! Cron clock - computes fire times for cron expressions.
//!
//! The underlying parser works in the 6-field seconds form and numbers the
//! days of the week `1-7` starting on Sunday. Standard 5-field expressions
//! are normalised into that form before parsing, including the day-of-week
//! translation from the usual `0-7` numbering.
//!
//! A 5-field expression that restricts both day-of-month and day-of-week
//! fires when either one matches, as standard cron does. The parser only
//! knows the "both match" reading, so such expressions are split into one
//! schedule per day field and their fire times are merged.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use cron::Schedule;

use crate::error::CronError;

/// A parsed cron schedule.
#[derive(Clone)]
pub struct CronSchedule {
    /// Expression as written by the user (trimmed).
    expr: String,

    /// Parsed schedules in the parser's native form. Fire times are the
    /// union of all of them.
    schedules: Vec<Schedule>,
}

impl CronSchedule {
    /// Parse a 5- or 6-field cron expression.
    ///
    /// # Errors
    ///
    /// Returns an error when the field count is wrong or any field is
    /// malformed or out of range.
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let schedules = day_variants(expr)?
            .iter()
            .map(|normalized| {
                Schedule::from_str(normalized).map_err(|e| CronError::Parse {
                    expr: expr.trim().to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            expr: expr.trim().to_string(),
            schedules,
        })
    }

    /// Get the expression as written.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First fire time strictly after `from`.
    pub fn next_after<Tz: TimeZone>(&self, from: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(from).find(|t| t > from))
            .min()
    }

    /// Last fire time strictly before `from`.
    pub fn previous_before<Tz: TimeZone>(&self, from: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedules
            .iter()
            .filter_map(|schedule| {
                let mut iter = schedule.after(from);
                while let Some(t) = iter.next_back() {
                    if &t < from {
                        return Some(t);
                    }
                }
                None
            })
            .max()
    }

    /// The next `count` fire times after `from`, in order.
    pub fn upcoming<Tz: TimeZone>(&self, from: &DateTime<Tz>, count: usize) -> Vec<DateTime<Tz>> {
        let mut times: Vec<DateTime<Tz>> = self
            .schedules
            .iter()
            .flat_map(move |schedule| schedule.after(from).filter(move |t| t > from).take(count))
            .collect();
        times.sort();
        times.dedup();
        times.truncate(count);
        times
    }
}

impl FromStr for CronSchedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronSchedule").field("expr", &self.expr).finish()
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

/// Compute the next fire time of `schedule` strictly after `from`.
///
/// # Errors
///
/// Returns an error if `schedule` does not parse, or parses but never fires.
pub fn next_fire_time<Tz: TimeZone>(
    schedule: &str,
    from: &DateTime<Tz>,
) -> Result<DateTime<Tz>, CronError> {
    CronSchedule::parse(schedule)?
        .next_after(from)
        .ok_or_else(|| CronError::Exhausted(schedule.trim().to_string()))
}

/// Compute the most recent fire time of `schedule` strictly before `from`.
///
/// # Errors
///
/// Returns an error if `schedule` does not parse, or parses but never fired.
pub fn previous_fire_time<Tz: TimeZone>(
    schedule: &str,
    from: &DateTime<Tz>,
) -> Result<DateTime<Tz>, CronError> {
    CronSchedule::parse(schedule)?
        .previous_before(from)
        .ok_or_else(|| CronError::Exhausted(schedule.trim().to_string()))
}

/// The next `count` fire times of `schedule` after `from`.
///
/// # Errors
///
/// Returns an error if `schedule` does not parse.
pub fn upcoming<Tz: TimeZone>(
    schedule: &str,
    from: &DateTime<Tz>,
    count: usize,
) -> Result<Vec<DateTime<Tz>>, CronError> {
    Ok(CronSchedule::parse(schedule)?.upcoming(from, count))
}

/// Normalise a cron expression into the parser's 6-field form.
///
/// - 5 fields: `0` is prepended as the seconds field and numeric
///   day-of-week values are translated from `0-7` (Sunday = 0 or 7).
/// - 6 fields: passed through with whitespace collapsed.
///
/// # Errors
///
/// Returns an error for any other field count or an invalid day-of-week.
pub fn normalize(expr: &str) -> Result<String, CronError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => {
            let dow = translate_day_of_week(expr, fields[4])?;
            Ok(format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], dow
            ))
        }
        6 => Ok(fields.join(" ")),
        found => Err(CronError::FieldCount {
            expr: expr.trim().to_string(),
            found,
        }),
    }
}

/// Normalised parser expressions whose union is `expr`.
///
/// Only a 5-field expression with both day fields restricted yields two:
/// one keyed on day-of-month, one keyed on day-of-week.
fn day_variants(expr: &str) -> Result<Vec<String>, CronError> {
    let normalized = normalize(expr)?;
    let fields: Vec<&str> = normalized.split(' ').collect();
    let five_field = expr.split_whitespace().count() == 5;
    if !five_field || !is_restricted(fields[3]) || !is_restricted(fields[5]) {
        return Ok(vec![normalized]);
    }

    let mut by_month_day = fields.clone();
    by_month_day[5] = "*";
    let mut by_week_day = fields;
    by_week_day[3] = "*";
    Ok(vec![by_month_day.join(" "), by_week_day.join(" ")])
}

/// A day field starting with `*` or `?` (including `*/n`) does not restrict.
fn is_restricted(field: &str) -> bool {
    !field.starts_with('*') && !field.starts_with('?')
}

/// Translate a standard day-of-week field (`0-7`, Sunday = 0 or 7) into the
/// parser's numbering (`1-7`, Sunday = 1). Named days pass through.
fn translate_day_of_week(expr: &str, field: &str) -> Result<String, CronError> {
    let mut days = BTreeSet::new();
    let mut items = Vec::new();

    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, Some(parse_step(expr, step)?)),
            None => (item, None),
        };

        if base.chars().any(|c| c.is_ascii_alphabetic()) {
            items.push(item.to_string());
            continue;
        }

        let (start, end) = match (base, step) {
            ("*" | "?", None) => {
                items.push(item.to_string());
                continue;
            }
            ("*" | "?", Some(_)) => (0, 6),
            _ => match base.split_once('-') {
                Some((a, b)) => (parse_day(expr, a)?, parse_day(expr, b)?),
                None => {
                    let day = parse_day(expr, base)?;
                    (day, if step.is_some() { 7 } else { day })
                }
            },
        };

        if start > end {
            return Err(CronError::Parse {
                expr: expr.trim().to_string(),
                message: format!("day-of-week range '{base}' is reversed"),
            });
        }

        for day in (start..=end).step_by(step.unwrap_or(1)) {
            days.insert(day % 7 + 1);
        }
    }

    items.extend(days.iter().map(u32::to_string));
    Ok(items.join(","))
}

fn parse_day(expr: &str, value: &str) -> Result<u32, CronError> {
    value
        .parse::<u32>()
        .ok()
        .filter(|day| *day <= 7)
        .ok_or_else(|| CronError::Parse {
            expr: expr.trim().to_string(),
            message: format!("day-of-week value '{value}' is not in 0-7"),
        })
}

fn parse_step(expr: &str, value: &str) -> Result<usize, CronError> {
    value
        .parse::<usize>()
        .ok()
        .filter(|step| *step > 0)
        .ok_or_else(|| CronError::Parse {
            expr: expr.trim().to_string(),
            message: format!("invalid step '{value}'"),
        })
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;

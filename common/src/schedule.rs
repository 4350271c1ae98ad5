// Crontab parsing and next fire time calculation
//
// Specifications use the classic crontab layout (minute hour dom month dow).
// They are normalized to the seconds-precision form understood by the `cron`
// crate. A specification may span several lines; the earliest upcoming time
// over all lines wins.

use crate::errors::ScheduleError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::fmt;
use std::str::FromStr;

const DAY_NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// A parsed, validated recurrence.
#[derive(Debug, Clone)]
pub struct CronSpec {
    source: String,
    schedules: Vec<CronSchedule>,
    timezone: Tz,
}

impl CronSpec {
    /// Parse a specification evaluated in UTC.
    pub fn parse(spec: &str) -> Result<Self, ScheduleError> {
        Self::parse_in(spec, default_timezone())
    }

    /// Parse a specification evaluated in `timezone`.
    pub fn parse_in(spec: &str, timezone: Tz) -> Result<Self, ScheduleError> {
        let schedules = spec
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| parse_cron_expression(&normalize_crontab_line(line)))
            .collect::<Result<Vec<_>, _>>()?;

        if schedules.is_empty() {
            return Err(ScheduleError::EmptySpecification);
        }

        Ok(Self {
            source: spec.to_string(),
            schedules,
            timezone,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Earliest fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let reference = after.with_timezone(&self.timezone);
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(&reference).next())
            .map(|next| next.with_timezone(&Utc))
            .min()
    }
}

impl fmt::Display for CronSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source.replace('\n', "\\n"))
    }
}

impl FromStr for CronSpec {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse and validate a seconds-precision cron expression
pub fn parse_cron_expression(expression: &str) -> Result<CronSchedule, ScheduleError> {
    CronSchedule::from_str(expression).map_err(|e| ScheduleError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Turn a five-field crontab line into the seven-field form. Aliases such as
/// `@hourly` and lines that already carry a seconds field pass through.
pub fn normalize_crontab_line(line: &str) -> String {
    if line.starts_with('@') {
        return line.to_string();
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 5 {
        return fields.join(" ");
    }

    // crontab counts weekdays from 0 (or 7) = Sunday, the cron crate from 1
    format!(
        "0 {} {} {} {} {}",
        fields[0],
        fields[1],
        fields[2],
        fields[3],
        translate_day_of_week(fields[4])
    )
}

fn translate_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(translate_day_part)
        .collect::<Vec<_>>()
        .join(",")
}

/// The cron crate numbers weekdays SUN=1..SAT=7, so a crontab range ending
/// at 7 (Sunday) would come out backwards. Such ranges are split into a
/// range ending on Saturday plus Sunday on its own.
fn translate_day_part(part: &str) -> String {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (part, None),
    };
    let suffix = step.map(|step| format!("/{}", step)).unwrap_or_default();

    if let Some((first, last)) = range.split_once('-') {
        if let (Ok(first), Ok(7)) = (first.parse::<usize>(), last.parse::<usize>()) {
            let step_by = step.and_then(|s| s.parse::<usize>().ok()).unwrap_or(1);
            return match first {
                0 => format!("SUN-SAT{}", suffix),
                7 => "SUN".to_string(),
                1..=6 => {
                    let mut days = if first == 6 {
                        "SAT".to_string()
                    } else {
                        format!("{}-SAT{}", DAY_NAMES[first], suffix)
                    };
                    if step_by > 0 && (7 - first) % step_by == 0 {
                        days.push_str(",SUN");
                    }
                    days
                }
                _ => part.to_string(),
            };
        }
    }

    let range = range
        .split('-')
        .map(|token| match token.parse::<usize>() {
            Ok(day) if day < DAY_NAMES.len() => DAY_NAMES[day].to_string(),
            _ => token.to_string(),
        })
        .collect::<Vec<_>>()
        .join("-");
    format!("{}{}", range, suffix)
}

/// Get the default timezone for triggers
pub fn default_timezone() -> Tz {
    chrono_tz::UTC
}

use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Datelike,
  Duration,
  Months,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Timelike,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "daybook-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "DAYBOOK_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "DAYBOOK_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "Europe/Paris";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

#[must_use]
pub fn local_now() -> NaiveDateTime {
  Utc::now()
    .with_timezone(project_timezone())
    .naive_local()
}

#[must_use]
pub fn local_today() -> NaiveDate {
  Utc::now()
    .with_timezone(project_timezone())
    .date_naive()
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_PROJECT_TIMEZONE,
    "DEFAULT_PROJECT_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw =
    match fs::read_to_string(path) {
      | Ok(raw) => raw,
      | Err(err) => {
        tracing::error!(
          file = %path.display(),
          error = %err,
          "failed reading timezone config file"
        );
        return None;
      }
    };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    })?;

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Resolve the calendar date a stop
/// clock time falls on, given the start
/// of the interval. A stop time that
/// would land before the start on the
/// start's own date is taken to be on
/// the following day.
#[must_use]
pub fn infer_stop_date(
  start: NaiveDateTime,
  stop_time: NaiveTime
) -> NaiveDate {
  let candidate =
    start.date().and_time(stop_time);
  let delta = candidate
    .signed_duration_since(start);

  if delta < Duration::zero() {
    start
      .date()
      .checked_add_signed(
        Duration::days(1)
      )
      .unwrap_or(start.date())
  } else {
    start.date()
  }
}

#[must_use]
pub fn infer_stop(
  start: NaiveDateTime,
  stop_time: NaiveTime
) -> NaiveDateTime {
  infer_stop_date(start, stop_time)
    .and_time(stop_time)
}

#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_day_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "yesterday" => {
      return today
        .checked_sub_signed(
          Duration::days(1)
        )
        .ok_or_else(|| {
          anyhow!(
            "no day before {today}"
          )
        });
    }
    | "tomorrow" => {
      return today
        .checked_add_signed(
          Duration::days(1)
        )
        .ok_or_else(|| {
          anyhow!(
            "no day after {today}"
          )
        });
    }
    | _ => {}
  }

  if let Some(weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(weekday_in_week(
      today, weekday
    ));
  }

  if token.len() <= 2
    && token
      .chars()
      .all(|c| c.is_ascii_digit())
  {
    let day: u32 =
      token.parse().context(
        "invalid day-of-month number"
      )?;
    return today
      .with_day(day)
      .ok_or_else(|| {
        anyhow!(
          "no day {day} in {}",
          today.format("%B %Y")
        )
      });
  }

  for fmt in ["%Y-%m-%d", "%d/%m/%Y"] {
    if let Ok(date) =
      NaiveDate::parse_from_str(
        token, fmt
      )
    {
      return Ok(date);
    }
  }

  Err(anyhow!(
    "unrecognized day expression: \
     {input}"
  ))
  .with_context(|| {
    "supported forms: \
     today/yesterday/tomorrow, \
     weekday names (e.g. monday), \
     day-of-month numbers, \
     YYYY-MM-DD, DD/MM/YYYY"
  })
}

#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_period_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let current = first_of_month(today);

  match lower.as_str() {
    | "this" | "current" => {
      return Ok(current);
    }
    | "last" | "previous" => {
      return current
        .checked_sub_months(
          Months::new(1)
        )
        .ok_or_else(|| {
          anyhow!(
            "no month before {current}"
          )
        });
    }
    | "next" => {
      return current
        .checked_add_months(
          Months::new(1)
        )
        .ok_or_else(|| {
          anyhow!(
            "no month after {current}"
          )
        });
    }
    | _ => {}
  }

  if let Some(month) =
    parse_month_name(&lower)
  {
    return NaiveDate::from_ymd_opt(
      today.year(),
      month,
      1
    )
    .ok_or_else(|| {
      anyhow!(
        "invalid month value: {month}"
      )
    });
  }

  if let Some((y, m)) =
    split_numeric_pair(token, '-')
  {
    return NaiveDate::from_ymd_opt(
      y, m, 1
    )
    .ok_or_else(|| {
      anyhow!("invalid month: {token}")
    });
  }

  if let Some((m, y)) =
    split_numeric_pair(token, '/')
  {
    return NaiveDate::from_ymd_opt(
      y as i32,
      m as u32,
      1
    )
    .ok_or_else(|| {
      anyhow!("invalid month: {token}")
    });
  }

  Err(anyhow!(
    "unrecognized month expression: \
     {input}"
  ))
  .with_context(|| {
    "supported forms: \
     this/last/next, month names \
     (e.g. march), YYYY-MM, MM/YYYY"
  })
}

fn split_numeric_pair(
  token: &str,
  sep: char
) -> Option<(i32, u32)> {
  let (left, right) =
    token.split_once(sep)?;
  let left: i32 =
    left.trim().parse().ok()?;
  let right: u32 =
    right.trim().parse().ok()?;
  Some((left, right))
}

pub fn parse_time_expr(
  input: &str
) -> anyhow::Result<NaiveTime> {
  parse_clock_time(input).ok_or_else(
    || {
      anyhow!(
        "unrecognized clock time: \
         {input} (expected HH:MM or \
         e.g. 3:23pm)"
      )
    }
  )
}

pub fn parse_clock_time(
  token: &str
) -> Option<NaiveTime> {
  let clock_re = Regex::new(
    r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$",
  )
  .ok()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = captures
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    let ampm = ampm_match
      .as_str()
      .to_ascii_lowercase();
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    match ampm.as_str() {
      | "am" => {
        if raw_hour == 12 {
          0
        } else {
          raw_hour
        }
      }
      | "pm" => {
        if raw_hour == 12 {
          12
        } else {
          raw_hour + 12
        }
      }
      | _ => return None
    }
  } else {
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  NaiveTime::from_hms_opt(
    hour, minute, 0
  )
}

pub fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn parse_month_name(
  token: &str
) -> Option<u32> {
  match token.trim() {
    | "january" | "jan" => Some(1),
    | "february" | "feb" => Some(2),
    | "march" | "mar" => Some(3),
    | "april" | "apr" => Some(4),
    | "may" => Some(5),
    | "june" | "jun" => Some(6),
    | "july" | "jul" => Some(7),
    | "august" | "aug" => Some(8),
    | "september" | "sep" | "sept" => {
      Some(9)
    }
    | "october" | "oct" => Some(10),
    | "november" | "nov" => Some(11),
    | "december" | "dec" => Some(12),
    | _ => None
  }
}

#[must_use]
pub fn first_of_month(
  date: NaiveDate
) -> NaiveDate {
  date.with_day(1).unwrap_or(date)
}

#[must_use]
pub fn week_start(
  date: NaiveDate
) -> NaiveDate {
  let back = date
    .weekday()
    .num_days_from_monday()
    as i64;
  date
    .checked_sub_signed(Duration::days(
      back
    ))
    .unwrap_or(date)
}

fn weekday_in_week(
  today: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let monday = week_start(today);
  let forward = target
    .num_days_from_monday()
    as i64;
  monday
    .checked_add_signed(Duration::days(
      forward
    ))
    .unwrap_or(today)
}

#[must_use]
pub fn days_in_month(
  period: NaiveDate
) -> u32 {
  let first = first_of_month(period);
  let next = first
    .checked_add_months(Months::new(1))
    .unwrap_or(first);
  next
    .signed_duration_since(first)
    .num_days() as u32
}

#[must_use]
pub fn month_weeks(
  period: NaiveDate
) -> Vec<[u32; 7]> {
  let first = first_of_month(period);
  let lead = first
    .weekday()
    .num_days_from_monday()
    as usize;

  let mut weeks = Vec::new();
  let mut week = [0_u32; 7];
  let mut slot = lead;

  for day in 1..=days_in_month(first) {
    week[slot] = day;
    slot += 1;
    if slot == 7 {
      weeks.push(week);
      week = [0_u32; 7];
      slot = 0;
    }
  }

  if slot > 0 {
    weeks.push(week);
  }

  weeks
}

#[must_use]
pub fn week_from_date(
  date: NaiveDate
) -> u32 {
  for (week_no, week) in
    month_weeks(date)
      .iter()
      .enumerate()
  {
    if week.contains(&date.day()) {
      return week_no as u32 + 1;
    }
  }
  1
}

#[must_use]
pub fn time_to_seconds(
  time: NaiveTime
) -> i64 {
  i64::from(time.hour()) * 3600
    + i64::from(time.minute()) * 60
    + i64::from(time.second())
}

#[must_use]
pub fn format_seconds_clock(
  seconds: i64
) -> String {
  let sign = if seconds < 0 {
    "-"
  } else {
    ""
  };
  let total = seconds.unsigned_abs();
  let (minutes, s) =
    (total / 60, total % 60);
  let (h, m) = (
    minutes / 60,
    minutes % 60
  );
  format!("{sign}{h}:{m:02}:{s:02}")
}

#[must_use]
pub fn display_hour(
  time: NaiveTime
) -> String {
  if time.minute() > 0 {
    format!(
      "{:02}h{:02}",
      time.hour(),
      time.minute()
    )
  } else {
    format!("{:02}h", time.hour())
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    NaiveTime
  };

  use super::{
    display_hour,
    format_seconds_clock,
    infer_stop,
    infer_stop_date,
    month_weeks,
    parse_clock_time,
    parse_day_expr,
    parse_period_expr,
    week_from_date
  };

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0)
      .expect("valid time")
  }

  #[test]
  fn stop_before_start_rolls_to_next_day()
   {
    let start = date(2013, 5, 15)
      .and_time(time(11, 0));
    assert_eq!(
      infer_stop_date(
        start,
        time(2, 0)
      ),
      date(2013, 5, 16)
    );
  }

  #[test]
  fn stop_after_start_stays_same_day()
  {
    let start = date(2013, 5, 15)
      .and_time(time(11, 0));
    assert_eq!(
      infer_stop_date(
        start,
        time(18, 0)
      ),
      date(2013, 5, 15)
    );
  }

  #[test]
  fn rollover_crosses_year_boundary()
  {
    let start = date(2020, 1, 1)
      .and_time(time(23, 30));
    assert_eq!(
      infer_stop_date(
        start,
        time(0, 15)
      ),
      date(2020, 1, 2)
    );
  }

  #[test]
  fn equal_times_stay_on_start_day() {
    let start = date(2021, 2, 28)
      .and_time(time(9, 0));
    assert_eq!(
      infer_stop_date(
        start,
        time(9, 0)
      ),
      date(2021, 2, 28)
    );
    assert_eq!(
      infer_stop_date(
        start,
        time(9, 0)
      ),
      infer_stop_date(
        start,
        time(9, 0)
      )
    );
  }

  #[test]
  fn inferred_stop_keeps_clock_time() {
    let start = date(2013, 5, 15)
      .and_time(time(22, 45));
    let stop =
      infer_stop(start, time(6, 30));
    assert_eq!(
      stop.time(),
      time(6, 30)
    );
    assert_eq!(
      stop.date(),
      date(2013, 5, 16)
    );
  }

  #[test]
  fn parses_clock_times() {
    assert_eq!(
      parse_clock_time("09:30"),
      Some(time(9, 30))
    );
    assert_eq!(
      parse_clock_time("3:23pm"),
      Some(time(15, 23))
    );
    assert_eq!(
      parse_clock_time("12:05am"),
      Some(time(0, 5))
    );
    assert_eq!(
      parse_clock_time("25:00"),
      None
    );
  }

  #[test]
  fn parses_day_expressions() {
    let today = date(2026, 2, 17);
    assert_eq!(
      parse_day_expr("today", today)
        .expect("parse today"),
      today
    );
    assert_eq!(
      parse_day_expr("monday", today)
        .expect("parse weekday"),
      date(2026, 2, 16)
    );
    assert_eq!(
      parse_day_expr("5", today)
        .expect("parse day number"),
      date(2026, 2, 5)
    );
    assert_eq!(
      parse_day_expr(
        "15/05/2013",
        today
      )
      .expect("parse dd/mm/yyyy"),
      date(2013, 5, 15)
    );
  }

  #[test]
  fn parses_period_expressions() {
    let today = date(2026, 2, 17);
    assert_eq!(
      parse_period_expr("this", today)
        .expect("parse this"),
      date(2026, 2, 1)
    );
    assert_eq!(
      parse_period_expr("last", today)
        .expect("parse last"),
      date(2026, 1, 1)
    );
    assert_eq!(
      parse_period_expr(
        "march", today
      )
      .expect("parse month name"),
      date(2026, 3, 1)
    );
    assert_eq!(
      parse_period_expr(
        "2025-11",
        today
      )
      .expect("parse yyyy-mm"),
      date(2025, 11, 1)
    );
  }

  #[test]
  fn month_grid_pads_leading_days() {
    let weeks =
      month_weeks(date(2013, 5, 1));
    assert_eq!(weeks[0],
      [0, 0, 1, 2, 3, 4, 5]);
    assert_eq!(
      week_from_date(date(
        2013, 5, 15
      )),
      3
    );
  }

  #[test]
  fn formats_seconds_and_hours() {
    assert_eq!(
      format_seconds_clock(55_321),
      "15:22:01"
    );
    assert_eq!(
      format_seconds_clock(-60),
      "-0:01:00"
    );
    assert_eq!(
      display_hour(time(8, 0)),
      "08h"
    );
    assert_eq!(
      display_hour(time(18, 59)),
      "18h59"
    );
  }
}

pub mod day_stamp_serde {
  use chrono::NaiveDateTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  const FORMAT: &str =
    "%Y-%m-%dT%H:%M";

  pub fn serialize<S>(
    dt: &NaiveDateTime,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.format(FORMAT).to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDateTime, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    NaiveDateTime::parse_from_str(
      &raw, FORMAT
    )
    .map_err(serde::de::Error::custom)
  }
}

pub mod period_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    period: &NaiveDate,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &period
        .format("%Y-%m")
        .to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDate, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    NaiveDate::parse_from_str(
      &format!("{raw}-01"),
      "%Y-%m-%d"
    )
    .map_err(serde::de::Error::custom)
  }
}

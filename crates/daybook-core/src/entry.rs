use anyhow::anyhow;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::{
    self, day_stamp_serde, display_hour, first_of_month, format_seconds_clock, time_to_seconds,
};

pub const MAX_CONTENT_LEN: usize = 500;

/// One author's ledger for one calendar month. Day entries are created
/// lazily as days get filled, so a fresh datebook holds none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datebook {
    pub uuid: Uuid,

    pub author: String,

    #[serde(with = "crate::datetime::period_serde")]
    pub period: NaiveDate,

    #[serde(default)]
    pub notes: String,

    #[serde(with = "day_stamp_serde")]
    pub created: NaiveDateTime,

    #[serde(with = "day_stamp_serde")]
    pub modified: NaiveDateTime,
}

impl Datebook {
    pub fn new(author: String, period: NaiveDate, now: NaiveDateTime) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            author,
            period: first_of_month(period),
            notes: String::new(),
            created: now,
            modified: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayEntry {
    pub uuid: Uuid,

    pub datebook: Uuid,

    pub activity_date: NaiveDate,

    #[serde(with = "day_stamp_serde")]
    pub start: NaiveDateTime,

    #[serde(with = "day_stamp_serde")]
    pub stop: NaiveDateTime,

    pub pause: NaiveTime,

    pub overtime: NaiveTime,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub vacation: bool,
}

impl DayEntry {
    pub fn new(
        datebook: Uuid,
        activity_date: NaiveDate,
        start_time: NaiveTime,
        stop_time: NaiveTime,
    ) -> Self {
        let start = activity_date.and_time(start_time);
        Self {
            uuid: Uuid::new_v4(),
            datebook,
            activity_date,
            start,
            stop: datetime::infer_stop(start, stop_time),
            pause: midnight(),
            overtime: midnight(),
            content: String::new(),
            vacation: false,
        }
    }

    /// Seconds between start and stop with the pause subtracted.
    pub fn elapsed_seconds(&self) -> i64 {
        self.stop.signed_duration_since(self.start).num_seconds() - time_to_seconds(self.pause)
    }

    /// Seconds that count toward worked totals. Vacation days keep their
    /// recorded times but contribute nothing.
    pub fn worked_seconds(&self) -> i64 {
        if self.vacation {
            0
        } else {
            self.elapsed_seconds()
        }
    }

    pub fn elapsed_clock(&self) -> String {
        format_seconds_clock(self.elapsed_seconds())
    }

    pub fn overtime_seconds(&self) -> i64 {
        time_to_seconds(self.overtime)
    }

    pub fn overtime_clock(&self) -> String {
        format_seconds_clock(self.overtime_seconds())
    }

    /// Working hours like "09h to 18h59".
    pub fn working_hours(&self) -> String {
        format!(
            "{} to {}",
            display_hour(self.start.time()),
            display_hour(self.stop.time())
        )
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.start.date() < self.activity_date {
            return Err(anyhow!("a day can't start before itself"));
        }
        if self.start.date() > self.activity_date {
            return Err(anyhow!("a day can't start after itself"));
        }
        if self.stop <= self.start {
            return Err(anyhow!("stop time can't be less or equal to start time"));
        }

        let next_day = self
            .activity_date
            .checked_add_signed(Duration::days(1))
            .unwrap_or(self.activity_date);
        if self.stop.date() > next_day {
            return Err(anyhow!("stop time can't run past the next day"));
        }

        let span = self.stop.signed_duration_since(self.start).num_seconds();
        if time_to_seconds(self.pause) > span {
            return Err(anyhow!("pause time can't exceed the time between start and stop"));
        }

        if self.content.chars().count() > MAX_CONTENT_LEN {
            return Err(anyhow!("content is limited to {MAX_CONTENT_LEN} characters"));
        }

        Ok(())
    }
}

/// Reusable day template, unique per (author, title).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayModel {
    pub uuid: Uuid,

    pub author: String,

    pub title: String,

    pub start_time: NaiveTime,

    pub stop_time: NaiveTime,

    pub pause: NaiveTime,

    pub overtime: NaiveTime,

    #[serde(default)]
    pub content: String,
}

impl DayModel {
    pub fn new(author: String, title: String, start_time: NaiveTime, stop_time: NaiveTime) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            author,
            title,
            start_time,
            stop_time,
            pause: midnight(),
            overtime: midnight(),
            content: String::new(),
        }
    }

    /// Start and stop instants the model produces for a target date. The
    /// stop date is inferred from the clock times, so a template crossing
    /// midnight lands its stop on the next day.
    pub fn apply_to(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let start = date.and_time(self.start_time);
        (start, datetime::infer_stop(start, self.stop_time))
    }
}

fn midnight() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default()
}

/// Aggregated totals over a set of day entries. Vacation days are counted
/// but contribute neither worked nor overtime seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonthTotals {
    pub days_worked: u64,
    pub vacation_days: u64,
    pub worked_seconds: i64,
    pub overtime_seconds: i64,
}

impl MonthTotals {
    pub fn collect<'a, I>(entries: I) -> Self
    where
        I: Iterator<Item = &'a DayEntry>,
    {
        let mut totals = Self::default();
        for entry in entries {
            if entry.vacation {
                totals.vacation_days += 1;
                continue;
            }
            totals.days_worked += 1;
            totals.worked_seconds += entry.worked_seconds();
            totals.overtime_seconds += entry.overtime_seconds();
        }
        totals
    }

    pub fn absorb(&mut self, other: &Self) {
        self.days_worked += other.days_worked;
        self.vacation_days += other.vacation_days;
        self.worked_seconds += other.worked_seconds;
        self.overtime_seconds += other.overtime_seconds;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use uuid::Uuid;

    use super::{DayEntry, DayModel};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
    }

    fn entry(start: (u32, u32), stop: (u32, u32)) -> DayEntry {
        DayEntry::new(
            Uuid::new_v4(),
            date(2026, 2, 17),
            time(start.0, start.1),
            time(stop.0, stop.1),
        )
    }

    #[test]
    fn elapsed_subtracts_pause() {
        let mut day = entry((9, 0), (18, 0));
        day.pause = time(1, 0);
        assert_eq!(day.elapsed_seconds(), 8 * 3600);
        assert_eq!(day.elapsed_clock(), "8:00:00");
    }

    #[test]
    fn vacation_days_count_zero_worked_time() {
        let mut day = entry((9, 0), (18, 0));
        day.vacation = true;
        assert_eq!(day.worked_seconds(), 0);
        assert_ne!(day.elapsed_seconds(), 0);
    }

    #[test]
    fn night_shift_stop_lands_on_next_day() {
        let day = entry((22, 0), (6, 0));
        assert_eq!(day.stop.date(), date(2026, 2, 18));
        assert_eq!(day.elapsed_seconds(), 8 * 3600);
        assert!(day.validate().is_ok());
    }

    #[test]
    fn validation_rejects_zero_length_days() {
        let day = entry((9, 0), (9, 0));
        assert!(day.validate().is_err());
    }

    #[test]
    fn validation_rejects_start_off_its_day() {
        let mut day = entry((9, 0), (18, 0));
        day.start = date(2026, 2, 16).and_time(time(9, 0));
        assert!(day.validate().is_err());
    }

    #[test]
    fn validation_rejects_oversized_pause() {
        let mut day = entry((9, 0), (10, 0));
        day.pause = time(2, 0);
        assert!(day.validate().is_err());
    }

    #[test]
    fn model_application_crosses_midnight() {
        let model = DayModel::new(
            "ann".to_string(),
            "night shift".to_string(),
            time(23, 30),
            time(0, 15),
        );
        let (start, stop) = model.apply_to(date(2020, 1, 1));
        assert_eq!(start, date(2020, 1, 1).and_time(time(23, 30)));
        assert_eq!(stop, date(2020, 1, 2).and_time(time(0, 15)));
    }

    #[test]
    fn working_hours_display() {
        let day = entry((8, 0), (18, 59));
        assert_eq!(day.working_hours(), "08h to 18h59");
    }
}

use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{format_seconds_clock, month_weeks, week_from_date};
use crate::entry::{Datebook, DayEntry, DayModel, MonthTotals};

const WEEKDAY_LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, rows, today))]
    pub fn print_entry_table(
        &mut self,
        rows: &[(&DayEntry, &Datebook)],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "Day".to_string(),
            "Author".to_string(),
            "Hours".to_string(),
            "Length".to_string(),
            "Overtime".to_string(),
            "Content".to_string(),
        ];

        let mut table_rows = Vec::with_capacity(rows.len());

        for (entry, book) in rows {
            let day = entry.activity_date.format("%Y-%m-%d").to_string();
            let day = if entry.activity_date == today {
                self.paint(&day, "33")
            } else {
                day
            };

            let hours = if entry.vacation {
                self.paint("vacation", "31")
            } else {
                entry.working_hours()
            };

            let length = if entry.vacation {
                String::new()
            } else {
                entry.elapsed_clock()
            };

            let overtime = if entry.overtime_seconds() > 0 {
                entry.overtime_clock()
            } else {
                String::new()
            };

            table_rows.push(vec![
                day,
                book.author.clone(),
                hours,
                length,
                overtime,
                entry.content.clone(),
            ]);
        }

        write_table(&mut out, headers, table_rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, entry, book))]
    pub fn print_entry_info(&mut self, entry: &DayEntry, book: &Datebook) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "day       {}", entry.activity_date.format("%Y-%m-%d"))?;
        writeln!(out, "author    {}", book.author)?;
        writeln!(out, "month     {}", book.period.format("%B %Y"))?;
        writeln!(out, "week      {}", week_from_date(entry.activity_date))?;
        writeln!(out, "start     {}", entry.start.format("%Y-%m-%d %H:%M"))?;
        writeln!(out, "stop      {}", entry.stop.format("%Y-%m-%d %H:%M"))?;
        writeln!(out, "hours     {}", entry.working_hours())?;
        writeln!(out, "length    {}", entry.elapsed_clock())?;
        writeln!(out, "pause     {}", entry.pause.format("%H:%M"))?;
        writeln!(out, "overtime  {}", entry.overtime.format("%H:%M"))?;
        writeln!(out, "vacation  {}", if entry.vacation { "yes" } else { "no" })?;
        if !entry.content.is_empty() {
            writeln!(out, "content   {}", entry.content)?;
        }
        writeln!(out, "uuid      {}", entry.uuid)?;

        Ok(())
    }

    /// Month grid in the shape of a wall calendar: one row per week, one
    /// column per weekday, each filled cell carrying the day number and
    /// either its elapsed clock or a vacation marker.
    #[tracing::instrument(skip(self, book, entries, today))]
    pub fn print_month_calendar(
        &mut self,
        book: &Datebook,
        entries: &[&DayEntry],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(
            out,
            "{} ({})",
            book.period.format("%B %Y"),
            book.author
        )?;

        let mut headers = vec!["Wk".to_string()];
        headers.extend(WEEKDAY_LABELS.iter().map(ToString::to_string));

        let mut rows = Vec::new();
        for (week_no, week) in month_weeks(book.period).iter().enumerate() {
            let mut row = vec![format!("{}", week_no + 1)];
            for day in week {
                row.push(self.format_day_cell(book, entries, today, *day));
            }
            rows.push(row);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    fn format_day_cell(
        &self,
        book: &Datebook,
        entries: &[&DayEntry],
        today: NaiveDate,
        day: u32,
    ) -> String {
        if day == 0 {
            return String::new();
        }

        let date = book.period.with_day(day).unwrap_or(book.period);
        let entry = entries.iter().find(|entry| entry.activity_date == date);

        let cell = match entry {
            Some(entry) if entry.vacation => format!("{day:2} vac"),
            Some(entry) => format!("{day:2} {}", short_clock(entry.elapsed_seconds())),
            None => format!("{day:2}"),
        };

        if date == today {
            self.paint(&cell, "33")
        } else if entry.is_some_and(|entry| entry.vacation) {
            self.paint(&cell, "31")
        } else {
            cell
        }
    }

    #[tracing::instrument(skip(self, book, totals))]
    pub fn print_month_summary(
        &mut self,
        book: &Datebook,
        totals: &MonthTotals,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(
            out,
            "{} day(s) worked, {} vacation day(s), {} worked, {} overtime",
            totals.days_worked,
            totals.vacation_days,
            format_seconds_clock(totals.worked_seconds),
            format_seconds_clock(totals.overtime_seconds),
        )?;

        if !book.notes.is_empty() {
            writeln!(out, "notes: {}", book.notes)?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, rows))]
    pub fn print_year_summary(
        &mut self,
        author: &str,
        year: i32,
        rows: &[(NaiveDate, MonthTotals)],
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "{year} ({author})")?;

        let headers = vec![
            "Month".to_string(),
            "Days".to_string(),
            "Vacation".to_string(),
            "Worked".to_string(),
            "Overtime".to_string(),
        ];

        let mut table_rows = Vec::with_capacity(rows.len());
        let mut year_totals = MonthTotals::default();

        for (period, totals) in rows {
            table_rows.push(vec![
                period.format("%B").to_string(),
                totals.days_worked.to_string(),
                totals.vacation_days.to_string(),
                format_seconds_clock(totals.worked_seconds),
                format_seconds_clock(totals.overtime_seconds),
            ]);
            year_totals.absorb(totals);
        }

        table_rows.push(vec![
            "Total".to_string(),
            year_totals.days_worked.to_string(),
            year_totals.vacation_days.to_string(),
            format_seconds_clock(year_totals.worked_seconds),
            format_seconds_clock(year_totals.overtime_seconds),
        ]);

        write_table(&mut out, headers, table_rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, models))]
    pub fn print_model_table(&mut self, models: &[&DayModel]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "Title".to_string(),
            "Start".to_string(),
            "Stop".to_string(),
            "Pause".to_string(),
            "Overtime".to_string(),
            "Content".to_string(),
        ];

        let rows: Vec<Vec<String>> = models
            .iter()
            .map(|model| {
                vec![
                    model.title.clone(),
                    model.start_time.format("%H:%M").to_string(),
                    model.stop_time.format("%H:%M").to_string(),
                    model.pause.format("%H:%M").to_string(),
                    model.overtime.format("%H:%M").to_string(),
                    model.content.clone(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Elapsed time as H:MM, compact enough for a calendar cell.
fn short_clock(seconds: i64) -> String {
    let minutes = seconds / 60;
    format!("{}:{:02}", minutes / 60, minutes % 60)
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(visible_width(header));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(visible_width(cell));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let padding = widths[idx].saturating_sub(visible_width(cell));
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn visible_width(cell: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(cell).as_str())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use uuid::Uuid;

    use super::{short_clock, strip_ansi, write_table};
    use crate::entry::{DayEntry, MonthTotals};

    #[test]
    fn short_clock_drops_seconds() {
        assert_eq!(short_clock(8 * 3600 + 30 * 60 + 59), "8:30");
        assert_eq!(short_clock(0), "0:00");
    }

    #[test]
    fn strip_ansi_removes_color_codes() {
        assert_eq!(strip_ansi("\x1b[33m17 8:00\x1b[0m"), "17 8:00");
    }

    #[test]
    fn table_pads_columns_to_widest_cell() {
        let mut out = Vec::new();
        write_table(
            &mut out,
            vec!["A".to_string(), "B".to_string()],
            vec![vec!["wide cell".to_string(), "x".to_string()]],
        )
        .expect("write table");

        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "A         B ");
        assert_eq!(lines[2], "wide cell x ");
    }

    #[test]
    fn month_totals_skip_vacation_days() {
        let mut worked = DayEntry::new(
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2026, 2, 17).expect("valid date"),
            NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
            NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
        );
        worked.overtime = NaiveTime::from_hms_opt(1, 0, 0).expect("valid time");

        let mut rest = worked.clone();
        rest.vacation = true;

        let totals = MonthTotals::collect([&worked, &rest].into_iter());
        assert_eq!(totals.days_worked, 1);
        assert_eq!(totals.vacation_days, 1);
        assert_eq!(totals.worked_seconds, 9 * 3600);
        assert_eq!(totals.overtime_seconds, 3600);
    }
}

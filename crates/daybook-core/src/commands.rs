use std::io::{self, Read};

use anyhow::{Context, anyhow};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::DataStore;
use crate::datetime::{
    first_of_month, infer_stop, local_now, parse_day_expr, parse_period_expr, parse_time_expr,
    week_start,
};
use crate::entry::{Datebook, DayEntry, DayModel, MAX_CONTENT_LEN, MonthTotals};
use crate::filter::Filter;
use crate::render::Renderer;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "fill",
        "modify",
        "vacation",
        "remove",
        "info",
        "list",
        "month",
        "week",
        "year",
        "notes",
        "model",
        "assign",
        "author",
        "undo",
        "export",
        "import",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = local_now();
    let today = now.date();
    let command = inv.command.as_str();

    debug!(
        command,
        filter = ?inv.filter_terms,
        args = ?inv.command_args,
        "dispatching command"
    );

    match command {
        "fill" => cmd_fill(store, cfg, &inv.command_args, now),
        "modify" => cmd_modify(store, cfg, &inv.command_args, now),
        "vacation" => cmd_vacation(store, cfg, &inv.command_args, now),
        "remove" => cmd_remove(store, cfg, &inv.command_args, now),
        "info" => cmd_info(store, cfg, renderer, &inv.command_args, today),
        "list" => cmd_list(store, renderer, &inv.filter_terms, today),
        "month" => cmd_month(store, cfg, renderer, &inv.command_args, today),
        "week" => cmd_week(store, cfg, renderer, &inv.command_args, today),
        "year" => cmd_year(store, cfg, renderer, &inv.command_args, today),
        "notes" => cmd_notes(store, cfg, &inv.command_args, now),
        "model" => cmd_model(store, cfg, renderer, &inv.command_args),
        "assign" => cmd_assign(store, cfg, &inv.command_args, now),
        "author" => cmd_author(store, cfg, &inv.command_args),
        "undo" => cmd_undo(store),
        "export" => cmd_export(store, &inv.filter_terms, today),
        "import" => cmd_import(store, now),
        "_commands" => cmd_commands(),
        "_show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_fill(
    store: &mut DataStore,
    cfg: &Config,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command fill");

    let day_token = args
        .first()
        .ok_or_else(|| anyhow!("fill requires a day argument"))?;
    let day = parse_day_expr(day_token, now.date())?;
    let (mods, content) = parse_mods(&args[1..])?;

    let author = resolve_author(store, cfg)?;
    let mut datebooks = store.load_datebooks()?;
    let mut entries = store.load_entries()?;
    let models = store.load_models()?;
    let datebooks_before = datebooks.clone();
    let entries_before = entries.clone();

    let book_uuid = store.ensure_datebook(&mut datebooks, &author, day, now);
    let (default_start, default_stop) = default_times(cfg)?;

    let mut entry = entries
        .iter()
        .find(|row| row.datebook == book_uuid && row.activity_date == day)
        .cloned()
        .unwrap_or_else(|| DayEntry::new(book_uuid, day, default_start, default_stop));

    apply_mods(&mut entry, &mods, content);
    entry.validate()?;

    let replaced = store.upsert_entry(&mut entries, entry);
    touch_datebook(&mut datebooks, book_uuid, now);

    store.push_undo_snapshot(&datebooks_before, &entries_before, &models)?;
    store.save_datebooks(&datebooks)?;
    store.save_entries(&entries)?;

    if replaced {
        println!("Updated day {day}.");
    } else {
        println!("Filled day {day}.");
    }
    Ok(())
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_modify(
    store: &mut DataStore,
    cfg: &Config,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command modify");

    let day_token = args
        .first()
        .ok_or_else(|| anyhow!("modify requires a day argument"))?;
    let day = parse_day_expr(day_token, now.date())?;
    let (mods, content) = parse_mods(&args[1..])?;
    if mods.is_empty() && content.is_none() {
        return Err(anyhow!("modify requires at least one modification"));
    }

    let author = resolve_author(store, cfg)?;
    let mut datebooks = store.load_datebooks()?;
    let mut entries = store.load_entries()?;
    let models = store.load_models()?;
    let datebooks_before = datebooks.clone();
    let entries_before = entries.clone();

    let book = find_book(&datebooks, &author, day)
        .ok_or_else(|| anyhow!("no datebook for {} ({author})", day.format("%Y-%m")))?;
    let book_uuid = book.uuid;

    let mut entry = entries
        .iter()
        .find(|row| row.datebook == book_uuid && row.activity_date == day)
        .cloned()
        .ok_or_else(|| anyhow!("no entry for {day}"))?;

    apply_mods(&mut entry, &mods, content);
    entry.validate()?;

    store.upsert_entry(&mut entries, entry);
    touch_datebook(&mut datebooks, book_uuid, now);

    store.push_undo_snapshot(&datebooks_before, &entries_before, &models)?;
    store.save_datebooks(&datebooks)?;
    store.save_entries(&entries)?;

    println!("Modified day {day}.");
    Ok(())
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_vacation(
    store: &mut DataStore,
    cfg: &Config,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command vacation");

    let day_token = args
        .first()
        .ok_or_else(|| anyhow!("vacation requires a day argument"))?;
    let day = parse_day_expr(day_token, now.date())?;

    let requested = match args.get(1).map(|arg| arg.to_ascii_lowercase()) {
        None => None,
        Some(value) if value == "on" => Some(true),
        Some(value) if value == "off" => Some(false),
        Some(other) => return Err(anyhow!("vacation takes 'on' or 'off', got: {other}")),
    };

    let author = resolve_author(store, cfg)?;
    let mut datebooks = store.load_datebooks()?;
    let mut entries = store.load_entries()?;
    let models = store.load_models()?;
    let datebooks_before = datebooks.clone();
    let entries_before = entries.clone();

    let book_uuid = store.ensure_datebook(&mut datebooks, &author, day, now);
    let (default_start, default_stop) = default_times(cfg)?;

    let mut entry = entries
        .iter()
        .find(|row| row.datebook == book_uuid && row.activity_date == day)
        .cloned()
        .unwrap_or_else(|| DayEntry::new(book_uuid, day, default_start, default_stop));

    entry.vacation = requested.unwrap_or(!entry.vacation);
    let vacation = entry.vacation;

    store.upsert_entry(&mut entries, entry);
    touch_datebook(&mut datebooks, book_uuid, now);

    store.push_undo_snapshot(&datebooks_before, &entries_before, &models)?;
    store.save_datebooks(&datebooks)?;
    store.save_entries(&entries)?;

    if vacation {
        println!("Marked {day} as vacation.");
    } else {
        println!("Cleared vacation on {day}.");
    }
    Ok(())
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_remove(
    store: &mut DataStore,
    cfg: &Config,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command remove");

    let day_token = args
        .first()
        .ok_or_else(|| anyhow!("remove requires a day argument"))?;
    let day = parse_day_expr(day_token, now.date())?;

    let author = resolve_author(store, cfg)?;
    let mut datebooks = store.load_datebooks()?;
    let mut entries = store.load_entries()?;
    let models = store.load_models()?;
    let datebooks_before = datebooks.clone();
    let entries_before = entries.clone();

    let book = find_book(&datebooks, &author, day)
        .ok_or_else(|| anyhow!("no datebook for {} ({author})", day.format("%Y-%m")))?;
    let book_uuid = book.uuid;

    let before = entries.len();
    entries.retain(|row| !(row.datebook == book_uuid && row.activity_date == day));
    if entries.len() == before {
        return Err(anyhow!("no entry for {day}"));
    }

    touch_datebook(&mut datebooks, book_uuid, now);

    store.push_undo_snapshot(&datebooks_before, &entries_before, &models)?;
    store.save_datebooks(&datebooks)?;
    store.save_entries(&entries)?;

    println!("Removed day {day}.");
    Ok(())
}

#[instrument(skip(store, cfg, renderer, args, today))]
fn cmd_info(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command info");

    let day = match args.first() {
        Some(token) => parse_day_expr(token, today)?,
        None => today,
    };

    let author = resolve_author(store, cfg)?;
    let datebooks = store.load_datebooks()?;
    let entries = store.load_entries()?;

    let book = find_book(&datebooks, &author, day)
        .ok_or_else(|| anyhow!("no datebook for {} ({author})", day.format("%Y-%m")))?;

    let entry = entries
        .iter()
        .find(|row| row.datebook == book.uuid && row.activity_date == day)
        .ok_or_else(|| anyhow!("no entry for {day}"))?;

    renderer.print_entry_info(entry, book)?;
    Ok(())
}

#[instrument(skip(store, renderer, filter_terms, today))]
fn cmd_list(
    store: &mut DataStore,
    renderer: &mut Renderer,
    filter_terms: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command list");

    let datebooks = store.load_datebooks()?;
    let entries = store.load_entries()?;
    let filter = Filter::parse(filter_terms, today)?;

    let mut rows: Vec<(&DayEntry, &Datebook)> = entries
        .iter()
        .filter_map(|entry| {
            datebooks
                .iter()
                .find(|book| book.uuid == entry.datebook)
                .map(|book| (entry, book))
        })
        .filter(|(entry, book)| filter.matches(entry, book, today))
        .collect();

    rows.sort_by_key(|(entry, book)| (entry.activity_date, book.author.clone()));
    renderer.print_entry_table(&rows, today)?;
    Ok(())
}

#[instrument(skip(store, cfg, renderer, args, today))]
fn cmd_month(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command month");

    let period = match args.first() {
        Some(token) => parse_period_expr(token, today)?,
        None => first_of_month(today),
    };

    let author = resolve_author(store, cfg)?;
    let datebooks = store.load_datebooks()?;
    let entries = store.load_entries()?;

    let Some(book) = find_book(&datebooks, &author, period) else {
        println!("No datebook for {} ({author}).", period.format("%Y-%m"));
        return Ok(());
    };

    let month_entries: Vec<&DayEntry> = entries
        .iter()
        .filter(|entry| entry.datebook == book.uuid)
        .collect();

    renderer.print_month_calendar(book, &month_entries, today)?;

    let totals = MonthTotals::collect(month_entries.iter().copied());
    renderer.print_month_summary(book, &totals)?;
    Ok(())
}

#[instrument(skip(store, cfg, renderer, args, today))]
fn cmd_week(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command week");

    let day = match args.first() {
        Some(token) => parse_day_expr(token, today)?,
        None => today,
    };
    let monday = week_start(day);
    let sunday = monday + chrono::Duration::days(6);

    let author = resolve_author(store, cfg)?;
    let datebooks = store.load_datebooks()?;
    let entries = store.load_entries()?;

    let mut rows: Vec<(&DayEntry, &Datebook)> = entries
        .iter()
        .filter(|entry| entry.activity_date >= monday && entry.activity_date <= sunday)
        .filter_map(|entry| {
            datebooks
                .iter()
                .find(|book| book.uuid == entry.datebook && book.author == author)
                .map(|book| (entry, book))
        })
        .collect();

    rows.sort_by_key(|(entry, _)| entry.activity_date);

    println!(
        "week of {} to {}",
        monday.format("%Y-%m-%d"),
        sunday.format("%Y-%m-%d")
    );
    renderer.print_entry_table(&rows, today)?;
    Ok(())
}

#[instrument(skip(store, cfg, renderer, args, today))]
fn cmd_year(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command year");

    let year = match args.first() {
        Some(token) => token
            .parse::<i32>()
            .with_context(|| format!("invalid year: {token}"))?,
        None => today.year(),
    };

    let author = resolve_author(store, cfg)?;
    let datebooks = store.load_datebooks()?;
    let entries = store.load_entries()?;

    let mut rows: Vec<(NaiveDate, MonthTotals)> = Vec::new();
    for book in datebooks
        .iter()
        .filter(|book| book.author == author && book.period.year() == year)
    {
        let totals = MonthTotals::collect(
            entries
                .iter()
                .filter(|entry| entry.datebook == book.uuid),
        );
        rows.push((book.period, totals));
    }

    if rows.is_empty() {
        println!("No datebooks for {year} ({author}).");
        return Ok(());
    }

    rows.sort_by_key(|(period, _)| *period);
    renderer.print_year_summary(&author, year, &rows)?;
    Ok(())
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_notes(
    store: &mut DataStore,
    cfg: &Config,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command notes");

    let period_token = args
        .first()
        .ok_or_else(|| anyhow!("notes requires a month argument"))?;
    let period = parse_period_expr(period_token, now.date())?;
    let text = args[1..].join(" ");

    let author = resolve_author(store, cfg)?;
    let mut datebooks = store.load_datebooks()?;

    if text.is_empty() {
        let book = find_book(&datebooks, &author, period)
            .ok_or_else(|| anyhow!("no datebook for {} ({author})", period.format("%Y-%m")))?;
        if book.notes.is_empty() {
            println!("No notes for {}.", period.format("%Y-%m"));
        } else {
            println!("{}", book.notes);
        }
        return Ok(());
    }

    if text.chars().count() > MAX_CONTENT_LEN {
        return Err(anyhow!("notes are limited to {MAX_CONTENT_LEN} characters"));
    }

    let entries = store.load_entries()?;
    let models = store.load_models()?;
    let datebooks_before = datebooks.clone();

    let book_uuid = store.ensure_datebook(&mut datebooks, &author, period, now);
    for book in &mut datebooks {
        if book.uuid == book_uuid {
            book.notes = text.clone();
            book.modified = now;
        }
    }

    store.push_undo_snapshot(&datebooks_before, &entries, &models)?;
    store.save_datebooks(&datebooks)?;

    println!("Updated notes for {}.", period.format("%Y-%m"));
    Ok(())
}

#[instrument(skip(store, cfg, renderer, args))]
fn cmd_model(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command model");

    let sub = args
        .first()
        .map(|arg| arg.to_ascii_lowercase())
        .unwrap_or_else(|| "list".to_string());

    match sub.as_str() {
        "list" => cmd_model_list(store, cfg, renderer),
        "add" => cmd_model_add(store, cfg, &args[1..]),
        "remove" => cmd_model_remove(store, cfg, &args[1..]),
        other => Err(anyhow!("unknown model subcommand: {other}")),
    }
}

#[instrument(skip(store, cfg, renderer))]
fn cmd_model_list(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
) -> anyhow::Result<()> {
    let author = resolve_author(store, cfg)?;
    let models = store.load_models()?;

    let rows: Vec<&DayModel> = models
        .iter()
        .filter(|model| model.author == author)
        .collect();

    renderer.print_model_table(&rows)?;
    Ok(())
}

#[instrument(skip(store, cfg, args))]
fn cmd_model_add(store: &mut DataStore, cfg: &Config, args: &[String]) -> anyhow::Result<()> {
    let title = args
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("model add requires a title"))?;
    let (mods, content) = parse_mods(&args[1..])?;

    let author = resolve_author(store, cfg)?;
    let datebooks = store.load_datebooks()?;
    let entries = store.load_entries()?;
    let mut models = store.load_models()?;
    let models_before = models.clone();

    let (default_start, default_stop) = default_times(cfg)?;
    let mut model = models
        .iter()
        .find(|model| model.author == author && model.title == title)
        .cloned()
        .unwrap_or_else(|| {
            DayModel::new(author.clone(), title.clone(), default_start, default_stop)
        });

    for one_mod in &mods {
        match one_mod {
            Mod::Start(time) => model.start_time = *time,
            Mod::Stop(time) => model.stop_time = *time,
            Mod::Pause(time) => model.pause = *time,
            Mod::Overtime(time) => model.overtime = *time,
            Mod::Vacation(_) => {
                return Err(anyhow!("day models have no vacation flag"));
            }
        }
    }
    if let Some(content) = content {
        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(anyhow!("content is limited to {MAX_CONTENT_LEN} characters"));
        }
        model.content = content;
    }

    models.retain(|row| !(row.author == author && row.title == title));
    models.push(model);
    models.sort_by(|a, b| (&a.author, &a.title).cmp(&(&b.author, &b.title)));

    store.push_undo_snapshot(&datebooks, &entries, &models_before)?;
    store.save_models(&models)?;

    println!("Saved model '{title}'.");
    Ok(())
}

#[instrument(skip(store, cfg, args))]
fn cmd_model_remove(store: &mut DataStore, cfg: &Config, args: &[String]) -> anyhow::Result<()> {
    let title = args
        .first()
        .ok_or_else(|| anyhow!("model remove requires a title"))?;

    let author = resolve_author(store, cfg)?;
    let datebooks = store.load_datebooks()?;
    let entries = store.load_entries()?;
    let mut models = store.load_models()?;
    let models_before = models.clone();

    let before = models.len();
    models.retain(|row| !(row.author == author && &row.title == title));
    if models.len() == before {
        return Err(anyhow!("no model titled '{title}'"));
    }

    store.push_undo_snapshot(&datebooks, &entries, &models_before)?;
    store.save_models(&models)?;

    println!("Removed model '{title}'.");
    Ok(())
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_assign(
    store: &mut DataStore,
    cfg: &Config,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command assign");

    let title = args
        .first()
        .ok_or_else(|| anyhow!("assign requires a model title"))?;
    if args.len() < 2 {
        return Err(anyhow!("assign requires at least one day"));
    }

    let author = resolve_author(store, cfg)?;
    let mut datebooks = store.load_datebooks()?;
    let mut entries = store.load_entries()?;
    let models = store.load_models()?;
    let datebooks_before = datebooks.clone();
    let entries_before = entries.clone();

    let model = models
        .iter()
        .find(|model| model.author == author && &model.title == title)
        .cloned()
        .ok_or_else(|| anyhow!("no model titled '{title}'"))?;

    let mut assigned = 0_u64;
    for day_token in &args[1..] {
        let day = parse_day_expr(day_token, now.date())?;
        let book_uuid = store.ensure_datebook(&mut datebooks, &author, day, now);

        let (start, stop) = model.apply_to(day);
        let mut entry = entries
            .iter()
            .find(|row| row.datebook == book_uuid && row.activity_date == day)
            .cloned()
            .unwrap_or_else(|| {
                DayEntry::new(book_uuid, day, model.start_time, model.stop_time)
            });

        entry.start = start;
        entry.stop = stop;
        entry.pause = model.pause;
        entry.overtime = model.overtime;
        entry.content = model.content.clone();
        entry.vacation = false;
        entry.validate()?;

        store.upsert_entry(&mut entries, entry);
        touch_datebook(&mut datebooks, book_uuid, now);
        assigned += 1;
    }

    if assigned > 0 {
        store.push_undo_snapshot(&datebooks_before, &entries_before, &models)?;
        store.save_datebooks(&datebooks)?;
        store.save_entries(&entries)?;
    }

    println!("Assigned model '{title}' to {assigned} day(s).");
    Ok(())
}

#[instrument(skip(store, cfg, args))]
fn cmd_author(store: &mut DataStore, cfg: &Config, args: &[String]) -> anyhow::Result<()> {
    if args.is_empty() {
        match store.active_author()? {
            Some(active) => println!("active={active}"),
            None => {
                let fallback = resolve_author(store, cfg)
                    .map(|name| format!("none (falling back to {name})"))
                    .unwrap_or_else(|_| "none".to_string());
                println!("active={fallback}");
            }
        }
        return Ok(());
    }

    let name = args[0].as_str();
    if name.eq_ignore_ascii_case("none") || name.eq_ignore_ascii_case("clear") {
        store.set_active_author(None)?;
        println!("Author cleared.");
        return Ok(());
    }

    store.set_active_author(Some(name))?;
    println!("Author set: {name}");
    Ok(())
}

#[instrument(skip(store))]
fn cmd_undo(store: &mut DataStore) -> anyhow::Result<()> {
    info!("command undo");

    let Some((datebooks, entries, models)) = store.pop_undo_snapshot()? else {
        println!("No undo transactions available.");
        return Ok(());
    };

    store.save_datebooks(&datebooks)?;
    store.save_entries(&entries)?;
    store.save_models(&models)?;

    println!("Undo completed.");
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExportRow {
    author: String,

    #[serde(with = "crate::datetime::period_serde")]
    period: NaiveDate,

    activity_date: NaiveDate,

    #[serde(with = "crate::datetime::day_stamp_serde")]
    start: NaiveDateTime,

    #[serde(with = "crate::datetime::day_stamp_serde")]
    stop: NaiveDateTime,

    pause: NaiveTime,

    overtime: NaiveTime,

    #[serde(default)]
    content: String,

    #[serde(default)]
    vacation: bool,
}

#[instrument(skip(store, filter_terms, today))]
fn cmd_export(
    store: &mut DataStore,
    filter_terms: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command export");

    let datebooks = store.load_datebooks()?;
    let entries = store.load_entries()?;
    let filter = Filter::parse(filter_terms, today)?;

    let rows: Vec<ExportRow> = entries
        .iter()
        .filter_map(|entry| {
            datebooks
                .iter()
                .find(|book| book.uuid == entry.datebook)
                .map(|book| (entry, book))
        })
        .filter(|(entry, book)| filter.matches(entry, book, today))
        .map(|(entry, book)| ExportRow {
            author: book.author.clone(),
            period: book.period,
            activity_date: entry.activity_date,
            start: entry.start,
            stop: entry.stop,
            pause: entry.pause,
            overtime: entry.overtime,
            content: entry.content.clone(),
            vacation: entry.vacation,
        })
        .collect();

    let out = serde_json::to_string(&rows)?;
    println!("{out}");
    Ok(())
}

#[instrument(skip(store, now))]
fn cmd_import(store: &mut DataStore, now: NaiveDateTime) -> anyhow::Result<()> {
    info!("command import");

    let mut stdin = String::new();
    io::stdin()
        .read_to_string(&mut stdin)
        .context("failed reading stdin")?;

    let trimmed = stdin.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("import: empty input"));
    }

    let rows = parse_import_rows(trimmed)?;

    let mut datebooks = store.load_datebooks()?;
    let mut entries = store.load_entries()?;
    let models = store.load_models()?;
    let datebooks_before = datebooks.clone();
    let entries_before = entries.clone();

    let mut imported = 0_u64;
    for row in rows {
        let period = first_of_month(row.activity_date);
        if row.period != period {
            warn!(
                row_period = %row.period.format("%Y-%m"),
                derived = %period.format("%Y-%m"),
                "import row period disagrees with its activity date; using the date"
            );
        }

        let book_uuid = store.ensure_datebook(&mut datebooks, &row.author, period, now);
        let mut entry = DayEntry::new(
            book_uuid,
            row.activity_date,
            row.start.time(),
            row.stop.time(),
        );
        entry.start = row.start;
        entry.stop = row.stop;
        entry.pause = row.pause;
        entry.overtime = row.overtime;
        entry.content = row.content;
        entry.vacation = row.vacation;
        entry
            .validate()
            .with_context(|| format!("invalid imported entry for {}", row.activity_date))?;

        store.upsert_entry(&mut entries, entry);
        touch_datebook(&mut datebooks, book_uuid, now);
        imported += 1;
    }

    if imported > 0 {
        store.push_undo_snapshot(&datebooks_before, &entries_before, &models)?;
        store.save_datebooks(&datebooks)?;
        store.save_entries(&entries)?;
    }

    println!("Imported {imported} day(s).");
    Ok(())
}

fn parse_import_rows(trimmed: &str) -> anyhow::Result<Vec<ExportRow>> {
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("failed parsing JSON array");
    }

    if trimmed.starts_with('{')
        && let Ok(row) = serde_json::from_str::<ExportRow>(trimmed)
    {
        return Ok(vec![row]);
    }

    let mut out = Vec::new();
    for (idx, line) in trimmed.lines().enumerate() {
        let token = line.trim();
        if token.is_empty() {
            continue;
        }
        let row: ExportRow = serde_json::from_str(token)
            .with_context(|| format!("failed parsing import line {}", idx + 1))?;
        out.push(row);
    }

    if out.is_empty() {
        return Err(anyhow!("import: empty input"));
    }

    Ok(out)
}

fn cmd_commands() -> anyhow::Result<()> {
    for command in known_command_names() {
        println!("{command}");
    }
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    for (k, v) in cfg.iter() {
        println!("{k}={v}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "Implemented commands: fill, modify, vacation, remove, info, list, month, week, year, notes, model (add/list/remove), assign, author, undo, export, import"
    );
    Ok(())
}

#[derive(Debug, Clone)]
enum Mod {
    Start(NaiveTime),
    Stop(NaiveTime),
    Pause(NaiveTime),
    Overtime(NaiveTime),
    Vacation(bool),
}

/// Split `key:value` modifiers from free content words. Everything after a
/// literal `--` is content.
fn parse_mods(args: &[String]) -> anyhow::Result<(Vec<Mod>, Option<String>)> {
    let mut mods = Vec::new();
    let mut content_parts = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg)? {
            mods.push(one_mod);
            continue;
        }

        content_parts.push(arg.clone());
    }

    let content = if content_parts.is_empty() {
        None
    } else {
        Some(content_parts.join(" "))
    };

    Ok((mods, content))
}

fn parse_one_mod(tok: &str) -> anyhow::Result<Option<Mod>> {
    if tok.eq_ignore_ascii_case("+vacation") {
        return Ok(Some(Mod::Vacation(true)));
    }
    if tok.eq_ignore_ascii_case("-vacation") {
        return Ok(Some(Mod::Vacation(false)));
    }

    let Some((key, value)) = tok.split_once(':').or_else(|| tok.split_once('=')) else {
        return Ok(None);
    };

    match key.to_ascii_lowercase().as_str() {
        "start" => Ok(Some(Mod::Start(parse_time_expr(value)?))),
        "stop" => Ok(Some(Mod::Stop(parse_time_expr(value)?))),
        "pause" => Ok(Some(Mod::Pause(parse_time_expr(value)?))),
        "overtime" => Ok(Some(Mod::Overtime(parse_time_expr(value)?))),
        _ => Ok(None),
    }
}

/// Apply modifiers and rebuild the start/stop instants. The stop date is
/// never edited directly: it is re-inferred from the clock times on every
/// change, so edits that push the stop past midnight (or pull it back) keep
/// the date in sync.
fn apply_mods(entry: &mut DayEntry, mods: &[Mod], content: Option<String>) {
    let mut start_time = entry.start.time();
    let mut stop_time = entry.stop.time();

    for one_mod in mods {
        match one_mod {
            Mod::Start(time) => start_time = *time,
            Mod::Stop(time) => stop_time = *time,
            Mod::Pause(time) => entry.pause = *time,
            Mod::Overtime(time) => entry.overtime = *time,
            Mod::Vacation(vacation) => entry.vacation = *vacation,
        }
    }

    entry.start = entry.activity_date.and_time(start_time);
    entry.stop = infer_stop(entry.start, stop_time);

    if let Some(content) = content {
        entry.content = content;
    }
}

fn default_times(cfg: &Config) -> anyhow::Result<(NaiveTime, NaiveTime)> {
    let start_raw = cfg.get("day.start").unwrap_or_else(|| "09:00".to_string());
    let stop_raw = cfg.get("day.stop").unwrap_or_else(|| "18:00".to_string());

    let start = parse_time_expr(&start_raw).context("invalid day.start setting")?;
    let stop = parse_time_expr(&stop_raw).context("invalid day.stop setting")?;
    Ok((start, stop))
}

#[instrument(skip(store, cfg))]
fn resolve_author(store: &DataStore, cfg: &Config) -> anyhow::Result<String> {
    if let Some(active) = store.active_author()? {
        return Ok(active);
    }

    if let Some(name) = cfg.get("author.default")
        && !name.trim().is_empty()
    {
        return Ok(name.trim().to_string());
    }

    if let Ok(user) = std::env::var("USER")
        && !user.trim().is_empty()
    {
        debug!(user = %user, "falling back to $USER for author");
        return Ok(user.trim().to_string());
    }

    Err(anyhow!(
        "no author configured: run 'daybook author NAME' or set author.default"
    ))
}

fn find_book<'a>(datebooks: &'a [Datebook], author: &str, day: NaiveDate) -> Option<&'a Datebook> {
    let period = first_of_month(day);
    datebooks
        .iter()
        .find(|book| book.author == author && book.period == period)
}

fn touch_datebook(datebooks: &mut [Datebook], uuid: Uuid, now: NaiveDateTime) {
    for book in datebooks {
        if book.uuid == uuid {
            book.modified = now;
        }
    }
}

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::entry::{Datebook, DayEntry, DayModel};

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub datebooks_path: PathBuf,
    pub entries_path: PathBuf,
    pub models_path: PathBuf,
    pub undo_path: PathBuf,
    pub author_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UndoEntry {
    datebooks: Vec<Datebook>,
    entries: Vec<DayEntry>,
    models: Vec<DayModel>,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let datebooks_path = data_dir.join("datebooks.data");
        let entries_path = data_dir.join("entries.data");
        let models_path = data_dir.join("models.data");
        let undo_path = data_dir.join("undo.data");
        let author_path = data_dir.join("author.data");

        for path in [
            &datebooks_path,
            &entries_path,
            &models_path,
            &undo_path,
            &author_path,
        ] {
            if !path.exists() {
                fs::write(path, "")?;
            }
        }

        info!(
            data_dir = %data_dir.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            datebooks_path,
            entries_path,
            models_path,
            undo_path,
            author_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_datebooks(&self) -> anyhow::Result<Vec<Datebook>> {
        load_jsonl(&self.datebooks_path).context("failed to load datebooks.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_entries(&self) -> anyhow::Result<Vec<DayEntry>> {
        load_jsonl(&self.entries_path).context("failed to load entries.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_models(&self) -> anyhow::Result<Vec<DayModel>> {
        load_jsonl(&self.models_path).context("failed to load models.data")
    }

    #[tracing::instrument(skip(self, datebooks))]
    pub fn save_datebooks(&self, datebooks: &[Datebook]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.datebooks_path, datebooks).context("failed to save datebooks.data")
    }

    #[tracing::instrument(skip(self, entries))]
    pub fn save_entries(&self, entries: &[DayEntry]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.entries_path, entries).context("failed to save entries.data")
    }

    #[tracing::instrument(skip(self, models))]
    pub fn save_models(&self, models: &[DayModel]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.models_path, models).context("failed to save models.data")
    }

    /// Find the datebook for (author, period), creating it lazily when a day
    /// of that month is first touched.
    #[tracing::instrument(skip(self, datebooks, now), fields(author = author))]
    pub fn ensure_datebook(
        &self,
        datebooks: &mut Vec<Datebook>,
        author: &str,
        period: NaiveDate,
        now: NaiveDateTime,
    ) -> Uuid {
        let period = crate::datetime::first_of_month(period);
        if let Some(book) = datebooks
            .iter()
            .find(|book| book.author == author && book.period == period)
        {
            return book.uuid;
        }

        let book = Datebook::new(author.to_string(), period, now);
        let uuid = book.uuid;
        debug!(period = %period.format("%Y-%m"), "created datebook lazily");
        datebooks.push(book);
        datebooks.sort_by(|a, b| (&a.author, a.period).cmp(&(&b.author, b.period)));
        uuid
    }

    /// Insert or replace the entry for its (datebook, activity_date) slot.
    /// Returns true when an existing entry was replaced.
    #[tracing::instrument(skip(self, entries, entry), fields(day = %entry.activity_date))]
    pub fn upsert_entry(&self, entries: &mut Vec<DayEntry>, entry: DayEntry) -> bool {
        let before = entries.len();
        entries.retain(|row| {
            !(row.datebook == entry.datebook && row.activity_date == entry.activity_date)
        });
        let replaced = entries.len() < before;

        entries.push(entry);
        entries.sort_by_key(|row| (row.activity_date, row.datebook));
        replaced
    }

    #[tracing::instrument(skip_all)]
    pub fn push_undo_snapshot(
        &self,
        datebooks: &[Datebook],
        entries: &[DayEntry],
        models: &[DayModel],
    ) -> anyhow::Result<()> {
        let mut journal: Vec<UndoEntry> = load_jsonl(&self.undo_path)?;
        journal.push(UndoEntry {
            datebooks: datebooks.to_vec(),
            entries: entries.to_vec(),
            models: models.to_vec(),
        });
        save_jsonl_atomic(&self.undo_path, &journal)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn pop_undo_snapshot(
        &self,
    ) -> anyhow::Result<Option<(Vec<Datebook>, Vec<DayEntry>, Vec<DayModel>)>> {
        let mut journal: Vec<UndoEntry> = load_jsonl(&self.undo_path)?;
        let Some(snapshot) = journal.pop() else {
            return Ok(None);
        };
        save_jsonl_atomic(&self.undo_path, &journal)?;
        Ok(Some((
            snapshot.datebooks,
            snapshot.entries,
            snapshot.models,
        )))
    }

    #[tracing::instrument(skip(self))]
    pub fn active_author(&self) -> anyhow::Result<Option<String>> {
        let raw = fs::read_to_string(&self.author_path)
            .with_context(|| format!("failed reading {}", self.author_path.display()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn set_active_author(&self, name: Option<&str>) -> anyhow::Result<()> {
        let payload = name.unwrap_or_default();
        fs::write(&self.author_path, payload)
            .with_context(|| format!("failed writing {}", self.author_path.display()))?;
        Ok(())
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let row: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(row);
    }

    debug!(count = out.len(), "loaded rows from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, rows))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = rows.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for row in rows {
        let serialized = serde_json::to_string(row)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

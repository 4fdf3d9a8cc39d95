use chrono::{NaiveDate, NaiveTime};
use daybook_core::datastore::DataStore;
use daybook_core::entry::{DayEntry, DayModel};
use daybook_core::filter::Filter;
use tempfile::tempdir;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
}

#[test]
fn datastore_roundtrip_and_filtering() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    let today = date(2026, 2, 17);
    let now = today.and_time(time(8, 0));

    let mut datebooks = store.load_datebooks().expect("load datebooks");
    let book_uuid = store.ensure_datebook(&mut datebooks, "ann", today, now);
    store.save_datebooks(&datebooks).expect("save datebooks");

    let mut entry = DayEntry::new(book_uuid, today, time(9, 0), time(18, 0));
    entry.content = "code review".to_string();
    entry.validate().expect("entry should validate");

    let mut entries = Vec::new();
    store.upsert_entry(&mut entries, entry);
    store.save_entries(&entries).expect("save entries");

    let loaded_books = store.load_datebooks().expect("reload datebooks");
    let loaded = store.load_entries().expect("reload entries");
    assert_eq!(loaded_books.len(), 1);
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].stop.date(), today);

    let filter = Filter::parse(&["+WORKED".to_string(), "review".to_string()], today)
        .expect("parse filter");
    assert!(filter.matches(&loaded[0], &loaded_books[0], today));
}

#[test]
fn upsert_replaces_the_day_slot() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    let today = date(2026, 2, 17);
    let now = today.and_time(time(8, 0));

    let mut datebooks = Vec::new();
    let book_uuid = store.ensure_datebook(&mut datebooks, "ann", today, now);

    let mut entries = Vec::new();
    let first = DayEntry::new(book_uuid, today, time(9, 0), time(17, 0));
    let second = DayEntry::new(book_uuid, today, time(10, 0), time(19, 0));

    assert!(!store.upsert_entry(&mut entries, first));
    assert!(store.upsert_entry(&mut entries, second));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].start.time(), time(10, 0));
}

#[test]
fn undo_restores_the_previous_snapshot() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    let today = date(2026, 2, 17);
    let now = today.and_time(time(8, 0));

    let mut datebooks = Vec::new();
    let book_uuid = store.ensure_datebook(&mut datebooks, "ann", today, now);

    store
        .push_undo_snapshot(&[], &[], &[])
        .expect("push snapshot");

    let mut entries = Vec::new();
    store.upsert_entry(&mut entries, DayEntry::new(book_uuid, today, time(9, 0), time(18, 0)));
    store.save_datebooks(&datebooks).expect("save datebooks");
    store.save_entries(&entries).expect("save entries");
    assert_eq!(store.load_entries().expect("load entries").len(), 1);

    let (datebooks, entries, models) = store
        .pop_undo_snapshot()
        .expect("pop snapshot")
        .expect("snapshot present");
    store.save_datebooks(&datebooks).expect("restore datebooks");
    store.save_entries(&entries).expect("restore entries");
    store.save_models(&models).expect("restore models");

    assert!(store.load_entries().expect("reload entries").is_empty());
    assert!(store.load_datebooks().expect("reload datebooks").is_empty());
}

#[test]
fn night_model_lands_stop_on_the_next_day() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    let model = DayModel::new(
        "ann".to_string(),
        "night shift".to_string(),
        time(22, 0),
        time(6, 0),
    );
    store.save_models(&[model.clone()]).expect("save models");

    let loaded = store.load_models().expect("load models");
    assert_eq!(loaded.len(), 1);

    let (start, stop) = loaded[0].apply_to(date(2026, 2, 28));
    assert_eq!(start, date(2026, 2, 28).and_time(time(22, 0)));
    assert_eq!(stop, date(2026, 3, 1).and_time(time(6, 0)));
}

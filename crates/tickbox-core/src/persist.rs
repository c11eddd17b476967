#![forbid(unsafe_code)]

//! Debounced persistence of the task list.
//!
//! # Design
//!
//! [`PersistenceSink`] is a throttled computed cell whose body serializes the
//! whole list and hands the string to a [`Store`]. Because the body reads the
//! item sequence and every field of every item, any change anywhere in the
//! list re-arms the sink's window; the write happens once the list has been
//! quiet for the whole window, with the settled state.
//!
//! Only `{title, completed}` is persisted. `editing` and `valid` are read so
//! that toggling them counts as activity, but they never reach the store.
//!
//! # Failure Modes
//!
//! A failed `save` is logged at `warn`, counted, and recorded as the last
//! [`SaveOutcome`]. The sink stays attached; the next change retries with a
//! full snapshot.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ahash::AHashMap;
use thiserror::Error;
use tickbox_reactive::Computed;
use web_time::Duration;

use crate::error::{Error, Result};
use crate::item::ItemRecord;
use crate::list::TodoList;

/// Key the list snapshot is stored under.
pub const STORAGE_KEY: &str = "todos-knockoutjs";

/// Default quiet window before a save: at most two writes per second.
pub const DEFAULT_SAVE_WINDOW: Duration = Duration::from_millis(500);

// ─── Stores ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// String key/value storage.
pub trait Store {
    /// The value under `key`, or `None` if nothing was ever saved there.
    fn load(&self, key: &str) -> std::result::Result<Option<String>, StoreError>;

    fn save(&self, key: &str, value: &str) -> std::result::Result<(), StoreError>;
}

/// In-process store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<AHashMap<String, String>>,
    saves: Cell<u64>,
    failing: Cell<bool>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with one entry.
    #[must_use]
    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        let store = Self::new();
        store.entries.borrow_mut().insert(key.into(), value.into());
        store
    }

    /// Make every subsequent `save` fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    /// Successful saves so far.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.saves.get()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }
}

impl Store for MemoryStore {
    fn load(&self, key: &str) -> std::result::Result<Option<String>, StoreError> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, value: &str) -> std::result::Result<(), StoreError> {
        if self.failing.get() {
            return Err(StoreError::Unavailable("memory store set to fail".into()));
        }
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

/// One `<key>.json` file per key under a directory.
///
/// Saves go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl Store for FileStore {
    fn load(&self, key: &str) -> std::result::Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&path)(err)),
        }
    }

    fn save(&self, key: &str, value: &str) -> std::result::Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(io_error(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_error(&path))?;
        Ok(())
    }
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

/// Load the persisted list under `key`.
///
/// A missing key is an empty list. Records may carry extra fields; they are
/// ignored.
pub fn load_records(store: &dyn Store, key: &str) -> Result<Vec<ItemRecord>> {
    let Some(text) = store.load(key)? else {
        tracing::debug!(key, "no stored snapshot");
        return Ok(Vec::new());
    };
    if text.trim().is_empty() || text.trim() == "null" {
        return Ok(Vec::new());
    }
    let records: Vec<ItemRecord> =
        serde_json::from_str(&text).map_err(|source| Error::Snapshot {
            key: key.to_owned(),
            source,
        })?;
    tracing::debug!(key, items = records.len(), "snapshot loaded");
    Ok(records)
}

/// Serialize records in the stored shape.
pub fn serialize(records: &[ItemRecord]) -> Result<String> {
    serde_json::to_string(records).map_err(|source| Error::Snapshot {
        key: STORAGE_KEY.to_owned(),
        source,
    })
}

// ─── Sink ────────────────────────────────────────────────────────────────────

/// Result of one sink run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { bytes: usize },
    Failed(String),
}

impl SaveOutcome {
    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

#[derive(Default)]
struct SinkStats {
    writes: Cell<u64>,
    failures: Cell<u64>,
    last: RefCell<Option<SaveOutcome>>,
}

/// Throttled writer of the full list snapshot.
pub struct PersistenceSink {
    cell: Computed<SaveOutcome>,
    stats: Rc<SinkStats>,
    key: String,
    window: Duration,
}

impl fmt::Debug for PersistenceSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceSink")
            .field("key", &self.key)
            .field("window", &self.window)
            .field("writes", &self.stats.writes.get())
            .field("failures", &self.stats.failures.get())
            .field("scheduled", &self.cell.is_scheduled())
            .finish()
    }
}

impl PersistenceSink {
    /// Start persisting `list`. The current state is written immediately.
    pub fn attach(
        list: &TodoList,
        store: Rc<dyn Store>,
        key: impl Into<String>,
        window: Duration,
    ) -> Self {
        let key = key.into();
        let stats = Rc::new(SinkStats::default());
        let items = list.items_cell().clone();
        let (run_key, run_stats) = (key.clone(), Rc::clone(&stats));

        let cell = Computed::throttled(list.runtime(), window, move || {
            let records: Vec<ItemRecord> = items.with(|items| {
                items
                    .iter()
                    .map(|item| {
                        let _ = (item.is_editing(), item.is_valid());
                        item.record()
                    })
                    .collect()
            });
            let saved = serialize(&records).and_then(|text| {
                store.save(&run_key, &text)?;
                Ok(text.len())
            });
            let outcome = match saved {
                Ok(bytes) => {
                    run_stats.writes.set(run_stats.writes.get() + 1);
                    tracing::debug!(key = %run_key, items = records.len(), bytes, "snapshot saved");
                    SaveOutcome::Saved { bytes }
                }
                Err(err) => {
                    run_stats.failures.set(run_stats.failures.get() + 1);
                    tracing::warn!(key = %run_key, error = %err, "snapshot save failed");
                    SaveOutcome::Failed(err.to_string())
                }
            };
            run_stats.last.replace(Some(outcome.clone()));
            outcome
        })
        .labeled("persistence");

        Self {
            cell,
            stats,
            key,
            window,
        }
    }

    /// Successful writes, including the initial one.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.stats.writes.get()
    }

    #[must_use]
    pub fn failures(&self) -> u64 {
        self.stats.failures.get()
    }

    #[must_use]
    pub fn last_outcome(&self) -> Option<SaveOutcome> {
        self.stats.last.borrow().clone()
    }

    /// Write now if a save is pending. Returns `true` if a write ran.
    pub fn flush(&self) -> bool {
        self.cell.flush()
    }

    /// Whether a save is waiting for the window to close.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.cell.is_scheduled()
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationPipeline;
    use tickbox_reactive::{Clock, LabClock, Runtime};
    use tracing_test::traced_test;

    fn lab_list(records: &[ItemRecord]) -> (TodoList, LabClock) {
        let clock = LabClock::new();
        let rt = Runtime::with_clock(Clock::Lab(clock.clone()));
        let pipeline = ValidationPipeline::empty(Rc::new(|_: &str| {}));
        (TodoList::new(&rt, records, pipeline), clock)
    }

    fn stored(store: &MemoryStore) -> Vec<ItemRecord> {
        serde_json::from_str(&store.get(STORAGE_KEY).unwrap()).unwrap()
    }

    #[test]
    fn attach_writes_current_state() {
        let (list, _) = lab_list(&[ItemRecord::new("a", true)]);
        let store = Rc::new(MemoryStore::new());
        let sink = PersistenceSink::attach(&list, store.clone(), STORAGE_KEY, DEFAULT_SAVE_WINDOW);
        assert_eq!(sink.writes(), 1);
        assert_eq!(stored(&store), vec![ItemRecord::new("a", true)]);
        assert!(sink.last_outcome().unwrap().is_saved());
    }

    #[test]
    fn burst_coalesces_into_one_settled_write() {
        let (list, clock) = lab_list(&[]);
        let store = Rc::new(MemoryStore::new());
        let sink = PersistenceSink::attach(&list, store.clone(), STORAGE_KEY, DEFAULT_SAVE_WINDOW);

        list.add_title("one");
        clock.advance(Duration::from_millis(100));
        list.runtime().run_due();
        list.add_title("two");
        list.get(0).unwrap().toggle();
        clock.advance(Duration::from_millis(499));
        list.runtime().run_due();
        assert_eq!(store.save_count(), 1);
        assert!(sink.is_pending());

        clock.advance(Duration::from_millis(1));
        list.runtime().run_due();
        assert_eq!(store.save_count(), 2);
        assert_eq!(
            stored(&store),
            vec![ItemRecord::new("one", true), ItemRecord::new("two", false)]
        );
    }

    #[test]
    fn transient_fields_count_as_activity_but_are_not_stored() {
        let (list, _) = lab_list(&[ItemRecord::new("a", false)]);
        let store = Rc::new(MemoryStore::new());
        let sink = PersistenceSink::attach(&list, store.clone(), STORAGE_KEY, DEFAULT_SAVE_WINDOW);
        list.edit_item(&list.get(0).unwrap());
        assert!(sink.is_pending());
        assert!(sink.flush());
        assert_eq!(
            store.get(STORAGE_KEY).as_deref(),
            Some(r#"[{"title":"a","completed":false}]"#)
        );
    }

    #[test]
    #[traced_test]
    fn failed_save_is_logged_and_sink_keeps_going() {
        let (list, _) = lab_list(&[]);
        let store = Rc::new(MemoryStore::new());
        store.set_failing(true);
        let sink = PersistenceSink::attach(&list, store.clone(), STORAGE_KEY, DEFAULT_SAVE_WINDOW);
        assert_eq!(sink.failures(), 1);
        assert!(matches!(sink.last_outcome(), Some(SaveOutcome::Failed(_))));
        assert!(logs_contain("snapshot save failed"));

        store.set_failing(false);
        list.add_title("retry");
        assert!(sink.flush());
        assert_eq!(sink.writes(), 1);
        assert_eq!(stored(&store), vec![ItemRecord::new("retry", false)]);
    }

    #[test]
    fn load_records_handles_missing_and_malformed() {
        let empty = MemoryStore::new();
        assert!(load_records(&empty, STORAGE_KEY).unwrap().is_empty());

        let null = MemoryStore::with_entry(STORAGE_KEY, "null");
        assert!(load_records(&null, STORAGE_KEY).unwrap().is_empty());

        let bad = MemoryStore::with_entry(STORAGE_KEY, "{not json");
        assert!(matches!(
            load_records(&bad, STORAGE_KEY),
            Err(Error::Snapshot { .. })
        ));

        let legacy = MemoryStore::with_entry(
            STORAGE_KEY,
            r#"[{"title":"a","completed":true,"editing":false,"valid":true}]"#,
        );
        assert_eq!(
            load_records(&legacy, STORAGE_KEY).unwrap(),
            vec![ItemRecord::new("a", true)]
        );
    }

    #[test]
    fn file_store_round_trips_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));
        assert_eq!(store.load("k").unwrap(), None);
        store.save("k", "[1]").unwrap();
        assert_eq!(store.load("k").unwrap().as_deref(), Some("[1]"));
        assert!(store.path_for("k").ends_with("k.json"));
        assert!(!store.path_for("k").with_extension("json.tmp").exists());
    }
}

//! Append-only history of analysis outcomes.
//!
//! Provides the [`HistoryStore`] trait and two implementations:
//! [`JsonFileStore`], which keeps the whole sequence as one pretty-printed
//! JSON array on disk, and [`MemoryStore`], an in-process double with the
//! same contract.
//!
//! Records are only ever appended. The single exception is a history file
//! that exists but cannot be parsed: it is reported with a warning and
//! treated as an empty sequence, and the next append replaces it. A record
//! whose fingerprint alone is unreadable is kept, without its fingerprint.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::detector::Fingerprint;
use crate::{AppError, Result};

/// Prior description used when the history is empty.
pub const FIRST_CAPTURE_DESCRIPTION: &str = "No previous image. This is the first one.";

/// One persisted analysis outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Fingerprint of the analysed frame; absent on records written
    /// before fingerprints were stored. An unreadable value loads as absent.
    #[serde(
        default,
        deserialize_with = "lenient_fingerprint",
        skip_serializing_if = "Option::is_none"
    )]
    pub fingerprint: Option<Fingerprint>,
    /// Description returned by the analysis collaborator.
    #[serde(default)]
    pub description: String,
    /// Whether the collaborator judged the item unchanged.
    #[serde(default)]
    pub is_the_same: bool,
    /// When the record was created; legacy records read as the Unix epoch.
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
}

fn lenient_fingerprint<'de, D>(deserializer: D) -> std::result::Result<Option<Fingerprint>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(hex)) => match Fingerprint::from_hex(&hex) {
            Ok(fingerprint) => Some(fingerprint),
            Err(err) => {
                warn!(%err, "ignoring unreadable fingerprint in history record");
                None
            }
        },
        Some(other) => {
            warn!(value = %other, "ignoring non-string fingerprint in history record");
            None
        }
    })
}

impl HistoryRecord {
    /// Build a record stamped with the current time.
    #[must_use]
    pub fn new(fingerprint: Fingerprint, description: String, is_the_same: bool) -> Self {
        Self {
            fingerprint: Some(fingerprint),
            description,
            is_the_same,
            timestamp: Utc::now(),
        }
    }
}

/// Read/append contract for the history sequence.
///
/// Implementations must be [`Send`] and [`Sync`]; the orchestrator holds
/// the store behind an [`std::sync::Arc`].
pub trait HistoryStore: Send + Sync {
    /// Read the full sequence in insertion order.
    ///
    /// An absent or empty backing store yields an empty sequence. A corrupt
    /// one is logged and also yields an empty sequence.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures other than absence or corruption
    /// (for example, permission denied).
    fn load(&self) -> Result<Vec<HistoryRecord>>;

    /// Append one record at the end of the sequence.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the record could not be persisted.
    fn append(&self, record: HistoryRecord) -> Result<()>;

    /// Most recent record, if any.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`HistoryStore::load`].
    fn latest(&self) -> Result<Option<HistoryRecord>> {
        Ok(self.load()?.pop())
    }
}

/// History kept as a single JSON array file, rewritten whole on each append.
///
/// Writes go to a temporary sibling file that is then renamed over the
/// target, so a crash mid-write never leaves a truncated history behind.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store backed by `path`. The file need not exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the sequence, surfacing corruption instead of masking it.
    ///
    /// # Errors
    ///
    /// - `AppError::StoreCorrupt` if the file is not a JSON record array.
    /// - `AppError::Io` if the file exists but cannot be read.
    pub fn try_load(&self) -> Result<Vec<HistoryRecord>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to read history {}: {err}",
                    self.path.display()
                )))
            }
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&raw).map_err(|err| {
            AppError::StoreCorrupt(format!("{}: {err}", self.path.display()))
        })
    }

    fn write_all(&self, records: &[HistoryRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| AppError::Store(format!("failed to serialize history: {e}")))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_owned(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::Store(format!("failed to create history directory {}: {e}", dir.display()))
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| AppError::Store(format!("failed to create temp history file: {e}")))?;
        tmp.write_all(json.as_bytes())
            .and_then(|()| tmp.flush())
            .map_err(|e| AppError::Store(format!("history write failed: {e}")))?;
        tmp.persist(&self.path).map_err(|e| {
            AppError::Store(format!("failed to replace {}: {e}", self.path.display()))
        })?;
        Ok(())
    }
}

impl HistoryStore for JsonFileStore {
    fn load(&self) -> Result<Vec<HistoryRecord>> {
        match self.try_load() {
            Err(AppError::StoreCorrupt(msg)) => {
                warn!(error = msg.as_str(), "history file is corrupt, starting from empty history");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    fn append(&self, record: HistoryRecord) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| AppError::Store("history writer mutex poisoned".into()))?;

        let mut records = self.load()?;
        records.push(record);
        self.write_all(&records)?;
        debug!(path = %self.path.display(), records = records.len(), "history appended");
        Ok(())
    }
}

/// In-memory history with an append counter.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<HistoryRecord>>,
    appends: AtomicUsize,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `records`; seeding does not count as appends.
    #[must_use]
    pub fn with_records(records: Vec<HistoryRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            appends: AtomicUsize::new(0),
        }
    }

    /// Number of successful [`HistoryStore::append`] calls.
    #[must_use]
    pub fn append_count(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }
}

impl HistoryStore for MemoryStore {
    fn load(&self) -> Result<Vec<HistoryRecord>> {
        self.records
            .lock()
            .map(|records| records.clone())
            .map_err(|_| AppError::Store("memory store mutex poisoned".into()))
    }

    fn append(&self, record: HistoryRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| AppError::Store("memory store mutex poisoned".into()))?
            .push(record);
        self.appends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

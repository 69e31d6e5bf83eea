//! Durable memory of advice topics already sent.
//!
//! A single record keyed by [`ADVICE_RECORD_KEY`] holds every stored summary
//! in chronological order. The job reads it once, appends one summary, and
//! writes the whole record back. There is no concurrency control; the last
//! writer wins.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::retry::RetryPolicy;

pub const ADVICE_RECORD_KEY: &str = "0";

static TABLE_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode previous advice: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid table name: {0}")]
    InvalidTable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdviceRecord {
    pub advice_id: String,
    #[serde(default)]
    pub previous_advice: Vec<String>,
}

impl AdviceRecord {
    pub fn empty() -> Self {
        Self {
            advice_id: ADVICE_RECORD_KEY.to_string(),
            previous_advice: Vec::new(),
        }
    }
}

/// A record as it sits in the store; `previous_advice` may be null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAdvice {
    pub advice_id: String,
    pub previous_advice: Option<Vec<String>>,
}

pub trait AdviceStore {
    fn get(&self, advice_id: &str) -> Result<Option<StoredAdvice>, HistoryError>;
    /// Full overwrite of the record under `record.advice_id`.
    fn put(&self, record: &AdviceRecord) -> Result<(), HistoryError>;
}

/// SQLite-backed advice store. The table holds one row per record with the
/// summaries serialized as a JSON array.
#[derive(Debug, Clone)]
pub struct SqliteAdviceStore {
    path: PathBuf,
    table: String,
}

impl SqliteAdviceStore {
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> Result<Self, HistoryError> {
        let table = table.into();
        if !TABLE_NAME_PATTERN.is_match(&table) {
            return Err(HistoryError::InvalidTable(table));
        }
        let store = Self {
            path: path.into(),
            table,
        };
        let _ = store.open()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection, HistoryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    advice_id TEXT PRIMARY KEY,
                    previous_advice TEXT
                )",
                self.table
            ),
            [],
        )?;
        Ok(conn)
    }
}

impl AdviceStore for SqliteAdviceStore {
    fn get(&self, advice_id: &str) -> Result<Option<StoredAdvice>, HistoryError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT advice_id, previous_advice FROM {} WHERE advice_id = ?1",
                    self.table
                ),
                params![advice_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        match row {
            Some((advice_id, raw)) => {
                let previous_advice = match raw {
                    Some(raw) => serde_json::from_str::<Option<Vec<String>>>(&raw)?,
                    None => None,
                };
                Ok(Some(StoredAdvice {
                    advice_id,
                    previous_advice,
                }))
            }
            None => Ok(None),
        }
    }

    fn put(&self, record: &AdviceRecord) -> Result<(), HistoryError> {
        let conn = self.open()?;
        let encoded = serde_json::to_string(&record.previous_advice)?;
        conn.execute(
            &format!(
                "INSERT INTO {} (advice_id, previous_advice) VALUES (?1, ?2)
                 ON CONFLICT(advice_id) DO UPDATE SET previous_advice = excluded.previous_advice",
                self.table
            ),
            params![record.advice_id, encoded],
        )?;
        Ok(())
    }
}

/// Read-modify-write access to the advice record used by the job.
pub struct AdviceHistory<'a> {
    store: &'a dyn AdviceStore,
    retry: RetryPolicy,
    limit: Option<usize>,
}

impl<'a> AdviceHistory<'a> {
    /// `limit` caps the number of summaries kept; `None` keeps all of them.
    pub fn new(store: &'a dyn AdviceStore, retry: RetryPolicy, limit: Option<usize>) -> Self {
        Self {
            store,
            retry,
            limit,
        }
    }

    /// Never fails: a missing record, a null summary list, or a store error
    /// all yield an empty history.
    pub fn load(&self) -> AdviceRecord {
        info!("loading previous advice");
        match self
            .retry
            .run("advice history read", || self.store.get(ADVICE_RECORD_KEY))
        {
            Ok(Some(stored)) => AdviceRecord {
                advice_id: stored.advice_id,
                previous_advice: stored.previous_advice.unwrap_or_default(),
            },
            Ok(None) => {
                info!("no previous advice recorded yet");
                AdviceRecord::empty()
            }
            Err(err) => {
                error!("failed to load previous advice, continuing without it: {}", err);
                AdviceRecord::empty()
            }
        }
    }

    /// Appends `summary` to `record` and overwrites the stored copy.
    pub fn save(&self, record: &mut AdviceRecord, summary: String) -> Result<(), HistoryError> {
        record.previous_advice.push(summary);
        if let Some(limit) = self.limit {
            let excess = record.previous_advice.len().saturating_sub(limit);
            if excess > 0 {
                record.previous_advice.drain(..excess);
            }
        }
        let record: &AdviceRecord = record;
        self.retry
            .run("advice history write", || self.store.put(record))
    }
}

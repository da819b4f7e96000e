//! Durable Scan State
//!
//! Two JSON files survive restarts: the progress checkpoint (`{"next_tick": N}`)
//! and the append-only list of matches. Unreadable or corrupt files are never
//! fatal; loading reports a [`RecoverableError`] that carries the value the
//! scanner continues with.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::record::MatchRecord;

/// Errors that stop the scan: state could not be written
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why a state file could not be used
#[derive(Error, Debug)]
pub enum StateReadError {
    #[error("Failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt state in {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Stored next_tick {stored} in {path} is before start tick {start_tick}")]
    BeforeStart {
        path: PathBuf,
        stored: u64,
        start_tick: u64,
    },
}

/// A read failure together with the fallback value to continue with
#[derive(Error, Debug)]
#[error("{cause} (using fallback)")]
pub struct RecoverableError<T: Debug> {
    pub fallback: T,
    #[source]
    pub cause: StateReadError,
}

/// Resolve a load result to its value, logging when the fallback is used
pub trait OrRecover<T> {
    fn or_recover(self) -> T;
}

impl<T: Debug> OrRecover<T> for Result<T, RecoverableError<T>> {
    fn or_recover(self) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                warn!("{}", e);
                e.fallback
            }
        }
    }
}

/// Pointer to the first tick not yet fully processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub next_tick: u64,
}

/// Progress checkpoint file
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
    start_tick: u64,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>, start_tick: u64) -> Self {
        Self {
            path: path.into(),
            start_tick,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// State of a scan that has not processed anything yet
    pub fn initial(&self) -> ProgressState {
        ProgressState {
            next_tick: self.start_tick,
        }
    }

    /// Read the checkpoint
    ///
    /// A missing file is a first run. Any read or parse failure falls back to the
    /// start tick, and so does a stored tick below the start tick.
    pub async fn load(&self) -> Result<ProgressState, RecoverableError<ProgressState>> {
        let state: ProgressState = match read_json(&self.path).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                info!("No progress file at {}, starting fresh", self.path.display());
                return Ok(self.initial());
            }
            Err(cause) => {
                return Err(RecoverableError {
                    fallback: self.initial(),
                    cause,
                })
            }
        };

        if state.next_tick < self.start_tick {
            return Err(RecoverableError {
                fallback: self.initial(),
                cause: StateReadError::BeforeStart {
                    path: self.path.clone(),
                    stored: state.next_tick,
                    start_tick: self.start_tick,
                },
            });
        }
        Ok(state)
    }

    /// Overwrite the checkpoint
    pub async fn save(&self, state: &ProgressState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(state)?;
        write_replace(&self.path, &bytes).await
    }
}

/// Append-only log of match records, stored as a JSON array
#[derive(Debug, Clone)]
pub struct MatchStore {
    path: PathBuf,
}

impl MatchStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored record; a missing file is an empty log
    pub async fn load(&self) -> Result<Vec<MatchRecord>, RecoverableError<Vec<MatchRecord>>> {
        match read_json(&self.path).await {
            Ok(records) => Ok(records.unwrap_or_default()),
            Err(cause) => Err(RecoverableError {
                fallback: Vec::new(),
                cause,
            }),
        }
    }

    /// Append a record, rewriting the whole file
    ///
    /// Returns `false` without writing when a record for the same payout entry
    /// (see [`MatchRecord::dedup_key`]) is already stored. An unusable existing file is moved
    /// aside to `<path>.corrupt` and the log restarts empty.
    pub async fn append(&self, record: &MatchRecord) -> Result<bool, StoreError> {
        let mut records = match self.load().await {
            Ok(records) => records,
            Err(e) => {
                warn!("{}", e);
                self.quarantine().await;
                e.fallback
            }
        };

        if records.iter().any(|r| r.dedup_key() == record.dedup_key()) {
            debug!(
                "Match for tick {} recipient {} already recorded",
                record.tick, record.pubkey_hex
            );
            return Ok(false);
        }

        records.push(record.clone());
        let bytes = serde_json::to_vec_pretty(&records)?;
        write_replace(&self.path, &bytes).await?;
        Ok(true)
    }

    async fn quarantine(&self) {
        let target = with_suffix(&self.path, ".corrupt");
        match fs::rename(&self.path, &target).await {
            Ok(()) => warn!("Moved unusable results file to {}", target.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not move {} aside: {}", self.path.display(), e),
        }
    }
}

/// Read and parse a JSON file; `Ok(None)` when it does not exist
async fn read_json<T>(path: &Path) -> Result<Option<T>, StateReadError>
where
    T: for<'de> Deserialize<'de>,
{
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StateReadError::Unreadable {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StateReadError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Write to a sibling temp file, then rename over the target
async fn write_replace(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let temp_path = with_suffix(path, ".tmp");
    fs::write(&temp_path, bytes).await.map_err(write_err)?;
    fs::rename(&temp_path, path).await.map_err(write_err)?;
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

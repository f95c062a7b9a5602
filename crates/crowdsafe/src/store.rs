//! The prediction store seam used by the service layer.
//!
//! [`PredictionStore`] is what request handling depends on. [`FileStore`] is
//! the production implementation: it holds only paths and opens a fresh
//! database connection for every operation, which is closed when the
//! operation returns, on success and on error alike.

use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::config::Config;
use crate::error::Result;
use crate::prediction::{PredictionRecord, RiskCounts};
use crate::storage::{ExportLog, Storage};

/// Durable append-only collection of prediction records.
pub trait PredictionStore: Send + Sync + std::fmt::Debug {
    /// Persist a record to every target.
    ///
    /// # Errors
    ///
    /// Returns a storage error if any write fails. Earlier writes are not
    /// rolled back.
    fn append(&self, record: &PredictionRecord) -> Result<()>;

    /// Up to `limit` records, newest id first, without chart data.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn list_recent(&self, limit: usize) -> Result<Vec<PredictionRecord>>;

    /// Total and per-risk record counts.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn aggregate_counts(&self) -> Result<RiskCounts>;

    /// Remove every queryable record, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete fails.
    fn clear(&self) -> Result<usize>;
}

/// `SQLite` database plus CSV export, opened per operation.
#[derive(Debug, Clone)]
pub struct FileStore {
    database_path: PathBuf,
    export_path: PathBuf,
}

impl FileStore {
    /// Create a store over the given files.
    ///
    /// Nothing is opened until the first operation.
    #[must_use]
    pub fn new(database_path: impl Into<PathBuf>, export_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            export_path: export_path.into(),
        }
    }

    /// Create a store from the resolved configuration paths.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.database_path(), config.export_path())
    }

    /// Path of the `SQLite` database.
    #[must_use]
    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    /// Path of the CSV export log.
    #[must_use]
    pub fn export_path(&self) -> &Path {
        &self.export_path
    }

    /// Create both files and the schema up front.
    ///
    /// # Errors
    ///
    /// Returns an error if either target cannot be created.
    pub fn initialize(&self) -> Result<()> {
        Storage::open(&self.database_path)?;
        ExportLog::open(&self.export_path)?;
        Ok(())
    }

    fn storage(&self) -> Result<Storage> {
        Storage::open(&self.database_path)
    }
}

impl PredictionStore for FileStore {
    fn append(&self, record: &PredictionRecord) -> Result<()> {
        self.storage()?.insert(record)?;

        if let Err(e) = ExportLog::open(&self.export_path).and_then(|log| log.append(record)) {
            error!(
                "Prediction {} stored in database but not exported: {}",
                record.id, e
            );
            return Err(e);
        }

        debug!("Appended prediction {}", record.id);
        Ok(())
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<PredictionRecord>> {
        self.storage()?.get_recent(limit)
    }

    fn aggregate_counts(&self) -> Result<RiskCounts> {
        self.storage()?.risk_counts()
    }

    fn clear(&self) -> Result<usize> {
        self.storage()?.clear()
    }
}

//! Flat CSV export log.
//!
//! Every stored prediction is mirrored here as one row. The log is only ever
//! appended to; clearing the history leaves it untouched.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::prediction::{Density, PredictionRecord, Risk};

use super::ensure_parent_dir;

/// Header row of the export file.
pub const EXPORT_HEADER: [&str; 10] = [
    "id",
    "timestamp",
    "eventName",
    "location",
    "crowdCount",
    "eventType",
    "timeSlot",
    "density",
    "risk",
    "recommendation",
];

/// One row of the export file. Chart data is not exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    /// Record id.
    pub id: i64,
    /// Creation time as written.
    pub timestamp: String,
    /// Event name.
    pub event_name: String,
    /// Location.
    pub location: String,
    /// Crowd count.
    pub crowd_count: u32,
    /// Event type.
    pub event_type: String,
    /// Time slot.
    pub time_slot: String,
    /// Density tier.
    pub density: Density,
    /// Risk tier.
    pub risk: Risk,
    /// Recommendation text.
    pub recommendation: String,
}

impl From<&PredictionRecord> for ExportRow {
    fn from(record: &PredictionRecord) -> Self {
        Self {
            id: record.id,
            timestamp: record.timestamp.to_rfc3339(),
            event_name: record.event_name.clone(),
            location: record.location.clone(),
            crowd_count: record.crowd_count,
            event_type: record.event_type.clone(),
            time_slot: record.time_slot.clone(),
            density: record.density,
            risk: record.risk,
            recommendation: record.recommendation.clone(),
        }
    }
}

/// Append-only CSV mirror of the prediction store.
#[derive(Debug, Clone)]
pub struct ExportLog {
    path: PathBuf,
}

impl ExportLog {
    /// Open the export log, creating it with a header row if it does not
    /// exist or is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let log = Self {
            path: path.as_ref().to_path_buf(),
        };
        ensure_parent_dir(&log.path)?;

        let is_empty = std::fs::metadata(&log.path).map_or(true, |m| m.len() == 0);
        if is_empty {
            let mut writer = csv::Writer::from_path(&log.path).map_err(|e| log.write_error(e))?;
            writer
                .write_record(EXPORT_HEADER)
                .map_err(|e| log.write_error(e))?;
            writer.flush()?;
            debug!("Created export log at {}", log.path.display());
        }

        Ok(log)
    }

    /// Append one record as a row.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or written.
    pub fn append(&self, record: &PredictionRecord) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.write_error(e.into()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer
            .serialize(ExportRow::from(record))
            .map_err(|e| self.write_error(e))?;
        writer.flush()?;

        debug!("Exported prediction {} to {}", record.id, self.path.display());
        Ok(())
    }

    /// Read every row back.
    #[cfg(test)]
    pub(crate) fn rows(&self) -> Result<Vec<ExportRow>> {
        let mut reader = csv::Reader::from_path(&self.path).map_err(|e| self.write_error(e))?;
        let rows = reader
            .deserialize::<ExportRow>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| self.write_error(e))?;
        Ok(rows)
    }

    fn write_error(&self, source: csv::Error) -> Error {
        Error::ExportWrite {
            path: self.path.clone(),
            source,
        }
    }
}

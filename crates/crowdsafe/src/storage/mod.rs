//! Storage layer for crowdsafe.
//!
//! This module provides the two persistence targets of a prediction: the
//! `SQLite` database that backs the history and dashboard queries, and the
//! flat CSV export log that survives history clears.

pub mod export;
pub mod migrations;
pub mod schema;

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::prediction::{ChartData, Density, PredictionRecord, Risk, RiskCounts};

pub use export::ExportLog;

/// Columns read back for a record, in row order.
const RECORD_COLUMNS: &str = "id, timestamp, eventName, location, crowdCount, eventType, \
                              timeSlot, density, risk, recommendation, chartData";

/// `SQLite` store for prediction records.
#[derive(Debug)]
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist
    /// and brings the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        ensure_parent_dir(&path)?;

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&conn)?;

        debug!("Database ready at {}", path.display());
        Ok(Self { conn })
    }

    /// Create an in-memory storage instance for testing.
    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: std::path::PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Insert a prediction record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record's chart cannot be serialized, or if the
    /// insert fails (including a duplicate id).
    pub fn insert(&self, record: &PredictionRecord) -> Result<()> {
        let chart = record
            .chart_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            r"
            INSERT INTO predictions (
                id, timestamp, eventName, location, crowdCount,
                eventType, timeSlot, density, risk, recommendation, chartData
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
            params![
                record.id,
                record.timestamp.to_rfc3339(),
                record.event_name,
                record.location,
                record.crowd_count,
                record.event_type,
                record.time_slot,
                record.density.to_string(),
                record.risk.to_string(),
                record.recommendation,
                chart,
            ],
        )?;

        debug!("Inserted prediction with id {}", record.id);
        Ok(())
    }

    /// Get a full record, including its chart, by id.
    #[cfg(test)]
    pub(crate) fn get(&self, id: i64) -> Result<Option<PredictionRecord>> {
        use rusqlite::OptionalExtension;

        let sql = format!("SELECT {RECORD_COLUMNS} FROM predictions WHERE id = ?1");
        let record = self
            .conn
            .query_row(&sql, [id], |row| Self::row_to_record(row, true))
            .optional()?;
        Ok(record)
    }

    /// Get the most recent records, newest id first, without chart data.
    ///
    /// Rows that cannot be decoded into a record are logged and skipped, so
    /// fewer than `limit` records may come back.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_recent(&self, limit: usize) -> Result<Vec<PredictionRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM predictions ORDER BY id DESC LIMIT ?1");
        let mut stmt = self.conn.prepare(&sql)?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut records = Vec::new();
        for row in stmt.query_map([limit_i64], |row| Self::row_to_record(row, false))? {
            match row {
                Ok(record) => records.push(record),
                Err(e @ rusqlite::Error::FromSqlConversionFailure(..)) => {
                    warn!("Skipping undecodable prediction row: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(records)
    }

    /// Count all records.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Count records per risk tier.
    ///
    /// Rows whose risk column holds an unknown value count towards the total
    /// only.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn risk_counts(&self) -> Result<RiskCounts> {
        let mut counts = RiskCounts {
            total_predictions: self.count()?,
            ..RiskCounts::default()
        };

        let mut stmt = self
            .conn
            .prepare("SELECT risk, COUNT(*) FROM predictions GROUP BY risk")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (name, count) = row?;
            match name.as_deref().and_then(Risk::from_name) {
                Some(risk) => counts.add(risk, count),
                None => warn!("Ignoring {} rows with unknown risk {:?}", count, name),
            }
        }

        Ok(counts)
    }

    /// Delete every record.
    ///
    /// Returns the number of records deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn clear(&self) -> Result<usize> {
        let affected = self.conn.execute("DELETE FROM predictions", [])?;
        info!("Cleared {} predictions", affected);
        Ok(affected)
    }

    /// Convert a database row to a record.
    fn row_to_record(row: &rusqlite::Row, with_chart: bool) -> rusqlite::Result<PredictionRecord> {
        let id: i64 = row.get(0)?;
        let timestamp_str: String = row.get(1)?;
        let crowd_count: u32 = row.get(4)?;
        let density_str: String = row.get(7)?;
        let risk_str: String = row.get(8)?;

        let timestamp = parse_timestamp(&timestamp_str).unwrap_or_else(|| {
            warn!("Unparseable timestamp {:?} on prediction {}", timestamp_str, id);
            DateTime::<Utc>::UNIX_EPOCH
        });

        let density = Density::from_name(&density_str).unwrap_or_else(|| {
            warn!(
                "Unknown density {:?} on prediction {}, deriving from count",
                density_str, id
            );
            Density::from_count(crowd_count)
        });

        let risk = Risk::from_name(&risk_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                8,
                Type::Text,
                format!("unknown risk tier: {risk_str}").into(),
            )
        })?;

        let chart_data = if with_chart {
            let raw: Option<String> = row.get(10)?;
            raw.and_then(|json| match serde_json::from_str::<ChartData>(&json) {
                Ok(chart) => Some(chart),
                Err(e) => {
                    warn!("Unreadable chart data on prediction {}: {}", id, e);
                    None
                }
            })
        } else {
            None
        };

        Ok(PredictionRecord {
            id,
            timestamp,
            event_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            location: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            crowd_count,
            event_type: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            time_slot: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            density,
            risk,
            recommendation: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
            chart_data,
        })
    }
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 and the offset-less ISO form written by earlier
/// deployments, which is taken to be UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Create the parent directory of `path` if it is missing.
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}

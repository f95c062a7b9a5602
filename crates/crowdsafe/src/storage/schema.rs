//! `SQLite` schema definitions for crowdsafe.
//!
//! Column names follow the JSON field names of a prediction record so that
//! databases written by earlier deployments of the service stay readable.

/// SQL statement to create the predictions table.
pub const CREATE_PREDICTIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS predictions (
    id INTEGER PRIMARY KEY,
    timestamp TEXT,
    eventName TEXT,
    location TEXT,
    crowdCount INTEGER,
    eventType TEXT,
    timeSlot TEXT,
    density TEXT,
    risk TEXT,
    recommendation TEXT,
    chartData TEXT
)
";

/// SQL statement to create an index on risk for the dashboard aggregates.
///
/// Applied by migration 2, not part of the base schema.
pub const CREATE_RISK_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_predictions_risk ON predictions(risk)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All base schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[CREATE_PREDICTIONS_TABLE, CREATE_METADATA_TABLE];

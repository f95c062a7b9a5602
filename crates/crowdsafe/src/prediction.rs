//! Core prediction types for crowdsafe.
//!
//! This module defines the persisted prediction record together with the
//! density and risk tiers derived from a crowd count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Labels attached to every projected trend, one per projected point.
pub const CHART_LABELS: [&str; 5] = ["Current", "+30min", "+1hr", "+1.5hr", "+2hr"];

/// Coarse crowd density bucket derived from the raw count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Density {
    /// Fewer than 200 people.
    Low,
    /// Between 200 and 500 people, inclusive.
    Medium,
    /// More than 500 people.
    High,
}

impl Density {
    /// Bucket a crowd count into a density tier.
    #[must_use]
    pub fn from_count(count: u32) -> Self {
        match count {
            0..=199 => Self::Low,
            200..=500 => Self::Medium,
            _ => Self::High,
        }
    }

    /// Parse the stored name of a density tier.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Low" => Some(Self::Low),
            "Medium" => Some(Self::Medium),
            "High" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Density {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

/// Crowd safety classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Risk {
    /// No intervention needed.
    Safe,
    /// Extra security presence advised.
    Warning,
    /// Immediate intervention required.
    Dangerous,
}

impl Risk {
    /// Every risk tier, in ascending severity.
    #[cfg(test)]
    pub(crate) const ALL: [Self; 3] = [Self::Safe, Self::Warning, Self::Dangerous];

    /// Parse the stored name of a risk tier.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Safe" => Some(Self::Safe),
            "Warning" => Some(Self::Warning),
            "Dangerous" => Some(Self::Dangerous),
            _ => None,
        }
    }
}

impl std::fmt::Display for Risk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => write!(f, "Safe"),
            Self::Warning => write!(f, "Warning"),
            Self::Dangerous => write!(f, "Dangerous"),
        }
    }
}

/// A labeled five-point projected crowd series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartData {
    /// Point labels, always [`CHART_LABELS`].
    pub labels: Vec<String>,
    /// Projected crowd counts; the first entry is the observed count.
    pub data: Vec<u32>,
}

impl ChartData {
    /// Attach the standard labels to a projected series.
    #[must_use]
    pub fn from_trend(trend: [u32; 5]) -> Self {
        Self {
            labels: CHART_LABELS.iter().map(ToString::to_string).collect(),
            data: trend.to_vec(),
        }
    }
}

/// A single persisted crowd-safety prediction.
///
/// Records are created once on a successful submission and never updated.
/// `chart_data` is `None` only when a record is read back through the
/// history listing, which omits the projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    /// Millisecond-epoch identifier, strictly increasing within a process.
    pub id: i64,

    /// When the prediction was made.
    pub timestamp: DateTime<Utc>,

    /// Caller-supplied event name.
    pub event_name: String,

    /// Caller-supplied location.
    pub location: String,

    /// Observed or estimated number of people.
    pub crowd_count: u32,

    /// Caller-supplied event type, e.g. `Festival`.
    pub event_type: String,

    /// Caller-supplied time slot, e.g. `Evening`.
    pub time_slot: String,

    /// Density tier at creation time.
    pub density: Density,

    /// Risk tier at creation time.
    pub risk: Risk,

    /// Action recommended for the risk tier.
    pub recommendation: String,

    /// Projected crowd trend.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub chart_data: Option<ChartData>,
}

/// Record counts per risk tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCounts {
    /// Number of records in the store.
    pub total_predictions: i64,
    /// Records classified as Safe.
    pub safe: i64,
    /// Records classified as Warning.
    pub warning: i64,
    /// Records classified as Dangerous.
    pub dangerous: i64,
}

impl RiskCounts {
    /// Add `count` records of the given tier.
    pub fn add(&mut self, risk: Risk, count: i64) {
        match risk {
            Risk::Safe => self.safe += count,
            Risk::Warning => self.warning += count,
            Risk::Dangerous => self.dangerous += count,
        }
    }
}

//! Prediction service: the transport-independent request handlers.
//!
//! Each operation validates its input, runs the classifier and the trend
//! projector, and talks to the injected [`PredictionStore`]. Nothing here
//! knows about HTTP.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::classifier::{self, ClassifierVariant};
use crate::config::Config;
use crate::detector::{BodyDetector, CountSource, FallbackRange, SignatureDetector};
use crate::error::{Error, Result};
use crate::prediction::{ChartData, PredictionRecord, RiskCounts};
use crate::store::{FileStore, PredictionStore};
use crate::trend;

/// Message returned for a submission with missing fields.
pub const MISSING_FIELDS: &str = "All fields are required";

/// Message returned for a crowd count that is not a non-negative integer.
pub const INVALID_COUNT: &str = "crowdCount must be a non-negative integer";

/// Message returned after the history was cleared.
pub const HISTORY_CLEARED: &str = "History cleared";

/// Sentinel event name for image submissions.
pub const IMAGE_EVENT_NAME: &str = "Image Based Event";

/// Sentinel location for image submissions.
pub const IMAGE_LOCATION: &str = "Uploaded Image";

/// Sentinel event type and time slot for image submissions.
pub const IMAGE_SENTINEL: &str = "Image";

/// A crowd count as sent by a client: a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CrowdCountInput {
    /// A JSON number.
    Number(serde_json::Number),
    /// A string holding an integer.
    Text(String),
}

impl CrowdCountInput {
    fn is_blank(&self) -> bool {
        matches!(self, Self::Text(text) if text.trim().is_empty())
    }

    fn to_count(&self) -> Result<u32> {
        let value = match self {
            Self::Number(number) => number
                .as_i64()
                .or_else(|| number.as_u64().map(|_| i64::MAX))
                .or_else(|| whole_number(number.as_f64()?)),
            Self::Text(text) => text.trim().parse::<i64>().ok(),
        };

        value
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| Error::validation(INVALID_COUNT))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn whole_number(value: f64) -> Option<i64> {
    (value.fract() == 0.0 && value.abs() < 9.0e15).then(|| value as i64)
}

/// Fields of a manual submission as received.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualSubmission {
    /// Event name.
    pub event_name: Option<String>,
    /// Location.
    pub location: Option<String>,
    /// Crowd count.
    pub crowd_count: Option<CrowdCountInput>,
    /// Event type, e.g. `Festival`.
    pub event_type: Option<String>,
    /// Time slot, e.g. `Evening`.
    pub time_slot: Option<String>,
}

struct ValidSubmission {
    event_name: String,
    location: String,
    crowd_count: u32,
    event_type: String,
    time_slot: String,
}

impl ManualSubmission {
    fn validate(self) -> Result<ValidSubmission> {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        let count = self.crowd_count.filter(|c| !c.is_blank());
        let (Some(event_name), Some(location), Some(count), Some(event_type), Some(time_slot)) = (
            present(self.event_name),
            present(self.location),
            count,
            present(self.event_type),
            present(self.time_slot),
        ) else {
            return Err(Error::validation(MISSING_FIELDS));
        };

        Ok(ValidSubmission {
            event_name,
            location,
            crowd_count: count.to_count()?,
            event_type,
            time_slot,
        })
    }
}

/// Body of the health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    /// Always `"ok"`.
    pub status: &'static str,
}

/// Issues record ids from the millisecond clock.
///
/// An id is never smaller than or equal to the previous one issued by the
/// same generator, even when the clock stalls or steps back.
///
/// The ordering covers issuance only. Ids are issued before the record is
/// stored, so two concurrent submissions may reach the store in the
/// opposite order of their ids.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    /// Issue the id for a record created at `now`.
    pub fn next(&self, now: DateTime<Utc>) -> i64 {
        let candidate = now.timestamp_millis();
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(candidate.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        candidate.max(previous.saturating_add(1))
    }
}

/// Orchestrates classification, projection and persistence.
pub struct PredictionService {
    store: Arc<dyn PredictionStore>,
    detector: Arc<dyn BodyDetector>,
    rng: Mutex<Box<dyn RngCore + Send>>,
    ids: IdGenerator,
    history_limit: usize,
    fallback: FallbackRange,
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("store", &self.store)
            .field("detector", &self.detector.name())
            .field("history_limit", &self.history_limit)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl PredictionService {
    /// Create a service over the given store and detector.
    ///
    /// Randomness is seeded from the operating system.
    #[must_use]
    pub fn new(store: Arc<dyn PredictionStore>, detector: Arc<dyn BodyDetector>) -> Self {
        Self {
            store,
            detector,
            rng: Mutex::new(Box::new(StdRng::from_os_rng())),
            ids: IdGenerator::default(),
            history_limit: 50,
            fallback: FallbackRange::default(),
        }
    }

    /// Build the production service from configuration.
    ///
    /// The database and export log are created eagerly so that a bad path
    /// fails at startup instead of on the first request.
    ///
    /// # Errors
    ///
    /// Returns an error if either persistence target cannot be created.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = FileStore::from_config(config);
        store.initialize()?;
        info!(
            "Using database {} and export log {}",
            store.database_path().display(),
            store.export_path().display()
        );

        Ok(Self::new(Arc::new(store), Arc::new(SignatureDetector))
            .with_history_limit(config.storage.history_limit)
            .with_fallback_range(FallbackRange::new(
                config.detection.fallback_min,
                config.detection.fallback_max,
            )))
    }

    /// Replace the random source used for trends and fallback estimates.
    #[must_use]
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    /// Set how many records the history returns.
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set the bounds of the fallback estimate.
    #[must_use]
    pub fn with_fallback_range(mut self, range: FallbackRange) -> Self {
        self.fallback = range;
        self
    }

    /// Classify and store a manually entered observation.
    ///
    /// # Errors
    ///
    /// Returns a validation error for missing or malformed fields, or a
    /// storage error if the record cannot be persisted.
    pub fn submit_manual(&self, submission: ManualSubmission) -> Result<PredictionRecord> {
        let fields = submission.validate()?;
        let record = self.record(
            ClassifierVariant::Manual,
            fields.event_name,
            fields.location,
            fields.crowd_count,
            fields.event_type,
            fields.time_slot,
        );
        self.store.append(&record)?;

        info!(
            id = record.id,
            variant = %ClassifierVariant::Manual,
            crowd_count = record.crowd_count,
            risk = %record.risk,
            "Stored prediction"
        );
        Ok(record)
    }

    /// Count, classify and store the crowd in an uploaded image.
    ///
    /// # Errors
    ///
    /// Returns an upstream detector error if the image cannot be analysed,
    /// or a storage error if the record cannot be persisted.
    pub fn submit_image(&self, image: &[u8]) -> Result<PredictionRecord> {
        let detected = self.detector.count_bodies(image)?;
        let (crowd_count, source) = {
            let mut rng = self.rng.lock();
            self.fallback.resolve(detected, &mut *rng)
        };

        match source {
            CountSource::Detector => info!(
                count_source = %source,
                detector = self.detector.name(),
                crowd_count,
                "Detected bodies in image"
            ),
            CountSource::Fallback => warn!(
                count_source = %source,
                detector = self.detector.name(),
                crowd_count,
                fallback_min = self.fallback.min(),
                fallback_max = self.fallback.max(),
                "No bodies detected, using fallback estimate"
            ),
        }

        let record = self.record(
            ClassifierVariant::Image,
            IMAGE_EVENT_NAME.to_string(),
            IMAGE_LOCATION.to_string(),
            crowd_count,
            IMAGE_SENTINEL.to_string(),
            IMAGE_SENTINEL.to_string(),
        );
        self.store.append(&record)?;

        info!(
            id = record.id,
            variant = %ClassifierVariant::Image,
            count_source = %source,
            crowd_count = record.crowd_count,
            risk = %record.risk,
            "Stored prediction"
        );
        Ok(record)
    }

    /// Dashboard totals.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub fn stats(&self) -> Result<RiskCounts> {
        self.store.aggregate_counts()
    }

    /// Most recent records, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub fn history(&self) -> Result<Vec<PredictionRecord>> {
        self.store.list_recent(self.history_limit)
    }

    /// Remove every record from the queryable store.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be cleared.
    pub fn clear_history(&self) -> Result<&'static str> {
        let removed = self.store.clear()?;
        info!(removed, "History cleared");
        Ok(HISTORY_CLEARED)
    }

    /// Liveness status.
    #[must_use]
    pub fn health(&self) -> HealthStatus {
        HealthStatus { status: "ok" }
    }

    /// Classify with the rule set of `variant`, project the trend and stamp
    /// a fresh id and timestamp.
    fn record(
        &self,
        variant: ClassifierVariant,
        event_name: String,
        location: String,
        crowd_count: u32,
        event_type: String,
        time_slot: String,
    ) -> PredictionRecord {
        let assessment =
            classifier::classify_with(variant, crowd_count, &time_slot, &event_type);
        let trend = {
            let mut rng = self.rng.lock();
            trend::project(crowd_count, &time_slot, &mut *rng)
        };
        let timestamp = Utc::now();

        tracing::debug!(%variant, ?trend, "Projected crowd trend");

        PredictionRecord {
            id: self.ids.next(timestamp),
            timestamp,
            event_name,
            location,
            crowd_count,
            event_type,
            time_slot,
            density: assessment.density,
            risk: assessment.risk,
            recommendation: assessment.recommendation.to_string(),
            chart_data: Some(ChartData::from_trend(trend)),
        }
    }
}

//! Rule-based crowd risk classification.
//!
//! Two rule sets exist and are kept apart on purpose: manual submissions
//! refine the risk with the time slot and event type, image submissions map
//! density straight onto risk with their own recommendation texts.

use crate::prediction::{Density, Risk};

/// Time slots that escalate a High density to Dangerous.
const LATE_TIME_SLOTS: [&str; 2] = ["Evening", "Night"];

/// Which rule set produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierVariant {
    /// Caller-entered counts with time slot and event type context.
    Manual,
    /// Counts inferred from an uploaded image.
    Image,
}

impl std::fmt::Display for ClassifierVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// Outcome of classifying a crowd observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    /// Density tier of the count.
    pub density: Density,
    /// Risk tier.
    pub risk: Risk,
    /// Recommended action.
    pub recommendation: &'static str,
}

/// Classify a manually submitted observation.
///
/// Rules are evaluated top to bottom and the first match wins.
#[must_use]
pub fn classify(crowd_count: u32, time_slot: &str, event_type: &str) -> Assessment {
    let density = Density::from_count(crowd_count);
    let (risk, recommendation) = match density {
        Density::High if LATE_TIME_SLOTS.contains(&time_slot) => (
            Risk::Dangerous,
            "URGENT: Deploy additional security staff immediately.",
        ),
        Density::High => (Risk::Warning, "Deploy additional security personnel."),
        Density::Medium if event_type == "Festival" => {
            (Risk::Warning, "Ensure adequate security presence.")
        }
        Density::Medium if event_type == "Political" => {
            (Risk::Warning, "Increase security measures.")
        }
        Density::Medium => (Risk::Safe, "Crowd density is manageable."),
        Density::Low => (Risk::Safe, "Crowd is under control."),
    };

    Assessment {
        density,
        risk,
        recommendation,
    }
}

/// Classify a count inferred from an uploaded image.
#[must_use]
pub fn classify_image(crowd_count: u32) -> Assessment {
    let density = Density::from_count(crowd_count);
    let (risk, recommendation) = match density {
        Density::High => (
            Risk::Dangerous,
            "URGENT: Deploy additional security staff immediately. Open extra exits.",
        ),
        Density::Medium => (
            Risk::Warning,
            "Moderate crowd detected. Increase monitoring and security.",
        ),
        Density::Low => (
            Risk::Safe,
            "Crowd is under control. Standard security measures are sufficient.",
        ),
    };

    Assessment {
        density,
        risk,
        recommendation,
    }
}

/// Classify with the rule set of the given variant.
///
/// The image variant ignores `time_slot` and `event_type`.
#[must_use]
pub fn classify_with(
    variant: ClassifierVariant,
    crowd_count: u32,
    time_slot: &str,
    event_type: &str,
) -> Assessment {
    match variant {
        ClassifierVariant::Manual => classify(crowd_count, time_slot, event_type),
        ClassifierVariant::Image => classify_image(crowd_count),
    }
}

//! Synthetic crowd trend projection.
//!
//! Produces the five-point series drawn on the dashboard chart. The series is
//! illustrative only: each step compounds a time-slot growth factor with a
//! small random perturbation, so two projections of the same input differ.

use rand::Rng;

/// Number of points in a projection, including the observed count.
pub const TREND_POINTS: usize = 5;

/// Growth factor used for time slots without an entry in the table.
pub const DEFAULT_GROWTH: f64 = 1.10;

/// Maximum absolute per-step perturbation of the growth factor.
pub const NOISE_AMPLITUDE: f64 = 0.05;

/// Per-step growth factor for a time slot.
#[must_use]
pub fn growth_factor(time_slot: &str) -> f64 {
    match time_slot {
        "Morning" => 1.15,
        "Afternoon" => 1.08,
        "Evening" => 1.25,
        "Night" => 0.92,
        _ => DEFAULT_GROWTH,
    }
}

/// Project a crowd count forward over the chart horizon.
///
/// The first point is always `base_count`. Every following point is the
/// previous one scaled by the growth factor plus noise drawn uniformly from
/// `[-NOISE_AMPLITUDE, NOISE_AMPLITUDE]`, rounded and clamped to `u32`.
pub fn project<R: Rng>(base_count: u32, time_slot: &str, rng: &mut R) -> [u32; TREND_POINTS] {
    let growth = growth_factor(time_slot);
    let mut trend = [0u32; TREND_POINTS];
    trend[0] = base_count;

    for step in 1..TREND_POINTS {
        let noise: f64 = rng.random_range(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE);
        let next = (f64::from(trend[step - 1]) * (growth + noise)).round();
        trend[step] = clamp_to_count(next);
    }

    trend
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_to_count(value: f64) -> u32 {
    value.clamp(0.0, f64::from(u32::MAX)) as u32
}

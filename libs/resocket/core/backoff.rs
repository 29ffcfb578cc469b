//! Delay between reconnection attempts
//!
//! `delay = initial_delay × backoff_multiplier^(attempt − 1)`, capped at
//! `max_delay`. With jitter enabled the capped value is moved by a uniform
//! offset of up to ±25% and floored at zero. Attempts are numbered from 1.

use crate::core::config::ReconnectionPolicy;
use rand::Rng;
use std::time::Duration;

/// Fraction of the capped delay that jitter may add or remove
pub const JITTER_RATIO: f64 = 0.25;

/// Delay before reconnection attempt `attempt`, using the thread RNG for jitter
pub fn delay(attempt: u32, policy: &ReconnectionPolicy) -> Duration {
    delay_with(attempt, policy, &mut rand::thread_rng())
}

/// Delay before reconnection attempt `attempt`, drawing jitter from `rng`
pub fn delay_with<R>(attempt: u32, policy: &ReconnectionPolicy, rng: &mut R) -> Duration
where
    R: Rng,
{
    let capped = capped_nanos(attempt, policy);

    let realized = if policy.jitter && capped > 0.0 {
        let offset = rng.gen_range(-JITTER_RATIO..=JITTER_RATIO) * capped;
        (capped + offset).max(0.0)
    } else {
        capped
    };

    // Beyond u64 nanoseconds (about 584 years) the wait is unbounded
    if realized >= u64::MAX as f64 {
        return Duration::MAX;
    }
    Duration::from_nanos(realized.round() as u64)
}

/// Non-jittered delay in nanoseconds
fn capped_nanos(attempt: u32, policy: &ReconnectionPolicy) -> f64 {
    let initial = policy.initial_delay.as_nanos() as f64;
    let max = policy.max_delay.as_nanos() as f64;

    if initial == 0.0 {
        return 0.0;
    }

    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let base = initial * policy.backoff_multiplier.powi(exponent);

    // powi overflows to infinity for large exponents; min() then caps it
    base.min(max)
}

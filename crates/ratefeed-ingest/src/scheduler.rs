//! Traffic shaping
//!
//! Decides how many records to release in the current one-minute window.
//! The daily target is spread over the day by an hourly share table, scaled
//! by a day-of-week multiplier, divided into per-minute windows and then
//! jittered by a uniform factor so emission is never perfectly flat.

use chrono::{DateTime, Datelike, Timelike, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Mutex;

/// Share of the daily volume released in each UTC hour
pub const HOURLY_SHARE: [f64; 24] = [
    0.003, 0.002, 0.002, 0.002, 0.002, 0.003, // 00-05
    0.010, 0.015, 0.025, // 06-08
    0.070, 0.065, 0.065, // 09-11
    0.125, 0.125, // 12-13
    0.050, 0.050, 0.050, // 14-16
    0.100, 0.100, 0.050, // 17-19
    0.025, 0.020, 0.015, 0.010, // 20-23
];

/// Day-of-week multiplier, Monday first
pub const DAY_MULTIPLIER: [f64; 7] = [1.1, 1.0, 1.0, 1.0, 0.9, 0.3, 0.2];

/// Share used for an hour outside the table
pub const FALLBACK_HOURLY_SHARE: f64 = 0.01;

pub const JITTER_MIN: f64 = 0.7;
pub const JITTER_MAX: f64 = 1.3;

/// Minutes per hour; each invocation is sized as one minute's worth of traffic
const WINDOWS_PER_HOUR: f64 = 60.0;

/// Diurnal load shape
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficProfile {
    pub hourly_share: [f64; 24],
    pub day_multiplier: [f64; 7],
    pub jitter_min: f64,
    pub jitter_max: f64,
}

impl Default for TrafficProfile {
    fn default() -> Self {
        Self {
            hourly_share: HOURLY_SHARE,
            day_multiplier: DAY_MULTIPLIER,
            jitter_min: JITTER_MIN,
            jitter_max: JITTER_MAX,
        }
    }
}

impl TrafficProfile {
    pub fn hourly_share(&self, hour: u32) -> f64 {
        self.hourly_share
            .get(hour as usize)
            .copied()
            .unwrap_or(FALLBACK_HOURLY_SHARE)
    }

    pub fn day_multiplier(&self, day_of_week: u32) -> f64 {
        self.day_multiplier
            .get(day_of_week as usize)
            .copied()
            .unwrap_or(1.0)
    }

    /// Target record count for one window, given an already-sampled jitter factor
    ///
    /// Rounds half to even (12.5 -> 12, 13.5 -> 14) and never goes below zero.
    /// `minute` does not affect the result: every minute of an hour gets the
    /// same base rate.
    pub fn target_count(
        &self,
        hour: u32,
        _minute: u32,
        day_of_week: u32,
        daily_target: u64,
        factor: f64,
    ) -> u64 {
        let hourly = daily_target as f64 * self.hourly_share(hour) * self.day_multiplier(day_of_week);
        let window = (hourly / WINDOWS_PER_HOUR * factor).round_ties_even();

        if window > 0.0 {
            window as u64
        } else {
            0
        }
    }
}

/// [`TrafficProfile::target_count`] against the default profile
pub fn compute_target_count(
    hour: u32,
    minute: u32,
    day_of_week: u32,
    daily_target: u64,
    factor: f64,
) -> u64 {
    TrafficProfile::default().target_count(hour, minute, day_of_week, daily_target, factor)
}

enum Jitter {
    Random(Mutex<StdRng>),
    Fixed(f64),
}

/// Samples the jitter factor and computes window targets from wall-clock time
pub struct RateScheduler {
    profile: TrafficProfile,
    jitter: Jitter,
}

impl RateScheduler {
    /// Scheduler seeded from OS entropy
    pub fn new(profile: TrafficProfile) -> Self {
        Self {
            profile,
            jitter: Jitter::Random(Mutex::new(StdRng::from_entropy())),
        }
    }

    /// Reproducible scheduler
    pub fn seeded(profile: TrafficProfile, seed: u64) -> Self {
        Self {
            profile,
            jitter: Jitter::Random(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// Scheduler that always applies `factor` instead of sampling one
    pub fn fixed(profile: TrafficProfile, factor: f64) -> Self {
        Self {
            profile,
            jitter: Jitter::Fixed(factor),
        }
    }

    pub fn profile(&self) -> &TrafficProfile {
        &self.profile
    }

    pub fn sample_factor(&self) -> f64 {
        match &self.jitter {
            Jitter::Fixed(factor) => *factor,
            Jitter::Random(rng) => {
                let mut rng = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                rng.gen_range(self.profile.jitter_min..=self.profile.jitter_max)
            },
        }
    }

    /// Target for the window containing `now` (UTC)
    pub fn target_at(&self, now: DateTime<Utc>, daily_target: u64) -> u64 {
        self.profile.target_count(
            now.hour(),
            now.minute(),
            now.weekday().num_days_from_monday(),
            daily_target,
            self.sample_factor(),
        )
    }
}

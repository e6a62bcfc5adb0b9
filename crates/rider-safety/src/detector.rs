//! Threshold fall detector over accelerometer samples.
//!
//! A fall is a free-fall phase (acceleration magnitude well below 1 g)
//! followed shortly by an impact spike. This is a heuristic for prompting
//! an alert, not a medical-grade classifier.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One accelerometer reading in g units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelSample {
    /// Monotonic time of the reading since the ride started.
    pub at: Duration,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelSample {
    pub fn new(at: Duration, x: f64, y: f64, z: f64) -> Self {
        Self { at, x, y, z }
    }

    /// Magnitude of the acceleration vector.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Detector thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Magnitude below which the rider is considered in free fall.
    pub free_fall_g: f64,
    /// Minimum free-fall duration.
    pub min_free_fall: Duration,
    /// Magnitude above which a reading counts as an impact.
    pub impact_g: f64,
    /// How long after free fall ends an impact is still attributed to it.
    pub impact_window: Duration,
    /// Quiet period after a signal.
    pub cooldown: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            free_fall_g: 0.5,
            min_free_fall: Duration::from_millis(80),
            impact_g: 2.5,
            impact_window: Duration::from_secs(1),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// A probable fall.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallSignal {
    /// Time of the impact reading.
    pub at: Duration,
    /// Length of the free-fall phase.
    pub free_fall: Duration,
    /// Impact magnitude in g.
    pub impact_g: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    FreeFall { since: Duration },
    AwaitingImpact { free_fall_end: Duration, free_fall: Duration },
}

/// Streaming fall detector.
#[derive(Debug, Clone)]
pub struct FallDetector {
    config: DetectorConfig,
    phase: Phase,
    last_sample: Option<Duration>,
    last_signal: Option<Duration>,
}

impl Default for FallDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl FallDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            last_sample: None,
            last_signal: None,
        }
    }

    /// Feed one sample. Returns a signal when a fall completes.
    pub fn push(&mut self, sample: AccelSample) -> Option<FallSignal> {
        if self.last_sample.is_some_and(|prev| sample.at < prev) {
            debug!(at = ?sample.at, "Out-of-order sample, resetting detector");
            self.phase = Phase::Idle;
        }
        self.last_sample = Some(sample.at);

        if self.in_cooldown(sample.at) {
            return None;
        }

        let magnitude = sample.magnitude();
        if magnitude < self.config.free_fall_g {
            if !matches!(self.phase, Phase::FreeFall { .. }) {
                self.phase = Phase::FreeFall { since: sample.at };
            }
            return None;
        }

        match self.phase {
            Phase::Idle => None,
            Phase::FreeFall { since } => {
                let free_fall = sample.at.saturating_sub(since);
                if free_fall < self.config.min_free_fall {
                    self.phase = Phase::Idle;
                    return None;
                }
                self.phase = Phase::AwaitingImpact {
                    free_fall_end: sample.at,
                    free_fall,
                };
                self.check_impact(sample, magnitude, free_fall)
            }
            Phase::AwaitingImpact {
                free_fall_end,
                free_fall,
            } => {
                if sample.at.saturating_sub(free_fall_end) > self.config.impact_window {
                    self.phase = Phase::Idle;
                    return None;
                }
                self.check_impact(sample, magnitude, free_fall)
            }
        }
    }

    /// Forget any partial fall and the cooldown.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.last_sample = None;
        self.last_signal = None;
    }

    fn check_impact(&mut self, sample: AccelSample, magnitude: f64, free_fall: Duration) -> Option<FallSignal> {
        if magnitude <= self.config.impact_g {
            return None;
        }

        self.phase = Phase::Idle;
        self.last_signal = Some(sample.at);
        info!(at = ?sample.at, ?free_fall, impact_g = magnitude, "Fall signal");
        Some(FallSignal {
            at: sample.at,
            free_fall,
            impact_g: magnitude,
        })
    }

    fn in_cooldown(&self, at: Duration) -> bool {
        self.last_signal
            .is_some_and(|signal| at.saturating_sub(signal) < self.config.cooldown)
    }
}

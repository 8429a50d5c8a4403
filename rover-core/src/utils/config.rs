//! Vehicle geometry and navigation tuning for the rover.
//!
//! `VehicleGeometry` converts between wheel travel and encoder pulses, and
//! `NavConfig` bundles the geometry with every threshold and timing constant the
//! navigator consumes. Both are fixed for the lifetime of one run.
//!
//! # Example
//! ```rust
//! use rover_core::utils::config::NavConfig;
//! let cfg = NavConfig::default();
//! assert_eq!(cfg.target_pulses(), 281);
//! assert_eq!(cfg.turn_pulses(), 32);
//! ```
//!
use core::f32::consts::PI;
use embassy_time::Duration;
use serde::{Deserialize, Serialize};

/// Physical dimensions of the drive train and encoder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleGeometry {
    /// Wheel circumference (cm)
    pub wheel_circumference_cm: f32,
    /// Encoder pulses per full wheel revolution
    pub pulses_per_revolution: u32,
    /// Distance between the two drive wheels (cm)
    pub vehicle_width_cm: f32,
    /// Empirical slip compensation applied to pivot turns
    pub turn_correction: f32,
}

impl Default for VehicleGeometry {
    fn default() -> Self {
        Self {
            wheel_circumference_cm: 21.28,
            pulses_per_revolution: 40,
            vehicle_width_cm: 13.5,
            turn_correction: 0.40,
        }
    }
}

impl VehicleGeometry {
    /// Encoder pulses produced by one centimeter of wheel travel.
    pub fn pulses_per_cm(&self) -> f32 {
        self.pulses_per_revolution as f32 / self.wheel_circumference_cm
    }

    /// Wheel travel (cm) represented by `pulses` encoder pulses.
    pub fn distance_for_pulses(
        &self,
        pulses: u32,
    ) -> f32 {
        pulses as f32 / self.pulses_per_cm()
    }

    /// Whole pulses needed to cover `distance_cm`, rounded down.
    pub fn pulses_for_distance(
        &self,
        distance_cm: f32,
    ) -> u32 {
        let pulses = distance_cm / self.wheel_circumference_cm * self.pulses_per_revolution as f32;
        libm::floorf(pulses.max(0.0)) as u32
    }

    /// Pulses each wheel must count for a 90° in-place pivot.
    ///
    /// `width * π / 2` is the half-circumference swept by the pivot; the
    /// correction factor scales it to account for wheel slip.
    pub fn turn_pulses(&self) -> u32 {
        let arc = self.vehicle_width_cm * PI * self.turn_correction;
        libm::roundf(arc / self.wheel_circumference_cm * self.pulses_per_revolution as f32) as u32
    }
}

/// Thresholds, targets and timing for one navigation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    pub geometry: VehicleGeometry,
    /// Front/side readings at or below this distance count as obstacles (cm)
    pub obstacle_threshold_cm: f32,
    /// Distance to travel before stopping (cm)
    pub target_distance_cm: f32,
    /// Bound on each echo edge wait (µs)
    pub sensor_timeout_us: u32,
    /// Minimum spacing between accepted encoder edges (µs)
    pub debounce_us: u32,
    /// Pause between measurements on different sensors (ms)
    pub settle_ms: u32,
    /// Hold after stopping for an obstacle (ms)
    pub obstacle_pause_ms: u32,
    /// Normalized PWM duty for both motors, `0.0..=1.0`
    pub motor_speed: f32,
    /// Abort a pivot that has not reached its pulse count in time (ms).
    /// `None` waits forever.
    pub turn_timeout_ms: Option<u32>,
    /// Interval between pulse count polls while pivoting (µs)
    pub turn_poll_us: u32,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            geometry: VehicleGeometry::default(),
            obstacle_threshold_cm: 30.0,
            target_distance_cm: 150.0,
            sensor_timeout_us: 40_000,
            debounce_us: 1_000,
            settle_ms: 50,
            obstacle_pause_ms: 1_000,
            motor_speed: 55_000.0 / 65_535.0,
            turn_timeout_ms: Some(5_000),
            turn_poll_us: 500,
        }
    }
}

impl NavConfig {
    /// Pulse count at which the forward run is complete.
    pub fn target_pulses(&self) -> u32 {
        self.geometry.pulses_for_distance(self.target_distance_cm)
    }

    /// Pulse count at which a pivot is complete.
    pub fn turn_pulses(&self) -> u32 {
        self.geometry.turn_pulses()
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_micros(self.sensor_timeout_us as u64)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms as u64)
    }

    pub fn obstacle_pause(&self) -> Duration {
        Duration::from_millis(self.obstacle_pause_ms as u64)
    }

    pub fn turn_timeout(&self) -> Option<Duration> {
        self.turn_timeout_ms
            .map(|ms| Duration::from_millis(ms as u64))
    }
}

//! Sensing for the rover.
//!
//! - `ultrasonic`: trigger/echo range sensors and the three-direction array
//! - `odometer`: debounced wheel encoder pulse counter

pub mod odometer;
pub mod ultrasonic;

use embassy_time::Instant;
use serde::Serialize;

pub use ultrasonic::{SensorArray, SensorError, UltrasonicSensor};

/// Speed of sound in air at room temperature (cm/µs).
pub const SPEED_OF_SOUND_CM_PER_US: f32 = 0.0343;

/// Fixed mounting directions of the three range sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Front,
    Left,
    Right,
}

impl Direction {
    /// Poll order within one cycle.
    pub const POLL_ORDER: [Direction; 3] = [Direction::Front, Direction::Left, Direction::Right];
}

/// Result of one range measurement.
///
/// `Timeout` means no echo was seen within the bound and is read as "no
/// obstacle", never as an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "r", rename_all = "snake_case")]
pub enum DistanceReading {
    Cm { d: f32 },
    Timeout,
}

impl DistanceReading {
    /// Convert a round-trip echo duration into a one-way distance.
    pub fn from_echo_us(high_us: u32) -> Self {
        DistanceReading::Cm {
            d: high_us as f32 * SPEED_OF_SOUND_CM_PER_US / 2.0,
        }
    }

    /// The measured distance, if any.
    pub fn cm(&self) -> Option<f32> {
        match *self {
            DistanceReading::Cm { d } => Some(d),
            DistanceReading::Timeout => None,
        }
    }

    /// True for a valid positive reading at or below `threshold_cm`.
    pub fn is_obstacle(
        &self,
        threshold_cm: f32,
    ) -> bool {
        matches!(*self, DistanceReading::Cm { d } if d > 0.0 && d <= threshold_cm)
    }
}

/// Monotonic microsecond time source.
///
/// Wraps around; callers compare instants with `wrapping_sub`.
pub trait Clock {
    fn now_us(&self) -> u32;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_us(&self) -> u32 {
        (**self).now_us()
    }
}

/// `Clock` backed by the embassy time driver of the target HAL.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_us(&self) -> u32 {
        Instant::now().as_micros() as u32
    }
}

/// A single trigger/echo distance sensor.
pub trait RangeSensor {
    type Error: core::fmt::Debug;

    fn measure(&mut self) -> Result<DistanceReading, Self::Error>;
}

/// Range sensing in the three fixed directions, as consumed by the navigator.
pub trait RangeSensors {
    type Error: core::fmt::Debug;

    fn measure(
        &mut self,
        direction: Direction,
    ) -> Result<DistanceReading, Self::Error>;
}

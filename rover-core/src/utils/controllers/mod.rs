//! Module Exports
//!
//! This file exports the motor control types used by the navigator.
//!
//! - `hbridge`: dual H-bridge driver with a shared PWM enable line.

/// Module for driving the two wheel motors.
pub mod hbridge;

use serde::{Deserialize, Serialize};

pub use hbridge::{ActuatorError, DualHBridge};

/// Rotation sense of a single wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelDirection {
    Forward,
    Reverse,
    Stop,
}

/// Direction of an in-place pivot turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pivot {
    Left,
    Right,
}

/// Per-wheel directions for one actuation. Speed is set separately and shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorCommand {
    pub left: WheelDirection,
    pub right: WheelDirection,
}

impl MotorCommand {
    pub const FORWARD: MotorCommand = MotorCommand {
        left: WheelDirection::Forward,
        right: WheelDirection::Forward,
    };
    pub const STOP: MotorCommand = MotorCommand {
        left: WheelDirection::Stop,
        right: WheelDirection::Stop,
    };

    /// Opposed wheels: the wheel on the turn side runs backwards.
    pub const fn pivot(direction: Pivot) -> Self {
        match direction {
            Pivot::Left => MotorCommand {
                left: WheelDirection::Reverse,
                right: WheelDirection::Forward,
            },
            Pivot::Right => MotorCommand {
                left: WheelDirection::Forward,
                right: WheelDirection::Reverse,
            },
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self == MotorCommand::STOP
    }
}

/// Fire-and-forget drive interface. Implementations keep no notion of where
/// the vehicle is.
pub trait MotionActuator {
    type Error: core::fmt::Debug;

    /// Set both wheel directions.
    fn apply(
        &mut self,
        command: MotorCommand,
    ) -> Result<(), Self::Error>;

    /// Set the shared duty cycle, `0.0..=1.0`.
    fn set_speed(
        &mut self,
        level: f32,
    ) -> Result<(), Self::Error>;

    fn drive_forward(&mut self) -> Result<(), Self::Error> {
        self.apply(MotorCommand::FORWARD)
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        self.apply(MotorCommand::STOP)
    }

    fn pivot(
        &mut self,
        direction: Pivot,
    ) -> Result<(), Self::Error> {
        self.apply(MotorCommand::pivot(direction))
    }
}

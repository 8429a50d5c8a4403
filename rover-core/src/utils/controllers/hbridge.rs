//! Dual H-bridge motor driver for the rover.
//!
//! Each wheel motor is wired to a pair of direction inputs (IN1/IN2 for the
//! left wheel, IN3/IN4 for the right). Both bridges share a single PWM enable
//! line, so speed is common to the two wheels.

use embedded_hal::{
    digital::{Error as _, ErrorKind as PinErrorKind, OutputPin},
    pwm::{Error as _, ErrorKind as PwmErrorKind, SetDutyCycle},
};

use super::{MotionActuator, MotorCommand, WheelDirection};

/// Errors that can occur while driving the H-bridge lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    PinError(PinErrorKind),
    PwmError(PwmErrorKind),
}

/// High-level driver for two DC motors on an L298N-style dual H-bridge.
pub struct DualHBridge<IN1, IN2, IN3, IN4, EN> {
    left: (IN1, IN2),
    right: (IN3, IN4),
    enable: EN,
}

impl<IN1, IN2, IN3, IN4, EN> DualHBridge<IN1, IN2, IN3, IN4, EN>
where
    IN1: OutputPin,
    IN2: OutputPin,
    IN3: OutputPin,
    IN4: OutputPin,
    EN: SetDutyCycle,
{
    /// Create a driver over the four direction inputs and the shared enable line.
    pub fn new(
        in1: IN1,
        in2: IN2,
        in3: IN3,
        in4: IN4,
        enable: EN,
    ) -> Self {
        DualHBridge {
            left: (in1, in2),
            right: (in3, in4),
            enable,
        }
    }

    /// Release the underlying pins and PWM channel.
    pub fn release(self) -> (IN1, IN2, IN3, IN4, EN) {
        (self.left.0, self.left.1, self.right.0, self.right.1, self.enable)
    }

    /// Drive one bridge: forward is (low, high), reverse is (high, low), stop
    /// pulls both inputs low.
    fn set_bridge<A: OutputPin, B: OutputPin>(
        pins: &mut (A, B),
        direction: WheelDirection,
    ) -> Result<(), ActuatorError> {
        let (a_high, b_high) = match direction {
            WheelDirection::Forward => (false, true),
            WheelDirection::Reverse => (true, false),
            WheelDirection::Stop => (false, false),
        };
        pins.0
            .set_state(a_high.into())
            .map_err(|e| ActuatorError::PinError(e.kind()))?;
        pins.1
            .set_state(b_high.into())
            .map_err(|e| ActuatorError::PinError(e.kind()))
    }
}

impl<IN1, IN2, IN3, IN4, EN> MotionActuator for DualHBridge<IN1, IN2, IN3, IN4, EN>
where
    IN1: OutputPin,
    IN2: OutputPin,
    IN3: OutputPin,
    IN4: OutputPin,
    EN: SetDutyCycle,
{
    type Error = ActuatorError;

    fn apply(
        &mut self,
        command: MotorCommand,
    ) -> Result<(), Self::Error> {
        tracing::trace!(?command, "H-bridge command");
        Self::set_bridge(&mut self.left, command.left)?;
        Self::set_bridge(&mut self.right, command.right)
    }

    fn set_speed(
        &mut self,
        level: f32,
    ) -> Result<(), Self::Error> {
        let max_duty = self.enable.max_duty_cycle();
        let duty = (level.clamp(0.0, 1.0) * max_duty as f32) as u16;
        tracing::debug!(level, duty, max_duty, "motor speed set");
        self.enable
            .set_duty_cycle(duty)
            .map_err(|e| ActuatorError::PwmError(e.kind()))
    }
}

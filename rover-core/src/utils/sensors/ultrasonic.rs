//! Trigger/echo ultrasonic range sensors.
//!
//! `UltrasonicSensor` drives one HC-SR04 style sensor over plain GPIO: a short
//! trigger pulse, then two bounded waits on the echo line. `SensorArray` groups
//! the front, left and right sensors behind `RangeSensors`.

use embedded_hal::{
    delay::DelayNs,
    digital::{Error as _, ErrorKind, InputPin, OutputPin},
};

use super::{Clock, Direction, DistanceReading, RangeSensor, RangeSensors};

/// Low time before the trigger pulse (µs).
const TRIGGER_SETTLE_US: u32 = 2;
/// Width of the trigger pulse (µs).
const TRIGGER_PULSE_US: u32 = 10;

/// Errors from the sensor's GPIO lines.
///
/// An echo that never arrives is not an error; see `DistanceReading::Timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    Trigger(ErrorKind),
    Echo(ErrorKind),
}

/// One trigger/echo range sensor.
pub struct UltrasonicSensor<TRIG, ECHO, D, C> {
    trigger: TRIG,
    echo: ECHO,
    delay: D,
    clock: C,
    timeout_us: u32,
}

impl<TRIG, ECHO, D, C> UltrasonicSensor<TRIG, ECHO, D, C>
where
    TRIG: OutputPin,
    ECHO: InputPin,
    D: DelayNs,
    C: Clock,
{
    /// Create a sensor that gives up on each echo edge after `timeout_us`.
    pub fn new(
        trigger: TRIG,
        echo: ECHO,
        delay: D,
        clock: C,
        timeout_us: u32,
    ) -> Self {
        Self {
            trigger,
            echo,
            delay,
            clock,
            timeout_us,
        }
    }

    /// Fire one ping and time the echo.
    pub fn ping(&mut self) -> Result<DistanceReading, SensorError> {
        self.pulse_trigger()?;

        let start = self.clock.now_us();
        while self.echo_low()? {
            if self.clock.now_us().wrapping_sub(start) > self.timeout_us {
                tracing::trace!("no echo rise within {} us", self.timeout_us);
                return Ok(DistanceReading::Timeout);
            }
        }

        let rise = self.clock.now_us();
        while !self.echo_low()? {
            if self.clock.now_us().wrapping_sub(rise) > self.timeout_us {
                tracing::trace!("echo held high past {} us", self.timeout_us);
                return Ok(DistanceReading::Timeout);
            }
        }
        let fall = self.clock.now_us();

        Ok(DistanceReading::from_echo_us(fall.wrapping_sub(rise)))
    }

    /// Release the pins and timing resources.
    pub fn release(self) -> (TRIG, ECHO, D, C) {
        (self.trigger, self.echo, self.delay, self.clock)
    }

    fn pulse_trigger(&mut self) -> Result<(), SensorError> {
        let trig = |e: TRIG::Error| SensorError::Trigger(e.kind());
        self.trigger.set_low().map_err(trig)?;
        self.delay.delay_us(TRIGGER_SETTLE_US);
        self.trigger.set_high().map_err(trig)?;
        self.delay.delay_us(TRIGGER_PULSE_US);
        self.trigger.set_low().map_err(trig)
    }

    fn echo_low(&mut self) -> Result<bool, SensorError> {
        self.echo
            .is_low()
            .map_err(|e| SensorError::Echo(e.kind()))
    }
}

impl<TRIG, ECHO, D, C> RangeSensor for UltrasonicSensor<TRIG, ECHO, D, C>
where
    TRIG: OutputPin,
    ECHO: InputPin,
    D: DelayNs,
    C: Clock,
{
    type Error = SensorError;

    fn measure(&mut self) -> Result<DistanceReading, Self::Error> {
        self.ping()
    }
}

/// The three fixed-direction sensors of the rover.
///
/// Does not space out measurements itself; the caller owns the settle delay
/// between sensors.
pub struct SensorArray<F, L, R> {
    pub front: F,
    pub left: L,
    pub right: R,
}

impl<F, L, R> SensorArray<F, L, R> {
    pub fn new(
        front: F,
        left: L,
        right: R,
    ) -> Self {
        Self { front, left, right }
    }
}

impl<F, L, R> RangeSensors for SensorArray<F, L, R>
where
    F: RangeSensor,
    L: RangeSensor<Error = F::Error>,
    R: RangeSensor<Error = F::Error>,
{
    type Error = F::Error;

    fn measure(
        &mut self,
        direction: Direction,
    ) -> Result<DistanceReading, Self::Error> {
        match direction {
            Direction::Front => self.front.measure(),
            Direction::Left => self.left.measure(),
            Direction::Right => self.right.measure(),
        }
    }
}

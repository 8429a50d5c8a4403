//! Reactive obstacle-avoidance state machine.
//!
//! The navigator drives forward until the encoder reports the target distance.
//! Each cycle it polls the front, left and right sensors in turn, spacing them
//! by the settle delay. A front obstacle stops the rover, and after a pause a
//! 90° pivot away from the blocked side is made, timed by encoder pulses. If
//! both sides are blocked the run ends.

use embedded_hal::delay::DelayNs;
use serde::Serialize;

use crate::utils::{
    config::NavConfig,
    controllers::{MotionActuator, Pivot},
    sensors::{odometer::PulseCounter, Clock, Direction, DistanceReading, RangeSensors},
};

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The target pulse count was reached.
    GoalReached,
    /// Obstacles ahead and on both sides.
    BoxedIn,
}

/// The navigator's single active state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "ns", rename_all = "snake_case")]
pub enum NavigatorState {
    Forward,
    /// Front obstacle seen; carries the side readings from the same cycle.
    Avoiding {
        left: DistanceReading,
        right: DistanceReading,
    },
    Turning { pivot: Pivot },
    Stopped { reason: StopReason },
}

impl NavigatorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NavigatorState::Stopped { .. })
    }
}

/// Errors surfaced by a navigation run.
#[derive(Debug)]
pub enum NavError<SE: core::fmt::Debug, AE: core::fmt::Debug> {
    Sensor(SE),
    Actuator(AE),
    /// A pivot did not reach its pulse count before the turn timeout.
    TurnStalled { counted: u32, required: u32 },
}

/// One poll cycle's readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Readings {
    pub front: DistanceReading,
    pub left: DistanceReading,
    pub right: DistanceReading,
}

/// Pick the pivot for a front obstacle, or `None` when boxed in.
///
/// Turns away from a blocked side; with both sides clear it turns left.
pub fn choose_pivot(
    left: DistanceReading,
    right: DistanceReading,
    threshold_cm: f32,
) -> Option<Pivot> {
    match (left.is_obstacle(threshold_cm), right.is_obstacle(threshold_cm)) {
        (true, true) => None,
        (true, false) => Some(Pivot::Right),
        (false, true) => Some(Pivot::Left),
        (false, false) => Some(Pivot::Left),
    }
}

/// Control core tying sensors, encoder and motors together.
pub struct Navigator<'a, S, A, P: ?Sized, D, C> {
    sensors: S,
    actuator: A,
    odometer: &'a P,
    delay: D,
    clock: C,
    config: NavConfig,
    state: NavigatorState,
    target_pulses: u32,
    turn_pulses: u32,
}

type NavResult<T, S, A> =
    Result<T, NavError<<S as RangeSensors>::Error, <A as MotionActuator>::Error>>;

impl<'a, S, A, P, D, C> Navigator<'a, S, A, P, D, C>
where
    S: RangeSensors,
    A: MotionActuator,
    P: PulseCounter + ?Sized,
    D: DelayNs,
    C: Clock,
{
    /// Build a navigator. Pulse targets are computed once here.
    pub fn new(
        sensors: S,
        actuator: A,
        odometer: &'a P,
        delay: D,
        clock: C,
        config: NavConfig,
    ) -> Self {
        let target_pulses = config.target_pulses();
        let turn_pulses = config.turn_pulses();
        tracing::info!(target_pulses, turn_pulses, "navigator configured");
        Navigator {
            sensors,
            actuator,
            odometer,
            delay,
            clock,
            config,
            state: NavigatorState::Forward,
            target_pulses,
            turn_pulses,
        }
    }

    pub fn state(&self) -> NavigatorState {
        self.state
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn target_pulses(&self) -> u32 {
        self.target_pulses
    }

    pub fn turn_pulses(&self) -> u32 {
        self.turn_pulses
    }

    /// Give back the owned collaborators.
    pub fn release(self) -> (S, A, D, C) {
        (self.sensors, self.actuator, self.delay, self.clock)
    }

    /// Begin the forward run: zero the encoder, set speed and drive.
    pub fn start(&mut self) -> NavResult<(), S, A> {
        self.odometer.reset();
        self.actuator
            .set_speed(self.config.motor_speed)
            .map_err(NavError::Actuator)?;
        self.actuator
            .drive_forward()
            .map_err(NavError::Actuator)?;
        self.state = NavigatorState::Forward;
        tracing::info!("forward run started");
        Ok(())
    }

    /// Run to a terminal state.
    pub fn run(&mut self) -> NavResult<StopReason, S, A> {
        self.start()?;
        loop {
            if let NavigatorState::Stopped { reason } = self.step()? {
                return Ok(reason);
            }
        }
    }

    /// Perform one state's work and return the new state.
    pub fn step(&mut self) -> NavResult<NavigatorState, S, A> {
        let next = match self.state {
            NavigatorState::Forward => self.forward_cycle()?,
            NavigatorState::Avoiding { left, right } => self.avoid(left, right)?,
            NavigatorState::Turning { pivot } => self.turn(pivot)?,
            NavigatorState::Stopped { reason } => NavigatorState::Stopped { reason },
        };
        if next != self.state {
            tracing::info!(from = ?self.state, to = ?next, "state transition");
        }
        self.state = next;
        Ok(next)
    }

    /// Poll all three sensors, front first, with a settle delay after each.
    pub fn poll(&mut self) -> NavResult<Readings, S, A> {
        let mut out = [DistanceReading::Timeout; 3];
        for (slot, direction) in out.iter_mut().zip(Direction::POLL_ORDER) {
            *slot = self
                .sensors
                .measure(direction)
                .map_err(NavError::Sensor)?;
            self.delay.delay_ms(self.config.settle_ms);
        }
        let [front, left, right] = out;
        Ok(Readings { front, left, right })
    }

    fn forward_cycle(&mut self) -> NavResult<NavigatorState, S, A> {
        let readings = self.poll()?;
        let pulses = self.odometer.read();
        tracing::debug!(?readings, pulses, "forward cycle");

        if pulses >= self.target_pulses {
            self.stop()?;
            tracing::info!(pulses, "target distance reached");
            return Ok(NavigatorState::Stopped {
                reason: StopReason::GoalReached,
            });
        }

        if readings
            .front
            .is_obstacle(self.config.obstacle_threshold_cm)
        {
            tracing::info!(front = ?readings.front, "obstacle ahead");
            return Ok(NavigatorState::Avoiding {
                left: readings.left,
                right: readings.right,
            });
        }

        Ok(NavigatorState::Forward)
    }

    fn avoid(
        &mut self,
        left: DistanceReading,
        right: DistanceReading,
    ) -> NavResult<NavigatorState, S, A> {
        self.stop()?;
        self.delay.delay_ms(self.config.obstacle_pause_ms);

        match choose_pivot(left, right, self.config.obstacle_threshold_cm) {
            Some(pivot) => Ok(NavigatorState::Turning { pivot }),
            None => {
                tracing::warn!(?left, ?right, "boxed in, goal unreachable");
                Ok(NavigatorState::Stopped {
                    reason: StopReason::BoxedIn,
                })
            }
        }
    }

    fn turn(
        &mut self,
        pivot: Pivot,
    ) -> NavResult<NavigatorState, S, A> {
        self.odometer.reset();
        self.actuator
            .pivot(pivot)
            .map_err(NavError::Actuator)?;

        let started = self.clock.now_us();
        let deadline_us = self
            .config
            .turn_timeout()
            .map(|d| d.as_micros().min(u32::MAX as u64) as u32);

        loop {
            let counted = self.odometer.read();
            if counted >= self.turn_pulses {
                break;
            }
            if let Some(limit) = deadline_us {
                if self.clock.now_us().wrapping_sub(started) > limit {
                    self.stop()?;
                    tracing::warn!(
                        ?pivot,
                        counted,
                        required = self.turn_pulses,
                        "pivot stalled"
                    );
                    return Err(NavError::TurnStalled {
                        counted,
                        required: self.turn_pulses,
                    });
                }
            }
            self.delay.delay_us(self.config.turn_poll_us);
        }

        self.stop()?;
        self.actuator
            .drive_forward()
            .map_err(NavError::Actuator)?;
        tracing::debug!(?pivot, pulses = self.odometer.read(), "pivot complete");
        Ok(NavigatorState::Forward)
    }

    fn stop(&mut self) -> NavResult<(), S, A> {
        self.actuator.stop().map_err(NavError::Actuator)
    }
}

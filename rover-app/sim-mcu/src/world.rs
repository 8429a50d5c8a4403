//! Simulated rover world.
//!
//! A flat 2D arena of axis-aligned box obstacles with a virtual clock. The
//! rover's drive train, encoder and range sensors are all views onto one
//! shared `World`: delays advance the clock, moving wheels emit encoder edges
//! into the odometer, and sensors ray-cast against the obstacles.

use std::{cell::RefCell, convert::Infallible, f32::consts::FRAC_PI_2, rc::Rc};

use embedded_hal::delay::DelayNs;
use rover_core::utils::{
    config::{NavConfig, VehicleGeometry},
    controllers::{MotionActuator, MotorCommand, WheelDirection},
    sensors::{
        odometer::Odometer, Clock, Direction, DistanceReading, RangeSensors,
        SPEED_OF_SOUND_CM_PER_US,
    },
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Axis-aligned box obstacle (cm).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Obstacle {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Obstacle {
    pub const fn new(
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
    ) -> Self {
        Obstacle { x0, y0, x1, y1 }
    }

    /// Distance along the ray `(ox, oy) + t * (dx, dy)` to the box, if hit.
    fn ray_hit(
        &self,
        (ox, oy): (f32, f32),
        (dx, dy): (f32, f32),
    ) -> Option<f32> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;
        let slabs = [
            (ox, dx, self.x0.min(self.x1), self.x0.max(self.x1)),
            (oy, dy, self.y0.min(self.y1), self.y0.max(self.y1)),
        ];
        for (o, d, lo, hi) in slabs {
            if d.abs() < 1e-6 {
                if o < lo || o > hi {
                    return None;
                }
            } else {
                let (a, b) = ((lo - o) / d, (hi - o) / d);
                t_min = t_min.max(a.min(b));
                t_max = t_max.min(a.max(b));
            }
        }
        if t_max < t_min.max(0.0) {
            None
        } else {
            Some(t_min.max(0.0))
        }
    }
}

/// Arena layout and physical behavior of the simulated rover.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSpec {
    pub obstacles: Vec<Obstacle>,
    /// Wheel surface speed at full duty (cm/s)
    pub top_speed_cm_s: f32,
    /// Fraction of pivot wheel travel that turns the chassis
    pub pivot_slip: f32,
    /// Contact bounce after each encoder edge (µs)
    pub bounce_us: Option<u32>,
}

impl Default for WorldSpec {
    fn default() -> Self {
        Self {
            obstacles: Vec::new(),
            top_speed_cm_s: 40.0,
            pivot_slip: 0.625,
            bounce_us: None,
        }
    }
}

/// Position (cm) and heading (rad, 0 = +X, CCW positive).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub heading: f32,
}

/// Sensor reads after the simulated time budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    Expired { at_ms: u64 },
}

impl core::fmt::Display for SimError {
    fn fmt(
        &self,
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        match self {
            SimError::Expired { at_ms } => write!(f, "simulation time budget spent at {at_ms} ms"),
        }
    }
}

impl std::error::Error for SimError {}

pub struct World {
    spec: WorldSpec,
    geometry: VehicleGeometry,
    odometer: &'static Odometer,
    pub pose: Pose,
    now_ns: u64,
    motion: MotorCommand,
    speed: f32,
    next_edge_ns: u64,
    deadline_ns: u64,
    settle_ns: u64,
    sensor_timeout_us: u32,
    last_ping: Option<(Direction, u64)>,
    pub commands: usize,
    pub crosstalk_warnings: u32,
}

pub type SharedWorld = Rc<RefCell<World>>;

impl World {
    pub fn new(
        spec: WorldSpec,
        config: &NavConfig,
        odometer: &'static Odometer,
        max_sim_secs: u64,
    ) -> SharedWorld {
        Rc::new(RefCell::new(World {
            spec,
            geometry: config.geometry,
            odometer,
            pose: Pose::default(),
            now_ns: 0,
            motion: MotorCommand::STOP,
            speed: 0.0,
            next_edge_ns: 0,
            deadline_ns: max_sim_secs.saturating_mul(1_000_000_000),
            settle_ns: config.settle_ms as u64 * 1_000_000,
            sensor_timeout_us: config.sensor_timeout_us,
            last_ping: None,
            commands: 0,
            crosstalk_warnings: 0,
        }))
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ns / 1_000_000
    }

    /// Time between encoder edges at the current speed, if the wheels turn.
    fn edge_period_ns(&self) -> Option<u64> {
        if self.motion.is_stopped() || self.speed <= 0.0 {
            return None;
        }
        let pulses_per_s = self.speed * self.spec.top_speed_cm_s * self.geometry.pulses_per_cm();
        if !pulses_per_s.is_finite() || pulses_per_s <= 0.0 {
            return None;
        }
        Some(((1e9 / pulses_per_s as f64) as u64).max(1))
    }

    /// Advance the clock, firing encoder edges and moving the chassis.
    fn advance(
        &mut self,
        ns: u64,
    ) {
        let end = self.now_ns.saturating_add(ns);
        if let Some(period) = self.edge_period_ns() {
            while self.next_edge_ns <= end {
                let edge_us = (self.next_edge_ns / 1_000) as u32;
                self.odometer.on_edge(edge_us);
                if let Some(bounce) = self.spec.bounce_us {
                    self.odometer.on_edge(edge_us.wrapping_add(bounce));
                }
                self.move_one_pulse();
                self.next_edge_ns = self.next_edge_ns.saturating_add(period);
                if self.next_edge_ns == u64::MAX {
                    break;
                }
            }
        }
        self.now_ns = end;
    }

    fn move_one_pulse(&mut self) {
        let step = self.geometry.distance_for_pulses(1);
        let half_width = self.geometry.vehicle_width_cm / 2.0;
        let turn = step * self.spec.pivot_slip / half_width;
        match (self.motion.left, self.motion.right) {
            (WheelDirection::Forward, WheelDirection::Forward) => {
                self.pose.x += step * self.pose.heading.cos();
                self.pose.y += step * self.pose.heading.sin();
            }
            (WheelDirection::Reverse, WheelDirection::Forward) => self.pose.heading += turn,
            (WheelDirection::Forward, WheelDirection::Reverse) => self.pose.heading -= turn,
            _ => {}
        }
    }

    fn range(
        &self,
        direction: Direction,
    ) -> Option<f32> {
        let angle = self.pose.heading
            + match direction {
                Direction::Front => 0.0,
                Direction::Left => FRAC_PI_2,
                Direction::Right => -FRAC_PI_2,
            };
        let origin = (self.pose.x, self.pose.y);
        let dir = (angle.cos(), angle.sin());
        self.spec
            .obstacles
            .iter()
            .filter_map(|o| o.ray_hit(origin, dir))
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// Virtual time delay.
pub struct SimDelay(pub SharedWorld);

impl DelayNs for SimDelay {
    fn delay_ns(
        &mut self,
        ns: u32,
    ) {
        self.0.borrow_mut().advance(ns as u64);
    }
}

/// Virtual microsecond clock.
pub struct SimClock(pub SharedWorld);

impl Clock for SimClock {
    fn now_us(&self) -> u32 {
        (self.0.borrow().now_ns / 1_000) as u32
    }
}

/// Drive train of the simulated rover.
pub struct SimMotors(pub SharedWorld);

impl MotionActuator for SimMotors {
    type Error = Infallible;

    fn apply(
        &mut self,
        command: MotorCommand,
    ) -> Result<(), Self::Error> {
        let mut guard = self.0.borrow_mut();
        let world = &mut *guard;
        let was_stopped = world.motion.is_stopped();
        world.motion = command;
        world.commands += 1;
        if was_stopped {
            if let Some(period) = world.edge_period_ns() {
                world.next_edge_ns = world.now_ns.saturating_add(period);
            }
        }
        debug!(?command, t_ms = world.now_ms(), "motor command");
        Ok(())
    }

    fn set_speed(
        &mut self,
        level: f32,
    ) -> Result<(), Self::Error> {
        self.0.borrow_mut().speed = level.clamp(0.0, 1.0);
        Ok(())
    }
}

/// Ray-cast range sensors that also watch for cross-talk.
pub struct SimSensors(pub SharedWorld);

impl RangeSensors for SimSensors {
    type Error = SimError;

    fn measure(
        &mut self,
        direction: Direction,
    ) -> Result<DistanceReading, Self::Error> {
        let mut guard = self.0.borrow_mut();
        let world = &mut *guard;
        if world.now_ns > world.deadline_ns {
            return Err(SimError::Expired {
                at_ms: world.now_ms(),
            });
        }

        if let Some((last, at)) = world.last_ping {
            if last != direction && world.now_ns - at < world.settle_ns {
                warn!(?last, ?direction, gap_us = (world.now_ns - at) / 1_000, "sensor cross-talk risk");
                world.crosstalk_warnings += 1;
            }
        }
        let now = world.now_ns;
        world.last_ping = Some((direction, now));

        let timeout_us = world.sensor_timeout_us;
        let echo_us = world
            .range(direction)
            .map(|d| (d * 2.0 / SPEED_OF_SOUND_CM_PER_US) as u32)
            .filter(|&us| us <= timeout_us);
        let reading = match echo_us {
            Some(us) => {
                world.advance(us as u64 * 1_000);
                DistanceReading::from_echo_us(us)
            }
            None => {
                world.advance(timeout_us as u64 * 1_000);
                DistanceReading::Timeout
            }
        };
        debug!(?direction, ?reading, "ping");
        Ok(reading)
    }
}

/// Built-in arenas.
pub fn preset(scenario: crate::Scenario) -> WorldSpec {
    use crate::Scenario;
    let obstacles = match scenario {
        Scenario::Open => vec![],
        // Wall ahead with a block hugging the left side: pivot right.
        Scenario::SideObstacle => vec![
            Obstacle::new(70.0, -60.0, 80.0, 60.0),
            Obstacle::new(0.0, 15.0, 70.0, 25.0),
        ],
        // Dead-end corridor narrower than the obstacle threshold.
        Scenario::BoxedIn => vec![
            Obstacle::new(-10.0, 18.0, 90.0, 28.0),
            Obstacle::new(-10.0, -28.0, 90.0, -18.0),
            Obstacle::new(90.0, -28.0, 100.0, 28.0),
        ],
        // Corridor wider than the obstacle threshold, closed at the far end.
        // The rover turns back on itself and leaves through the open start.
        Scenario::Corridor => vec![
            Obstacle::new(-10.0, 45.0, 110.0, 55.0),
            Obstacle::new(-10.0, -55.0, 110.0, -45.0),
            Obstacle::new(100.0, -45.0, 110.0, 45.0),
        ],
    };
    WorldSpec {
        obstacles,
        ..WorldSpec::default()
    }
}

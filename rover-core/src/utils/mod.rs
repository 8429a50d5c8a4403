//! Utility re-exports and helper macros for the rover.
//!
//! This module re-exports the sensing, actuation and navigation components:
//!
//! - `config`: vehicle geometry and tunable thresholds
//! - `controllers`: motor command types and the dual H-bridge driver
//! - `sensors`: ultrasonic range sensors and the wheel encoder odometer
//! - `navigation`: the forward / avoid / turn state machine
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts,
//! e.g. handing a `&'static Odometer` to an encoder interrupt handler.

pub mod config;
pub mod controllers;
pub mod navigation;
pub mod sensors;

pub use config::{NavConfig, VehicleGeometry};
pub use controllers::{MotionActuator, MotorCommand, Pivot, WheelDirection};
pub use embassy_time::{Duration, Instant};
pub use navigation::{NavError, Navigator, NavigatorState, StopReason};
pub use sensors::{
    odometer::{Odometer, PulseCounter},
    Clock, Direction, DistanceReading, RangeSensors,
};

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}

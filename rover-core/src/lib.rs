//! Core drivers and the obstacle-avoidance decision loop for a two-wheel
//! differential-drive rover on no-std embedded platforms.
//!
//! For a host-side simulation, see the `rover-app/sim-mcu` binary.
#![no_std]

pub mod utils;

//! Navigation for the rover.
//!
//! This module provides the reactive forward / avoid / turn state machine.

pub mod navigator;

pub use navigator::{choose_pivot, NavError, Navigator, NavigatorState, Readings, StopReason};

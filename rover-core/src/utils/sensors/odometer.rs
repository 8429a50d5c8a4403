//! Debounced wheel encoder pulse counter.
//!
//! The encoder interrupt calls [`Odometer::on_edge`] on every rising edge; the
//! navigator resets and reads the count from the main loop. The count is a
//! single atomic word, so reads are never torn. Only the interrupt writes
//! `last_edge_us`.
//!
//! ```rust
//! use rover_core::utils::sensors::odometer::Odometer;
//! static ODOMETER: Odometer = Odometer::new(1_000);
//! assert!(ODOMETER.on_edge(5_000));
//! assert!(!ODOMETER.on_edge(5_400)); // bounce
//! assert_eq!(ODOMETER.read(), 1);
//! ```

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Reset/read access to a pulse count, as consumed by the navigator.
pub trait PulseCounter {
    fn reset(&self);
    fn read(&self) -> u32;
}

/// Encoder pulse counter with edge debouncing.
#[derive(Debug)]
pub struct Odometer {
    count: AtomicU32,
    last_edge_us: AtomicU32,
    primed: AtomicBool,
    debounce_us: u32,
}

impl Odometer {
    /// Create a zeroed counter that ignores edges within `debounce_us` of the
    /// last accepted one.
    pub const fn new(debounce_us: u32) -> Self {
        Self {
            count: AtomicU32::new(0),
            last_edge_us: AtomicU32::new(0),
            primed: AtomicBool::new(false),
            debounce_us,
        }
    }

    /// Edge handler. Returns `true` if the edge was counted.
    ///
    /// Must only be called from the single encoder event source.
    pub fn on_edge(
        &self,
        now_us: u32,
    ) -> bool {
        if self.primed.load(Ordering::Relaxed) {
            let last = self.last_edge_us.load(Ordering::Relaxed);
            if now_us.wrapping_sub(last) <= self.debounce_us {
                return false;
            }
        }
        self.last_edge_us.store(now_us, Ordering::Relaxed);
        self.primed.store(true, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Zero the pulse count. Debounce history is kept.
    pub fn reset(&self) {
        self.count.store(0, Ordering::Release);
    }

    /// Current pulse count.
    pub fn read(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    pub fn debounce_us(&self) -> u32 {
        self.debounce_us
    }
}

impl PulseCounter for Odometer {
    fn reset(&self) {
        Odometer::reset(self);
    }

    fn read(&self) -> u32 {
        Odometer::read(self)
    }
}

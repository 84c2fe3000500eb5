//! Time-source capability for link components.
//!
//! Components never consult a global simulation clock. The owning kernel
//! hands each endpoint a [`TimeSource`] at construction; the endpoint
//! queries it whenever it needs the current time and stores nothing.

use std::cell::Cell;
use std::rc::Rc;

use crate::types::SimTime;

/// Read-only access to the current simulation time.
pub trait TimeSource {
    /// Returns the current simulation time.
    fn now(&self) -> SimTime;
}

/// A shared simulation clock, advanced by the event kernel.
///
/// Single-threaded by design: each link instance and its clock live on the
/// one logical thread that processes the link's events, so interior
/// mutability through [`Cell`] is sufficient.
#[derive(Debug, Default)]
pub struct SimClock {
    time: Cell<SimTime>,
}

impl SimClock {
    /// Creates a clock at time zero, wrapped for sharing.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Sets the clock to an absolute time.
    ///
    /// The kernel must only move time forward; events are delivered in
    /// non-decreasing timestamp order.
    pub fn set(&self, time: SimTime) {
        debug_assert!(time >= self.time.get());
        self.time.set(time);
    }

    /// Advances the clock by `delta`.
    pub fn advance(&self, delta: SimTime) {
        self.time.set(self.time.get() + delta);
    }
}

impl TimeSource for SimClock {
    fn now(&self) -> SimTime {
        self.time.get()
    }
}

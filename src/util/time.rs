//! Time utilities for the simulation clock

use parking_lot::Mutex;
use std::time::Instant;

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Default tick rate of the simulation loop
pub const SIMULATION_TPS: u32 = 60;

/// Calculate delta time for one tick at the given rate (in seconds)
pub fn tick_delta(tick_rate: u32) -> f64 {
    1.0 / tick_rate.max(1) as f64
}

/// Monotonic world-time source, in seconds.
///
/// Snapshots, compensation queries and the sweep all read the same clock so
/// that "now" means the same thing across the core.
pub trait WorldClock: Send + Sync {
    fn now(&self) -> f64;
}

/// World clock backed by the process start instant
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerClock;

impl WorldClock for ServerClock {
    fn now(&self) -> f64 {
        SERVER_START.get_or_init(Instant::now).elapsed().as_secs_f64()
    }
}

/// Manually driven clock for replays and tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, t: f64) {
        *self.now.lock() = t;
    }

    pub fn advance(&self, dt: f64) {
        *self.now.lock() += dt;
    }
}

impl WorldClock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}

/// A simple timer for measuring durations
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

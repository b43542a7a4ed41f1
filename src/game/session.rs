//! Fixed-tick driver: snapshot capture followed by the coarse sweep

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::anticheat::{AntiCheatSweep, SweepFlag};
use crate::util::time::{tick_delta, Timer, WorldClock};

use super::lag::LagCompensator;
use super::snapshot::WorldSnapshot;
use super::world::WorldSource;

/// What one tick did
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub timestamp: f64,
    pub players: usize,
    pub entities: usize,
    pub flags: Vec<SweepFlag>,
    /// Wall time spent in the tick
    pub duration_micros: u64,
}

pub struct SyncSession {
    world: Arc<dyn WorldSource>,
    clock: Arc<dyn WorldClock>,
    lag: Arc<LagCompensator>,
    sweep: Arc<AntiCheatSweep>,
    tick_rate: u32,
    tick: AtomicU64,
}

impl SyncSession {
    pub fn new(
        world: Arc<dyn WorldSource>,
        clock: Arc<dyn WorldClock>,
        lag: Arc<LagCompensator>,
        sweep: Arc<AntiCheatSweep>,
        tick_rate: u32,
    ) -> Self {
        Self {
            world,
            clock,
            lag,
            sweep,
            tick_rate: tick_rate.max(1),
            tick: AtomicU64::new(0),
        }
    }

    /// Run one tick synchronously
    ///
    /// The snapshot is appended before the sweep runs, so any compensation
    /// query for this tick's time already sees it.
    pub fn step(&self) -> TickReport {
        let timer = Timer::new();
        let tick = self.tick.fetch_add(1, Ordering::Relaxed) + 1;
        let timestamp = self.clock.now();
        let entities = self.world.entities();

        let mut snapshot = WorldSnapshot::new(timestamp);
        for view in &entities {
            snapshot.record(view);
        }
        let players = snapshot.player_count();
        if let Err(e) = self.lag.record_snapshot(snapshot) {
            warn!(tick, error = %e, "Snapshot dropped");
        }

        let flags = self.sweep.run(timestamp, &entities);
        let duration_micros = timer.elapsed_micros();
        if !flags.is_empty() {
            debug!(tick, flags = flags.len(), "Sweep flagged entities");
        }
        if duration_micros as f64 > tick_delta(self.tick_rate) * 1_000_000.0 {
            warn!(tick, duration_micros, "Tick overran its budget");
        }

        TickReport {
            tick,
            timestamp,
            players,
            entities: entities.len(),
            flags,
            duration_micros,
        }
    }

    /// Drive the tick loop until `shutdown` flips to true or its sender drops
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(tick_rate = self.tick_rate, "Sync session started");

        let tick_duration = Duration::from_secs_f64(tick_delta(self.tick_rate));
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    self.step();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(ticks = self.ticks(), "Sync session stopped");
    }

    pub fn ticks(&self) -> u64 {
        self.tick.load(Ordering::Relaxed)
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }
}

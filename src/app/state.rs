//! Application state shared across routes and background tasks

use std::sync::Arc;

use crate::anticheat::{AntiCheatSweep, InputValidationGate};
use crate::config::Config;
use crate::game::{EntityKey, LagCompensator, PlayerId, SyncSession, VehicleRoster};
use crate::telemetry::TelemetryBus;
use crate::util::rate_limit::ApiRateLimiter;
use crate::util::time::{ServerClock, WorldClock};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub telemetry: TelemetryBus,
    pub roster: Arc<VehicleRoster>,
    pub lag: Arc<LagCompensator>,
    pub gate: Arc<InputValidationGate>,
    pub sweep: Arc<AntiCheatSweep>,
    pub session: Arc<SyncSession>,
    pub admin_limiter: ApiRateLimiter,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(ServerClock))
    }

    /// Build the state around a specific world clock
    pub fn with_clock(config: Config, clock: Arc<dyn WorldClock>) -> Self {
        let config = Arc::new(config);
        let telemetry = TelemetryBus::default();

        // Gameplay code keeps the roster current; it feeds both the
        // snapshots and the gate's physical checks
        let roster = Arc::new(VehicleRoster::new());

        let lag = Arc::new(LagCompensator::new(
            config.history.clone(),
            config.lag.clone(),
            clock.clone(),
            telemetry.clone(),
        ));
        let gate = Arc::new(InputValidationGate::new(
            config.gate.clone(),
            roster.clone(),
            telemetry.clone(),
        ));
        let sweep = Arc::new(AntiCheatSweep::new(config.sweep.clone(), telemetry.clone()));

        let session = Arc::new(SyncSession::new(
            roster.clone(),
            clock,
            lag.clone(),
            sweep.clone(),
            config.tick_rate,
        ));

        let admin_limiter = ApiRateLimiter::new(config.admin_rate_limit);

        Self {
            config,
            telemetry,
            roster,
            lag,
            gate,
            sweep,
            session,
            admin_limiter,
        }
    }

    /// Clear a disconnected player from every per-player map
    pub fn remove_player(&self, player_id: &PlayerId) -> bool {
        let gate = self.gate.remove_player(player_id);
        let lag = self.lag.remove_player(player_id);
        let swept = self.sweep.forget(&EntityKey::Player(*player_id));
        let vehicle = self.roster.remove(player_id).is_some();
        gate || lag || swept || vehicle
    }
}

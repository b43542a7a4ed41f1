//! Per-player input validation pipeline
//!
//! Every input runs through four stages in order, stopping at the first
//! failure: rate check, value range, physical plausibility, behavioral
//! patterns. Only an input that passes every stage updates the player's rate
//! counters and input history; a rejection only bumps the suspicion count.
//!
//! Player state lives in a sharded map and the shard entry is held for the
//! whole pipeline, so concurrent calls for the same player are serialized
//! while different players validate in parallel.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::GateConfig;
use crate::game::physics::{PhysicalState, PhysicalStateProvider};
use crate::game::{PlayerId, PlayerInput, TickInput};
use crate::telemetry::{TelemetryBus, TelemetryKind};

use super::patterns::{self, InputHistoryRing};
use super::verdict::{ReasonCode, ValidationVerdict, VerdictRecord};

/// Rate and suspicion bookkeeping for one player
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerValidationState {
    pub player_id: PlayerId,
    /// Timestamp of the last accepted input
    pub last_input_time: Option<f64>,
    /// Timestamp of the first accepted input of the current rate window
    pub window_start: Option<f64>,
    /// Accepted inputs in the current rate window
    pub input_count_in_window: u32,
    pub suspicion_count: u32,
    /// Set by the sanction layer; the gate only records it
    pub banned: bool,
}

impl PlayerValidationState {
    fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            last_input_time: None,
            window_start: None,
            input_count_in_window: 0,
            suspicion_count: 0,
            banned: false,
        }
    }
}

#[derive(Debug)]
struct GateEntry {
    state: PlayerValidationState,
    history: InputHistoryRing,
}

/// The input validation gate
pub struct InputValidationGate {
    players: DashMap<PlayerId, GateEntry>,
    physics: Arc<dyn PhysicalStateProvider>,
    telemetry: TelemetryBus,
    config: GateConfig,
}

impl InputValidationGate {
    pub fn new(
        config: GateConfig,
        physics: Arc<dyn PhysicalStateProvider>,
        telemetry: TelemetryBus,
    ) -> Self {
        Self {
            players: DashMap::new(),
            physics,
            telemetry,
            config,
        }
    }

    /// Validate one input; call once per input, in per-player timestamp order
    pub fn validate(&self, input: &PlayerInput) -> ValidationVerdict {
        let mut entry = self
            .players
            .entry(input.player_id)
            .or_insert_with(|| GateEntry {
                state: PlayerValidationState::new(input.player_id),
                history: InputHistoryRing::new(self.config.history_size),
            });

        let outcome = self.run_stages(&entry, input);
        let verdict = match outcome {
            Ok(window) => {
                entry.state.last_input_time = Some(input.timestamp);
                entry.state.window_start = Some(window.start);
                entry.state.input_count_in_window = window.count;
                entry.history.push(input.controls);
                ValidationVerdict::pass()
            }
            Err(verdict) => {
                entry.state.suspicion_count += 1;
                warn!(
                    player_id = %input.player_id,
                    timestamp = input.timestamp,
                    reason = ?verdict.reason,
                    suspicion_count = entry.state.suspicion_count,
                    detail = %verdict.detail,
                    "Input rejected"
                );
                verdict
            }
        };

        let record = VerdictRecord {
            player_id: input.player_id,
            timestamp: input.timestamp,
            is_valid: verdict.is_valid,
            reason: verdict.reason,
            detail: verdict.detail.clone(),
            suspicion_count: entry.state.suspicion_count,
        };
        drop(entry);

        self.telemetry.publish(TelemetryKind::Verdict(record));
        verdict
    }

    /// Returns the updated rate window when every stage passes
    fn run_stages(
        &self,
        entry: &GateEntry,
        input: &PlayerInput,
    ) -> Result<RateWindow, ValidationVerdict> {
        let window = check_rate(&entry.state, input.timestamp, &self.config)?;
        check_values(&input.controls, &self.config)?;
        let physical = self.physics.physical_state(input.player_id);
        check_physical(input.player_id, &input.controls, physical, &self.config)?;

        if let Some(finding) = patterns::inspect(&entry.history, &input.controls, &self.config) {
            return Err(ValidationVerdict::reject(
                ReasonCode::SuspiciousBehavior,
                finding.to_string(),
            ));
        }

        Ok(window)
    }

    pub fn suspicion_count(&self, player_id: &PlayerId) -> u32 {
        self.players
            .get(player_id)
            .map(|e| e.state.suspicion_count)
            .unwrap_or(0)
    }

    pub fn state(&self, player_id: &PlayerId) -> Option<PlayerValidationState> {
        self.players.get(player_id).map(|e| e.state.clone())
    }

    /// Record a sanction decision made outside the core
    pub fn set_banned(&self, player_id: &PlayerId, banned: bool) -> bool {
        match self.players.get_mut(player_id) {
            Some(mut entry) => {
                entry.state.banned = banned;
                true
            }
            None => false,
        }
    }

    /// Drop all state for a disconnected player
    pub fn remove_player(&self, player_id: &PlayerId) -> bool {
        let removed = self.players.remove(player_id).is_some();
        if removed {
            debug!(player_id = %player_id, "Validation state cleared");
        }
        removed
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }
}

/// Rate window a passing input would leave behind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateWindow {
    pub start: f64,
    pub count: u32,
}

/// Stage 1: minimum spacing and per-window count
///
/// A window opens at an accepted input and lasts `rate_window` seconds; the
/// first accepted input at or past its end opens the next one.
pub fn check_rate(
    state: &PlayerValidationState,
    timestamp: f64,
    config: &GateConfig,
) -> Result<RateWindow, ValidationVerdict> {
    if !timestamp.is_finite() {
        return Err(ValidationVerdict::reject(
            ReasonCode::InvalidInputValues,
            "Input timestamp is not finite",
        ));
    }

    let fresh = RateWindow {
        start: timestamp,
        count: 1,
    };
    let Some(last) = state.last_input_time else {
        return Ok(fresh);
    };

    let gap = timestamp - last;
    if gap < 0.0 {
        return Err(ValidationVerdict::reject(
            ReasonCode::TooFrequentInput,
            format!(
                "Input out of order: {:.3}s precedes last accepted {:.3}s",
                timestamp, last
            ),
        ));
    }
    if gap < config.min_input_interval {
        return Err(ValidationVerdict::reject(
            ReasonCode::TooFrequentInput,
            format!("Input too frequent: {:.3}s", gap),
        ));
    }

    let start = state.window_start.unwrap_or(last);
    if timestamp - start >= config.rate_window {
        return Ok(fresh);
    }

    let count = state.input_count_in_window + 1;
    if count > config.max_inputs_per_window {
        return Err(ValidationVerdict::reject(
            ReasonCode::RateLimitExceeded,
            format!("Rate limit exceeded: {} inputs in window", count),
        ));
    }
    Ok(RateWindow { start, count })
}

/// Stage 2: finite values inside their ranges
pub fn check_values(controls: &TickInput, config: &GateConfig) -> Result<(), ValidationVerdict> {
    if !controls.movement.is_finite() {
        return Err(ValidationVerdict::reject(
            ReasonCode::InvalidInputValues,
            "Vehicle movement contains NaN or Infinity values",
        ));
    }
    if !controls.steering.is_finite() {
        return Err(ValidationVerdict::reject(
            ReasonCode::InvalidInputValues,
            "Steering contains NaN or Infinity values",
        ));
    }

    let magnitude = controls.movement.length();
    if magnitude > config.max_movement {
        return Err(ValidationVerdict::reject(
            ReasonCode::InvalidInputValues,
            format!("Vehicle movement magnitude too high: {:.3}", magnitude),
        ));
    }
    if controls.steering.abs() > config.max_steering {
        return Err(ValidationVerdict::reject(
            ReasonCode::InvalidInputValues,
            format!("Steering value out of range: {:.3}", controls.steering),
        ));
    }
    Ok(())
}

/// Stage 3: what the vehicle can physically do right now
pub fn check_physical(
    player_id: PlayerId,
    controls: &TickInput,
    physical: Option<PhysicalState>,
    config: &GateConfig,
) -> Result<(), ValidationVerdict> {
    let Some(physical) = physical else {
        return Err(ValidationVerdict::reject(
            ReasonCode::PlayerNotFound,
            format!("Player {} not found", player_id),
        ));
    };

    let magnitude = controls.movement.length();
    if physical.is_stuck && magnitude > config.stuck_movement_threshold {
        return Err(ValidationVerdict::reject(
            ReasonCode::PhysicallyImpossible,
            "Player is stuck but trying to move",
        ));
    }

    let max_possible = physical.max_speed * config.speed_tolerance;
    let requested = magnitude * physical.max_speed;
    if requested > max_possible {
        return Err(ValidationVerdict::reject(
            ReasonCode::PhysicallyImpossible,
            format!("Speed too high: {:.2} > {:.2}", requested, max_possible),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::VehicleRoster;
    use crate::game::world::PlayerState;
    use glam::{Quat, Vec2, Vec3};
    use uuid::Uuid;

    const PLAYER: Uuid = Uuid::from_u128(1);

    fn gate_with_roster() -> (InputValidationGate, Arc<VehicleRoster>) {
        let roster = Arc::new(VehicleRoster::new());
        roster.upsert(PlayerState {
            player_id: PLAYER,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            last_update: 0.0,
        });
        let gate = InputValidationGate::new(
            GateConfig::default(),
            roster.clone(),
            TelemetryBus::default(),
        );
        (gate, roster)
    }

    fn human(i: usize) -> TickInput {
        let angle = (7.3 + (i % 5) as f32 * 1.1).to_radians();
        TickInput::new(Vec2::from_angle(angle) * 0.6, 0.137 + 0.011 * (i % 5) as f32)
    }

    fn input(timestamp: f64, controls: TickInput) -> PlayerInput {
        PlayerInput {
            player_id: PLAYER,
            timestamp,
            controls,
        }
    }

    #[test]
    fn too_frequent_input_is_rejected() {
        let (gate, _) = gate_with_roster();
        assert!(gate.validate(&input(0.0, human(0))).is_valid);

        let second = gate.validate(&input(0.005, human(1)));
        assert_eq!(second.reason, ReasonCode::TooFrequentInput);

        // Measured from the last accepted input, not the rejected one
        let third = gate.validate(&input(0.020, human(2)));
        assert!(third.is_valid, "{:?}", third);
        assert_eq!(gate.suspicion_count(&PLAYER), 1);
    }

    fn gate_with_config(config: GateConfig) -> InputValidationGate {
        let (_, roster) = gate_with_roster();
        InputValidationGate::new(config, roster, TelemetryBus::default())
    }

    #[test]
    fn hundred_and_first_input_in_window_is_rate_limited() {
        let gate = gate_with_config(GateConfig {
            min_input_interval: 0.004,
            ..GateConfig::default()
        });
        for i in 0..100 {
            let verdict = gate.validate(&input(i as f64 * 0.005, human(i)));
            assert!(verdict.is_valid, "input {i}: {:?}", verdict);
        }
        let verdict = gate.validate(&input(0.5, human(100)));
        assert_eq!(verdict.reason, ReasonCode::RateLimitExceeded);
        assert_eq!(gate.state(&PLAYER).map(|s| s.input_count_in_window), Some(100));

        // The window opened at 0.0, so 1.0 starts the next one
        assert!(gate.validate(&input(1.0, human(101))).is_valid);
        let state = gate.state(&PLAYER).unwrap();
        assert_eq!(state.window_start, Some(1.0));
        assert_eq!(state.input_count_in_window, 1);
    }

    #[test]
    fn steady_input_is_never_rate_limited() {
        for hz in [30.0, 60.0] {
            let (gate, _) = gate_with_roster();
            for i in 0..(hz as usize * 10) {
                let verdict = gate.validate(&input(i as f64 / hz, human(i)));
                assert!(verdict.is_valid, "{hz} Hz input {i}: {:?}", verdict);
            }
            assert_eq!(gate.suspicion_count(&PLAYER), 0);
        }
    }

    #[test]
    fn rate_window_is_measured_from_its_first_input() {
        let config = GateConfig::default();
        let mut state = PlayerValidationState::new(PLAYER);
        state.last_input_time = Some(5.9);
        state.window_start = Some(5.0);
        state.input_count_in_window = 100;
        assert!(check_rate(&state, 5.95, &config).is_err());
        assert_eq!(
            check_rate(&state, 6.0, &config),
            Ok(RateWindow {
                start: 6.0,
                count: 1
            })
        );
    }

    #[test]
    fn same_player_calls_are_serialized() {
        let (gate, _) = gate_with_roster();
        let gate = Arc::new(gate);
        let threads = 8;

        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let gate = gate.clone();
                std::thread::spawn(move || gate.validate(&input(1.0, human(i))).is_valid)
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|valid| *valid)
            .count();

        assert_eq!(accepted, 1);
        assert_eq!(gate.suspicion_count(&PLAYER), threads as u32 - 1);
        let state = gate.state(&PLAYER).unwrap();
        assert_eq!(state.input_count_in_window, 1);
    }

    #[test]
    fn out_of_order_input_is_rejected() {
        let (gate, _) = gate_with_roster();
        assert!(gate.validate(&input(1.0, human(0))).is_valid);
        let verdict = gate.validate(&input(0.5, human(1)));
        assert_eq!(verdict.reason, ReasonCode::TooFrequentInput);
        assert!(verdict.detail.contains("out of order"));
    }

    #[test]
    fn value_ranges() {
        let config = GateConfig::default();
        let too_big = TickInput::new(Vec2::new(2.0, 0.0), 0.137);
        assert_eq!(
            check_values(&too_big, &config).unwrap_err().reason,
            ReasonCode::InvalidInputValues
        );
        assert!(check_values(&TickInput::new(Vec2::new(0.5, 0.5), 0.137), &config).is_ok());
        assert!(check_values(&TickInput::new(Vec2::new(f32::NAN, 0.0), 0.0), &config).is_err());
        assert!(check_values(&TickInput::new(Vec2::ZERO, f32::INFINITY), &config).is_err());
        assert!(check_values(&TickInput::new(Vec2::ZERO, -1.2), &config).is_err());
    }

    #[test]
    fn stuck_vehicle_cannot_move() {
        let config = GateConfig::default();
        let stuck = Some(PhysicalState {
            is_stuck: true,
            max_speed: 10.0,
        });
        let push = TickInput::new(Vec2::new(0.5, 0.0), 0.137);
        assert_eq!(
            check_physical(PLAYER, &push, stuck, &config).unwrap_err().reason,
            ReasonCode::PhysicallyImpossible
        );
        let nudge = TickInput::new(Vec2::new(0.05, 0.0), 0.137);
        assert!(check_physical(PLAYER, &nudge, stuck, &config).is_ok());
    }

    #[test]
    fn unknown_vehicle_is_player_not_found() {
        let roster = Arc::new(VehicleRoster::new());
        let gate = InputValidationGate::new(GateConfig::default(), roster, TelemetryBus::default());
        let verdict = gate.validate(&input(0.0, human(0)));
        assert_eq!(verdict.reason, ReasonCode::PlayerNotFound);
        assert_eq!(gate.suspicion_count(&PLAYER), 1);
    }

    #[test]
    fn sixth_identical_input_is_suspicious() {
        let (gate, _) = gate_with_roster();
        let same = TickInput::new(Vec2::new(0.31, 0.52), 0.37);
        for i in 0..5 {
            assert!(gate.validate(&input(i as f64 * 0.02, same)).is_valid);
        }
        let verdict = gate.validate(&input(0.1, same));
        assert_eq!(verdict.reason, ReasonCode::SuspiciousBehavior);
        assert!(verdict.detail.contains("repeating"));
    }

    #[test]
    fn rejected_input_leaves_rate_state_untouched() {
        let (gate, roster) = gate_with_roster();
        assert!(gate.validate(&input(0.0, human(0))).is_valid);
        roster.set_stuck(PLAYER, true);
        assert_eq!(
            gate.validate(&input(0.5, human(1))).reason,
            ReasonCode::PhysicallyImpossible
        );

        let state = gate.state(&PLAYER).unwrap();
        assert_eq!(state.last_input_time, Some(0.0));
        assert_eq!(state.input_count_in_window, 1);
        assert_eq!(state.suspicion_count, 1);
    }

    #[test]
    fn remove_player_clears_state() {
        let (gate, _) = gate_with_roster();
        gate.validate(&input(0.0, human(0)));
        assert!(gate.set_banned(&PLAYER, true));
        assert!(gate.state(&PLAYER).unwrap().banned);
        assert!(gate.remove_player(&PLAYER));
        assert_eq!(gate.player_count(), 0);
        assert_eq!(gate.suspicion_count(&PLAYER), 0);
    }
}

//! Lag compensation against the snapshot history
//!
//! Client actions are stamped with the client's view of world time. Movement
//! and hit claims are reconciled against the snapshot nearest that time; when
//! none is close enough, movement degrades to a fallback estimate and actions
//! fail closed.

use dashmap::DashMap;
use glam::Vec3;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::{FallbackPolicy, HistoryConfig, LagConfig};
use crate::telemetry::{TelemetryBus, TelemetryKind};
use crate::util::time::WorldClock;

use super::combat::{ActionResult, HitScan};
use super::snapshot::{SnapshotError, SnapshotHistory, WorldSnapshot};
use super::world::WorldSource;
use super::PlayerId;

/// Smoothed latency estimate for one connected player
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerLagProfile {
    pub player_id: PlayerId,
    pub average_ping_ms: f32,
    /// World time of the last ping sample or compensation request
    pub last_update_time: f64,
}

/// How a compensation request was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationOutcome {
    /// Movement reconciled against a historical snapshot
    Historical,
    FallbackScale,
    FallbackExtrapolate,
    ActionHit,
    ActionMiss,
    /// No snapshot for the action time; nothing was resolved
    ActionUnresolved,
}

/// Compensation outcome as published on the telemetry stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationRecord {
    pub player_id: PlayerId,
    pub client_timestamp: f64,
    pub outcome: CompensationOutcome,
    /// Estimated one-way delay in seconds
    pub delay_secs: f64,
    pub hit_player_id: Option<PlayerId>,
}

pub struct LagCompensator {
    history: RwLock<SnapshotHistory>,
    profiles: DashMap<PlayerId, PlayerLagProfile>,
    clock: Arc<dyn WorldClock>,
    telemetry: TelemetryBus,
    config: LagConfig,
}

impl LagCompensator {
    pub fn new(
        history: HistoryConfig,
        config: LagConfig,
        clock: Arc<dyn WorldClock>,
        telemetry: TelemetryBus,
    ) -> Self {
        Self {
            history: RwLock::new(SnapshotHistory::new(history.capacity, history.tolerance_secs)),
            profiles: DashMap::new(),
            clock,
            telemetry,
            config,
        }
    }

    /// Append an externally built snapshot
    pub fn record_snapshot(&self, snapshot: WorldSnapshot) -> Result<(), SnapshotError> {
        self.history.write().append(snapshot)
    }

    /// Capture the world at the clock's current time; returns the player count
    pub fn capture(&self, world: &dyn WorldSource) -> Result<usize, SnapshotError> {
        let snapshot = WorldSnapshot::capture(self.clock.now(), world);
        let players = snapshot.player_count();
        self.record_snapshot(snapshot)?;
        Ok(players)
    }

    pub fn query(&self, timestamp: f64) -> Option<Arc<WorldSnapshot>> {
        self.history.read().query(timestamp)
    }

    /// Reconcile a client-claimed position with the history
    pub fn compensate_movement(
        &self,
        player_id: PlayerId,
        client_timestamp: f64,
        target: Vec3,
    ) -> Vec3 {
        let profile = self.touch_profile(player_id);
        let delay = self.total_delay(client_timestamp, profile.average_ping_ms);

        let historical = self
            .query(client_timestamp)
            .and_then(|snapshot| snapshot.player_position(&player_id));

        let (position, outcome) = match historical {
            Some(past) => {
                // Pass-through: the claimed displacement is trusted as-is
                let displacement = target - past;
                (past + displacement, CompensationOutcome::Historical)
            }
            None => self.fallback(player_id, target, delay),
        };

        self.publish(CompensationRecord {
            player_id,
            client_timestamp,
            outcome,
            delay_secs: delay,
            hit_player_id: None,
        });
        position
    }

    fn fallback(&self, player_id: PlayerId, target: Vec3, delay: f64) -> (Vec3, CompensationOutcome) {
        match self.config.fallback {
            FallbackPolicy::Scale => {
                let factor = (delay * 0.5).min(1.0) as f32;
                debug!(player_id = %player_id, delay, factor, "No snapshot, scaling target position");
                (target * (1.0 + factor), CompensationOutcome::FallbackScale)
            }
            FallbackPolicy::Extrapolate => {
                let velocity = self
                    .history
                    .read()
                    .latest()
                    .and_then(|snapshot| snapshot.player_velocity(&player_id))
                    .unwrap_or(Vec3::ZERO);
                debug!(player_id = %player_id, delay, "No snapshot, extrapolating from last velocity");
                (
                    target + velocity * delay as f32,
                    CompensationOutcome::FallbackExtrapolate,
                )
            }
        }
    }

    /// Resolve a hit claim against the snapshot at the client's time
    ///
    /// Fails closed: without a snapshot nothing is hit and
    /// `compensation_applied` is false.
    pub fn compensate_action(
        &self,
        player_id: PlayerId,
        client_timestamp: f64,
        origin: Vec3,
        direction: Vec3,
    ) -> ActionResult {
        let profile = self.touch_profile(player_id);
        let delay = self.total_delay(client_timestamp, profile.average_ping_ms);

        let result = match self.query(client_timestamp) {
            Some(snapshot) => self.hit_scan().resolve(&snapshot, player_id, origin, direction),
            None => {
                debug!(
                    player_id = %player_id,
                    client_timestamp,
                    "No snapshot for action time, action not resolved"
                );
                ActionResult::unresolved()
            }
        };

        let outcome = match (result.compensation_applied, result.is_hit) {
            (false, _) => CompensationOutcome::ActionUnresolved,
            (true, true) => CompensationOutcome::ActionHit,
            (true, false) => CompensationOutcome::ActionMiss,
        };
        self.publish(CompensationRecord {
            player_id,
            client_timestamp,
            outcome,
            delay_secs: delay,
            hit_player_id: result.hit_player_id,
        });
        result
    }

    /// Fold a ping sample into the player's moving average
    pub fn update_player_lag_data(&self, player_id: PlayerId, ping_ms: f32) {
        if !ping_ms.is_finite() || ping_ms < 0.0 {
            debug!(player_id = %player_id, ping_ms, "Ignoring invalid ping sample");
            return;
        }

        let now = self.clock.now();
        let alpha = self.config.ping_smoothing;
        self.profiles
            .entry(player_id)
            .and_modify(|profile| {
                profile.average_ping_ms = profile.average_ping_ms * (1.0 - alpha) + ping_ms * alpha;
                profile.last_update_time = now;
            })
            .or_insert(PlayerLagProfile {
                player_id,
                average_ping_ms: ping_ms,
                last_update_time: now,
            });
    }

    pub fn average_ping_ms(&self, player_id: &PlayerId) -> Option<f32> {
        self.profiles.get(player_id).map(|p| p.average_ping_ms)
    }

    pub fn profile(&self, player_id: &PlayerId) -> Option<PlayerLagProfile> {
        self.profiles.get(player_id).map(|p| *p)
    }

    /// Player position at `timestamp`, interpolated between the surrounding snapshots
    pub fn historical_position(&self, player_id: &PlayerId, timestamp: f64) -> Option<Vec3> {
        let history = self.history.read();
        if let Some((before, after)) = history.bracket(timestamp) {
            match (
                before.player_position(player_id),
                after.player_position(player_id),
            ) {
                (Some(a), Some(b)) => {
                    let span = after.timestamp - before.timestamp;
                    if span <= f64::EPSILON {
                        return Some(a);
                    }
                    let alpha = ((timestamp - before.timestamp) / span) as f32;
                    return Some(a.lerp(b, alpha));
                }
                (Some(a), None) => return Some(a),
                (None, Some(b)) => return Some(b),
                (None, None) => {}
            }
        }
        history
            .query(timestamp)
            .and_then(|snapshot| snapshot.player_position(player_id))
    }

    /// Forget a disconnected player's latency profile
    pub fn remove_player(&self, player_id: &PlayerId) -> bool {
        self.profiles.remove(player_id).is_some()
    }

    pub fn snapshot_count(&self) -> usize {
        self.history.read().len()
    }

    pub fn time_range(&self) -> Option<(f64, f64)> {
        self.history.read().time_range()
    }

    pub fn tracked_players(&self) -> usize {
        self.profiles.len()
    }

    fn touch_profile(&self, player_id: PlayerId) -> PlayerLagProfile {
        let now = self.clock.now();
        *self.profiles.entry(player_id).or_insert_with(|| PlayerLagProfile {
            player_id,
            average_ping_ms: self.config.default_ping_ms,
            last_update_time: now,
        })
    }

    /// `max(0, now - client_timestamp) + half the round trip`, in seconds
    fn total_delay(&self, client_timestamp: f64, average_ping_ms: f32) -> f64 {
        let behind = if client_timestamp.is_finite() {
            (self.clock.now() - client_timestamp).max(0.0)
        } else {
            0.0
        };
        behind + average_ping_ms as f64 / 2000.0
    }

    fn hit_scan(&self) -> HitScan {
        HitScan {
            max_distance: self.config.max_ray_distance,
            hit_radius: self.config.hit_radius,
        }
    }

    fn publish(&self, record: CompensationRecord) {
        self.telemetry.publish(TelemetryKind::Compensation(record));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::time::ManualClock;
    use uuid::Uuid;

    const SHOOTER: Uuid = Uuid::from_u128(1);
    const TARGET: Uuid = Uuid::from_u128(2);

    fn compensator(fallback: FallbackPolicy) -> (LagCompensator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(10.0));
        let config = LagConfig {
            fallback,
            ..LagConfig::default()
        };
        let lag = LagCompensator::new(
            HistoryConfig::default(),
            config,
            clock.clone(),
            TelemetryBus::default(),
        );
        (lag, clock)
    }

    fn snapshot(timestamp: f64, players: &[(Uuid, Vec3, Vec3)]) -> WorldSnapshot {
        let mut snapshot = WorldSnapshot::new(timestamp);
        for &(id, position, velocity) in players {
            snapshot.player_positions.insert(id, position);
            snapshot.player_velocities.insert(id, velocity);
        }
        snapshot
    }

    #[test]
    fn action_without_history_fails_closed() {
        let (lag, _) = compensator(FallbackPolicy::Scale);
        let result = lag.compensate_action(SHOOTER, 9.9, Vec3::ZERO, Vec3::X);
        assert!(!result.is_hit);
        assert!(!result.compensation_applied);

        // A snapshot outside tolerance is as good as none
        lag.record_snapshot(snapshot(5.0, &[(TARGET, Vec3::X * 10.0, Vec3::ZERO)]))
            .unwrap();
        let result = lag.compensate_action(SHOOTER, 9.9, Vec3::ZERO, Vec3::X);
        assert!(!result.is_hit);
        assert!(!result.compensation_applied);
    }

    #[test]
    fn action_hits_historical_position() {
        let (lag, _) = compensator(FallbackPolicy::Scale);
        lag.record_snapshot(snapshot(9.8, &[(TARGET, Vec3::new(30.0, 0.5, 0.0), Vec3::ZERO)]))
            .unwrap();
        lag.record_snapshot(snapshot(9.9, &[(TARGET, Vec3::new(30.0, 8.0, 0.0), Vec3::ZERO)]))
            .unwrap();

        let result = lag.compensate_action(SHOOTER, 9.81, Vec3::ZERO, Vec3::X);
        assert!(result.is_hit);
        assert!(result.compensation_applied);
        assert_eq!(result.hit_player_id, Some(TARGET));

        let result = lag.compensate_action(SHOOTER, 9.89, Vec3::ZERO, Vec3::X);
        assert!(!result.is_hit);
        assert!(result.compensation_applied);
    }

    #[test]
    fn movement_with_history_passes_target_through() {
        let (lag, _) = compensator(FallbackPolicy::Scale);
        lag.record_snapshot(snapshot(9.9, &[(SHOOTER, Vec3::new(1.0, 0.0, 1.0), Vec3::ZERO)]))
            .unwrap();
        let target = Vec3::new(1.5, 0.0, 1.2);
        assert_eq!(lag.compensate_movement(SHOOTER, 9.9, target), target);
    }

    #[test]
    fn movement_fallback_scales_by_delay() {
        let (lag, _) = compensator(FallbackPolicy::Scale);
        // delay = (10.0 - 9.9) + 100ms / 2 = 0.15s, factor 0.075
        let result = lag.compensate_movement(SHOOTER, 9.9, Vec3::new(10.0, 0.0, 0.0));
        assert!((result.x - 10.75).abs() < 1e-3, "{result:?}");

        // Factor saturates at 1
        let result = lag.compensate_movement(SHOOTER, 0.0, Vec3::new(10.0, 0.0, 0.0));
        assert!((result.x - 20.0).abs() < 1e-3);
    }

    #[test]
    fn movement_fallback_extrapolates_from_velocity() {
        let (lag, clock) = compensator(FallbackPolicy::Extrapolate);
        lag.record_snapshot(snapshot(2.0, &[(SHOOTER, Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0))]))
            .unwrap();
        clock.set(10.0);
        // No snapshot near 9.9; delay 0.15s at 4 units/s
        let result = lag.compensate_movement(SHOOTER, 9.9, Vec3::new(10.0, 0.0, 0.0));
        assert!((result.x - 10.6).abs() < 1e-3, "{result:?}");
    }

    #[test]
    fn ping_is_exponentially_smoothed() {
        let (lag, _) = compensator(FallbackPolicy::Scale);
        lag.update_player_lag_data(SHOOTER, 200.0);
        assert_eq!(lag.average_ping_ms(&SHOOTER), Some(200.0));
        lag.update_player_lag_data(SHOOTER, 100.0);
        let ping = lag.average_ping_ms(&SHOOTER).unwrap();
        assert!((ping - 190.0).abs() < 1e-3);

        lag.update_player_lag_data(SHOOTER, f32::NAN);
        lag.update_player_lag_data(SHOOTER, -5.0);
        assert_eq!(lag.average_ping_ms(&SHOOTER), Some(ping));
    }

    #[test]
    fn compensation_request_creates_default_profile() {
        let (lag, _) = compensator(FallbackPolicy::Scale);
        lag.compensate_action(SHOOTER, 9.9, Vec3::ZERO, Vec3::X);
        assert_eq!(lag.average_ping_ms(&SHOOTER), Some(100.0));
        assert!(lag.remove_player(&SHOOTER));
        assert!(lag.profile(&SHOOTER).is_none());
    }

    #[test]
    fn historical_position_interpolates() {
        let (lag, _) = compensator(FallbackPolicy::Scale);
        lag.record_snapshot(snapshot(1.0, &[(TARGET, Vec3::ZERO, Vec3::ZERO)]))
            .unwrap();
        lag.record_snapshot(snapshot(2.0, &[(TARGET, Vec3::new(10.0, 0.0, 0.0), Vec3::ZERO)]))
            .unwrap();

        let mid = lag.historical_position(&TARGET, 1.25).unwrap();
        assert!((mid.x - 2.5).abs() < 1e-4);
        // Just past the newest snapshot, still within tolerance
        assert_eq!(lag.historical_position(&TARGET, 2.3), Some(Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(lag.historical_position(&TARGET, 5.0), None);
    }

    #[test]
    fn capture_uses_clock_time() {
        let (lag, clock) = compensator(FallbackPolicy::Scale);
        let world = vec![crate::game::world::EntityView::Player(crate::game::world::PlayerState {
            player_id: TARGET,
            position: Vec3::Y,
            rotation: glam::Quat::IDENTITY,
            velocity: Vec3::ZERO,
            last_update: 10.0,
        })];
        assert_eq!(lag.capture(&world).unwrap(), 1);
        clock.advance(1.0 / 60.0);
        lag.capture(&world).unwrap();
        assert_eq!(lag.snapshot_count(), 2);
        assert_eq!(lag.time_range().map(|(first, _)| first), Some(10.0));
    }
}

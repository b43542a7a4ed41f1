//! Coarse whole-world plausibility sweep
//!
//! Runs once per tick over every replicated entity and flags state that the
//! per-input gate never saw. It only reports; correcting or sanctioning is
//! left to whoever consumes the flags.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

use crate::config::SweepConfig;
use crate::game::world::{EntityKey, EntityView};
use crate::telemetry::{TelemetryBus, TelemetryKind};

/// Kind of implausible state found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    PositionOutOfBounds,
    ExcessiveVelocity,
    UpdateRateAbuse,
    NonFiniteState,
    FutureTimestamp,
}

/// One flagged entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepFlag {
    pub key: EntityKey,
    pub violation: Violation,
    /// Offending value (distance, speed, interval or time offset)
    pub observed: f64,
    pub detail: String,
}

impl SweepFlag {
    fn new(key: EntityKey, violation: Violation, observed: f64, detail: String) -> Self {
        Self {
            key,
            violation,
            observed,
            detail,
        }
    }
}

pub struct AntiCheatSweep {
    config: SweepConfig,
    /// Last `last_update` seen per entity
    last_seen: DashMap<EntityKey, f64>,
    telemetry: TelemetryBus,
}

impl AntiCheatSweep {
    pub fn new(config: SweepConfig, telemetry: TelemetryBus) -> Self {
        Self {
            config,
            last_seen: DashMap::new(),
            telemetry,
        }
    }

    /// Check every entity against the bounds at world time `now`
    ///
    /// Memory for entities missing from `entities` is dropped, so despawned
    /// entities do not accumulate.
    pub fn run(&self, now: f64, entities: &[EntityView]) -> Vec<SweepFlag> {
        let mut flags = Vec::new();
        for view in entities {
            self.inspect(now, view, &mut flags);
        }

        let present: HashSet<EntityKey> = entities.iter().map(|view| view.key()).collect();
        self.last_seen.retain(|key, _| present.contains(key));

        for flag in &flags {
            warn!(
                entity = %flag.key,
                violation = ?flag.violation,
                observed = flag.observed,
                "{}",
                flag.detail
            );
            self.telemetry.publish(TelemetryKind::SweepFlag(flag.clone()));
        }
        flags
    }

    fn inspect(&self, now: f64, view: &EntityView, flags: &mut Vec<SweepFlag>) {
        let key = view.key();
        let position = view.position();
        let velocity = view.velocity();
        let last_update = view.last_update();

        if !position.is_finite() || !velocity.is_finite() || !last_update.is_finite() {
            flags.push(SweepFlag::new(
                key,
                Violation::NonFiniteState,
                0.0,
                format!("{} has NaN or Infinity in its replicated state", key),
            ));
            return;
        }

        let distance = position.length();
        if distance > self.config.max_position {
            flags.push(SweepFlag::new(
                key,
                Violation::PositionOutOfBounds,
                distance as f64,
                format!("{} position out of bounds: {:.1}", key, distance),
            ));
        }

        let speed = velocity.length();
        if speed > self.config.max_velocity {
            flags.push(SweepFlag::new(
                key,
                Violation::ExcessiveVelocity,
                speed as f64,
                format!("{} velocity too high: {:.1}", key, speed),
            ));
        }

        let ahead = last_update - now;
        if ahead > self.config.future_tolerance {
            flags.push(SweepFlag::new(
                key,
                Violation::FutureTimestamp,
                ahead,
                format!("{} update stamped {:.3}s in the future", key, ahead),
            ));
        }

        // Only a fresh update can abuse the rate
        if let Some(previous) = self.last_seen.insert(key, last_update) {
            let interval = last_update - previous;
            if interval > 0.0 && interval < self.config.min_update_interval {
                flags.push(SweepFlag::new(
                    key,
                    Violation::UpdateRateAbuse,
                    interval,
                    format!("{} updating too frequently: {:.4}s", key, interval),
                ));
            }
        }
    }

    /// Drop the per-entity memory for a despawned entity
    pub fn forget(&self, key: &EntityKey) -> bool {
        self.last_seen.remove(key).is_some()
    }

    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::{EntityState, PlayerState};
    use crate::game::EntityId;
    use glam::{Quat, Vec3};
    use uuid::Uuid;

    fn sweep() -> AntiCheatSweep {
        AntiCheatSweep::new(SweepConfig::default(), TelemetryBus::default())
    }

    fn player(position: Vec3, velocity: Vec3, last_update: f64) -> EntityView {
        EntityView::Player(PlayerState {
            player_id: Uuid::from_u128(1),
            position,
            rotation: Quat::IDENTITY,
            velocity,
            last_update,
        })
    }

    fn violations(flags: &[SweepFlag]) -> Vec<Violation> {
        flags.iter().map(|f| f.violation).collect()
    }

    #[test]
    fn sane_entity_is_not_flagged() {
        let flags = sweep().run(1.0, &[player(Vec3::new(10.0, 0.0, 5.0), Vec3::X * 20.0, 1.0)]);
        assert!(flags.is_empty());
    }

    #[test]
    fn far_position_is_flagged() {
        let flags = sweep().run(1.0, &[player(Vec3::new(10_001.0, 0.0, 0.0), Vec3::ZERO, 1.0)]);
        assert_eq!(violations(&flags), vec![Violation::PositionOutOfBounds]);
        assert!((flags[0].observed - 10_001.0).abs() < 1e-3);
    }

    #[test]
    fn fast_velocity_is_flagged() {
        let flags = sweep().run(1.0, &[player(Vec3::ZERO, Vec3::new(0.0, 0.0, 150.0), 1.0)]);
        assert_eq!(violations(&flags), vec![Violation::ExcessiveVelocity]);
    }

    #[test]
    fn rapid_updates_are_flagged() {
        let sweep = sweep();
        assert!(sweep.run(1.0, &[player(Vec3::ZERO, Vec3::ZERO, 1.0)]).is_empty());

        let flags = sweep.run(1.01, &[player(Vec3::ZERO, Vec3::ZERO, 1.005)]);
        assert_eq!(violations(&flags), vec![Violation::UpdateRateAbuse]);

        // Unchanged last_update means no new update arrived
        assert!(sweep.run(1.1, &[player(Vec3::ZERO, Vec3::ZERO, 1.005)]).is_empty());
    }

    #[test]
    fn nan_state_is_flagged() {
        let flags = sweep().run(1.0, &[player(Vec3::new(f32::NAN, 0.0, 0.0), Vec3::ZERO, 1.0)]);
        assert_eq!(violations(&flags), vec![Violation::NonFiniteState]);
    }

    #[test]
    fn future_timestamp_is_flagged() {
        let flags = sweep().run(1.0, &[player(Vec3::ZERO, Vec3::ZERO, 2.0)]);
        assert_eq!(violations(&flags), vec![Violation::FutureTimestamp]);
    }

    #[test]
    fn generic_entities_are_swept_too() {
        let prop = EntityView::Entity(EntityState {
            entity_id: EntityId(3),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Vec3::Y * 500.0,
            active: true,
            last_update: 1.0,
        });
        let sweep = sweep();
        let flags = sweep.run(1.0, &[prop]);
        assert_eq!(flags[0].key, EntityKey::Entity(EntityId(3)));
        assert!(sweep.forget(&EntityKey::Entity(EntityId(3))));
        assert_eq!(sweep.tracked(), 0);
    }

    #[test]
    fn despawned_entities_are_pruned() {
        let prop = |id: u64| {
            EntityView::Entity(EntityState {
                entity_id: EntityId(id),
                position: Vec3::ZERO,
                rotation: Quat::IDENTITY,
                velocity: Vec3::ZERO,
                active: true,
                last_update: 1.0,
            })
        };
        let sweep = sweep();
        sweep.run(1.0, &[prop(1), prop(2), player(Vec3::ZERO, Vec3::ZERO, 1.0)]);
        assert_eq!(sweep.tracked(), 3);

        sweep.run(1.1, &[prop(2)]);
        assert_eq!(sweep.tracked(), 1);
        assert!(!sweep.forget(&EntityKey::Entity(EntityId(1))));
        assert!(sweep.forget(&EntityKey::Entity(EntityId(2))));
    }
}

//! World snapshots and the bounded, time-ordered history used for lag compensation

use glam::{Quat, Vec3};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::world::{EntityView, WorldSource};
use super::{EntityId, PlayerId};

/// Position/rotation/activity of a non-player entity at one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityRecord {
    pub position: Vec3,
    pub rotation: Quat,
    pub active: bool,
}

/// Timestamped capture of every networked entity at one simulation tick
#[derive(Debug, Clone, Default)]
pub struct WorldSnapshot {
    pub timestamp: f64,
    pub player_positions: HashMap<PlayerId, Vec3>,
    pub player_rotations: HashMap<PlayerId, Quat>,
    pub player_velocities: HashMap<PlayerId, Vec3>,
    pub entity_states: HashMap<EntityId, EntityRecord>,
}

impl WorldSnapshot {
    pub fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    /// Build a snapshot from the world layer's entity enumeration
    pub fn capture(timestamp: f64, world: &dyn WorldSource) -> Self {
        let mut snapshot = Self::new(timestamp);
        for view in world.entities() {
            snapshot.record(&view);
        }
        snapshot
    }

    /// Add one entity; a later record for the same id replaces the earlier one
    pub fn record(&mut self, view: &EntityView) {
        match view {
            EntityView::Player(p) => {
                self.player_positions.insert(p.player_id, p.position);
                self.player_rotations.insert(p.player_id, p.rotation);
                self.player_velocities.insert(p.player_id, p.velocity);
            }
            EntityView::Entity(e) => {
                self.entity_states.insert(
                    e.entity_id,
                    EntityRecord {
                        position: e.position,
                        rotation: e.rotation,
                        active: e.active,
                    },
                );
            }
        }
    }

    pub fn player_position(&self, player_id: &PlayerId) -> Option<Vec3> {
        self.player_positions.get(player_id).copied()
    }

    pub fn player_velocity(&self, player_id: &PlayerId) -> Option<Vec3> {
        self.player_velocities.get(player_id).copied()
    }

    pub fn player_count(&self) -> usize {
        self.player_positions.len()
    }
}

/// Bounded history of snapshots in non-decreasing timestamp order
///
/// Appends evict the oldest entry once `capacity` is reached. Because order is
/// enforced on append, nearest-time lookups are a binary search.
#[derive(Debug)]
pub struct SnapshotHistory {
    snapshots: VecDeque<Arc<WorldSnapshot>>,
    capacity: usize,
    tolerance: f64,
}

impl SnapshotHistory {
    pub fn new(capacity: usize, tolerance: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
            tolerance,
        }
    }

    /// Append a snapshot at the tail, evicting the head when over capacity
    pub fn append(&mut self, snapshot: WorldSnapshot) -> Result<(), SnapshotError> {
        if !snapshot.timestamp.is_finite() {
            return Err(SnapshotError::NonFiniteTimestamp);
        }
        if let Some(last) = self.snapshots.back() {
            if snapshot.timestamp < last.timestamp {
                return Err(SnapshotError::OutOfOrder {
                    last: last.timestamp,
                    got: snapshot.timestamp,
                });
            }
        }

        self.snapshots.push_back(Arc::new(snapshot));
        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }
        Ok(())
    }

    /// Snapshot whose timestamp is closest to `target`, if within tolerance
    ///
    /// Ties resolve to the earlier snapshot.
    pub fn query(&self, target: f64) -> Option<Arc<WorldSnapshot>> {
        let index = self.nearest_index(target)?;
        let snapshot = &self.snapshots[index];
        if (snapshot.timestamp - target).abs() <= self.tolerance {
            Some(Arc::clone(snapshot))
        } else {
            None
        }
    }

    fn nearest_index(&self, target: f64) -> Option<usize> {
        if self.snapshots.is_empty() || !target.is_finite() {
            return None;
        }

        // First snapshot at or after the target
        let upper = self.snapshots.partition_point(|s| s.timestamp < target);
        if upper == 0 {
            return Some(0);
        }
        if upper == self.snapshots.len() {
            return Some(upper - 1);
        }

        let before = target - self.snapshots[upper - 1].timestamp;
        let after = self.snapshots[upper].timestamp - target;
        if before <= after {
            // Earliest of any run of equal timestamps
            let t = self.snapshots[upper - 1].timestamp;
            Some(self.snapshots.partition_point(|s| s.timestamp < t))
        } else {
            Some(upper)
        }
    }

    /// The snapshots immediately at-or-before and after `target`
    ///
    /// Returns `None` unless `target` lies inside the stored time range.
    pub fn bracket(&self, target: f64) -> Option<(Arc<WorldSnapshot>, Arc<WorldSnapshot>)> {
        if !target.is_finite() {
            return None;
        }
        let (first, last) = self.time_range()?;
        if target < first || target > last {
            return None;
        }

        let upper = self.snapshots.partition_point(|s| s.timestamp <= target);
        let before = upper.checked_sub(1)?;
        let after = upper.min(self.snapshots.len() - 1);
        Some((
            Arc::clone(&self.snapshots[before]),
            Arc::clone(&self.snapshots[after]),
        ))
    }

    pub fn latest(&self) -> Option<Arc<WorldSnapshot>> {
        self.snapshots.back().cloned()
    }

    /// Oldest and newest stored timestamps
    pub fn time_range(&self) -> Option<(f64, f64)> {
        match (self.snapshots.front(), self.snapshots.back()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

/// Snapshot history errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnapshotError {
    #[error("Snapshot at {got} is older than the newest stored snapshot at {last}")]
    OutOfOrder { last: f64, got: f64 },

    #[error("Snapshot timestamp is not finite")]
    NonFiniteTimestamp,
}

//! Hit detection against historical player positions

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::snapshot::WorldSnapshot;
use super::PlayerId;

/// Outcome of a lag-compensated action
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub is_hit: bool,
    pub hit_position: Vec3,
    pub hit_player_id: Option<PlayerId>,
    /// A historical snapshot was found and the action was resolved against it
    pub compensation_applied: bool,
}

impl ActionResult {
    /// No snapshot available: the action is not resolved at all
    pub fn unresolved() -> Self {
        Self {
            is_hit: false,
            hit_position: Vec3::ZERO,
            hit_player_id: None,
            compensation_applied: false,
        }
    }

    fn miss() -> Self {
        Self {
            compensation_applied: true,
            ..Self::unresolved()
        }
    }
}

/// Shape of the hit test segment
#[derive(Debug, Clone, Copy)]
pub struct HitScan {
    pub max_distance: f32,
    pub hit_radius: f32,
}

impl HitScan {
    /// Test the segment `[origin, origin + dir * max_distance]` against every
    /// player recorded in `snapshot`
    ///
    /// The shooter is skipped. Among players within `hit_radius` of the segment,
    /// the one nearest the origin along the segment wins; ties go to the lower id.
    pub fn resolve(
        &self,
        snapshot: &WorldSnapshot,
        shooter: PlayerId,
        origin: Vec3,
        direction: Vec3,
    ) -> ActionResult {
        let Some(dir) = direction.try_normalize() else {
            return ActionResult::miss();
        };
        if !origin.is_finite() {
            return ActionResult::miss();
        }
        let end = origin + dir * self.max_distance;

        let mut best: Option<(f32, PlayerId, Vec3)> = None;
        for (&player_id, &position) in &snapshot.player_positions {
            if player_id == shooter {
                continue;
            }
            let (distance, along) = distance_to_segment(position, origin, end);
            if distance > self.hit_radius {
                continue;
            }
            let closer = match best {
                None => true,
                Some((best_along, best_id, _)) => {
                    along < best_along || (along == best_along && player_id < best_id)
                }
            };
            if closer {
                best = Some((along, player_id, position));
            }
        }

        match best {
            Some((_, player_id, position)) => ActionResult {
                is_hit: true,
                hit_position: position,
                hit_player_id: Some(player_id),
                compensation_applied: true,
            },
            None => ActionResult::miss(),
        }
    }
}

/// Shortest distance from `point` to the segment `[start, end]`, plus the
/// segment parameter `t` in [0, 1] of the closest point
pub fn distance_to_segment(point: Vec3, start: Vec3, end: Vec3) -> (f32, f32) {
    let segment = end - start;
    let length_sq = segment.length_squared();
    if length_sq <= f32::EPSILON {
        return (point.distance(start), 0.0);
    }
    let t = ((point - start).dot(segment) / length_sq).clamp(0.0, 1.0);
    let closest = start + segment * t;
    (point.distance(closest), t)
}

//! Behavioral pattern detectors over a player's recent inputs

use crate::config::GateConfig;
use crate::game::TickInput;

/// Fixed-capacity circular buffer of a player's recently accepted inputs
#[derive(Debug, Clone)]
pub struct InputHistoryRing {
    samples: Vec<TickInput>,
    capacity: usize,
    /// Slot the next sample is written to
    cursor: usize,
    total_received: u64,
}

impl InputHistoryRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
            total_received: 0,
        }
    }

    /// Write a sample, overwriting the oldest slot once full
    pub fn push(&mut self, sample: TickInput) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.cursor] = sample;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
        self.total_received += 1;
    }

    /// Sample `back` steps before the newest (0 = newest)
    pub fn recent(&self, back: usize) -> Option<&TickInput> {
        if back >= self.samples.len() {
            return None;
        }
        let index = (self.cursor + self.capacity - 1 - back) % self.capacity;
        self.samples.get(index)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_received(&self) -> u64 {
        self.total_received
    }
}

/// What the behavioral stage found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternFinding {
    RepeatingPattern { matches: usize, window: usize },
    AutomatedSteering,
    AutomatedDirection,
}

impl std::fmt::Display for PatternFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternFinding::RepeatingPattern { matches, window } => write!(
                f,
                "Detected repeating input patterns ({}/{} matched)",
                matches, window
            ),
            PatternFinding::AutomatedSteering => {
                write!(f, "Detected automated steering precision")
            }
            PatternFinding::AutomatedDirection => {
                write!(f, "Detected automated movement direction")
            }
        }
    }
}

/// Run both detectors; `None` when the ring is too short or nothing matched
pub fn inspect(
    history: &InputHistoryRing,
    current: &TickInput,
    config: &GateConfig,
) -> Option<PatternFinding> {
    if history.len() < config.min_history_for_patterns {
        return None;
    }
    detect_repeating(history, current, config).or_else(|| detect_automated(current, config))
}

/// Compare the newest `pattern_length` inputs (current included) with the
/// `pattern_length` inputs immediately before them
pub fn detect_repeating(
    history: &InputHistoryRing,
    current: &TickInput,
    config: &GateConfig,
) -> Option<PatternFinding> {
    let window = config.pattern_length;
    if window == 0 {
        return None;
    }

    // Position 0 is the current input, position k > 0 is history.recent(k - 1)
    let at = |k: usize| {
        if k == 0 {
            Some(current)
        } else {
            history.recent(k - 1)
        }
    };

    let matches = (0..window)
        .filter(|&i| match (at(i), at(i + window)) {
            (Some(a), Some(b)) => inputs_match(a, b, config.input_match_tolerance),
            _ => false,
        })
        .count();

    if matches as f32 >= window as f32 * config.pattern_match_ratio {
        Some(PatternFinding::RepeatingPattern { matches, window })
    } else {
        None
    }
}

/// Flag values that land exactly on a coarse grid, as scripted input does
pub fn detect_automated(current: &TickInput, config: &GateConfig) -> Option<PatternFinding> {
    if is_on_grid(
        current.steering,
        config.steering_step,
        config.steering_tolerance,
        config.max_steering,
    ) {
        return Some(PatternFinding::AutomatedSteering);
    }

    // A zero vector has no direction to judge
    if current.movement.length_squared() > f32::EPSILON {
        let degrees = current.movement.y.atan2(current.movement.x).to_degrees();
        if is_on_grid(
            degrees,
            config.angle_step_deg,
            config.angle_tolerance_deg,
            180.0,
        ) {
            return Some(PatternFinding::AutomatedDirection);
        }
    }

    None
}

/// Whether `value` lies within `tolerance` of a multiple of `step` in [-limit, limit]
fn is_on_grid(value: f32, step: f32, tolerance: f32, limit: f32) -> bool {
    if step <= 0.0 || !value.is_finite() {
        return false;
    }
    let nearest = (value / step).round() * step;
    nearest.abs() <= limit + tolerance && (value - nearest).abs() <= tolerance
}

/// Two inputs are the same when analog axes agree within `tolerance` and
/// every button matches exactly
pub fn inputs_match(a: &TickInput, b: &TickInput, tolerance: f32) -> bool {
    a.movement.distance(b.movement) <= tolerance
        && (a.steering - b.steering).abs() <= tolerance
        && a.accelerate == b.accelerate
        && a.brake == b.brake
        && a.handbrake == b.handbrake
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn config() -> GateConfig {
        GateConfig::default()
    }

    fn human(i: usize) -> TickInput {
        let angle = (7.3 + (i % 5) as f32 * 1.1).to_radians();
        TickInput::new(Vec2::from_angle(angle) * 0.6, 0.137 + 0.011 * (i % 5) as f32)
    }

    #[test]
    fn ring_overwrites_oldest() {
        let mut ring = InputHistoryRing::new(3);
        for i in 0..5 {
            ring.push(TickInput::new(Vec2::ZERO, i as f32));
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.total_received(), 5);
        assert_eq!(ring.recent(0).map(|s| s.steering), Some(4.0));
        assert_eq!(ring.recent(2).map(|s| s.steering), Some(2.0));
        assert!(ring.recent(3).is_none());
    }

    #[test]
    fn steering_on_tenths_is_automated() {
        let config = config();
        for steering in [0.3, 0.305, 0.295, -1.0, 0.0] {
            let input = TickInput::new(Vec2::new(0.3, 0.41), steering);
            assert_eq!(
                detect_automated(&input, &config),
                Some(PatternFinding::AutomatedSteering),
                "steering {steering}"
            );
        }
    }

    #[test]
    fn analog_steering_is_not_automated() {
        let input = TickInput::new(Vec2::new(0.3, 0.41), 0.137);
        assert_eq!(detect_automated(&input, &config()), None);
    }

    #[test]
    fn movement_on_fifteen_degrees_is_automated() {
        let config = config();
        let input = TickInput::new(Vec2::from_angle(30f32.to_radians()) * 0.5, 0.137);
        assert_eq!(
            detect_automated(&input, &config),
            Some(PatternFinding::AutomatedDirection)
        );

        let input = TickInput::new(Vec2::new(0.0, -0.8), 0.137);
        assert_eq!(
            detect_automated(&input, &config),
            Some(PatternFinding::AutomatedDirection)
        );

        let input = TickInput::new(Vec2::ZERO, 0.137);
        assert_eq!(detect_automated(&input, &config), None);
    }

    #[test]
    fn identical_inputs_repeat() {
        let config = config();
        let sample = TickInput::new(Vec2::new(0.31, 0.52), 0.37);
        let mut ring = InputHistoryRing::new(config.history_size);
        for _ in 0..5 {
            ring.push(sample);
        }
        assert_eq!(
            detect_repeating(&ring, &sample, &config),
            Some(PatternFinding::RepeatingPattern {
                matches: 3,
                window: 3
            })
        );
    }

    #[test]
    fn varied_inputs_do_not_repeat() {
        let config = config();
        let mut ring = InputHistoryRing::new(config.history_size);
        for i in 0..8 {
            ring.push(human(i));
        }
        assert_eq!(inspect(&ring, &human(8), &config), None);
    }

    #[test]
    fn detectors_need_five_prior_samples() {
        let config = config();
        let sample = TickInput::new(Vec2::ZERO, 0.0);
        let mut ring = InputHistoryRing::new(config.history_size);
        for _ in 0..4 {
            ring.push(sample);
        }
        assert_eq!(inspect(&ring, &sample, &config), None);
        ring.push(sample);
        assert!(inspect(&ring, &sample, &config).is_some());
    }

    #[test]
    fn buttons_must_match_exactly() {
        let a = TickInput::new(Vec2::X, 0.5);
        let mut b = a;
        b.handbrake = true;
        assert!(inputs_match(&a, &a, 0.01));
        assert!(!inputs_match(&a, &b, 0.01));
    }
}

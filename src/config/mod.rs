//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::util::time::SIMULATION_TPS;
use crate::util::rate_limit::ADMIN_RATE_LIMIT;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,

    /// Simulation tick rate (snapshot capture + sweep)
    pub tick_rate: u32,

    /// Bearer token for the moderation endpoints (open when unset)
    pub admin_token: Option<String>,
    /// Moderation endpoint requests per second
    pub admin_rate_limit: u32,

    /// Sanction engine webhook (forwarding disabled when unset)
    pub sanction: Option<SanctionConfig>,

    pub history: HistoryConfig,
    pub lag: LagConfig,
    pub gate: GateConfig,
    pub sweep: SweepConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // A bare PORT binds every interface and wins over SERVER_ADDR
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let sanction = match (
            env::var("SANCTION_WEBHOOK_URL").ok(),
            env::var("SANCTION_WEBHOOK_SECRET").ok(),
        ) {
            (Some(url), Some(secret)) => Some(SanctionConfig { url, secret }),
            (Some(_), None) => return Err(ConfigError::Missing("SANCTION_WEBHOOK_SECRET")),
            (None, _) => None,
        };

        let mut history = HistoryConfig::default();
        if let Some(capacity) = parse_var::<usize>("SNAPSHOT_CAPACITY")? {
            if capacity == 0 {
                return Err(ConfigError::Invalid {
                    var: "SNAPSHOT_CAPACITY",
                    value: capacity.to_string(),
                });
            }
            history.capacity = capacity;
        }
        if let Some(tolerance_ms) = parse_var::<f64>("SNAPSHOT_TOLERANCE_MS")? {
            if !tolerance_ms.is_finite() || tolerance_ms < 0.0 {
                return Err(ConfigError::Invalid {
                    var: "SNAPSHOT_TOLERANCE_MS",
                    value: tolerance_ms.to_string(),
                });
            }
            history.tolerance_secs = tolerance_ms / 1000.0;
        }

        let mut lag = LagConfig::default();
        if let Some(fallback) = parse_var::<FallbackPolicy>("FALLBACK_COMPENSATION")? {
            lag.fallback = fallback;
        }

        let tick_rate = parse_var::<u32>("TICK_RATE_HZ")?.unwrap_or(SIMULATION_TPS);
        if tick_rate == 0 {
            return Err(ConfigError::Invalid {
                var: "TICK_RATE_HZ",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: parse_var::<LogFormat>("LOG_FORMAT")?.unwrap_or_default(),

            tick_rate,

            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            admin_rate_limit: parse_var::<u32>("ADMIN_RATE_LIMIT")?.unwrap_or(ADMIN_RATE_LIMIT),

            sanction,

            history,
            lag,
            gate: GateConfig::default(),
            sweep: SweepConfig::default(),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            tick_rate: SIMULATION_TPS,
            admin_token: None,
            admin_rate_limit: ADMIN_RATE_LIMIT,
            sanction: None,
            history: HistoryConfig::default(),
            lag: LagConfig::default(),
            gate: GateConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

/// Read and parse an optional environment variable
fn parse_var<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(None),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

/// Sanction engine webhook endpoint
#[derive(Clone, Debug)]
pub struct SanctionConfig {
    pub url: String,
    /// HMAC-SHA256 key used to sign each batch
    pub secret: String,
}

/// Snapshot history sizing
#[derive(Clone, Debug)]
pub struct HistoryConfig {
    /// Maximum number of snapshots kept (1000 ≈ 16 s at 60 Hz)
    pub capacity: usize,
    /// Maximum distance between a query time and the nearest snapshot
    pub tolerance_secs: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            tolerance_secs: 0.5,
        }
    }
}

/// What `compensate_movement` does when no snapshot covers the client time
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// `target * (1 + min(delay * 0.5, 1))`
    #[default]
    Scale,
    /// `target + last_velocity * delay`
    Extrapolate,
}

impl FromStr for FallbackPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scale" => Ok(Self::Scale),
            "extrapolate" => Ok(Self::Extrapolate),
            _ => Err(()),
        }
    }
}

/// Lag compensation tuning
#[derive(Clone, Debug)]
pub struct LagConfig {
    /// Player hit radius for historical hit tests
    pub hit_radius: f32,
    /// Length of the hit-test segment
    pub max_ray_distance: f32,
    /// EMA weight of each new ping sample
    pub ping_smoothing: f32,
    /// Ping assumed for a profile created before any sample arrives
    pub default_ping_ms: f32,
    pub fallback: FallbackPolicy,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            hit_radius: 1.0,
            max_ray_distance: 1000.0,
            ping_smoothing: 0.1,
            default_ping_ms: 100.0,
            fallback: FallbackPolicy::Scale,
        }
    }
}

/// Input validation gate thresholds
#[derive(Clone, Debug)]
pub struct GateConfig {
    /// Minimum gap between accepted inputs (seconds)
    pub min_input_interval: f64,
    /// Length of a rate window, measured from its first accepted input (seconds)
    pub rate_window: f64,
    pub max_inputs_per_window: u32,

    pub max_movement: f32,
    pub max_steering: f32,

    /// Movement magnitude a stuck vehicle may still request
    pub stuck_movement_threshold: f32,
    /// Allowed overshoot of the vehicle's max speed
    pub speed_tolerance: f32,

    /// Input history ring size
    pub history_size: usize,
    /// Prior samples required before pattern checks run
    pub min_history_for_patterns: usize,
    pub pattern_length: usize,
    pub pattern_match_ratio: f32,
    /// Tolerance for treating two inputs as identical
    pub input_match_tolerance: f32,

    pub steering_step: f32,
    pub steering_tolerance: f32,
    pub angle_step_deg: f32,
    pub angle_tolerance_deg: f32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_input_interval: 0.016,
            rate_window: 1.0,
            max_inputs_per_window: 100,
            max_movement: 1.0,
            max_steering: 1.0,
            stuck_movement_threshold: 0.1,
            speed_tolerance: 1.1,
            history_size: 10,
            min_history_for_patterns: 5,
            pattern_length: 3,
            pattern_match_ratio: 0.8,
            input_match_tolerance: 0.01,
            steering_step: 0.1,
            steering_tolerance: 0.01,
            angle_step_deg: 15.0,
            angle_tolerance_deg: 0.01,
        }
    }
}

/// Coarse anti-cheat sweep bounds
#[derive(Clone, Debug)]
pub struct SweepConfig {
    /// Maximum distance from the world origin
    pub max_position: f32,
    /// Maximum speed (units/s)
    pub max_velocity: f32,
    /// Minimum interval between two recorded updates of one entity
    pub min_update_interval: f64,
    /// How far past "now" an entity's last update may be stamped
    pub future_tolerance: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_position: 10_000.0,
            max_velocity: 100.0,
            min_update_interval: 1.0 / 60.0,
            future_tolerance: 1.0 / 60.0,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_core_constants() {
        let config = Config::default();
        assert_eq!(config.history.capacity, 1000);
        assert_eq!(config.history.tolerance_secs, 0.5);
        assert_eq!(config.gate.max_inputs_per_window, 100);
        assert_eq!(config.gate.history_size, 10);
        assert_eq!(config.lag.fallback, FallbackPolicy::Scale);
        assert_eq!(config.tick_rate, 60);
    }

    #[test]
    fn fallback_policy_parses_case_insensitively() {
        assert_eq!("Extrapolate".parse(), Ok(FallbackPolicy::Extrapolate));
        assert_eq!("scale".parse(), Ok(FallbackPolicy::Scale));
        assert!("clamp".parse::<FallbackPolicy>().is_err());
    }

    #[test]
    fn log_format_parses() {
        assert_eq!("json".parse(), Ok(LogFormat::Json));
        assert_eq!("TEXT".parse(), Ok(LogFormat::Pretty));
    }
}

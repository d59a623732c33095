//! Flight configuration, loaded once before arming and immutable afterwards.
//!
//! All noise parameters are standard deviations; the estimator squares them
//! into variances when building its covariance matrices.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::constants::ABORT_HOLD_SECONDS;
use crate::control::ControlLaw;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} must be positive (got {value})")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlightConfig {
    // Rocket kinematics
    pub burnout_mass_kg: f64,
    pub air_density_kg_per_m3: f64,

    // Drag constants
    pub rocket_cd: f64,
    /// Incremental Cd contributed by the airbrake at full extension.
    pub airbrake_cd_full_deployment: f64,
    pub rocket_area_m2: f64,

    // Kalman filter process noise (std devs per axis)
    pub model_std_y: f64,
    pub model_std_v: f64,
    pub model_std_a: f64,

    // Measurement noise (std devs)
    pub measurement_std_y: f64,
    pub measurement_std_a: f64,

    // State transition thresholds and control
    pub target_apogee_meters: f64,
    pub launch_accel_mps2: f64,
    pub coast_lockout_seconds: f64,
    /// Gain for the proportional control law. Multiplied by the apogee
    /// error and dt each cycle.
    pub kp: f64,
    /// Maximum airbrake slew rate, deployment units per second.
    pub max_slew_per_second: f64,

    #[serde(default)]
    pub control_law: ControlLaw,
    #[serde(default = "default_true")]
    pub airbrakes_enabled: bool,
    #[serde(default = "default_abort_hold")]
    pub abort_hold_seconds: f64,
}

fn default_true() -> bool {
    true
}

fn default_abort_hold() -> f64 {
    ABORT_HOLD_SECONDS
}

impl FlightConfig {
    /// Reads and validates a config file. A rejected config must never make
    /// it past setup, so callers treat any error here as fatal.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: FlightConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("burnout_mass_kg", self.burnout_mass_kg),
            ("air_density_kg_per_m3", self.air_density_kg_per_m3),
            ("rocket_area_m2", self.rocket_area_m2),
            ("target_apogee_meters", self.target_apogee_meters),
            ("launch_accel_mps2", self.launch_accel_mps2),
            ("coast_lockout_seconds", self.coast_lockout_seconds),
            ("max_slew_per_second", self.max_slew_per_second),
            ("abort_hold_seconds", self.abort_hold_seconds),
            // Zero measurement variance would make the innovation
            // covariance singular on the first estimator update.
            ("measurement_std_y", self.measurement_std_y),
            ("measurement_std_a", self.measurement_std_a),
        ];
        for (field, value) in positive {
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive { field, value });
            }
        }

        let non_negative = [
            ("rocket_cd", self.rocket_cd),
            ("airbrake_cd_full_deployment", self.airbrake_cd_full_deployment),
            ("model_std_y", self.model_std_y),
            ("model_std_v", self.model_std_v),
            ("model_std_a", self.model_std_a),
            ("kp", self.kp),
        ];
        for (field, value) in non_negative {
            if !(value >= 0.0) {
                return Err(ConfigError::Negative { field, value });
            }
        }
        Ok(())
    }
}

/// Baseline parameter set for unit tests across the crate.
#[cfg(test)]
pub fn test_config() -> FlightConfig {
    FlightConfig {
        burnout_mass_kg: 0.65,
        air_density_kg_per_m3: 1.18,
        rocket_cd: 0.71,
        airbrake_cd_full_deployment: 0.35,
        rocket_area_m2: 0.0025,
        model_std_y: 0.5,
        model_std_v: 0.5,
        model_std_a: 1.0,
        measurement_std_y: 0.5,
        measurement_std_a: 0.3,
        target_apogee_meters: 228.6,
        launch_accel_mps2: 30.0,
        coast_lockout_seconds: 1.5,
        kp: 0.012,
        max_slew_per_second: 3.0,
        control_law: ControlLaw::Solver,
        airbrakes_enabled: true,
        abort_hold_seconds: 2.0,
    }
}

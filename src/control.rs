//! Apogee prediction and airbrake deployment control.
//!
//! The closed-form predictor solves the drag-decelerated ascent ODE under
//! quadratic drag; the solver inverts it by bisection to find the
//! deployment fraction that lands the predicted apogee on target.

use serde::Deserialize;

use crate::config::FlightConfig;
use crate::constants::{GRAVITY, ITERATION_TIME_STEP};

/// Bisection depth for the deployment solver; 6 steps resolve 1/64.
const BISECTION_DIGITS: u32 = 6;

/// Effective drag below this is treated as drag-free ascent.
const MIN_DRAG_PARAMETER: f64 = 1e-9;

/// Combined rocket + airbrake drag coefficient at the given deployment.
pub fn effective_cd(config: &FlightConfig, deployment: f64) -> f64 {
    config.rocket_cd + deployment * config.airbrake_cd_full_deployment
}

/// Predicts apogee from the current altitude and velocity assuming
/// unpowered ascent against quadratic drag at a fixed deployment.
///
/// Valid only while ascending; with v <= 0 the rocket is at or past
/// apogee and the current altitude is returned. Near-zero drag falls back
/// to the vacuum ballistic limit v^2 / 2g so the logarithm can never blow
/// up into the command path.
pub fn predict_apogee(config: &FlightConfig, y: f64, v: f64, deployment: f64) -> f64 {
    if v <= 0.0 {
        return y;
    }

    let cd = effective_cd(config, deployment.clamp(0.0, 1.0));
    let k = 0.5 * cd * config.rocket_area_m2 * config.air_density_kg_per_m3;
    if k < MIN_DRAG_PARAMETER {
        return y + v * v / (2.0 * GRAVITY);
    }

    let mass = config.burnout_mass_kg;
    let log_arg = (k * v * v) / (mass * GRAVITY) + 1.0;
    y + log_arg.ln() * mass / (2.0 * k)
}

/// Forward-Euler reference predictor. Integrates the same drag model until
/// the vertical velocity crosses zero; kept for validating the closed form
/// and for tests.
pub fn predict_apogee_iterative(config: &FlightConfig, y: f64, v: f64, deployment: f64) -> f64 {
    let cd = effective_cd(config, deployment.clamp(0.0, 1.0));
    let k = 0.5 * cd * config.rocket_area_m2 * config.air_density_kg_per_m3;
    let mass = config.burnout_mass_kg;

    let mut y = y;
    let mut v = v;
    while v > 0.0 {
        let a = -GRAVITY - (k / mass) * v * v;
        v += a * ITERATION_TIME_STEP;
        y += v * ITERATION_TIME_STEP;
    }
    y
}

/// Solves for the deployment fraction in [0, 1] whose predicted apogee
/// meets the configured target.
///
/// Prediction is monotonically non-increasing in deployment, so each
/// bisection step tests whether adding the next power-of-two increment
/// still overshoots the target and keeps it if so.
pub fn compute_deployment(config: &FlightConfig, y: f64, v: f64) -> f64 {
    let target = config.target_apogee_meters;

    // Already under target with zero drag added, or over it at full drag:
    // saturate rather than search outside the actuator's authority.
    if predict_apogee(config, y, v, 0.0) < target {
        return 0.0;
    }
    if predict_apogee(config, y, v, 1.0) > target {
        return 1.0;
    }

    let mut deployment = 0.0;
    for digits in 1..=BISECTION_DIGITS {
        let addition = 1.0 / (1u64 << digits) as f64;
        if predict_apogee(config, y, v, deployment + addition) > target {
            deployment += addition;
        }
    }
    deployment
}

/// Which coast-phase control law drives the airbrake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlLaw {
    /// Bisection on predicted apogee (the flight default).
    #[default]
    Solver,
    /// Integrates kp * apogee-error * dt onto the previous command.
    Proportional,
    /// Full deployment while the no-brake prediction overshoots.
    BangBang,
}

/// Produces the desired (pre-rate-limit) deployment each coast cycle.
pub struct DeploymentController {
    law: ControlLaw,
    desired: f64,
}

impl DeploymentController {
    pub fn new(law: ControlLaw) -> Self {
        DeploymentController { law, desired: 0.0 }
    }

    /// Re-seeds the integrated command; called when coast control begins.
    pub fn reset(&mut self) {
        self.desired = 0.0;
    }

    pub fn desired_deployment(&mut self, config: &FlightConfig, y: f64, v: f64, dt: f64) -> f64 {
        self.desired = match self.law {
            ControlLaw::Solver => compute_deployment(config, y, v),
            ControlLaw::Proportional => {
                let error =
                    predict_apogee(config, y, v, self.desired) - config.target_apogee_meters;
                (self.desired + config.kp * error * dt).clamp(0.0, 1.0)
            }
            ControlLaw::BangBang => {
                if predict_apogee(config, y, v, 0.0) > config.target_apogee_meters {
                    1.0
                } else {
                    0.0
                }
            }
        };
        self.desired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FlightConfig, test_config};
    use approx::assert_relative_eq;

    /// The worked example from the drag model derivation: y = 100 m,
    /// v = 50 m/s, Cd 0.4, area 0.01 m^2, rho 1.225, mass 1 kg.
    fn example_config() -> FlightConfig {
        let mut config = test_config();
        config.rocket_cd = 0.4;
        config.airbrake_cd_full_deployment = 0.4;
        config.rocket_area_m2 = 0.01;
        config.air_density_kg_per_m3 = 1.225;
        config.burnout_mass_kg = 1.0;
        config
    }

    #[test]
    fn ascending_rocket_gains_altitude() {
        let config = example_config();
        let apogee = predict_apogee(&config, 100.0, 50.0, 0.0);
        assert!(apogee > 100.0);
        // Drag keeps it below the vacuum limit.
        assert!(apogee < 100.0 + 50.0 * 50.0 / (2.0 * GRAVITY));
    }

    #[test]
    fn more_deployment_always_lowers_apogee() {
        let config = example_config();
        let mut previous = f64::INFINITY;
        for step in 0..=10 {
            let apogee = predict_apogee(&config, 100.0, 50.0, step as f64 / 10.0);
            assert!(apogee < previous);
            previous = apogee;
        }
    }

    #[test]
    fn descending_returns_current_altitude() {
        let config = example_config();
        assert_eq!(predict_apogee(&config, 150.0, -3.0, 0.5), 150.0);
        assert_eq!(predict_apogee(&config, 150.0, 0.0, 0.5), 150.0);
    }

    #[test]
    fn zero_drag_matches_vacuum_ballistics() {
        let mut config = example_config();
        config.rocket_cd = 0.0;
        config.airbrake_cd_full_deployment = 0.0;
        let apogee = predict_apogee(&config, 0.0, 40.0, 1.0);
        assert_relative_eq!(apogee, 40.0 * 40.0 / (2.0 * GRAVITY), max_relative = 1e-12);
        assert!(apogee.is_finite());
    }

    #[test]
    fn closed_form_agrees_with_iterative() {
        let config = example_config();
        for &(y, v, d) in &[(100.0, 50.0, 0.0), (50.0, 80.0, 0.5), (200.0, 20.0, 1.0)] {
            let closed = predict_apogee(&config, y, v, d);
            let iterated = predict_apogee_iterative(&config, y, v, d);
            assert_relative_eq!(closed, iterated, max_relative = 0.01);
        }
    }

    #[test]
    fn solver_saturates_at_zero_when_under_target() {
        let mut config = example_config();
        config.target_apogee_meters = predict_apogee(&config, 100.0, 50.0, 0.0) + 10.0;
        assert_eq!(compute_deployment(&config, 100.0, 50.0), 0.0);
    }

    #[test]
    fn solver_saturates_at_one_when_over_target() {
        let mut config = example_config();
        config.target_apogee_meters = predict_apogee(&config, 100.0, 50.0, 1.0) - 10.0;
        assert_eq!(compute_deployment(&config, 100.0, 50.0), 1.0);
    }

    #[test]
    fn solver_lands_within_search_resolution() {
        let mut config = example_config();
        // Pick a target bracketed by the actuator's authority.
        let full = predict_apogee(&config, 100.0, 50.0, 1.0);
        let none = predict_apogee(&config, 100.0, 50.0, 0.0);
        config.target_apogee_meters = 0.5 * (full + none);

        let deployment = compute_deployment(&config, 100.0, 50.0);
        assert!(deployment > 0.0 && deployment < 1.0);

        // Off by at most one bisection step in deployment, so the achieved
        // apogee is within that step's worth of altitude from target.
        let achieved = predict_apogee(&config, 100.0, 50.0, deployment);
        let resolution_band = (predict_apogee(&config, 100.0, 50.0, deployment - 1.0 / 64.0)
            - predict_apogee(&config, 100.0, 50.0, deployment + 1.0 / 64.0))
        .abs();
        assert!((achieved - config.target_apogee_meters).abs() <= resolution_band);
    }

    #[test]
    fn solver_never_produces_nan() {
        let config = example_config();
        for &(y, v) in &[(0.0, 0.0), (100.0, -50.0), (5000.0, 300.0), (0.0, 1e-9)] {
            let deployment = compute_deployment(&config, y, v);
            assert!(deployment.is_finite());
            assert!((0.0..=1.0).contains(&deployment));
        }
    }

    #[test]
    fn bang_bang_switches_on_no_brake_prediction() {
        let mut config = example_config();
        let mut controller = DeploymentController::new(ControlLaw::BangBang);
        config.target_apogee_meters = predict_apogee(&config, 100.0, 50.0, 0.0) - 5.0;
        assert_eq!(controller.desired_deployment(&config, 100.0, 50.0, 0.05), 1.0);
        config.target_apogee_meters = predict_apogee(&config, 100.0, 50.0, 0.0) + 5.0;
        assert_eq!(controller.desired_deployment(&config, 100.0, 50.0, 0.05), 0.0);
    }

    #[test]
    fn proportional_integrates_toward_deployment_and_clamps() {
        let mut config = example_config();
        config.kp = 0.5;
        config.target_apogee_meters = predict_apogee(&config, 100.0, 50.0, 1.0) - 20.0;
        let mut controller = DeploymentController::new(ControlLaw::Proportional);
        let mut last = 0.0;
        for _ in 0..200 {
            let desired = controller.desired_deployment(&config, 100.0, 50.0, 0.05);
            assert!((0.0..=1.0).contains(&desired));
            assert!(desired >= last);
            last = desired;
        }
        // Persistent overshoot drives the command to full deployment.
        assert_relative_eq!(last, 1.0);
    }
}

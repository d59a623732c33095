//! Per-cycle flight orchestration. `Context` owns every piece of mutable
//! flight state (estimator, phase, brake command path, bookkeeping) and is
//! updated exactly once per control cycle, in order: estimate, bookkeep,
//! abort check, phase logic, telemetry.

use log::{info, warn};
use thiserror::Error;

use crate::actuator::Airbrake;
use crate::config::FlightConfig;
use crate::constants::{
    DOWNLINK_PERIOD_SECONDS, RECOVERY_ALTITUDE_METERS, RECOVERY_VELOCITY_METERS_PER_SECOND,
};
use crate::control::DeploymentController;
use crate::estimator::{EstimatorError, StateEstimator};
use crate::logger::{FlightLogger, FlightSummary, TelemetryRow};
use crate::phase::{BurningPhase, CoastingPhase, FlightPhase, LandedPhase, RecoveryPhase};
use crate::rate_limiter::RateLimiter;
use crate::sensors::SensorSample;
use crate::transmitter::{DownlinkPacket, Transmitter};
use crate::trigger::HoldTrigger;

#[derive(Debug, Error)]
pub enum FlightError {
    #[error("control cycle ran before arming; this is a logic bug, not a flight condition")]
    UpdateBeforeArm,
    #[error(transparent)]
    Estimator(#[from] EstimatorError),
}

pub struct Context {
    config: FlightConfig,
    estimator: StateEstimator,
    phase: FlightPhase,
    controller: DeploymentController,
    brake: Airbrake,
    logger: Option<FlightLogger>,
    transmitter: Option<Transmitter>,
    abort: HoldTrigger,

    // Apogee bookkeeping; updated every cycle regardless of phase.
    apogee_meters: f64,
    apogee_seconds: f64,

    launch_seconds: Option<f64>,
    touchdown_seconds: Option<f64>,
    last_transmit_seconds: Option<f64>,
    summary_written: bool,
    finished: bool,
}

impl Context {
    pub fn new(
        config: FlightConfig,
        brake: Airbrake,
        logger: Option<FlightLogger>,
        transmitter: Option<Transmitter>,
    ) -> Self {
        let estimator = StateEstimator::from_config(&config);
        let controller = DeploymentController::new(config.control_law);
        let abort = HoldTrigger::new(config.abort_hold_seconds);
        Context {
            config,
            estimator,
            phase: FlightPhase::Setup,
            controller,
            brake,
            logger,
            transmitter,
            abort,
            apogee_meters: 0.0,
            apogee_seconds: 0.0,
            launch_seconds: None,
            touchdown_seconds: None,
            last_transmit_seconds: None,
            summary_written: false,
            finished: false,
        }
    }

    /// Leaves SETUP. Call once, after calibration, before the first cycle.
    pub fn arm(&mut self) {
        match self.phase {
            FlightPhase::Setup => {
                info!("armed; waiting for launch");
                self.phase = FlightPhase::Idle;
            }
            _ => warn!("arm called twice; ignoring"),
        }
    }

    /// One control cycle. `now` and `dt` are wall-clock derived; `sample`
    /// was read immediately before this call.
    pub fn update(
        &mut self,
        sample: &SensorSample,
        now: f64,
        dt: f64,
        button_pressed: bool,
    ) -> Result<(), FlightError> {
        if matches!(self.phase, FlightPhase::Setup) {
            return Err(FlightError::UpdateBeforeArm);
        }
        if self.finished {
            return Ok(());
        }

        self.estimator
            .update(sample.altitude_agl, sample.vertical_accel, dt)?;
        let y = self.estimator.altitude();
        let v = self.estimator.velocity();
        let a = self.estimator.acceleration();

        // Runs before the phase match so an unexpected phase state can
        // never suppress apogee capture.
        if y > self.apogee_meters {
            self.apogee_meters = y;
            self.apogee_seconds = now;
        }

        if self.abort.held(button_pressed, now) {
            info!("abort trigger held; terminating flight");
            self.end();
            return Ok(());
        }

        let mut commanded = 0.0;
        let next = match &mut self.phase {
            FlightPhase::Setup => None,
            FlightPhase::Idle => {
                if sample.vertical_accel >= self.config.launch_accel_mps2 {
                    info!("launch detected at {:.1} m/s^2", sample.vertical_accel);
                    self.launch_seconds = Some(now);
                    Some(FlightPhase::Burning(BurningPhase {
                        ignition_seconds: now,
                    }))
                } else {
                    None
                }
            }
            FlightPhase::Burning(burning) => {
                // Never actuate during thrust.
                self.brake.close();
                if burning.burned_out(now, self.config.coast_lockout_seconds) {
                    info!("burnout lockout elapsed; coast control active");
                    self.controller.reset();
                    Some(FlightPhase::Coasting(CoastingPhase {
                        limiter: RateLimiter::new(0.0, self.config.max_slew_per_second, now),
                    }))
                } else {
                    None
                }
            }
            FlightPhase::Coasting(coasting) => {
                let desired = self.controller.desired_deployment(&self.config, y, v, dt);
                commanded = coasting.limiter.get(desired, now);
                self.brake.set_deployment(commanded);

                if y < RECOVERY_ALTITUDE_METERS && v < RECOVERY_VELOCITY_METERS_PER_SECOND {
                    info!("descent confirmed; retracting brakes for recovery");
                    commanded = 0.0;
                    self.brake.close();
                    Some(FlightPhase::Recovery(RecoveryPhase::new()))
                } else {
                    None
                }
            }
            FlightPhase::Recovery(recovery) => {
                self.brake.close();
                // Flush every cycle so a hard landing loses as little
                // data as possible.
                if let Some(logger) = &mut self.logger {
                    logger.flush();
                }
                if recovery.check_landed(v) {
                    self.touchdown_seconds = Some(now);
                    Some(FlightPhase::Landed(LandedPhase {
                        touchdown_seconds: now,
                    }))
                } else {
                    None
                }
            }
            FlightPhase::Landed(_) => None,
        };

        if let Some(next) = next {
            self.phase = next;
            if matches!(self.phase, FlightPhase::Landed(_)) {
                info!(
                    "touchdown at {:.1} s; apogee {:.1} m at {:.1} s",
                    now, self.apogee_meters, self.apogee_seconds
                );
                self.write_summary();
            }
        }

        let row = TelemetryRow::new(
            now,
            self.phase.letter(),
            sample,
            (y, v, a),
            commanded,
            self.brake.deployment(),
            self.apogee_meters,
        );
        if let Some(logger) = &mut self.logger {
            logger.log_row(&row);
        }
        self.maybe_transmit(now, y, v, a);

        Ok(())
    }

    /// Terminates the flight: brakes retracted, summary written, log
    /// closed. The only way out of the control loop besides power-off.
    pub fn end(&mut self) {
        self.brake.close();
        self.write_summary();
        self.logger = None;
        self.finished = true;
    }

    fn write_summary(&mut self) {
        if self.summary_written {
            return;
        }
        self.summary_written = true;
        let summary = FlightSummary {
            apogee_meters: self.apogee_meters,
            apogee_seconds: self.apogee_seconds,
            launch_seconds: self.launch_seconds,
            touchdown_seconds: self.touchdown_seconds,
            final_phase: self.phase.name(),
        };
        info!(
            "flight summary: apogee {:.1} m at {:.1} s, final phase {}",
            summary.apogee_meters, summary.apogee_seconds, summary.final_phase
        );
        if let Some(logger) = &mut self.logger {
            logger.log_summary(&summary);
            logger.flush();
        }
    }

    fn maybe_transmit(&mut self, now: f64, y: f64, v: f64, a: f64) {
        let due = match self.last_transmit_seconds {
            Some(last) => now - last >= DOWNLINK_PERIOD_SECONDS,
            None => true,
        };
        if !due {
            return;
        }
        if let Some(transmitter) = &mut self.transmitter {
            transmitter.transmit(&DownlinkPacket {
                phase_name: self.phase.name(),
                altitude: y,
                velocity: v,
                acceleration: a,
                deployment: self.brake.deployment(),
                apogee: self.apogee_meters,
            });
        }
        self.last_transmit_seconds = Some(now);
    }

    pub fn phase(&self) -> &FlightPhase {
        &self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn apogee_meters(&self) -> f64 {
        self.apogee_meters
    }

    pub fn apogee_seconds(&self) -> f64 {
        self.apogee_seconds
    }

    pub fn launch_seconds(&self) -> Option<f64> {
        self.launch_seconds
    }

    pub fn touchdown_seconds(&self) -> Option<f64> {
        self.touchdown_seconds
    }

    pub fn brake_deployment(&self) -> f64 {
        self.brake.deployment()
    }

    /// Current (position, velocity, acceleration) estimate.
    pub fn estimate(&self) -> (f64, f64, f64) {
        (
            self.estimator.altitude(),
            self.estimator.velocity(),
            self.estimator.acceleration(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::constants::{CYCLE_PERIOD_SECONDS, LANDED_QUIET_SAMPLES};

    fn still_air() -> SensorSample {
        SensorSample {
            altitude_agl: 0.0,
            vertical_accel: 0.0,
            temperature: 20.0,
        }
    }

    fn sample(altitude: f64, accel: f64) -> SensorSample {
        SensorSample {
            altitude_agl: altitude,
            vertical_accel: accel,
            temperature: 20.0,
        }
    }

    fn test_context() -> Context {
        Context::new(test_config(), Airbrake::disconnected(), None, None)
    }

    #[test]
    fn update_before_arm_is_a_logic_error() {
        let mut context = test_context();
        let result = context.update(&still_air(), 0.0, CYCLE_PERIOD_SECONDS, false);
        assert!(matches!(result, Err(FlightError::UpdateBeforeArm)));
    }

    #[test]
    fn idle_holds_below_launch_threshold() {
        let mut context = test_context();
        context.arm();
        for cycle in 0..200 {
            let now = cycle as f64 * CYCLE_PERIOD_SECONDS;
            context
                .update(&sample(0.0, 5.0), now, CYCLE_PERIOD_SECONDS, false)
                .unwrap();
        }
        assert_eq!(context.phase().name(), "Idle");
        assert!(context.launch_seconds().is_none());
    }

    #[test]
    fn launch_spike_enters_burning_next_evaluation() {
        let mut context = test_context();
        context.arm();
        context
            .update(&still_air(), 0.0, CYCLE_PERIOD_SECONDS, false)
            .unwrap();
        assert_eq!(context.phase().name(), "Idle");
        context
            .update(&sample(0.1, 45.0), 0.05, CYCLE_PERIOD_SECONDS, false)
            .unwrap();
        assert_eq!(context.phase().name(), "Burning");
        assert_eq!(context.launch_seconds(), Some(0.05));
    }

    #[test]
    fn burning_locks_brakes_and_exits_once_after_lockout() {
        let mut context = test_context();
        context.arm();
        context
            .update(&sample(0.0, 45.0), 0.0, CYCLE_PERIOD_SECONDS, false)
            .unwrap();
        assert_eq!(context.phase().name(), "Burning");

        let mut coasting_entries = 0;
        let mut previous = "Burning".to_string();
        for cycle in 1..=60 {
            let now = cycle as f64 * CYCLE_PERIOD_SECONDS;
            context
                .update(&sample(now * 20.0, 45.0), now, CYCLE_PERIOD_SECONDS, false)
                .unwrap();
            if context.phase().name() == "Burning" {
                assert_eq!(context.brake_deployment(), 0.0);
                // Lockout: 1.5 s after ignition at t = 0.
                assert!(now < 1.5);
            }
            if context.phase().name() == "Coasting" && previous == "Burning" {
                coasting_entries += 1;
                assert!(now >= 1.5);
            }
            previous = context.phase().name().to_string();
        }
        assert_eq!(coasting_entries, 1);
    }

    #[test]
    fn coasting_commands_are_slew_limited() {
        let mut config = test_config();
        // Target far below reachable apogee so the solver pins at 1.0.
        config.target_apogee_meters = 10.0;
        let mut context = Context::new(config, Airbrake::disconnected(), None, None);
        context.arm();
        context.phase = FlightPhase::Coasting(CoastingPhase {
            limiter: RateLimiter::new(0.0, 3.0, 0.0),
        });

        let mut previous = 0.0;
        for cycle in 1..=40 {
            let now = cycle as f64 * CYCLE_PERIOD_SECONDS;
            // Ascending fast at altitude: solver always wants full brakes.
            context
                .update(&sample(100.0 + now * 50.0, -9.81), now, CYCLE_PERIOD_SECONDS, false)
                .unwrap();
            let deployment = context.brake_deployment();
            assert!(deployment >= previous);
            assert!(deployment - previous <= 3.0 * CYCLE_PERIOD_SECONDS + 1e-9);
            assert!(deployment <= 3.0 * now + 1e-9);
            previous = deployment;
        }
        assert!(previous > 0.5);
    }

    /// Puts the context in the coasting phase with the estimator settled
    /// at `altitude`, then descends at `descent_rate` m/s. Returns the
    /// final phase name and how low the altitude got.
    fn coast_then_descend(descent_rate: f64, start_altitude: f64, cycles: usize) -> (String, f64) {
        let mut context = test_context();
        context.arm();
        context.phase = FlightPhase::Coasting(CoastingPhase {
            limiter: RateLimiter::new(0.0, 3.0, 0.0),
        });
        // Settle the estimator well above the recovery altitude floor.
        let mut cycle = 0;
        for _ in 0..300 {
            cycle += 1;
            let now = cycle as f64 * CYCLE_PERIOD_SECONDS;
            context
                .update(&sample(start_altitude, 0.0), now, CYCLE_PERIOD_SECONDS, false)
                .unwrap();
        }
        assert_eq!(context.phase().name(), "Coasting");

        let mut altitude = start_altitude;
        for _ in 0..cycles {
            cycle += 1;
            let now = cycle as f64 * CYCLE_PERIOD_SECONDS;
            altitude = (altitude - descent_rate * CYCLE_PERIOD_SECONDS).max(0.5);
            context
                .update(&sample(altitude, 0.0), now, CYCLE_PERIOD_SECONDS, false)
                .unwrap();
            if context.phase().name() == "Recovery" {
                assert_eq!(context.brake_deployment(), 0.0);
                break;
            }
        }
        (context.phase().name().to_string(), altitude)
    }

    #[test]
    fn low_altitude_alone_does_not_enter_recovery() {
        // Creeps down at 0.3 m/s: crosses the 20 m floor but never
        // satisfies the descent-velocity condition.
        let (phase, altitude) = coast_then_descend(0.3, 25.0, 2000);
        assert!(altitude < 20.0);
        assert_eq!(phase, "Coasting");
    }

    #[test]
    fn descent_alone_does_not_enter_recovery() {
        // Falls fast but never gets below the altitude floor.
        let (phase, altitude) = coast_then_descend(2.0, 300.0, 200);
        assert!(altitude > 20.0);
        assert_eq!(phase, "Coasting");
    }

    #[test]
    fn low_and_descending_enters_recovery() {
        let (phase, altitude) = coast_then_descend(2.0, 25.0, 400);
        assert!(altitude < 20.0);
        assert_eq!(phase, "Recovery");
    }

    #[test]
    fn recovery_lands_after_quiet_window() {
        let mut context = test_context();
        context.arm();
        context.phase = FlightPhase::Recovery(RecoveryPhase::new());
        for cycle in 1..=300 {
            let now = cycle as f64 * CYCLE_PERIOD_SECONDS;
            context
                .update(&sample(0.3, 0.0), now, CYCLE_PERIOD_SECONDS, false)
                .unwrap();
        }
        assert_eq!(context.phase().name(), "Landed");
        assert!(context.touchdown_seconds().is_some());
    }

    #[test]
    fn landed_never_actuates() {
        let mut context = test_context();
        context.arm();
        context.phase = FlightPhase::Landed(LandedPhase {
            touchdown_seconds: 0.0,
        });
        for cycle in 1..=LANDED_QUIET_SAMPLES {
            let now = cycle as f64 * CYCLE_PERIOD_SECONDS;
            context
                .update(&sample(0.0, 0.0), now, CYCLE_PERIOD_SECONDS, false)
                .unwrap();
            assert_eq!(context.brake_deployment(), 0.0);
        }
        assert_eq!(context.phase().name(), "Landed");
    }

    #[test]
    fn abort_hold_terminates_from_any_phase() {
        let mut context = test_context();
        context.arm();
        let mut aborted_at = None;
        for cycle in 0..100 {
            let now = cycle as f64 * CYCLE_PERIOD_SECONDS;
            context
                .update(&still_air(), now, CYCLE_PERIOD_SECONDS, true)
                .unwrap();
            if context.is_finished() {
                aborted_at = Some(now);
                break;
            }
        }
        // Hold threshold is 2.0 s; honored within one cycle of crossing.
        let aborted_at = aborted_at.expect("abort never fired");
        assert!(aborted_at >= 2.0);
        assert!(aborted_at <= 2.0 + 2.0 * CYCLE_PERIOD_SECONDS);
        assert_eq!(context.brake_deployment(), 0.0);
    }

    #[test]
    fn short_press_does_not_abort() {
        let mut context = test_context();
        context.arm();
        for cycle in 0..100 {
            let now = cycle as f64 * CYCLE_PERIOD_SECONDS;
            // Pressed only every other cycle; never held continuously.
            let pressed = cycle % 2 == 0;
            context
                .update(&still_air(), now, CYCLE_PERIOD_SECONDS, pressed)
                .unwrap();
        }
        assert!(!context.is_finished());
    }

    #[test]
    fn apogee_bookkeeping_runs_in_every_phase() {
        let mut context = test_context();
        context.arm();
        // Stays in Idle the whole time (accel below threshold), but the
        // running max must still be captured.
        let mut cycle = 0;
        for altitude in [10.0, 30.0, 48.0, 42.0, 20.0] {
            for _ in 0..40 {
                cycle += 1;
                let now = cycle as f64 * CYCLE_PERIOD_SECONDS;
                context
                    .update(&sample(altitude, 0.0), now, CYCLE_PERIOD_SECONDS, false)
                    .unwrap();
            }
        }
        assert_eq!(context.phase().name(), "Idle");
        assert!(context.apogee_meters() > 45.0);
        assert!(context.apogee_seconds() > 0.0);
    }
}

//! Constants used throughout the program.

/// Standard gravitational acceleration, m/s^2.
pub const GRAVITY: f64 = 9.81;

/// Nominal control loop period. Timing is still measured against the wall
/// clock each cycle; this only sets the sleep target and the first-cycle dt.
pub const CYCLE_PERIOD_SECONDS: f64 = 0.05;

/// Smallest dt accepted by the state estimator.
pub const MIN_DT_SECONDS: f64 = 1e-6;

/// Timestep for the iterative apogee predictor:
pub const ITERATION_TIME_STEP: f64 = 0.01;

/// Altitude below which the rocket is considered to be recovering:
pub const RECOVERY_ALTITUDE_METERS: f64 = 20.0;

/// Descent velocity required (together with the altitude floor) to enter
/// recovery, so estimator noise near apogee cannot trigger it early:
pub const RECOVERY_VELOCITY_METERS_PER_SECOND: f64 = -0.5;

/// Speed below which the rocket is considered to have landed:
pub const LANDED_SPEED_METERS_PER_SECOND: f64 = 0.1;

/// Consecutive quiet velocity samples required to declare touchdown:
pub const LANDED_QUIET_SAMPLES: usize = 10;

/// Telemetry downlink period over the serial radio:
pub const DOWNLINK_PERIOD_SECONDS: f64 = 0.2;

/// How long the button must be held to abort the flight:
pub const ABORT_HOLD_SECONDS: f64 = 2.0;

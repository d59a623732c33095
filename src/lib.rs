//! Flight-control core for a model-rocket airbrake: a Kalman state
//! estimator, an apogee-targeting deployment solver, and a forward-only
//! flight phase machine, driven by one fixed-rate control loop.

pub mod actuator;
pub mod config;
pub mod constants;
pub mod context;
pub mod control;
pub mod estimator;
pub mod logger;
pub mod phase;
pub mod rate_limiter;
pub mod sensors;
pub mod transmitter;
pub mod trigger;
pub mod ui;

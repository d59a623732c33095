//! Offline closed-loop flight simulation. Runs the full control stack
//! against the simulated sensor model as fast as it will go and reports
//! how close the flight came to the configured target apogee.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

use apex_rocket::actuator::Airbrake;
use apex_rocket::config::FlightConfig;
use apex_rocket::constants::CYCLE_PERIOD_SECONDS;
use apex_rocket::context::Context;
use apex_rocket::phase::FlightPhase;
use apex_rocket::sensors::{MotorProfile, SimulatedSensors};

#[derive(Parser)]
#[command(about = "Closed-loop airbrake flight simulation")]
struct Args {
    /// Path to the flight configuration file.
    config: PathBuf,

    /// Seed for the sensor noise generator.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Altimeter noise standard deviation, meters.
    #[arg(long, default_value_t = 0.5)]
    altitude_noise: f64,

    /// Accelerometer noise standard deviation, m/s^2.
    #[arg(long, default_value_t = 0.3)]
    accel_noise: f64,

    /// Motor burn duration, seconds.
    #[arg(long, default_value_t = 1.0)]
    burn: f64,

    /// Net thrust acceleration during the burn, m/s^2.
    #[arg(long, default_value_t = 90.0)]
    thrust: f64,

    /// Maximum simulated flight time, seconds.
    #[arg(long, default_value_t = 300.0)]
    max_time: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = FlightConfig::load(&args.config)
        .with_context(|| format!("rejecting flight configuration {:?}", args.config))?;
    let target = config.target_apogee_meters;

    let mut sensors = SimulatedSensors::new(
        &config,
        MotorProfile {
            launch_delay_seconds: 1.0,
            burn_seconds: args.burn,
            thrust_accel_mps2: args.thrust,
        },
        args.altitude_noise,
        args.accel_noise,
        args.seed,
    );
    let mut context = Context::new(config, Airbrake::disconnected(), None, None);
    context.arm();

    let dt = CYCLE_PERIOD_SECONDS;
    let mut now = 0.0;
    let mut true_apogee: f64 = 0.0;
    while now < args.max_time {
        now += dt;
        let sample = sensors.read(dt);
        true_apogee = true_apogee.max(sensors.altitude());
        context.update(&sample, now, dt, false)?;
        sensors.set_deployment(context.brake_deployment());
        if matches!(context.phase(), FlightPhase::Landed(_)) {
            break;
        }
    }

    println!("final phase:      {}", context.phase().name());
    println!("target apogee:    {target:.1} m");
    println!("true apogee:      {true_apogee:.1} m");
    println!("estimated apogee: {:.1} m at {:.1} s", context.apogee_meters(), context.apogee_seconds());
    println!("apogee error:     {:+.1} m", true_apogee - target);
    match context.launch_seconds() {
        Some(t) => println!("launch detected:  {t:.2} s"),
        None => println!("launch detected:  never"),
    }
    match context.touchdown_seconds() {
        Some(t) => println!("touchdown:        {t:.2} s"),
        None => println!("touchdown:        never"),
    }
    Ok(())
}

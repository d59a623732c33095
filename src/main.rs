use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use clap::Parser;
use log::{info, warn};

use apex_rocket::actuator::{Airbrake, SysfsServo};
use apex_rocket::config::FlightConfig;
use apex_rocket::constants::CYCLE_PERIOD_SECONDS;
use apex_rocket::context::Context;
use apex_rocket::logger::FlightLogger;
use apex_rocket::sensors::{MotorProfile, PhysicalSensors, Sensors, SimulatedSensors};
use apex_rocket::transmitter::Transmitter;
use apex_rocket::ui::Button;

#[derive(Parser)]
#[command(about = "Airbrake flight computer")]
struct Args {
    /// Path to the flight configuration file.
    config: PathBuf,

    /// Run against the built-in flight simulation instead of hardware.
    #[arg(long)]
    simulate: bool,

    /// Serial port for the telemetry downlink.
    #[arg(long, default_value = "/dev/serial0")]
    port: String,

    /// Sysfs PWM channel directory for the airbrake servo.
    #[arg(long, default_value = "/sys/class/pwm/pwmchip0/pwm0")]
    pwm: String,

    /// GPIO value file for the abort button; omit to fly without one.
    #[arg(long)]
    button: Option<PathBuf>,

    /// Directory for telemetry logs.
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = FlightConfig::load(&args.config)
        .with_context(|| format!("rejecting flight configuration {:?}", args.config))?;
    let config_echo = format!("{config:#?}");
    info!("configuration loaded:\n{config_echo}");

    let mut sensors = if args.simulate {
        info!("running in SIMULATION");
        Sensors::Simulated(SimulatedSensors::new(
            &config,
            MotorProfile {
                launch_delay_seconds: 5.0,
                burn_seconds: 1.0,
                thrust_accel_mps2: 90.0,
            },
            0.3,
            0.2,
            rand::random(),
        ))
    } else {
        info!("running in FLIGHT mode");
        Sensors::Physical(PhysicalSensors::connect()?)
    };

    let servo = if args.simulate {
        None
    } else {
        match SysfsServo::attach(&args.pwm) {
            Ok(servo) => Some(servo),
            Err(e) => {
                warn!("airbrake servo unavailable at {}: {e}", args.pwm);
                None
            }
        }
    };
    let mut brake = Airbrake::new(config.airbrakes_enabled, servo);
    brake.test_sweep();

    let transmitter = match Transmitter::open(&args.port, 9600) {
        Ok(transmitter) => Some(transmitter),
        Err(e) => {
            warn!("telemetry downlink unavailable on {}: {e}", args.port);
            None
        }
    };

    let button = args.button.map(Button::gpio).unwrap_or(Button::Disconnected);

    sensors.calibrate();

    let logger = FlightLogger::create(&args.log_dir, &config_echo)?;
    let mut context = Context::new(config, brake, Some(logger), transmitter);
    context.arm();

    let start = Instant::now();
    let period = Duration::from_secs_f64(CYCLE_PERIOD_SECONDS);
    let mut last: Option<f64> = None;

    loop {
        let cycle_start = Instant::now();
        let now = start.elapsed().as_secs_f64();
        let dt = match last {
            Some(last) => now - last,
            None => CYCLE_PERIOD_SECONDS,
        };
        last = Some(now);

        let sample = sensors.read(dt);
        context.update(&sample, now, dt, button.pressed())?;
        if context.is_finished() {
            break;
        }
        sensors.set_deployment(context.brake_deployment());

        // Overruns turn directly into control phase lag; report them
        // instead of silently absorbing the slip.
        let busy = cycle_start.elapsed();
        if busy >= period {
            warn!(
                "control cycle overran: {:.1} ms (budget {:.1} ms)",
                busy.as_secs_f64() * 1e3,
                CYCLE_PERIOD_SECONDS * 1e3,
            );
        } else {
            thread::sleep(period - busy);
        }
    }

    info!(
        "flight ended: apogee {:.1} m at {:.1} s",
        context.apogee_meters(),
        context.apogee_seconds()
    );
    Ok(())
}

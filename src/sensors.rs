//! Sensor boundary. The control core consumes one `SensorSample` per
//! cycle: calibrated altitude AGL and gravity-corrected vertical
//! acceleration in the earth frame. The physical variant wires the BMP280
//! altimeter and BNO055 IMU; the simulated variant integrates a simple
//! thrust/drag model and is used on the bench and in tests.

use log::{info, warn};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use thiserror::Error;

use crate::config::FlightConfig;
use crate::constants::GRAVITY;

#[derive(Debug, Clone, Copy)]
pub struct SensorSample {
    /// Meters above the calibrated ground reference.
    pub altitude_agl: f64,
    /// Kinematic vertical acceleration, earth frame, m/s^2. Zero at rest.
    pub vertical_accel: f64,
    /// Degrees Celsius, for telemetry only.
    pub temperature: f64,
}

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("failed to open I2C bus: {0}")]
    I2c(String),
    #[error("IMU initialization failed: {0}")]
    Imu(String),
}

pub enum Sensors {
    Physical(PhysicalSensors),
    Simulated(SimulatedSensors),
}

impl Sensors {
    /// One sample per control cycle. `dt` advances the simulated physics
    /// and is ignored by real hardware.
    pub fn read(&mut self, dt: f64) -> SensorSample {
        match self {
            Sensors::Physical(sensors) => sensors.read(),
            Sensors::Simulated(sensors) => sensors.read(dt),
        }
    }

    /// Establishes the ground reference before arming.
    pub fn calibrate(&mut self) {
        if let Sensors::Physical(sensors) = self {
            sensors.calibrate();
        }
    }

    /// Feeds the commanded brake position back into the simulated drag
    /// model. Physical hardware feels the real thing.
    pub fn set_deployment(&mut self, deployment: f64) {
        if let Sensors::Simulated(sensors) = self {
            sensors.set_deployment(deployment);
        }
    }
}

pub struct PhysicalSensors {
    bmp280: bmp280::Bmp280,
    bno055: bno055::Bno055<linux_embedded_hal::I2cdev>,
    altitude_offset: f64,
    last: SensorSample,
}

impl PhysicalSensors {
    pub fn connect() -> Result<Self, SensorError> {
        // I2C read/write errors happen on a cold bus; keep trying.
        let mut bmp280 = loop {
            match bmp280::Bmp280Builder::new().build() {
                Ok(dev) => break dev,
                Err(_) => {
                    warn!("waiting for BMP280 to be ready...");
                    std::thread::sleep(std::time::Duration::from_secs(1));
                }
            }
        };
        bmp280
            .zero()
            .map_err(|e| SensorError::I2c(format!("{e:?}")))?;
        info!("BMP280 initialized");

        let i2c = linux_embedded_hal::I2cdev::new("/dev/i2c-1")
            .map_err(|e| SensorError::I2c(format!("{e:?}")))?;
        let mut delay = linux_embedded_hal::Delay;
        let mut bno = bno055::Bno055::new(i2c);
        bno.init(&mut delay)
            .map_err(|e| SensorError::Imu(format!("{e:?}")))?;
        bno.set_mode(bno055::BNO055OperationMode::NDOF, &mut delay)
            .map_err(|e| SensorError::Imu(format!("{e:?}")))?;
        info!("BNO055 initialized");

        Ok(PhysicalSensors {
            bmp280,
            bno055: bno,
            altitude_offset: 0.0,
            last: SensorSample {
                altitude_agl: 0.0,
                vertical_accel: 0.0,
                temperature: 20.0,
            },
        })
    }

    /// Averages a burst of altimeter readings at rest to establish the
    /// ground reference.
    pub fn calibrate(&mut self) {
        const CALIBRATION_POINTS: usize = 100;
        info!("calibrating ground altitude ({CALIBRATION_POINTS} points)");
        self.altitude_offset = 0.0;
        let mut sum = 0.0;
        let mut count = 0usize;
        for _ in 0..CALIBRATION_POINTS {
            if let Ok(altitude) = self.bmp280.altitude_m() {
                sum += f64::from(altitude);
                count += 1;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        if count > 0 {
            self.altitude_offset = sum / count as f64;
        }
        info!("ground reference: {:.2} m", self.altitude_offset);
    }

    /// Reads all sensors; on a transient read failure the previous value
    /// is kept so one bad bus transaction cannot kick the estimator.
    pub fn read(&mut self) -> SensorSample {
        if let Ok(altitude) = self.bmp280.altitude_m() {
            self.last.altitude_agl = f64::from(altitude) - self.altitude_offset;
        } else {
            warn!("failed to read altitude from BMP280");
        }
        if let Ok(temperature) = self.bmp280.temperature_celsius() {
            self.last.temperature = f64::from(temperature);
        }

        // The BNO055 reports gravity-free linear acceleration in the body
        // frame; rotate it into the earth frame with the fused attitude
        // quaternion and keep the vertical component.
        match (self.bno055.quaternion(), self.bno055.linear_acceleration()) {
            (Ok(quat), Ok(accel)) => {
                self.last.vertical_accel = vertical_component(
                    [
                        f64::from(quat.s),
                        f64::from(quat.v.x),
                        f64::from(quat.v.y),
                        f64::from(quat.v.z),
                    ],
                    [f64::from(accel.x), f64::from(accel.y), f64::from(accel.z)],
                );
            }
            _ => warn!("failed to read acceleration from BNO055"),
        }

        self.last
    }
}

/// Vertical (earth z) component of a body-frame vector rotated by the
/// attitude quaternion [w, x, y, z].
fn vertical_component(q: [f64; 4], a: [f64; 3]) -> f64 {
    let [w, x, y, z] = q;
    let [ax, ay, az] = a;

    // t = 2 * (q.v x a); rotated = a + w * t + q.v x t
    let tx = 2.0 * (y * az - z * ay);
    let ty = 2.0 * (z * ax - x * az);
    let tz = 2.0 * (x * ay - y * ax);
    az + w * tz + (x * ty - y * tx)
}

/// Motor characterization for the simulated variant.
#[derive(Debug, Clone, Copy)]
pub struct MotorProfile {
    /// Pad time before ignition.
    pub launch_delay_seconds: f64,
    pub burn_seconds: f64,
    /// Net thrust acceleration during the burn (before gravity and drag).
    pub thrust_accel_mps2: f64,
}

pub struct SimulatedSensors {
    time: f64,
    altitude: f64,
    velocity: f64,
    accel: f64,
    deployment: f64,

    profile: MotorProfile,
    mass: f64,
    air_density: f64,
    area: f64,
    rocket_cd: f64,
    airbrake_cd: f64,

    altitude_noise: Normal<f64>,
    accel_noise: Normal<f64>,
    rng: StdRng,
}

impl SimulatedSensors {
    pub fn new(
        config: &FlightConfig,
        profile: MotorProfile,
        altitude_noise_std: f64,
        accel_noise_std: f64,
        seed: u64,
    ) -> Self {
        SimulatedSensors {
            time: 0.0,
            altitude: 0.0,
            velocity: 0.0,
            accel: 0.0,
            deployment: 0.0,
            profile,
            mass: config.burnout_mass_kg,
            air_density: config.air_density_kg_per_m3,
            area: config.rocket_area_m2,
            rocket_cd: config.rocket_cd,
            airbrake_cd: config.airbrake_cd_full_deployment,
            altitude_noise: Normal::new(0.0, altitude_noise_std.max(0.0)).unwrap(),
            accel_noise: Normal::new(0.0, accel_noise_std.max(0.0)).unwrap(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn set_deployment(&mut self, deployment: f64) {
        self.deployment = deployment.clamp(0.0, 1.0);
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Advances the truth model by `dt` and returns a noisy measurement.
    pub fn read(&mut self, dt: f64) -> SensorSample {
        self.step(dt);
        SensorSample {
            altitude_agl: self.altitude + self.altitude_noise.sample(&mut self.rng),
            vertical_accel: self.accel + self.accel_noise.sample(&mut self.rng),
            temperature: 20.0,
        }
    }

    fn step(&mut self, dt: f64) {
        self.time += dt;

        let ignition = self.profile.launch_delay_seconds;
        let burnout = ignition + self.profile.burn_seconds;

        let cd = self.rocket_cd + self.deployment * self.airbrake_cd;
        let k = 0.5 * cd * self.area * self.air_density;
        let drag = (k / self.mass) * self.velocity * self.velocity * self.velocity.signum();

        let thrust = if self.time >= ignition && self.time < burnout {
            self.profile.thrust_accel_mps2
        } else {
            0.0
        };

        let on_ground = self.altitude <= 0.0 && thrust <= GRAVITY;
        self.accel = if on_ground {
            0.0
        } else {
            thrust - GRAVITY - drag
        };

        self.velocity += self.accel * dt;
        self.altitude += self.velocity * dt;
        if self.altitude < 0.0 {
            self.altitude = 0.0;
            self.velocity = 0.0;
        }
    }
}

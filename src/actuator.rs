//! Airbrake actuation boundary. The control core only ever hands this a
//! deployment fraction in [0, 1]; pulse-width mapping and the sysfs PWM
//! plumbing stay on this side of the line.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use log::{info, warn};

/// 50 Hz servo frame.
const PWM_PERIOD_NS: u64 = 20_000_000;
/// Pulse width at zero deployment.
const MIN_PULSE_NS: u64 = 1_000_000;
/// Pulse width at full deployment.
const MAX_PULSE_NS: u64 = 2_000_000;

pub struct Airbrake {
    deployment: f64,
    enabled: bool,
    servo: Option<SysfsServo>,
}

impl Airbrake {
    pub fn new(enabled: bool, servo: Option<SysfsServo>) -> Self {
        Airbrake {
            deployment: 0.0,
            enabled,
            servo,
        }
    }

    /// Brake with no physical backend; commands are tracked but go nowhere.
    pub fn disconnected() -> Self {
        Airbrake::new(false, None)
    }

    /// Clamps to [0, 1], records the value, and drives the servo when the
    /// brake is enabled.
    pub fn set_deployment(&mut self, value: f64) {
        let value = value.clamp(0.0, 1.0);
        self.deployment = value;
        if !self.enabled {
            return;
        }
        if let Some(servo) = &self.servo {
            if let Err(e) = servo.write_deployment(value) {
                warn!("airbrake servo write failed: {e}");
            }
        }
    }

    pub fn close(&mut self) {
        self.set_deployment(0.0);
    }

    pub fn open(&mut self) {
        self.set_deployment(1.0);
    }

    pub fn deployment(&self) -> f64 {
        self.deployment
    }

    /// Pre-flight sweep: a slow half-sine pass, then a full snap open and
    /// closed. Confirms the linkage moves freely before arming.
    pub fn test_sweep(&mut self) {
        if self.servo.is_none() || !self.enabled {
            info!("airbrake test skipped (no servo attached or brakes disabled)");
            return;
        }
        info!("airbrake test sweep");
        let steps = 500;
        for i in 0..=steps {
            let angle = std::f64::consts::PI * i as f64 / steps as f64;
            self.set_deployment(angle.sin());
            thread::sleep(Duration::from_millis(10));
        }
        thread::sleep(Duration::from_secs(1));
        self.open();
        thread::sleep(Duration::from_secs(1));
        self.close();
    }
}

/// Servo on a Linux sysfs PWM channel.
pub struct SysfsServo {
    duty_path: PathBuf,
}

impl SysfsServo {
    /// Attaches to an already-exported channel, programs the servo frame,
    /// and enables output.
    pub fn attach(channel_dir: &str) -> io::Result<Self> {
        let dir = PathBuf::from(channel_dir);
        fs::write(dir.join("period"), PWM_PERIOD_NS.to_string())?;
        let servo = SysfsServo {
            duty_path: dir.join("duty_cycle"),
        };
        servo.write_deployment(0.0)?;
        fs::write(dir.join("enable"), "1")?;
        Ok(servo)
    }

    fn write_deployment(&self, deployment: f64) -> io::Result<()> {
        let pulse =
            MIN_PULSE_NS + ((MAX_PULSE_NS - MIN_PULSE_NS) as f64 * deployment).round() as u64;
        fs::write(&self.duty_path, pulse.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_clamped() {
        let mut brake = Airbrake::disconnected();
        brake.set_deployment(1.7);
        assert_eq!(brake.deployment(), 1.0);
        brake.set_deployment(-0.2);
        assert_eq!(brake.deployment(), 0.0);
        brake.set_deployment(0.4);
        assert_eq!(brake.deployment(), 0.4);
    }

    #[test]
    fn open_and_close_hit_the_rails() {
        let mut brake = Airbrake::disconnected();
        brake.open();
        assert_eq!(brake.deployment(), 1.0);
        brake.close();
        assert_eq!(brake.deployment(), 0.0);
    }
}

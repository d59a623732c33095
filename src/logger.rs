//! CSV telemetry logging. One named-column row per control cycle, with the
//! parsed configuration echoed into the file header before the column
//! names so every log is self-describing.

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::sensors::SensorSample;

/// Everything a single telemetry row carries. Values are handed over as
/// named columns; the names are written once, in `write_header`.
pub struct TelemetryRow {
    pub time_seconds: f64,
    pub phase: char,
    pub raw_altitude: f64,
    pub raw_accel: f64,
    pub est_altitude: f64,
    pub est_velocity: f64,
    pub est_accel: f64,
    pub commanded_deployment: f64,
    pub brake_deployment: f64,
    pub apogee: f64,
    pub temperature: f64,
}

impl TelemetryRow {
    pub fn new(
        time_seconds: f64,
        phase: char,
        sample: &SensorSample,
        est: (f64, f64, f64),
        commanded_deployment: f64,
        brake_deployment: f64,
        apogee: f64,
    ) -> Self {
        TelemetryRow {
            time_seconds,
            phase,
            raw_altitude: sample.altitude_agl,
            raw_accel: sample.vertical_accel,
            est_altitude: est.0,
            est_velocity: est.1,
            est_accel: est.2,
            commanded_deployment,
            brake_deployment,
            apogee,
            temperature: sample.temperature,
        }
    }
}

/// Summary written when the flight ends or is aborted.
pub struct FlightSummary {
    pub apogee_meters: f64,
    pub apogee_seconds: f64,
    pub launch_seconds: Option<f64>,
    pub touchdown_seconds: Option<f64>,
    pub final_phase: &'static str,
}

pub struct FlightLogger {
    writer: BufWriter<fs::File>,
}

impl FlightLogger {
    /// Opens `<dir>/<timestamp>.csv`, writes the config echo preamble and
    /// the header row.
    pub fn create(dir: &Path, config_echo: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let file_path = dir.join(format!(
            "{}.csv",
            chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S")
        ));

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(file_path)?;

        let mut logger = FlightLogger {
            writer: BufWriter::new(file),
        };
        logger.write_preamble(config_echo)?;
        logger.write_header()?;
        Ok(logger)
    }

    fn write_preamble(&mut self, config_echo: &str) -> io::Result<()> {
        for line in config_echo.lines() {
            writeln!(self.writer, "# {line}")?;
        }
        Ok(())
    }

    fn write_header(&mut self) -> io::Result<()> {
        writeln!(
            self.writer,
            "time_s,phase,raw_altitude_m,raw_accel_mps2,est_altitude_m,est_velocity_mps,est_accel_mps2,commanded_deployment,brake_deployment,apogee_m,temperature_c"
        )
    }

    pub fn log_row(&mut self, row: &TelemetryRow) {
        if let Err(e) = writeln!(
            self.writer,
            "{:.3},{},{:.3},{:.3},{:.3},{:.3},{:.3},{:.4},{:.4},{:.3},{:.1}",
            row.time_seconds,
            row.phase,
            row.raw_altitude,
            row.raw_accel,
            row.est_altitude,
            row.est_velocity,
            row.est_accel,
            row.commanded_deployment,
            row.brake_deployment,
            row.apogee,
            row.temperature,
        ) {
            log::error!("failed to write telemetry row: {e}");
        }
    }

    pub fn log_summary(&mut self, summary: &FlightSummary) {
        let launch = summary
            .launch_seconds
            .map_or("n/a".to_string(), |t| format!("{t:.3}"));
        let touchdown = summary
            .touchdown_seconds
            .map_or("n/a".to_string(), |t| format!("{t:.3}"));
        if let Err(e) = writeln!(
            self.writer,
            "# summary: apogee_m={:.2} apogee_s={:.3} launch_s={} touchdown_s={} final_phase={}",
            summary.apogee_meters, summary.apogee_seconds, launch, touchdown, summary.final_phase,
        ) {
            log::error!("failed to write flight summary: {e}");
        }
    }

    pub fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            log::error!("failed to flush telemetry log: {e}");
        }
    }
}

impl Drop for FlightLogger {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

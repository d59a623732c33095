//! Serial telemetry downlink. Packets go out at a fixed sub-rate of the
//! control loop, and continuously once landed so the rocket can be found.

use std::io::Write;

use log::warn;
use serialport::TTYPort;

pub struct DownlinkPacket {
    pub phase_name: &'static str,
    pub altitude: f64,
    pub velocity: f64,
    pub acceleration: f64,
    pub deployment: f64,
    pub apogee: f64,
}

pub struct Transmitter {
    port: TTYPort,
}

impl Transmitter {
    pub fn open(path: &str, baud: u32) -> serialport::Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(std::time::Duration::from_millis(1000))
            .open_native()?;
        Ok(Transmitter { port })
    }

    /// Best effort: a dropped packet is not worth disturbing the control
    /// loop over.
    pub fn transmit(&mut self, packet: &DownlinkPacket) {
        let output = format!(
            "{},{:.1},{:.1},{:.1},{:.3},{:.1}\n",
            packet.phase_name,
            packet.altitude,
            packet.velocity,
            packet.acceleration,
            packet.deployment,
            packet.apogee,
        );
        if self.port.write_all(output.as_bytes()).is_err() {
            warn!("failed to write downlink packet to serial port");
        }
    }
}

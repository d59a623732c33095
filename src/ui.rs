//! Minimal user-interface boundary: the abort/advance button, sampled once
//! per control cycle. Tones and indicator LEDs belong to the ground-side
//! tooling, not the flight loop.

use std::fs;
use std::path::PathBuf;

pub enum Button {
    /// A GPIO value file (e.g. /sys/class/gpio/gpio17/value), high when
    /// pressed.
    Gpio { value_path: PathBuf },
    /// No button wired; never reads as pressed.
    Disconnected,
}

impl Button {
    pub fn gpio(value_path: impl Into<PathBuf>) -> Self {
        Button::Gpio {
            value_path: value_path.into(),
        }
    }

    /// One non-blocking sample. Read failures count as not pressed so a
    /// flaky pin cannot abort a flight.
    pub fn pressed(&self) -> bool {
        match self {
            Button::Gpio { value_path } => fs::read_to_string(value_path)
                .map(|raw| raw.trim() == "1")
                .unwrap_or(false),
            Button::Disconnected => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnected_button_is_never_pressed() {
        assert!(!Button::Disconnected.pressed());
    }

    #[test]
    fn missing_gpio_file_reads_unpressed() {
        let button = Button::gpio("/nonexistent/gpio/value");
        assert!(!button.pressed());
    }
}

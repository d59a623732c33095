//! Flight phases and the data each carries. Transitions are forward-only;
//! no phase is ever revisited. The transition decisions themselves live in
//! `Context::update`, which owns the one mutable reference per cycle.

use fixed_deque::Deque;

use crate::constants::{LANDED_QUIET_SAMPLES, LANDED_SPEED_METERS_PER_SECOND};
use crate::rate_limiter::RateLimiter;

pub enum FlightPhase {
    /// Pre-flight. Running the control cycle in this phase is a logic bug.
    Setup,
    /// Armed, watching for the launch acceleration spike.
    Idle,
    /// Powered ascent; brakes locked shut.
    Burning(BurningPhase),
    /// Unpowered ascent under closed-loop apogee control.
    Coasting(CoastingPhase),
    /// Descent; brakes retracted, log flushed every cycle.
    Recovery(RecoveryPhase),
    /// Terminal. Passive telemetry broadcast only.
    Landed(LandedPhase),
}

pub struct BurningPhase {
    pub ignition_seconds: f64,
}

pub struct CoastingPhase {
    /// Slew limiter for the brake command; seeded at zero on coast entry
    /// and owned by the phase so it cannot outlive it.
    pub limiter: RateLimiter,
}

pub struct RecoveryPhase {
    quiet: Deque<f64>,
}

pub struct LandedPhase {
    pub touchdown_seconds: f64,
}

impl FlightPhase {
    pub fn name(&self) -> &'static str {
        match self {
            FlightPhase::Setup => "Setup",
            FlightPhase::Idle => "Idle",
            FlightPhase::Burning(_) => "Burning",
            FlightPhase::Coasting(_) => "Coasting",
            FlightPhase::Recovery(_) => "Recovery",
            FlightPhase::Landed(_) => "Landed",
        }
    }

    /// Single character used in telemetry rows.
    pub fn letter(&self) -> char {
        match self {
            FlightPhase::Setup => 'S',
            FlightPhase::Idle => 'I',
            FlightPhase::Burning(_) => 'B',
            FlightPhase::Coasting(_) => 'C',
            FlightPhase::Recovery(_) => 'R',
            FlightPhase::Landed(_) => 'L',
        }
    }
}

impl BurningPhase {
    /// True once the configured lockout has elapsed since ignition; the
    /// motor is assumed burned out and coast control may begin.
    pub fn burned_out(&self, now_seconds: f64, lockout_seconds: f64) -> bool {
        now_seconds - self.ignition_seconds >= lockout_seconds
    }
}

impl RecoveryPhase {
    pub fn new() -> Self {
        RecoveryPhase {
            quiet: Deque::new(LANDED_QUIET_SAMPLES),
        }
    }

    /// Feeds one velocity estimate; returns true once a full window of
    /// consecutive samples is below the landed threshold, so a single
    /// quiet estimate mid-descent cannot declare touchdown.
    pub fn check_landed(&mut self, velocity: f64) -> bool {
        if velocity.abs() < LANDED_SPEED_METERS_PER_SECOND {
            self.quiet.push_back(velocity);
        } else {
            self.quiet.clear();
        }
        self.quiet.len() == LANDED_QUIET_SAMPLES
    }
}

impl Default for RecoveryPhase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burnout_waits_for_lockout() {
        let burning = BurningPhase { ignition_seconds: 10.0 };
        assert!(!burning.burned_out(10.0, 1.5));
        assert!(!burning.burned_out(11.4, 1.5));
        assert!(burning.burned_out(11.5, 1.5));
    }

    #[test]
    fn landed_requires_full_quiet_window() {
        let mut recovery = RecoveryPhase::new();
        for _ in 0..LANDED_QUIET_SAMPLES - 1 {
            assert!(!recovery.check_landed(0.02));
        }
        assert!(recovery.check_landed(-0.05));
    }

    #[test]
    fn descent_sample_restarts_quiet_window() {
        let mut recovery = RecoveryPhase::new();
        for _ in 0..LANDED_QUIET_SAMPLES - 1 {
            recovery.check_landed(0.0);
        }
        // Still moving: everything accumulated so far is discarded.
        assert!(!recovery.check_landed(-4.0));
        for _ in 0..LANDED_QUIET_SAMPLES - 1 {
            assert!(!recovery.check_landed(0.0));
        }
        assert!(recovery.check_landed(0.0));
    }

    #[test]
    fn phase_letters_are_unique() {
        let phases = [
            FlightPhase::Setup,
            FlightPhase::Idle,
            FlightPhase::Burning(BurningPhase { ignition_seconds: 0.0 }),
            FlightPhase::Coasting(CoastingPhase {
                limiter: RateLimiter::new(0.0, 1.0, 0.0),
            }),
            FlightPhase::Recovery(RecoveryPhase::new()),
            FlightPhase::Landed(LandedPhase { touchdown_seconds: 0.0 }),
        ];
        let mut letters: Vec<char> = phases.iter().map(|p| p.letter()).collect();
        letters.sort_unstable();
        letters.dedup();
        assert_eq!(letters.len(), phases.len());
    }
}

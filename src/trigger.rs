//! Hold-to-activate trigger. Polled once per control cycle; fires only when
//! the input has been continuously asserted for the hold duration.

pub struct HoldTrigger {
    hold_seconds: f64,
    pressed_since: Option<f64>,
}

impl HoldTrigger {
    pub fn new(hold_seconds: f64) -> Self {
        HoldTrigger {
            hold_seconds,
            pressed_since: None,
        }
    }

    /// Returns true once `pressed` has been held for the full duration.
    pub fn held(&mut self, pressed: bool, now_seconds: f64) -> bool {
        if !pressed {
            self.pressed_since = None;
            return false;
        }
        match self.pressed_since {
            None => {
                self.pressed_since = Some(now_seconds);
                false
            }
            Some(start) => now_seconds - start >= self.hold_seconds,
        }
    }

    /// Clears the press state so the trigger can be reused.
    pub fn reset(&mut self) {
        self.pressed_since = None;
    }
}

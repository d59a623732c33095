//! Bounds how fast a commanded value may change, against wall-clock time
//! rather than a cycle count, so jitter in the loop period cannot speed up
//! the airbrake.

pub struct RateLimiter {
    current: f64,
    max_rate_per_second: f64,
    last_seconds: f64,
}

impl RateLimiter {
    /// Seeds the limiter. `now_seconds` is the caller's monotonic elapsed
    /// time; the first `get` after construction sees the elapsed time since
    /// this call.
    pub fn new(initial: f64, max_rate_per_second: f64, now_seconds: f64) -> Self {
        RateLimiter {
            current: initial,
            max_rate_per_second,
            last_seconds: now_seconds,
        }
    }

    /// Moves the held value toward `requested` by at most
    /// elapsed * max_rate and returns it. The output only advances when
    /// called again, so the airbrake stops moving if control stops
    /// commanding it.
    pub fn get(&mut self, requested: f64, now_seconds: f64) -> f64 {
        let elapsed = (now_seconds - self.last_seconds).max(0.0);
        self.last_seconds = now_seconds;

        let max_delta = elapsed * self.max_rate_per_second;
        let delta = (requested - self.current).clamp(-max_delta, max_delta);

        self.current += delta;
        self.current
    }

    pub fn current(&self) -> f64 {
        self.current
    }
}

use std::{fmt::Display, thread, time::Duration};

/// Repeats a fallible action a bounded number of times, pausing between tries.
#[derive(Debug, Clone, Copy, SmartDefault)]
pub struct Retry {
    /// Total number of tries, including the first.
    #[default = 3]
    attempts: u32,
    /// Pause between tries, in milliseconds.
    #[default = 1000]
    interval: u64,
}

impl Retry {
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }

    pub fn retry_until_ok<F, T, E>(&self, what: &str, mut func: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Display,
    {
        let duration = Duration::from_millis(self.interval);
        let mut attempt = 1;
        loop {
            match func() {
                Ok(value) => return Ok(value),
                Err(why) => {
                    if attempt >= self.attempts {
                        return Err(why);
                    }

                    warn!("{} failed (attempt {} of {}): {}", what, attempt, self.attempts, why);
                    attempt += 1;
                    thread::sleep(duration);
                }
            }
        }
    }
}

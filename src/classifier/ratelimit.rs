use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-provider request throttle.
///
/// Holds a mutex across the whole call, so at most one request per provider
/// is in flight and consecutive requests are spaced at least
/// `1000 / requests_per_second` ms apart. MusicBrainz in particular bans
/// clients that exceed one request per second.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let rps = if requests_per_second > 0.0 {
            requests_per_second
        } else {
            1.0
        };
        Self {
            min_interval: Duration::from_secs_f64(1.0 / rps),
            last_request: Mutex::new(None),
        }
    }

    /// Run `f` under the throttle, sleeping first if the previous request
    /// was too recent.
    pub fn throttle<T>(&self, f: impl FnOnce() -> T) -> T {
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());

        // Lock stays held through the call: one in-flight request.
        f()
    }
}

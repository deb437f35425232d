//! Rolling-window rate limiter guarding synchronous provider submissions.
//!
//! [`Throttler::calculate_delay`] both measures and — when the window has
//! room — records the request in the same call; it only returns a
//! nonzero delay when the window is full, in which case it does *not*
//! record anything. Callers sleep for the returned delay and then call
//! [`Throttler::record_request`] themselves to mark the submission that
//! actually happened after the wait.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct ThrottlerConfig {
    pub max_requests_per_window: Option<u32>,
    pub window_seconds: f64,
    pub current_request_count: usize,
    pub enabled: bool,
}

struct State {
    timestamps: VecDeque<Instant>,
}

pub struct Throttler {
    max_requests_per_window: Option<u32>,
    window: Duration,
    state: Mutex<State>,
}

impl Throttler {
    pub fn new(max_requests_per_window: Option<u32>, window_seconds: f64) -> Self {
        Throttler {
            max_requests_per_window,
            window: Duration::from_secs_f64(window_seconds),
            state: Mutex::new(State {
                timestamps: VecDeque::new(),
            }),
        }
    }

    /// A disabled throttler (`limit = None`) that never delays.
    pub fn disabled() -> Self {
        Throttler::new(None, 60.0)
    }

    fn evict_expired(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Returns the delay the caller must sleep before submitting. Zero
    /// means "go now" — and, when the window had room, this call already
    /// recorded the submission; the caller must not call
    /// [`Throttler::record_request`] in that case.
    pub fn calculate_delay(&self) -> Duration {
        let Some(limit) = self.max_requests_per_window else {
            return Duration::ZERO;
        };
        let now = Instant::now();
        let mut state = self.state.lock().expect("throttler mutex poisoned");
        Self::evict_expired(&mut state.timestamps, now, self.window);

        if state.timestamps.len() < limit as usize {
            state.timestamps.push_back(now);
            return Duration::ZERO;
        }

        let oldest = *state.timestamps.front().expect("len >= limit > 0 implies nonempty");
        let elapsed = now.duration_since(oldest);
        self.window.saturating_sub(elapsed)
    }

    /// Records a submission at `timestamp` (default: now). Call this only
    /// after sleeping for a nonzero delay from [`Throttler::calculate_delay`].
    pub fn record_request(&self, timestamp: Option<Instant>) {
        let ts = timestamp.unwrap_or_else(Instant::now);
        let mut state = self.state.lock().expect("throttler mutex poisoned");
        Self::evict_expired(&mut state.timestamps, ts, self.window);
        state.timestamps.push_back(ts);
    }

    pub fn is_enabled(&self) -> bool {
        self.max_requests_per_window.is_some()
    }

    pub fn current_request_count(&self) -> usize {
        if !self.is_enabled() {
            return 0;
        }
        let now = Instant::now();
        let mut state = self.state.lock().expect("throttler mutex poisoned");
        Self::evict_expired(&mut state.timestamps, now, self.window);
        state.timestamps.len()
    }

    pub fn config(&self) -> ThrottlerConfig {
        let state = self.state.lock().expect("throttler mutex poisoned");
        ThrottlerConfig {
            max_requests_per_window: self.max_requests_per_window,
            window_seconds: self.window.as_secs_f64(),
            current_request_count: state.timestamps.len(),
            enabled: self.max_requests_per_window.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn disabled_never_delays() {
        let t = Throttler::disabled();
        for _ in 0..10 {
            assert_eq!(t.calculate_delay(), Duration::ZERO);
        }
    }

    #[test]
    fn allows_up_to_limit_then_delays() {
        let t = Throttler::new(Some(2), 10.0);
        assert_eq!(t.calculate_delay(), Duration::ZERO);
        assert_eq!(t.calculate_delay(), Duration::ZERO);
        let delay = t.calculate_delay();
        assert!(delay > Duration::ZERO && delay <= Duration::from_secs(10));
    }

    #[test]
    fn window_frees_up_after_expiry() {
        let t = Throttler::new(Some(1), 0.05);
        assert_eq!(t.calculate_delay(), Duration::ZERO);
        sleep(Duration::from_millis(80));
        assert_eq!(t.calculate_delay(), Duration::ZERO);
    }

    #[test]
    fn current_count_reflects_window() {
        let t = Throttler::new(Some(5), 10.0);
        assert_eq!(t.current_request_count(), 0);
        t.calculate_delay();
        assert_eq!(t.current_request_count(), 1);
    }
}

use std::time::Duration;

use metrics::gauge;
use tokio::{
    sync::Mutex,
    time::{sleep, Instant},
};

/// Token bucket shared by every worker that calls a rate limited service.
///
/// The bucket starts full with `burst` tokens and regains one token per
/// `interval`. A zero interval disables throttling.
pub struct Throttle {
    state: Mutex<BucketState>,
    capacity: f64,
    interval: Duration,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl Throttle {
    pub fn new(burst: u32, interval: Duration) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            interval,
        }
    }

    /// Waits until a token is available, consumes it and returns the time spent waiting.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        if self.interval.is_zero() {
            return Duration::ZERO;
        }

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    Some(self.interval.mul_f64(1.0 - state.tokens))
                }
            };

            match wait {
                None => break,
                Some(wait) => sleep(wait).await,
            }
        }

        let waited = started.elapsed();
        gauge!("throttle_wait_seconds").set(waited.as_secs_f64());
        waited
    }

    /// Consumes a token without waiting; returns `false` when the bucket is empty.
    pub async fn try_acquire(&self) -> bool {
        if self.interval.is_zero() {
            return true;
        }
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        let earned = elapsed.as_secs_f64() / self.interval.as_secs_f64();
        state.tokens = (state.tokens + earned).min(self.capacity);
        state.last_refill = now;
    }
}

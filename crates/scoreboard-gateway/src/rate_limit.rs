//! Per-client sliding-window rate limiting

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Independent counters; each client has one window per bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Register,
    Login,
    Verify,
    Default,
}

/// Keeps the timestamps of accepted requests inside the window.
///
/// A request is accepted while the client's window holds fewer than `max`
/// timestamps; rejected requests are not recorded.
pub struct RateLimiter {
    window: Duration,
    hits: DashMap<(Bucket, String), VecDeque<Instant>>,
}

impl RateLimiter {
    /// Prune idle clients once the map grows past this many keys
    const EVICTION_THRESHOLD: usize = 10_000;

    pub fn new(window: Duration) -> Self {
        Self {
            window,
            hits: DashMap::new(),
        }
    }

    /// Records the request and returns whether it is within `max`
    pub fn check(&self, bucket: Bucket, client: &str, max: u32) -> bool {
        let now = Instant::now();

        if self.hits.len() > Self::EVICTION_THRESHOLD {
            self.hits.retain(|_, stamps| {
                stamps
                    .back()
                    .is_some_and(|last| now.duration_since(*last) < self.window)
            });
        }

        let mut stamps = self
            .hits
            .entry((bucket, client.to_string()))
            .or_default();
        while let Some(oldest) = stamps.front() {
            if now.duration_since(*oldest) < self.window {
                break;
            }
            stamps.pop_front();
        }

        if stamps.len() >= max as usize {
            return false;
        }
        stamps.push_back(now);
        true
    }
}

//! Outbound gateway ratelimiting
//!
//! The gateway allows a fixed number of payload sends per window;
//! application-triggered sends block until the window frees up. Heartbeats
//! and handshake payloads bypass this limiter.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Default send budget: 110 payloads per 60 seconds
const DEFAULT_COUNT: u32 = 110;
const DEFAULT_PER: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Window {
    max: u32,
    remaining: u32,
    per: Duration,
    started: Option<Instant>,
}

impl Window {
    /// How long the caller must wait before sending; consumes one slot when
    /// no wait is needed.
    fn get_delay(&mut self, now: Instant) -> Duration {
        let expired = self
            .started
            .is_none_or(|started| now.duration_since(started) > self.per);

        if expired {
            self.remaining = self.max;
        }

        if self.remaining == self.max {
            self.started = Some(now);
        }

        if self.remaining == 0 {
            let started = self.started.unwrap_or(now);
            return self.per.saturating_sub(now.duration_since(started));
        }

        self.remaining -= 1;
        Duration::ZERO
    }
}

/// Per-shard send ratelimiter
#[derive(Debug)]
pub struct GatewayRatelimiter {
    shard_id: u32,
    window: Mutex<Window>,
}

impl GatewayRatelimiter {
    /// Create a limiter with the protocol's default budget
    #[must_use]
    pub fn new(shard_id: u32) -> Self {
        Self::with_budget(shard_id, DEFAULT_COUNT, DEFAULT_PER)
    }

    /// Create a limiter with a custom budget
    #[must_use]
    pub fn with_budget(shard_id: u32, count: u32, per: Duration) -> Self {
        Self {
            shard_id,
            window: Mutex::new(Window {
                max: count,
                remaining: count,
                per,
                started: None,
            }),
        }
    }

    /// Wait until a send slot is available
    pub async fn block(&self) {
        let retry_after = {
            let mut window = self.window.lock().await;
            window.get_delay(Instant::now())
        };

        if !retry_after.is_zero() {
            tracing::warn!(
                shard_id = self.shard_id,
                wait_secs = retry_after.as_secs_f64(),
                "Gateway send ratelimit hit, waiting"
            );
            tokio::time::sleep(retry_after).await;
            tracing::info!(shard_id = self.shard_id, "Gateway send ratelimit released");
        }
    }
}

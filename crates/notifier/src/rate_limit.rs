//! Fixed-window rate limiting for test sends.
//!
//! The Redis implementation uses `INCR` on a per-window key and sets `EXPIRE`
//! when the counter is created, so the key disappears with its window.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

use crate::error::NotifierError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window: Duration,
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request for `key`. Returns `false` once the window's quota is used up.
    async fn try_acquire(&self, key: &str) -> Result<bool, NotifierError>;

    fn settings(&self) -> RateLimitSettings;
}

pub struct RedisRateLimiter {
    redis: ConnectionManager,
    settings: RateLimitSettings,
}

impl RedisRateLimiter {
    pub fn new(redis: ConnectionManager, settings: RateLimitSettings) -> Self {
        Self { redis, settings }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn try_acquire(&self, key: &str) -> Result<bool, NotifierError> {
        let key = format!("test_send:rate:{key}");
        let mut conn = self.redis.clone();

        let count: u64 = conn.incr(&key, 1).await?;
        if count == 1 {
            let window_secs = self.settings.window.as_secs().max(1) as i64;
            conn.expire::<_, ()>(&key, window_secs).await?;
        }

        let allowed = count <= u64::from(self.settings.max_requests);
        if !allowed {
            tracing::debug!(key = %key, count, "Test send rate limit reached");
        }
        Ok(allowed)
    }

    fn settings(&self) -> RateLimitSettings {
        self.settings
    }
}

/// Process-local limiter with the same fixed-window semantics.
pub struct MemoryRateLimiter {
    windows: Mutex<HashMap<String, (Instant, u32)>>,
    settings: RateLimitSettings,
}

impl MemoryRateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            settings,
        }
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn try_acquire(&self, key: &str) -> Result<bool, NotifierError> {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let window = self.settings.window;
        // Drop keys whose window has closed so idle users do not accumulate.
        windows.retain(|_, (started, _)| now.duration_since(*started) < window);
        let entry = windows.entry(key.to_string()).or_insert((now, 0));
        entry.1 += 1;
        Ok(entry.1 <= self.settings.max_requests)
    }

    fn settings(&self) -> RateLimitSettings {
        self.settings
    }
}

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::{Script, aio::ConnectionManager};

use super::InfraError;
use crate::app_error::{AppError, AppResult};

/// Trait for rate limiting implementations.
#[async_trait]
pub trait RateLimiterTrait: Send + Sync {
    /// Count one request against `key`.
    /// Returns `Ok(false)` once `max_requests` have been seen within the current window.
    async fn allow(&self, key: &str, max_requests: u64, window_ms: u64) -> AppResult<bool>;
}

// ============================================================================
// InMemoryRateLimiter
// ============================================================================

/// How often expired windows are dropped from the map.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Window {
    count: u64,
    reset_at: Instant,
}

struct Windows {
    entries: HashMap<String, Window>,
    last_sweep: Instant,
}

/// Fixed-window counters held in process memory.
///
/// Counters are per process, so this is only correct for a single instance.
pub struct InMemoryRateLimiter {
    windows: Mutex<Windows>,
    sweep_interval: Duration,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::with_sweep_interval(SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            windows: Mutex::new(Windows {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            sweep_interval,
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .map(|windows| windows.entries.len())
            .unwrap_or_default()
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiterTrait for InMemoryRateLimiter {
    async fn allow(&self, key: &str, max_requests: u64, window_ms: u64) -> AppResult<bool> {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| AppError::Internal("rate limiter lock poisoned".into()))?;

        if now.duration_since(windows.last_sweep) >= self.sweep_interval {
            windows.entries.retain(|_, w| w.reset_at > now);
            windows.last_sweep = now;
        }

        let window = windows
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Window {
                count: 0,
                reset_at: now + Duration::from_millis(window_ms),
            });
        if window.reset_at <= now {
            window.count = 0;
            window.reset_at = now + Duration::from_millis(window_ms);
        }

        if window.count >= max_requests {
            return Ok(false);
        }
        window.count += 1;
        Ok(true)
    }
}

// ============================================================================
// RedisRateLimiter
// ============================================================================

/// Lua script for atomic increment with a millisecond TTL.
/// Returns the new count after increment.
/// If the key exists but has no TTL (e.g. a crash between INCR and PEXPIRE), TTL is set.
const INCR_WITH_PTTL_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
elseif redis.call('PTTL', KEYS[1]) == -1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return current
"#;

/// Redis-backed rate limiter; counters are shared by every instance.
#[derive(Clone)]
pub struct RedisRateLimiter {
    manager: ConnectionManager,
    script: Script,
}

impl RedisRateLimiter {
    pub async fn new(redis_url: &str) -> Result<Self, InfraError> {
        let client = redis::Client::open(redis_url).map_err(InfraError::RedisConnection)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(InfraError::RedisConnection)?;
        Ok(Self {
            manager,
            script: Script::new(INCR_WITH_PTTL_SCRIPT),
        })
    }
}

#[async_trait]
impl RateLimiterTrait for RedisRateLimiter {
    async fn allow(&self, key: &str, max_requests: u64, window_ms: u64) -> AppResult<bool> {
        let mut conn = self.manager.clone();
        let current: u64 = self
            .script
            .key(format!("rate:{key}"))
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(current <= max_requests)
    }
}

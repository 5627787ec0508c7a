// core/common/src/rate_limit.rs
// Rate limiting with sliding window algorithm

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded: {0}")]
    LimitExceeded(String),
    #[error("No rate limit configured for {0}")]
    NoLimitConfigured(String),
}

#[derive(Debug, Clone)]
pub struct RateLimit {
    pub requests_per_window: u32,
    pub window: Duration,
}

impl RateLimit {
    pub fn new(requests_per_window: u32, window: Duration) -> Self {
        Self {
            requests_per_window,
            window,
        }
    }

    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }
}

#[derive(Debug, Clone, Default)]
struct RateLimitEntry {
    timestamps: Vec<Instant>,
}

impl RateLimitEntry {
    fn cleanup_old_requests(&mut self, now: Instant, window: Duration) {
        self.timestamps
            .retain(|ts| now.saturating_duration_since(*ts) < window);
    }
}

pub struct RateLimiter {
    limits: HashMap<String, RateLimit>,
    entries: Arc<RwLock<HashMap<String, RateLimitEntry>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            limits: HashMap::new(),
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn add_limit(&mut self, endpoint: impl Into<String>, limit: RateLimit) {
        self.limits.insert(endpoint.into(), limit);
    }

    pub fn has_limit(&self, endpoint: &str) -> bool {
        self.limits.contains_key(endpoint)
    }

    /// Check if a request is allowed for the given key (client address or phone)
    pub async fn check_rate_limit(
        &self,
        endpoint: &str,
        key: &str,
    ) -> Result<RateLimitInfo, RateLimitError> {
        let limit = self
            .limits
            .get(endpoint)
            .ok_or_else(|| RateLimitError::NoLimitConfigured(endpoint.to_string()))?;

        let now = Instant::now();
        let rate_key = format!("{}:{}", endpoint, key);

        let mut entries = self.entries.write().await;
        let entry = entries.entry(rate_key).or_default();

        entry.cleanup_old_requests(now, limit.window);

        let current_count = entry.timestamps.len();

        if current_count >= limit.requests_per_window as usize {
            let oldest = entry.timestamps.first().copied().unwrap_or(now);
            let retry_after = limit
                .window
                .saturating_sub(now.saturating_duration_since(oldest))
                .as_secs()
                .max(1);

            return Err(RateLimitError::LimitExceeded(format!(
                "Too many requests. Retry after {} seconds",
                retry_after
            )));
        }

        entry.timestamps.push(now);

        Ok(RateLimitInfo {
            limit: limit.requests_per_window,
            remaining: limit.requests_per_window - (current_count as u32 + 1),
            reset_after_secs: limit.window.as_secs(),
        })
    }

    /// Drop keys whose every request has left the longest configured window
    pub async fn cleanup_old_entries(&self) {
        let longest = self
            .limits
            .values()
            .map(|l| l.window)
            .max()
            .unwrap_or_default();
        let now = Instant::now();

        let mut entries = self.entries.write().await;
        for entry in entries.values_mut() {
            entry.cleanup_old_requests(now, longest);
        }
        entries.retain(|_, entry| !entry.timestamps.is_empty());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_secs: u64,
}

impl RateLimitInfo {
    pub fn to_headers(&self) -> Vec<(String, String)> {
        vec![
            ("X-RateLimit-Limit".to_string(), self.limit.to_string()),
            ("X-RateLimit-Remaining".to_string(), self.remaining.to_string()),
            ("X-RateLimit-Reset".to_string(), self.reset_after_secs.to_string()),
        ]
    }
}

/// Start background cleanup task
pub fn start_cleanup_task(limiter: Arc<RateLimiter>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            limiter.cleanup_old_entries().await;
        }
    });
}

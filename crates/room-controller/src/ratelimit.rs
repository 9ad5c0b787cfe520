//! Per-connection command rate limiting.
//!
//! Fixed windows keyed by (connection, command kind). Windows reset lazily:
//! a command arriving after the window expired starts a fresh window, and a
//! rejected command never extends or restarts the window. Command kinds with
//! no configured policy pass through untouched.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Limit for one command kind: at most `limit` commands per `window`.
#[derive(Debug, Clone, Copy)]
pub struct RatePolicy {
    pub limit: u32,
    pub window: Duration,
}

impl RatePolicy {
    #[must_use]
    pub const fn new(limit: u32, window_millis: u64) -> Self {
        Self {
            limit,
            window: Duration::from_millis(window_millis),
        }
    }
}

#[derive(Debug)]
struct WindowEntry {
    count: u32,
    started_at: Instant,
}

/// Per-connection fixed-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    policies: HashMap<&'static str, RatePolicy>,
    windows: HashMap<(String, &'static str), WindowEntry>,
}

impl RateLimiter {
    /// Limiter with the default playback-coordination policy table.
    #[must_use]
    pub fn with_default_policies() -> Self {
        Self::new(HashMap::from([
            ("play", RatePolicy::new(5, 5_000)),
            ("pause", RatePolicy::new(5, 5_000)),
            ("seek", RatePolicy::new(8, 5_000)),
            ("time-update", RatePolicy::new(20, 10_000)),
            ("send-message", RatePolicy::new(10, 5_000)),
            ("force-ready", RatePolicy::new(3, 10_000)),
            ("send-reaction", RatePolicy::new(10, 5_000)),
            ("playlist-add", RatePolicy::new(10, 30_000)),
        ]))
    }

    #[must_use]
    pub fn new(policies: HashMap<&'static str, RatePolicy>) -> Self {
        Self {
            policies,
            windows: HashMap::new(),
        }
    }

    /// Whether `connection_id` may execute a command of `kind` at `now`.
    /// Counts the attempt either way; rejections do not reset the window.
    pub fn allow(&mut self, connection_id: &str, kind: &'static str, now: Instant) -> bool {
        let Some(policy) = self.policies.get(kind) else {
            return true;
        };

        let key = (connection_id.to_string(), kind);
        let entry = self
            .windows
            .entry(key)
            .or_insert_with(|| WindowEntry {
                count: 0,
                started_at: now,
            });

        if now.duration_since(entry.started_at) >= policy.window {
            entry.count = 0;
            entry.started_at = now;
        }

        entry.count += 1;
        entry.count <= policy.limit
    }

    /// Drop all windows for a departed connection.
    pub fn forget(&mut self, connection_id: &str) {
        self.windows.retain(|(conn, _), _| conn != connection_id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn limiter_5_per_5s() -> RateLimiter {
        RateLimiter::new(HashMap::from([("play", RatePolicy::new(5, 5_000))]))
    }

    #[tokio::test(start_paused = true)]
    async fn test_allows_up_to_limit_then_rejects() {
        let mut limiter = limiter_5_per_5s();
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.allow("conn-1", "play", now));
        }
        assert!(!limiter.allow("conn-1", "play", now));
        assert!(!limiter.allow("conn-1", "play", now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_restart_after_expiry() {
        let mut limiter = limiter_5_per_5s();
        let start = Instant::now();

        for _ in 0..6 {
            limiter.allow("conn-1", "play", start);
        }

        // Sixth command inside the window was rejected; after the window
        // elapses a fresh one starts and admits again.
        let later = start + Duration::from_millis(5_000);
        assert!(limiter.allow("conn-1", "play", later));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_do_not_extend_window() {
        let mut limiter = limiter_5_per_5s();
        let start = Instant::now();

        for _ in 0..5 {
            limiter.allow("conn-1", "play", start);
        }
        // Hammering rejected commands late in the window must not push the
        // window start forward.
        let late = start + Duration::from_millis(4_999);
        assert!(!limiter.allow("conn-1", "play", late));

        let after = start + Duration::from_millis(5_000);
        assert!(limiter.allow("conn-1", "play", after));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connections_and_kinds_isolated() {
        let mut limiter = RateLimiter::new(HashMap::from([
            ("play", RatePolicy::new(1, 5_000)),
            ("seek", RatePolicy::new(1, 5_000)),
        ]));
        let now = Instant::now();

        assert!(limiter.allow("conn-1", "play", now));
        assert!(!limiter.allow("conn-1", "play", now));

        // Different kind, same connection: separate window.
        assert!(limiter.allow("conn-1", "seek", now));
        // Different connection, same kind: separate window.
        assert!(limiter.allow("conn-2", "play", now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfigured_kind_bypasses() {
        let mut limiter = limiter_5_per_5s();
        let now = Instant::now();

        for _ in 0..100 {
            assert!(limiter.allow("conn-1", "heartbeat", now));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_clears_connection_windows() {
        let mut limiter = limiter_5_per_5s();
        let now = Instant::now();

        for _ in 0..6 {
            limiter.allow("conn-1", "play", now);
        }
        assert!(!limiter.allow("conn-1", "play", now));

        limiter.forget("conn-1");
        assert!(limiter.allow("conn-1", "play", now));
    }
}

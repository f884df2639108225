//! Per-client rate limiting for the endpoints that trigger outbound calls.
//!
//! Every client address gets its own GCRA limiter, created on first use.
//! Entries idle for longer than `stale_after` are dropped by a background
//! sweep so the map cannot grow without bound.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::task::JoinHandle;
use tracing::{debug, info};

type ClientLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

struct ClientEntry {
    limiter: ClientLimiter,
    last_seen: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited,
}

impl RateDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Sustained requests per second per client. Zero is treated as one.
    pub rps: u32,
    /// Requests a fresh client may make back to back. Zero is treated as one.
    pub burst: u32,
    /// Idle time after which a client's entry is forgotten.
    pub stale_after: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            rps: 5,
            burst: 20,
            stale_after: Duration::from_secs(300),
        }
    }
}

pub struct PerClientRateLimiter {
    clients: DashMap<IpAddr, ClientEntry>,
    quota: Quota,
    stale_after: Duration,
}

impl PerClientRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let rps = NonZeroU32::new(config.rps).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(NonZeroU32::MIN);
        info!(
            rps = rps.get(),
            burst = burst.get(),
            stale_secs = config.stale_after.as_secs(),
            "per-client rate limiter configured"
        );
        Self {
            clients: DashMap::new(),
            quota: Quota::per_second(rps).allow_burst(burst),
            stale_after: config.stale_after,
        }
    }

    /// Take one token from `client`'s bucket if one is available.
    pub fn check_and_consume(&self, client: IpAddr) -> RateDecision {
        let mut entry = self.clients.entry(client).or_insert_with(|| ClientEntry {
            limiter: RateLimiter::direct(self.quota),
            last_seen: Instant::now(),
        });
        entry.last_seen = Instant::now();
        match entry.limiter.check() {
            Ok(()) => RateDecision::Allowed,
            Err(_) => {
                debug!(client = %client, "rate limit exceeded");
                RateDecision::Limited
            }
        }
    }

    /// Forget clients idle for at least `stale_after`. Returns how many went.
    pub fn cleanup_stale(&self) -> usize {
        let before = self.clients.len();
        self.clients
            .retain(|_, entry| entry.last_seen.elapsed() < self.stale_after);
        let removed = before.saturating_sub(self.clients.len());
        if removed > 0 {
            debug!(
                removed,
                remaining = self.clients.len(),
                "cleaned up stale rate limiter entries"
            );
        }
        removed
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    /// Sweep stale entries every `stale_after / 2` for the life of the runtime.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let period = (limiter.stale_after / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.tick().await;
            loop {
                tick.tick().await;
                limiter.cleanup_stale();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rps: u32, burst: u32) -> PerClientRateLimiter {
        PerClientRateLimiter::new(RateLimiterConfig {
            rps,
            burst,
            stale_after: Duration::from_secs(60),
        })
    }

    #[test]
    fn burst_is_allowed_then_limited() {
        let limiter = limiter(1, 3);
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        for _ in 0..3 {
            assert_eq!(limiter.check_and_consume(ip), RateDecision::Allowed);
        }
        assert_eq!(limiter.check_and_consume(ip), RateDecision::Limited);
    }

    #[test]
    fn clients_are_limited_independently() {
        let limiter = limiter(1, 1);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(limiter.check_and_consume(a).is_allowed());
        assert!(!limiter.check_and_consume(a).is_allowed());
        assert!(limiter.check_and_consume(b).is_allowed());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn zero_quota_still_admits_one_request() {
        let limiter = limiter(0, 0);
        let ip: IpAddr = "10.0.0.9".parse().unwrap();
        assert!(limiter.check_and_consume(ip).is_allowed());
        assert!(!limiter.check_and_consume(ip).is_allowed());
    }

    #[test]
    fn cleanup_drops_idle_clients() {
        let limiter = PerClientRateLimiter::new(RateLimiterConfig {
            rps: 10,
            burst: 10,
            stale_after: Duration::ZERO,
        });
        limiter.check_and_consume("10.0.0.1".parse().unwrap());
        assert_eq!(limiter.cleanup_stale(), 1);
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn cleanup_keeps_active_clients() {
        let limiter = limiter(10, 10);
        limiter.check_and_consume("10.0.0.1".parse().unwrap());
        assert_eq!(limiter.cleanup_stale(), 0);
        assert_eq!(limiter.tracked_clients(), 1);
    }
}

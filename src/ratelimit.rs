//! Fixed-window rate limiting per client IP.

use anyhow::Result;
use std::time::Duration;

use crate::config::LimitConfig;
use crate::kv::KvStore;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    scope: &'static str,
    max_requests: u64,
    window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests seen in the current window, this one included.
    pub count: u64,
}

impl RateLimiter {
    pub fn new(scope: &'static str, limit: &LimitConfig) -> Self {
        Self {
            scope,
            max_requests: limit.max_requests,
            window: Duration::from_secs(limit.window_secs),
        }
    }

    pub fn key(&self, ip: &str) -> String {
        format!("ratelimit:{}:{}", self.scope, ip)
    }

    /// Counts the request and decides whether it may proceed.
    ///
    /// Rejected requests are counted too, so hammering does not reopen the
    /// window early.
    pub async fn check(&self, kv: &dyn KvStore, ip: &str) -> Result<RateDecision> {
        let count = kv.increment(&self.key(ip), self.window).await?;
        Ok(RateDecision {
            allowed: count <= self.max_requests,
            count,
        })
    }

    /// Like [`check`](Self::check), but a storage failure lets the request
    /// through.
    pub async fn check_or_allow(&self, kv: &dyn KvStore, ip: &str) -> RateDecision {
        match self.check(kv, ip).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(scope = self.scope, error = %e, "rate limit check failed, allowing request");
                RateDecision {
                    allowed: true,
                    count: 0,
                }
            }
        }
    }
}

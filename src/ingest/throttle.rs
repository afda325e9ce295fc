//! Token-bucket throttle for outbound news requests.
//!
//! Wraps any [`NewsSource`] so call sites never sleep on their own: every
//! fetch first waits for a token, refilled at the configured per-minute rate.

use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use crate::ingest::types::{NewsSource, RawArticle};

#[derive(Clone)]
pub struct Throttle {
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl Throttle {
    pub fn per_minute(requests: u32, burst: u32) -> Self {
        let rpm = NonZeroU32::new(requests.max(1)).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst.max(1)).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(rpm).allow_burst(burst);
        Self {
            limiter: Some(Arc::new(RateLimiter::direct(quota))),
        }
    }

    /// No limiting at all; for tests and fixture sources.
    pub fn unlimited() -> Self {
        Self { limiter: None }
    }

    /// Wait until a token is available.
    pub async fn acquire(&self) {
        if let Some(l) = &self.limiter {
            l.until_ready().await;
        }
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.limiter.as_ref().map_or(true, |l| l.check().is_ok())
    }
}

pub struct ThrottledSource<S> {
    inner: S,
    throttle: Throttle,
}

impl<S: NewsSource> ThrottledSource<S> {
    pub fn new(inner: S, throttle: Throttle) -> Self {
        Self { inner, throttle }
    }
}

#[async_trait]
impl<S: NewsSource> NewsSource for ThrottledSource<S> {
    async fn fetch_company(&self, symbol: &str) -> Result<Vec<RawArticle>> {
        self.throttle.acquire().await;
        self.inner.fetch_company(symbol).await
    }

    async fn fetch_general(&self) -> Result<Vec<RawArticle>> {
        self.throttle.acquire().await;
        self.inner.fetch_general().await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

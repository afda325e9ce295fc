//! In-memory TTL cache for weight allocations.
//!
//! Allocations are explanations of a sentiment call that changes slowly, so
//! identical requests within the TTL (one hour by default) reuse the previous
//! answer instead of paying for another model call.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::analyze::weights::{WeightAllocation, WeightRequest};

#[derive(Debug)]
pub struct WeightCache {
    ttl: Duration,
    inner: Mutex<HashMap<String, (Instant, WeightAllocation)>>,
}

impl WeightCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, req: &WeightRequest) -> Option<WeightAllocation> {
        if self.ttl.is_zero() {
            return None;
        }
        let key = cache_key(req);
        let mut map = self.inner.lock().ok()?;
        match map.get(&key) {
            Some((at, hit)) if at.elapsed() < self.ttl => Some(hit.clone()),
            Some(_) => {
                map.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, req: &WeightRequest, value: WeightAllocation) {
        if self.ttl.is_zero() {
            return;
        }
        let Ok(mut map) = self.inner.lock() else {
            return;
        };
        let ttl = self.ttl;
        map.retain(|_, (at, _)| at.elapsed() < ttl);
        map.insert(cache_key(req), (Instant::now(), value));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// SHA-256 over symbol, aggregate call and the ordered article list.
fn cache_key(req: &WeightRequest) -> String {
    let mut h = Sha256::new();
    h.update(req.symbol.trim().to_ascii_uppercase().as_bytes());
    h.update([0u8]);
    h.update(req.overall_sentiment.trim().to_ascii_lowercase().as_bytes());
    h.update([0u8]);
    h.update([req.overall_confidence]);
    for a in &req.articles {
        h.update([0x1e]);
        h.update(a.title.as_bytes());
        h.update([0x1f]);
        h.update(a.description.as_bytes());
        h.update([0x1f]);
        h.update(a.published_at.as_deref().unwrap_or_default().as_bytes());
    }
    let digest = h.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

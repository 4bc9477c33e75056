// Product cache with explicit TTL and an injectable clock

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::services::catalog::ProductInfo;

/// Time source for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|p| p.into_inner());
        *offset += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|p| p.into_inner());
        self.origin + offset
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    product: ProductInfo,
    expires_at: Instant,
}

/// Product lookups keyed by product id, each entry living for `ttl`
pub struct ProductCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl std::fmt::Debug for ProductCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductCache")
            .field("ttl", &self.ttl)
            .field("len", &self.len())
            .finish()
    }
}

impl ProductCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_system_clock(ttl: Duration) -> Self {
        Self::new(ttl, Arc::new(SystemClock))
    }

    /// Fresh entry for `product_id`, if any. Expired entries are evicted.
    pub fn get(&self, product_id: &str) -> Option<ProductInfo> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
            match entries.get(product_id) {
                Some(entry) if now < entry.expires_at => return Some(entry.product.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        if entries
            .get(product_id)
            .is_some_and(|entry| now >= entry.expires_at)
        {
            entries.remove(product_id);
        }
        None
    }

    pub fn insert(&self, product: ProductInfo) {
        let expires_at = self.clock.now() + self.ttl;
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.insert(
            product.id.clone(),
            CacheEntry {
                product,
                expires_at,
            },
        );
    }

    pub fn invalidate(&self, product_id: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.remove(product_id);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

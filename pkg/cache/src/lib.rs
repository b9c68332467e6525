//! Bounded, concurrent key→value cache with per-entry TTL and LRU eviction.
//!
//! One mutex guards the item map, the LRU list, and the key→node index
//! together; the three structures mutate atomically. A background sweeper
//! drops expired entries once per second for the lifetime of the cache.

use pkg_constants::lease::CACHE_SWEEP_INTERVAL_SECS;
use pkg_metrics::{MetricsRegistry, CACHE_OPERATIONS};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub struct TtlLruCache<V> {
    inner: Mutex<CacheInner<V>>,
    metrics: Arc<MetricsRegistry>,
}

struct CacheInner<V> {
    items: HashMap<String, CacheEntry<V>>,
    key_to_node: HashMap<String, usize>,
    lru: LruList,
    max_size: usize,
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V: Clone + Send + 'static> TtlLruCache<V> {
    pub fn new(max_size: usize, metrics: Arc<MetricsRegistry>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(CacheInner {
                items: HashMap::new(),
                key_to_node: HashMap::new(),
                lru: LruList::default(),
                max_size,
            }),
            metrics,
        })
    }

    /// Insert or replace the value under `key` with a fresh expiration.
    /// Inserting into a full cache evicts the least-recently-used entry first.
    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let expires_at = Instant::now() + ttl;

        if let Some(entry) = inner.items.get_mut(key) {
            entry.value = value;
            entry.expires_at = expires_at;
            if let Some(&node) = inner.key_to_node.get(key) {
                inner.lru.move_to_front(node);
            }
            self.metrics.counter_inc(CACHE_OPERATIONS, &["set", "update"]);
            return;
        }

        if inner.items.len() >= inner.max_size && inner.evict_oldest() {
            self.metrics.counter_inc(CACHE_OPERATIONS, &["evict", "size_limit"]);
        }

        inner.items.insert(key.to_string(), CacheEntry { value, expires_at });
        let node = inner.lru.push_front(key.to_string());
        inner.key_to_node.insert(key.to_string(), node);
        self.metrics.counter_inc(CACHE_OPERATIONS, &["set", "insert"]);
    }

    /// Look up `key`. An expired entry is removed and reported as a miss.
    /// A hit refreshes the entry's LRU position.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let now = Instant::now();

        let found = inner
            .items
            .get(key)
            .map(|entry| (entry.expires_at, entry.value.clone()));

        match found {
            None => {
                self.metrics.counter_inc(CACHE_OPERATIONS, &["get", "miss"]);
                None
            }
            Some((expires_at, _)) if expires_at <= now => {
                inner.remove_entry(key);
                self.metrics.counter_inc(CACHE_OPERATIONS, &["get", "expired"]);
                None
            }
            Some((_, value)) => {
                if let Some(&node) = inner.key_to_node.get(key) {
                    inner.lru.move_to_front(node);
                }
                self.metrics.counter_inc(CACHE_OPERATIONS, &["get", "hit"]);
                Some(value)
            }
        }
    }

    /// Lower (or raise) the size cap, evicting LRU entries until it holds.
    pub fn set_max_size(&self, max_size: usize) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        inner.max_size = max_size;
        while inner.items.len() > inner.max_size {
            if !inner.evict_oldest() {
                break;
            }
            self.metrics.counter_inc(CACHE_OPERATIONS, &["evict", "size_limit"]);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start the expiry sweeper as a background task. It wakes every second
    /// and removes every entry whose expiration has passed.
    pub fn start_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(CACHE_SWEEP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                cache.remove_expired();
            }
        })
    }

    fn remove_expired(&self) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let now = Instant::now();
        let expired: Vec<String> = inner
            .items
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            debug!("Sweeping expired cache entry: {}", key);
            inner.remove_entry(&key);
            self.metrics.counter_inc(CACHE_OPERATIONS, &["cleanup", "expired"]);
        }
    }
}

impl<V> CacheInner<V> {
    fn remove_entry(&mut self, key: &str) {
        self.items.remove(key);
        if let Some(node) = self.key_to_node.remove(key) {
            self.lru.remove(node);
        }
    }

    /// Drop the least-recently-used entry. Returns false on an empty cache.
    fn evict_oldest(&mut self) -> bool {
        match self.lru.back() {
            Some(idx) => {
                let key = self.lru.key(idx).to_string();
                self.remove_entry(&key);
                true
            }
            None => false,
        }
    }
}

/// Doubly-linked LRU list over slab indices. Front = most recent.
/// The cache's key→node index maps into `nodes`; freed slots are recycled.
#[derive(Default)]
struct LruList {
    nodes: Vec<LruNode>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

struct LruNode {
    key: String,
    prev: Option<usize>,
    next: Option<usize>,
}

impl LruList {
    fn push_front(&mut self, key: String) -> usize {
        let node = LruNode {
            key,
            prev: None,
            next: self.head,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        if let Some(old_head) = self.head {
            self.nodes[old_head].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
        idx
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.nodes[idx].next = self.head;
        if let Some(old_head) = self.head {
            self.nodes[old_head].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn remove(&mut self, idx: usize) {
        self.unlink(idx);
        self.nodes[idx].key.clear();
        self.free.push(idx);
    }

    fn back(&self) -> Option<usize> {
        self.tail
    }

    fn key(&self, idx: usize) -> &str {
        &self.nodes[idx].key
    }

    fn unlink(&mut self, idx: usize) {
        let prev = self.nodes[idx].prev;
        let next = self.nodes[idx].next;
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[idx].prev = None;
        self.nodes[idx].next = None;
    }
}

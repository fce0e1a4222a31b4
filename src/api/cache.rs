//! In-process read cache in front of the record store.
//!
//! The durable store stays authoritative; these entries only shortcut
//! reads and expire on a TTL. Every game mutation re-caches its rows,
//! which is what gives abandoned sessions their inactivity clock.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::{Duration, Instant},
};

use serde::Serialize;

use crate::config::CacheConfig;
use crate::game::engine::GameRecord;
use crate::metrics::MetricsRegistry;

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Generic LRU cache with TTL support
pub struct LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    capacity: usize,
    cache: Arc<RwLock<HashMap<K, CacheEntry<V>>>>,
    /// Access order tracking for LRU eviction, oldest first
    access_order: Arc<RwLock<Vec<K>>>,
    ttl: Option<Duration>,
}

#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            cache: Arc::new(RwLock::new(HashMap::with_capacity(capacity))),
            access_order: Arc::new(RwLock::new(Vec::with_capacity(capacity))),
            ttl: None,
        }
    }

    pub fn with_ttl(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            cache: Arc::new(RwLock::new(HashMap::with_capacity(capacity))),
            access_order: Arc::new(RwLock::new(Vec::with_capacity(capacity))),
            ttl: Some(ttl),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();

        // Lock order is always cache before access_order.
        let mut cache = write_lock(&self.cache);
        if let Some(entry) = cache.get(key) {
            if let Some(ttl) = self.ttl {
                if now.duration_since(entry.created_at) > ttl {
                    cache.remove(key);
                    self.remove_from_access_order(key);
                    return None;
                }
            }

            let value = entry.value.clone();
            self.update_access_order(key);
            return Some(value);
        }

        None
    }

    pub fn put(&self, key: K, value: V) {
        let mut cache = write_lock(&self.cache);
        let mut access_order = write_lock(&self.access_order);

        while cache.len() >= self.capacity && !cache.contains_key(&key) {
            if let Some(lru_key) = access_order.first().cloned() {
                cache.remove(&lru_key);
                access_order.retain(|k| k != &lru_key);
            } else {
                break;
            }
        }

        let entry = CacheEntry {
            value,
            created_at: Instant::now(),
        };

        cache.insert(key.clone(), entry);
        access_order.retain(|k| k != &key);
        access_order.push(key);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut cache = write_lock(&self.cache);
        if let Some(entry) = cache.remove(key) {
            self.remove_from_access_order(key);
            Some(entry.value)
        } else {
            None
        }
    }

    pub fn clear(&self) {
        let mut cache = write_lock(&self.cache);
        let mut access_order = write_lock(&self.access_order);
        cache.clear();
        access_order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let cache = read_lock(&self.cache);
        let now = Instant::now();

        let expired_entries = match self.ttl {
            Some(ttl) => cache
                .values()
                .filter(|entry| now.duration_since(entry.created_at) > ttl)
                .count(),
            None => 0,
        };

        CacheStats {
            capacity: self.capacity,
            size: cache.len(),
            expired_entries,
        }
    }

    /// Drop entries past their TTL, returning how many went.
    pub fn cleanup_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };

        let now = Instant::now();
        let mut cache = write_lock(&self.cache);
        let expired: Vec<K> = cache
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.created_at) > ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            cache.remove(key);
            self.remove_from_access_order(key);
        }

        expired.len()
    }

    fn update_access_order(&self, key: &K) {
        let mut access_order = write_lock(&self.access_order);
        access_order.retain(|k| k != key);
        access_order.push(key.clone());
    }

    fn remove_from_access_order(&self, key: &K) {
        let mut access_order = write_lock(&self.access_order);
        access_order.retain(|k| k != key);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub capacity: usize,
    pub size: usize,
    pub expired_entries: usize,
}

/// Table-specific cache manager: game rows, the per-player active-game
/// pointer, and balances.
pub struct TableCache {
    games: LruCache<String, GameRecord>,
    active_games: LruCache<String, String>,
    balances: LruCache<String, u64>,
    metrics: MetricsRegistry,
}

impl TableCache {
    pub fn new(config: &CacheConfig, metrics: MetricsRegistry) -> Self {
        let ttl = Duration::from_secs(config.ttl_seconds);
        Self {
            games: LruCache::with_ttl(config.capacity, ttl),
            active_games: LruCache::with_ttl(config.capacity, ttl),
            balances: LruCache::with_ttl(config.capacity, ttl),
            metrics,
        }
    }

    pub fn game(&self, game_id: &str) -> Option<GameRecord> {
        let hit = self.games.get(&game_id.to_string());
        self.metrics.record_cache_hit(hit.is_some());
        hit
    }

    pub fn active_game_id(&self, user_id: &str) -> Option<String> {
        let hit = self.active_games.get(&user_id.to_string());
        self.metrics.record_cache_hit(hit.is_some());
        hit
    }

    pub fn balance(&self, user_id: &str) -> Option<u64> {
        let hit = self.balances.get(&user_id.to_string());
        self.metrics.record_cache_hit(hit.is_some());
        hit
    }

    /// Re-cache a game row with a fresh TTL, keeping the owner's
    /// active-game pointer in step with the game's liveness.
    pub fn refresh_game(&self, game: &GameRecord) {
        self.games.put(game.id.clone(), game.clone());
        if game.is_live() {
            self.active_games
                .put(game.owner_id.clone(), game.id.clone());
        } else {
            self.active_games.remove(&game.owner_id);
        }
    }

    pub fn cache_balance(&self, user_id: &str, balance: u64) {
        self.balances.put(user_id.to_string(), balance);
    }

    pub fn invalidate_game(&self, game_id: &str) {
        self.games.remove(&game_id.to_string());
    }

    /// Drop everything cached for one player. Used after a failed commit,
    /// when the cached view can no longer be trusted.
    pub fn invalidate_user(&self, user_id: &str) {
        if let Some(game_id) = self.active_games.remove(&user_id.to_string()) {
            self.games.remove(&game_id);
        }
        self.balances.remove(&user_id.to_string());
    }

    pub fn cleanup_expired(&self) -> usize {
        self.games.cleanup_expired()
            + self.active_games.cleanup_expired()
            + self.balances.cleanup_expired()
    }

    pub fn stats(&self) -> TableCacheStats {
        TableCacheStats {
            games: self.games.stats(),
            active_games: self.active_games.stats(),
            balances: self.balances.stats(),
        }
    }

    /// Start background cleanup task
    pub fn start_cleanup_task(cache: Arc<TableCache>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = cache.cleanup_expired();
                if removed > 0 {
                    tracing::debug!(removed, "Cache cleanup dropped expired entries");
                }
            }
        });
    }
}

#[derive(Debug, Serialize)]
pub struct TableCacheStats {
    pub games: CacheStats,
    pub active_games: CacheStats,
    pub balances: CacheStats,
}

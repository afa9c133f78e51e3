use std::any::Any;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// TTL tier for a cached probe result. Each tier matches the volatility of
/// the data it holds: hardware identifiers survive a day, drive state only
/// seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Hardware identifiers, model, serial.
    Static,
    /// Firmware versions, enclosure topology, HBA tool output, by-id links.
    Slow,
    /// ZFS pool membership.
    Medium,
    /// Drive state, SCSI roster.
    Fast,
    /// Temperatures.
    Dynamic,
}

impl Tier {
    pub fn ttl(self) -> Duration {
        match self {
            Tier::Static => Duration::from_secs(24 * 3600),
            Tier::Slow => Duration::from_secs(3600),
            Tier::Medium => Duration::from_secs(300),
            Tier::Fast => Duration::from_secs(5),
            Tier::Dynamic => Duration::from_secs(30),
        }
    }
}

struct Entry {
    value: Box<dyn Any + Send + Sync>,
    fetched_at: Instant,
    expires_at: Instant,
}

/// Thread-safe TTL cache shared by all probe adapters within one engine
/// invocation. Readers are non-exclusive; each key has a single writer per
/// TTL window. Expired entries read as absent, never stale.
///
/// Created once at engine entry and passed explicitly; there is no global.
pub struct Cache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Cache {
    pub fn new() -> Self {
        Cache { entries: RwLock::new(HashMap::new()) }
    }

    /// Live value for `key`, or None if absent or expired.
    pub fn get<T: Any + Clone>(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(key)?;
        if Instant::now() >= entry.expires_at {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    /// Age of the entry under `key`, expired or not.
    pub fn age(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.read().unwrap();
        entries.get(key).map(|e| e.fetched_at.elapsed())
    }

    pub fn set<T: Any + Send + Sync>(&self, key: &str, value: T, tier: Tier) {
        self.set_with_ttl(key, value, tier.ttl());
    }

    pub fn set_with_ttl<T: Any + Send + Sync>(&self, key: &str, value: T, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key.to_string(),
            Entry { value: Box::new(value), fetched_at: now, expires_at: now + ttl },
        );
    }

    /// Fetch through the cache: return the live value or compute, store and
    /// return a fresh one.
    pub fn get_or_insert_with<T, F>(&self, key: &str, tier: Tier, fetch: F) -> T
    where
        T: Any + Clone + Send + Sync,
        F: FnOnce() -> T,
    {
        if let Some(v) = self.get::<T>(key) {
            return v;
        }
        let v = fetch();
        self.set(key, v.clone(), tier);
        v
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.write().unwrap().remove(key);
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }

    /// Drop expired entries. Optional housekeeping; lookups already treat
    /// expired entries as absent.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.write().unwrap().retain(|_, e| e.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn get_returns_live_value() {
        let c = Cache::new();
        c.set("k", 42u32, Tier::Fast);
        assert_eq!(c.get::<u32>("k"), Some(42));
    }

    #[test]
    fn expired_entry_reads_as_absent() {
        let c = Cache::new();
        c.set_with_ttl("k", 1u32, Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(c.get::<u32>("k"), None);
        // Still physically present until purged.
        assert_eq!(c.len(), 1);
        c.purge_expired();
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn wrong_type_reads_as_absent() {
        let c = Cache::new();
        c.set("k", "hello".to_string(), Tier::Static);
        assert_eq!(c.get::<u32>("k"), None);
        assert_eq!(c.get::<String>("k"), Some("hello".to_string()));
    }

    #[test]
    fn get_or_insert_fetches_once_within_ttl() {
        let c = Cache::new();
        let mut calls = 0;
        for _ in 0..3 {
            let v = c.get_or_insert_with("k", Tier::Slow, || {
                calls += 1;
                7u64
            });
            assert_eq!(v, 7);
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn tiers_are_ordered_by_ttl() {
        assert!(Tier::Static.ttl() > Tier::Slow.ttl());
        assert!(Tier::Slow.ttl() > Tier::Medium.ttl());
        assert!(Tier::Medium.ttl() > Tier::Dynamic.ttl());
        assert!(Tier::Dynamic.ttl() > Tier::Fast.ttl());
    }
}

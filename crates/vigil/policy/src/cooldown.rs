//! Per-(policy, target) cooldown tracking.
//!
//! Keeps the last-fired instant for every pair and answers whether the
//! pair may fire again. Uses the monotonic clock throughout; wall-clock
//! time never feeds cooldown decisions.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Key identifying one cooldown entry.
pub type CooldownKey = (String, String);

/// Registry of last-fired instants keyed by (policy name, target).
///
/// Entries idle longer than ten times the longest cooldown observed are
/// evicted opportunistically on mutation. An evicted or unknown key is
/// treated as ready, which is always safe.
#[derive(Debug, Default)]
pub struct CooldownRegistry {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    fired: HashMap<CooldownKey, Instant>,
    longest_cooldown: Duration,
    mutations: u64,
}

/// How many mutations between opportunistic eviction sweeps.
const EVICT_EVERY: u64 = 256;

impl CooldownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the pair may fire, and how long remains if it may not.
    pub fn ready(&self, key: &CooldownKey, cooldown: Duration) -> (bool, Duration) {
        if cooldown.is_zero() {
            return (true, Duration::ZERO);
        }
        let inner = self.inner.lock().unwrap();
        match inner.fired.get(key) {
            Some(last) => {
                let elapsed = last.elapsed();
                if elapsed >= cooldown {
                    (true, Duration::ZERO)
                } else {
                    (false, cooldown - elapsed)
                }
            }
            None => (true, Duration::ZERO),
        }
    }

    /// Atomically check the cooldown and mark the pair as fired now.
    ///
    /// Returns `true` when the caller won the right to emit; `false` when
    /// the pair is still cooling down. Callers must gate emission on the
    /// return value.
    pub fn try_mark(&self, key: &CooldownKey, cooldown: Duration) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        if let Some(last) = inner.fired.get(key) {
            if !cooldown.is_zero() && now.duration_since(*last) < cooldown {
                return false;
            }
        }

        inner.fired.insert(key.clone(), now);
        inner.longest_cooldown = inner.longest_cooldown.max(cooldown);
        inner.mutations += 1;
        if inner.mutations % EVICT_EVERY == 0 {
            let horizon = inner.longest_cooldown.saturating_mul(10);
            if !horizon.is_zero() {
                inner.fired.retain(|_, last| last.elapsed() < horizon);
            }
        }
        true
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(policy: &str, target: &str) -> CooldownKey {
        (policy.to_string(), target.to_string())
    }

    #[test]
    fn test_unknown_key_is_ready() {
        let registry = CooldownRegistry::new();
        let (ready, remaining) = registry.ready(&key("p", "t"), Duration::from_secs(60));
        assert!(ready);
        assert_eq!(remaining, Duration::ZERO);
    }

    #[test]
    fn test_mark_blocks_within_cooldown() {
        let registry = CooldownRegistry::new();
        let k = key("high-cpu", "web-1");
        let cooldown = Duration::from_secs(60);

        assert!(registry.try_mark(&k, cooldown));
        assert!(!registry.try_mark(&k, cooldown));

        let (ready, remaining) = registry.ready(&k, cooldown);
        assert!(!ready);
        assert!(remaining > Duration::ZERO && remaining <= cooldown);
    }

    #[test]
    fn test_zero_cooldown_always_fires() {
        let registry = CooldownRegistry::new();
        let k = key("p", "t");
        assert!(registry.try_mark(&k, Duration::ZERO));
        assert!(registry.try_mark(&k, Duration::ZERO));
    }

    #[test]
    fn test_pairs_are_independent() {
        let registry = CooldownRegistry::new();
        let cooldown = Duration::from_secs(60);
        assert!(registry.try_mark(&key("p", "web-1"), cooldown));
        assert!(registry.try_mark(&key("p", "web-2"), cooldown));
        assert!(registry.try_mark(&key("q", "web-1"), cooldown));
        assert!(!registry.try_mark(&key("p", "web-1"), cooldown));
    }

    #[test]
    fn test_cooldown_expires() {
        let registry = CooldownRegistry::new();
        let k = key("p", "t");
        let cooldown = Duration::from_millis(20);

        assert!(registry.try_mark(&k, cooldown));
        assert!(!registry.try_mark(&k, cooldown));
        std::thread::sleep(Duration::from_millis(25));
        assert!(registry.try_mark(&k, cooldown));
    }
}

//! Per-participant usage counters
//!
//! A small key-value store with an explicit expiry on every entry. Expired
//! entries are dropped lazily when touched. `DailyLimiter` builds a
//! games-per-UTC-day quota on top of it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Days, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LimitError;
use crate::game::ActorId;

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A counter that stops existing at `expires_at`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub count: u32,
    pub expires_at: DateTime<Utc>,
}

/// Key-value store for usage counters
pub trait UsageStore: Send + Sync {
    /// Live entry for `key`, `None` if absent or expired
    fn get(&self, key: &str) -> Option<UsageEntry>;

    fn put(&self, key: &str, entry: UsageEntry);
}

/// In-process store
pub struct MemoryUsageStore {
    entries: Mutex<HashMap<String, UsageEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryUsageStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of entries currently held, expired or not
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UsageStore for MemoryUsageStore {
    fn get(&self, key: &str) -> Option<UsageEntry> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(*entry),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: &str, entry: UsageEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), entry);
    }
}

/// Caps the number of chains each participant may open per UTC day
pub struct DailyLimiter {
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
    limit: u32,
    exempt: HashSet<ActorId>,
}

impl DailyLimiter {
    pub fn new(
        store: Arc<dyn UsageStore>,
        clock: Arc<dyn Clock>,
        limit: u32,
        exempt: impl IntoIterator<Item = ActorId>,
    ) -> Self {
        Self {
            store,
            clock,
            limit,
            exempt: exempt.into_iter().collect(),
        }
    }

    /// Count one use for `actor`.
    ///
    /// Returns the number of uses today including this one, or an error
    /// once the limit is spent. Exempt actors always succeed with 0.
    pub fn try_consume(&self, actor: &ActorId) -> Result<u32, LimitError> {
        if self.exempt.contains(actor) {
            return Ok(0);
        }

        let key = format!("daily-games:{}", actor);
        let now = self.clock.now();
        let entry = self.store.get(&key).unwrap_or(UsageEntry {
            count: 0,
            expires_at: next_utc_midnight(now),
        });

        if entry.count >= self.limit {
            tracing::debug!("{} hit the daily limit of {}", actor, self.limit);
            return Err(LimitError::Reached { limit: self.limit });
        }

        let entry = UsageEntry {
            count: entry.count + 1,
            ..entry
        };
        self.store.put(&key, entry);
        Ok(entry.count)
    }
}

/// Start of the next UTC day after `now`
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .unwrap_or(now.date_naive());
    tomorrow.and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    /// Clock that only moves when told to
    struct FakeClock(Mutex<DateTime<Utc>>);

    impl FakeClock {
        fn at(t: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(t)))
        }

        fn advance(&self, d: Duration) {
            let mut t = self.0.lock().unwrap();
            *t += d;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn limiter(clock: Arc<FakeClock>, limit: u32) -> (DailyLimiter, Arc<MemoryUsageStore>) {
        let store = Arc::new(MemoryUsageStore::new(clock.clone()));
        let limiter = DailyLimiter::new(store.clone(), clock, limit, [ActorId::new("owner")]);
        (limiter, store)
    }

    #[test]
    fn test_next_midnight() {
        let t = Utc.with_ymd_and_hms(2024, 2, 28, 23, 59, 59).unwrap();
        assert_eq!(next_utc_midnight(t), Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_store_prunes_expired_entries_on_access() {
        let clock = FakeClock::at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let store = MemoryUsageStore::new(clock.clone());
        store.put(
            "k",
            UsageEntry {
                count: 2,
                expires_at: clock.now() + Duration::minutes(5),
            },
        );
        assert_eq!(store.get("k").map(|e| e.count), Some(2));

        clock.advance(Duration::minutes(5));
        assert_eq!(store.get("k"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_limit_reached_then_reset_next_day() {
        let clock = FakeClock::at(Utc.with_ymd_and_hms(2024, 5, 1, 22, 0, 0).unwrap());
        let (limiter, _) = limiter(clock.clone(), 3);
        let alice = ActorId::new("alice");

        assert_eq!(limiter.try_consume(&alice), Ok(1));
        assert_eq!(limiter.try_consume(&alice), Ok(2));
        assert_eq!(limiter.try_consume(&alice), Ok(3));
        assert_eq!(limiter.try_consume(&alice), Err(LimitError::Reached { limit: 3 }));

        // Other participants are counted separately
        assert_eq!(limiter.try_consume(&ActorId::new("bob")), Ok(1));

        clock.advance(Duration::hours(2));
        assert_eq!(limiter.try_consume(&alice), Ok(1));
    }

    #[test]
    fn test_exempt_actor_is_never_counted() {
        let clock = FakeClock::at(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
        let (limiter, store) = limiter(clock, 1);
        for _ in 0..5 {
            assert_eq!(limiter.try_consume(&ActorId::new("owner")), Ok(0));
        }
        assert!(store.is_empty());
    }
}

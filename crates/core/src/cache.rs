//! Snapshot cache over the record store.
//!
//! The engines always run against the most recently *resolved* snapshot. Every fetch takes a
//! ticket when it starts; a resolved fetch is installed only when its ticket is newer than the
//! installed snapshot's, so a slow, older fetch never replaces a newer one. Invalidation
//! (after a mutation) marks the cache stale until a fetch issued after it resolves.

use crate::model::Referral;
use crate::store::RecordStore;
use crate::TrackerResult;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// One resolved read of the record store.
#[derive(Debug)]
pub struct Snapshot {
    /// Ticket of the fetch that produced this snapshot.
    pub generation: u64,
    pub referrals: Vec<Referral>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheState {
    current: Option<Arc<Snapshot>>,
    /// Fetches with a ticket at or below this were issued before the last invalidation.
    invalidated_through: u64,
}

#[derive(Debug, Default)]
pub struct SnapshotCache {
    state: Mutex<CacheState>,
    tickets: AtomicU64,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot, refetching first if the cache is empty or stale.
    ///
    /// # Errors
    ///
    /// Propagates the store's fetch error. The previous snapshot is left in place.
    pub fn read(&self, store: &dyn RecordStore) -> TrackerResult<Arc<Snapshot>> {
        if let Some(snapshot) = self.fresh() {
            return Ok(snapshot);
        }
        self.refresh(store)
    }

    /// Fetch unconditionally and install the result if nothing newer has landed meanwhile.
    pub fn refresh(&self, store: &dyn RecordStore) -> TrackerResult<Arc<Snapshot>> {
        let ticket = self.begin_fetch();
        match store.fetch_referrals() {
            Ok(referrals) => Ok(self.install(ticket, referrals)),
            Err(err) => {
                tracing::warn!(ticket, error = %err, "referral fetch failed");
                Err(err)
            }
        }
    }

    /// Reserve a ticket for a fetch that is about to start.
    pub fn begin_fetch(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Install the result of fetch `ticket`, returning whichever snapshot is current after.
    pub fn install(&self, ticket: u64, referrals: Vec<Referral>) -> Arc<Snapshot> {
        let mut state = self.lock();

        if let Some(current) = &state.current {
            if ticket <= current.generation {
                tracing::debug!(ticket, "discarded superseded snapshot");
                return Arc::clone(current);
            }
        }

        tracing::debug!(ticket, referrals = referrals.len(), "installed snapshot");
        let snapshot = Arc::new(Snapshot {
            generation: ticket,
            referrals,
            fetched_at: Utc::now(),
        });
        state.current = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Mark the cache stale; the next [`read`](Self::read) refetches.
    pub fn invalidate(&self) {
        let issued = self.tickets.load(Ordering::SeqCst);
        let mut state = self.lock();
        state.invalidated_through = issued;
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.lock().current.clone()
    }

    fn fresh(&self) -> Option<Arc<Snapshot>> {
        let state = self.lock();
        state
            .current
            .as_ref()
            .filter(|s| s.generation > state.invalidated_through)
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Patient, Regression};
    use crate::mutation::{Mutation, MutationAck};
    use crate::TrackerError;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    struct CountingStore {
        fetches: AtomicUsize,
        fail: bool,
    }

    impl CountingStore {
        fn new(fail: bool) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail,
            }
        }
    }

    impl RecordStore for CountingStore {
        fn fetch_referrals(&self) -> TrackerResult<Vec<Referral>> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TrackerError::StoreUnavailable("offline".into()));
            }
            Ok((0..=n)
                .map(|_| Referral::new(Patient::new("Ada", "Lovelace"), "Intake", Utc::now()))
                .collect())
        }

        fn fetch_regressions(&self, _order_id: Uuid) -> TrackerResult<Vec<Regression>> {
            Ok(vec![])
        }

        fn apply(&self, _mutation: &Mutation) -> TrackerResult<MutationAck> {
            Ok(MutationAck::default())
        }
    }

    #[test]
    fn reads_are_cached_until_invalidated() {
        let store = CountingStore::new(false);
        let cache = SnapshotCache::new();

        let first = cache.read(&store).unwrap();
        let again = cache.read(&store).unwrap();
        assert_eq!(first.generation, again.generation);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);

        cache.invalidate();
        let refreshed = cache.read(&store).unwrap();
        assert!(refreshed.generation > first.generation);
        assert_eq!(refreshed.referrals.len(), 2);
    }

    #[test]
    fn older_fetch_never_replaces_newer_snapshot() {
        let cache = SnapshotCache::new();
        let slow = cache.begin_fetch();
        let fast = cache.begin_fetch();

        let installed = cache.install(fast, vec![]);
        assert_eq!(installed.generation, fast);

        let after_slow = cache.install(
            slow,
            vec![Referral::new(Patient::new("Old", "Data"), "Intake", Utc::now())],
        );
        assert_eq!(after_slow.generation, fast);
        assert!(after_slow.referrals.is_empty());
    }

    #[test]
    fn fetch_issued_before_invalidation_stays_stale() {
        let store = CountingStore::new(false);
        let cache = SnapshotCache::new();
        let ticket = cache.begin_fetch();
        cache.invalidate();
        cache.install(ticket, vec![]);

        // installed, but issued before the invalidation, so read refetches
        let snapshot = cache.read(&store).unwrap();
        assert!(snapshot.generation > ticket);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_fetch_keeps_previous_snapshot() {
        let cache = SnapshotCache::new();
        let ticket = cache.begin_fetch();
        cache.install(ticket, vec![]);
        cache.invalidate();

        let err = cache.read(&CountingStore::new(true)).unwrap_err();
        assert!(matches!(err, TrackerError::StoreUnavailable(_)));
        assert_eq!(cache.current().map(|s| s.generation), Some(ticket));
    }
}

//! Singleton store with per-name lifecycle state
//!
//! The store is the single source of truth for singleton instances and for
//! which names are mid-construction or mid-destruction. It is the only
//! mutable shared state in the container.
//!
//! Per-name state transitions are atomic: `begin_creation` uses the map's
//! entry API as the compare-and-swap from absent to `Creating`, so at most
//! one resolver starts construction for a name. Entry guards are never held
//! across construction, so a second resolver for the same name observes
//! `Creating` and fails fast rather than blocking.

use crate::{BeanError, BeanValue, Result};
use ahash::RandomState;
use dashmap::DashMap;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Lifecycle state of a singleton entry.
///
/// `absent` and `destroyed` are represented by the entry not existing in the
/// store; an entry only exists while a name is creating, ready, or being
/// torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Construction is in flight; no instance yet
    Creating,
    /// Fully constructed and cached
    Ready,
    /// Teardown is in flight; the instance is about to be dropped
    Destroying,
}

/// One tracked singleton.
struct SingletonEntry {
    state: LifecycleState,
    /// Present only in `Ready`
    instance: Option<BeanValue>,
}

/// Outcome of [`SingletonStore::begin_creation`].
#[derive(Debug)]
pub enum CreationTicket {
    /// The caller owns construction for this name
    Started,
    /// Another call already produced the instance
    AlreadyReady(BeanValue),
}

/// Thread-safe store of singleton instances keyed by bean name.
///
/// Uses `DashMap` with `ahash` so unrelated names never contend on a single
/// global lock.
pub struct SingletonStore {
    entries: DashMap<String, SingletonEntry, RandomState>,
}

impl SingletonStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Get the cached instance for a `Ready` entry
    #[inline]
    pub fn get(&self, name: &str) -> Option<BeanValue> {
        let entry = self.entries.get(name)?;
        match entry.state {
            LifecycleState::Ready => entry.instance.clone(),
            _ => None,
        }
    }

    /// Current state for a name, if an entry exists
    #[inline]
    pub fn state(&self, name: &str) -> Option<LifecycleState> {
        self.entries.get(name).map(|e| e.state)
    }

    /// True if the name is mid-construction or mid-destruction
    #[inline]
    pub fn in_transition(&self, name: &str) -> bool {
        matches!(
            self.state(name),
            Some(LifecycleState::Creating) | Some(LifecycleState::Destroying)
        )
    }

    /// True if a `Ready` instance is cached for the name
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        matches!(self.state(name), Some(LifecycleState::Ready))
    }

    /// Claim construction of `name`.
    ///
    /// Atomically transitions absent -> `Creating`. If another call already
    /// completed construction, the cached instance is handed back instead.
    /// If the name is `Creating` or `Destroying`, fails with
    /// `CreationInProgress` immediately; there is no blocking wait.
    pub fn begin_creation(&self, name: &str) -> Result<CreationTicket> {
        use dashmap::mapref::entry::Entry;
        match self.entries.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(SingletonEntry {
                    state: LifecycleState::Creating,
                    instance: None,
                });

                #[cfg(feature = "logging")]
                trace!(
                    target: "trellis_ioc",
                    bean = name,
                    "Singleton marked creating"
                );

                Ok(CreationTicket::Started)
            }
            Entry::Occupied(entry) => match entry.get().state {
                LifecycleState::Ready => Ok(CreationTicket::AlreadyReady(
                    entry
                        .get()
                        .instance
                        .clone()
                        .ok_or_else(|| BeanError::Other(format!("ready entry for '{name}' has no instance")))?,
                )),
                LifecycleState::Creating | LifecycleState::Destroying => {
                    Err(BeanError::in_progress(name))
                }
            },
        }
    }

    /// Transition `Creating` -> `Ready`, caching the instance
    pub fn complete_creation(&self, name: &str, instance: BeanValue) {
        if let Some(mut entry) = self.entries.get_mut(name) {
            entry.state = LifecycleState::Ready;
            entry.instance = Some(instance);

            #[cfg(feature = "logging")]
            debug!(
                target: "trellis_ioc",
                bean = name,
                "Singleton created and cached"
            );
        }
    }

    /// Tear down a partially-created entry after a construction failure.
    ///
    /// Removal is mandatory: a failed construction must not leave a dangling
    /// `Creating` entry blocking later retries.
    pub fn fail_creation(&self, name: &str) {
        self.entries.remove(name);

        #[cfg(feature = "logging")]
        debug!(
            target: "trellis_ioc",
            bean = name,
            "Singleton entry removed after failed construction"
        );
    }

    /// Transition `Ready` -> `Destroying`, handing back the instance so the
    /// caller can run its destroy hook. Returns `None` if the name has no
    /// `Ready` entry.
    pub fn begin_destruction(&self, name: &str) -> Option<BeanValue> {
        let mut entry = self.entries.get_mut(name)?;
        if entry.state != LifecycleState::Ready {
            return None;
        }
        entry.state = LifecycleState::Destroying;
        entry.instance.take()
    }

    /// Remove a `Destroying` entry; the name becomes absent and may be
    /// created again later
    pub fn complete_destruction(&self, name: &str) {
        self.entries.remove(name);

        #[cfg(feature = "logging")]
        trace!(
            target: "trellis_ioc",
            bean = name,
            "Singleton destroyed and removed"
        );
    }

    /// Names of all `Ready` singletons
    pub fn ready_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.state == LifecycleState::Ready)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Number of entries (any state)
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store holds no entries
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SingletonStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SingletonStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonStore")
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn value(n: u32) -> BeanValue {
        Arc::new(n)
    }

    #[test]
    fn create_then_get() {
        let store = SingletonStore::new();
        assert!(store.get("a").is_none());

        assert!(matches!(
            store.begin_creation("a").unwrap(),
            CreationTicket::Started
        ));
        assert_eq!(store.state("a"), Some(LifecycleState::Creating));
        assert!(store.get("a").is_none());

        store.complete_creation("a", value(1));
        assert_eq!(store.state("a"), Some(LifecycleState::Ready));
        assert!(store.get("a").is_some());
    }

    #[test]
    fn second_claim_while_creating_fails_fast() {
        let store = SingletonStore::new();
        store.begin_creation("a").unwrap();

        let err = store.begin_creation("a").unwrap_err();
        assert!(matches!(err, BeanError::CreationInProgress { name } if name == "a"));
    }

    #[test]
    fn claim_on_ready_returns_existing() {
        let store = SingletonStore::new();
        store.begin_creation("a").unwrap();
        store.complete_creation("a", value(7));

        match store.begin_creation("a").unwrap() {
            CreationTicket::AlreadyReady(v) => {
                assert_eq!(*v.downcast::<u32>().unwrap(), 7);
            }
            CreationTicket::Started => panic!("should not restart construction"),
        }
    }

    #[test]
    fn failed_creation_allows_retry() {
        let store = SingletonStore::new();
        store.begin_creation("a").unwrap();
        store.fail_creation("a");

        assert_eq!(store.state("a"), None);
        assert!(matches!(
            store.begin_creation("a").unwrap(),
            CreationTicket::Started
        ));
    }

    #[test]
    fn destruction_removes_entry() {
        let store = SingletonStore::new();
        store.begin_creation("a").unwrap();
        store.complete_creation("a", value(1));

        let instance = store.begin_destruction("a").unwrap();
        assert_eq!(*instance.downcast::<u32>().unwrap(), 1);
        assert_eq!(store.state("a"), Some(LifecycleState::Destroying));
        assert!(store.in_transition("a"));

        store.complete_destruction("a");
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_claims_start_exactly_one_construction() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::thread;

        let store = Arc::new(SingletonStore::new());
        let started = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let started = Arc::clone(&started);
                thread::spawn(move || {
                    if let Ok(CreationTicket::Started) = store.begin_creation("shared") {
                        started.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }
}

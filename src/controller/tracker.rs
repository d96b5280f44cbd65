//! # Dependency Tracker
//!
//! Records which parents read which objects they do not own, so a change to
//! the read object re-enqueues every parent that depends on it.
//!
//! Registrations are leases. Every pass that performs the read renews the
//! lease; entries whose lease ran out are ignored by `lookup` and dropped by
//! `gc`. Parents that are deleted or stop reconciling fall out of the
//! registry on their own.
//!
//! The registry is a `DashMap` sharded by tracked key, so registrations and
//! lookups for unrelated keys do not contend.

use crate::store::ResourceKey;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;
use tokio::time::Instant;

/// One registration: `dependent` wants to hear about changes to `tracked`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackRequest {
    pub tracked: ResourceKey,
    pub dependent: ResourceKey,
    /// When the registration lapses unless renewed
    pub lease_expiry: Instant,
}

pub trait Tracker: Send + Sync + Debug {
    /// Register (or renew) interest of `dependent` in `tracked`
    fn track(&self, tracked: &ResourceKey, dependent: &ResourceKey);

    /// Live dependents of `tracked`, sorted
    fn lookup(&self, tracked: &ResourceKey) -> Vec<ResourceKey>;
}

#[derive(Debug)]
pub struct LeaseTracker {
    lease: Duration,
    entries: DashMap<ResourceKey, HashMap<ResourceKey, Instant>>,
}

impl LeaseTracker {
    pub fn new(lease: Duration) -> Self {
        Self {
            lease,
            entries: DashMap::new(),
        }
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Drop expired registrations; returns how many were removed
    pub fn gc(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, dependents| {
            let before = dependents.len();
            dependents.retain(|_, expiry| *expiry > now);
            removed += before - dependents.len();
            !dependents.is_empty()
        });
        removed
    }

    /// Number of live and not yet collected registrations
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Tracker for LeaseTracker {
    fn track(&self, tracked: &ResourceKey, dependent: &ResourceKey) {
        let expiry = Instant::now() + self.lease;
        self.entries
            .entry(tracked.clone())
            .or_default()
            .insert(dependent.clone(), expiry);
    }

    fn lookup(&self, tracked: &ResourceKey) -> Vec<ResourceKey> {
        let now = Instant::now();
        let mut dependents: Vec<ResourceKey> = self
            .entries
            .get(tracked)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|(_, expiry)| **expiry > now)
                    .map(|(dependent, _)| dependent.clone())
                    .collect()
            })
            .unwrap_or_default();
        dependents.sort();
        dependents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;

    fn key(name: &str) -> ResourceKey {
        ResourceKey::of::<ConfigMap>("default", name)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_and_expiry() {
        let tracker = LeaseTracker::new(Duration::from_secs(30));
        let shared = key("shared");
        tracker.track(&shared, &key("d1"));
        tokio::time::advance(Duration::from_secs(10)).await;
        tracker.track(&shared, &key("d2"));
        assert_eq!(tracker.lookup(&shared), vec![key("d1"), key("d2")]);

        // d1 registered at t=0 expires at t=30, d2 lives until t=40
        tokio::time::advance(Duration::from_secs(25)).await;
        assert_eq!(tracker.lookup(&shared), vec![key("d2")]);
        assert_eq!(tracker.gc(), 1);
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_renews_lease() {
        let tracker = LeaseTracker::new(Duration::from_secs(30));
        let tracked = key("images");
        tracker.track(&tracked, &key("parent"));
        tokio::time::advance(Duration::from_secs(20)).await;
        tracker.track(&tracked, &key("parent"));
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(tracker.lookup(&tracked), vec![key("parent")]);
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gc_removes_empty_keys() {
        let tracker = LeaseTracker::new(Duration::from_secs(5));
        tracker.track(&key("a"), &key("parent"));
        tracker.track(&key("b"), &key("parent"));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(tracker.gc(), 2);
        assert!(tracker.is_empty());
        assert!(tracker.lookup(&key("a")).is_empty());
    }

    #[test]
    fn test_concurrent_registration() {
        let tracker = std::sync::Arc::new(LeaseTracker::new(Duration::from_secs(60)));
        let shared = key("shared");
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = std::sync::Arc::clone(&tracker);
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        tracker.track(&shared, &key(&format!("d{i}-{j}")));
                        tracker.track(&key(&format!("own{i}")), &key(&format!("d{i}-{j}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.lookup(&shared).len(), 400);
    }
}

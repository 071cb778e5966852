//! Lease-based leader election over a store object.
//!
//! All manager replicas race to write one election record; the winner
//! renews it ahead of the lease expiry, everyone else observes. The
//! store's optimistic concurrency is the only arbiter: a Conflict on
//! replace means someone else moved first.
//!
//! Expiry is judged on a local clock: a candidate starts its timer when
//! it first observes a given resourceVersion of the record, so skewed
//! wall clocks between replicas cannot cause a premature takeover.

use chrono::{DateTime, Utc};
use models::{DynamicObject, Metadata};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use store_client::{StoreClient, StoreError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const ELECTIONS_PATH: &str = "elections";

/// Contents of the election record object's spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionRecord {
    pub holder_identity: String,
    /// Persisted at millisecond resolution so sub-second leases keep a
    /// non-zero expiry window.
    pub lease_duration_ms: u64,
    pub acquire_time: DateTime<Utc>,
    pub renew_time: DateTime<Utc>,
    pub leader_transitions: u64,
}

#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// Name of the record object all replicas contend on.
    pub name: String,
    /// This replica's identity, written into the record it holds.
    pub identity: String,
    /// How long a record stays valid after its last observed change.
    pub lease_duration: Duration,
    /// How long the leader keeps retrying a failed renewal before
    /// stepping down.
    pub renew_deadline: Duration,
    /// Pause between acquisition or renewal attempts.
    pub retry_period: Duration,
}

impl ElectionConfig {
    pub fn new(name: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: identity.into(),
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(2),
        }
    }
}

struct Observation {
    resource_version: Option<String>,
    at: Instant,
}

/// One replica's view of the election.
pub struct LeaderElector {
    store: Arc<dyn StoreClient>,
    config: ElectionConfig,
    observed: Mutex<Observation>,
}

impl LeaderElector {
    pub fn new(store: Arc<dyn StoreClient>, config: ElectionConfig) -> Self {
        Self {
            store,
            config,
            observed: Mutex::new(Observation {
                resource_version: None,
                at: Instant::now(),
            }),
        }
    }

    pub fn identity(&self) -> &str {
        &self.config.identity
    }

    /// One acquisition or renewal attempt. Returns true while this
    /// replica holds the lease.
    pub async fn try_acquire_or_renew(&self) -> bool {
        let now = Utc::now();
        let current = match self
            .store
            .get(ELECTIONS_PATH, None, &self.config.name)
            .await
        {
            Ok(obj) => obj,
            Err(e) if e.is_not_found() => {
                return self.create_record(now).await;
            }
            Err(error) => {
                warn!(%error, "failed to fetch election record");
                return false;
            }
        };

        let record: ElectionRecord = match serde_json::from_value(current.spec.clone()) {
            Ok(r) => r,
            Err(error) => {
                warn!(%error, "malformed election record, attempting takeover");
                return self.replace_record(current, now, true).await;
            }
        };

        // Restart the local expiry timer whenever the record changes
        // under us, whoever wrote it.
        let lease_fresh = {
            let mut observed = self.observed.lock().unwrap();
            if observed.resource_version != current.metadata.resource_version {
                observed.resource_version = current.metadata.resource_version.clone();
                observed.at = Instant::now();
            }
            observed.at.elapsed() < Duration::from_millis(record.lease_duration_ms)
        };

        if record.holder_identity != self.config.identity {
            if lease_fresh {
                debug!(holder = %record.holder_identity, "lease held by another replica");
                return false;
            }
            info!(previous = %record.holder_identity, "lease expired, attempting takeover");
            return self.replace_record(current, now, true).await;
        }

        self.replace_record(current, now, false).await
    }

    async fn create_record(&self, now: DateTime<Utc>) -> bool {
        let record = ElectionRecord {
            holder_identity: self.config.identity.clone(),
            lease_duration_ms: self.config.lease_duration.as_millis() as u64,
            acquire_time: now,
            renew_time: now,
            leader_transitions: 0,
        };
        let object = DynamicObject {
            api_version: "vcops.io/v1".to_string(),
            kind: "ElectionRecord".to_string(),
            metadata: Metadata::named(&self.config.name),
            spec: match serde_json::to_value(&record) {
                Ok(v) => v,
                Err(_) => return false,
            },
            status: None,
        };
        match self.store.create(ELECTIONS_PATH, None, &object).await {
            Ok(created) => {
                self.note(created.metadata.resource_version);
                info!(identity = %self.config.identity, "acquired leadership (new record)");
                true
            }
            Err(StoreError::Conflict(_)) => false,
            Err(error) => {
                warn!(%error, "failed to create election record");
                false
            }
        }
    }

    async fn replace_record(
        &self,
        mut current: DynamicObject,
        now: DateTime<Utc>,
        takeover: bool,
    ) -> bool {
        let previous: Option<ElectionRecord> = serde_json::from_value(current.spec.clone()).ok();
        let record = ElectionRecord {
            holder_identity: self.config.identity.clone(),
            lease_duration_ms: self.config.lease_duration.as_millis() as u64,
            acquire_time: if takeover {
                now
            } else {
                previous.as_ref().map(|r| r.acquire_time).unwrap_or(now)
            },
            renew_time: now,
            leader_transitions: previous
                .as_ref()
                .map(|r| r.leader_transitions + u64::from(takeover))
                .unwrap_or(0),
        };
        current.spec = match serde_json::to_value(&record) {
            Ok(v) => v,
            Err(_) => return false,
        };
        let name = current.metadata.name.clone();
        match self
            .store
            .replace(ELECTIONS_PATH, None, &name, &current)
            .await
        {
            Ok(saved) => {
                self.note(saved.metadata.resource_version);
                if takeover {
                    info!(identity = %self.config.identity, "acquired leadership");
                }
                true
            }
            Err(StoreError::Conflict(_)) => {
                debug!("lost election race");
                false
            }
            Err(error) => {
                warn!(%error, "failed to update election record");
                false
            }
        }
    }

    fn note(&self, resource_version: Option<String>) {
        let mut observed = self.observed.lock().unwrap();
        observed.resource_version = resource_version;
        observed.at = Instant::now();
    }

    /// Blocks until leadership is acquired, then renews it until lost or
    /// stopped. Publishes the current state on `leading`.
    ///
    /// Returns `true` if stopped externally while holding or seeking the
    /// lease, `false` if leadership was lost.
    pub async fn run(
        &self,
        mut stop: watch::Receiver<bool>,
        leading: &watch::Sender<bool>,
    ) -> bool {
        // Acquisition phase.
        loop {
            if *stop.borrow() {
                return true;
            }
            if self.try_acquire_or_renew().await {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_period) => {}
                _ = stop.changed() => return true,
            }
        }
        let _ = leading.send(true);

        // Renewal phase.
        let mut last_renew = Instant::now();
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_period) => {}
                _ = stop.changed() => {
                    let _ = leading.send(false);
                    return true;
                }
            }
            if self.try_acquire_or_renew().await {
                last_renew = Instant::now();
            } else if last_renew.elapsed() >= self.config.renew_deadline {
                warn!(identity = %self.config.identity, "failed to renew lease, stepping down");
                let _ = leading.send(false);
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store_client::MockStoreClient;

    fn config(identity: &str) -> ElectionConfig {
        ElectionConfig {
            name: "manager-leader".to_string(),
            identity: identity.to_string(),
            lease_duration: Duration::from_millis(200),
            renew_deadline: Duration::from_millis(150),
            retry_period: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn first_candidate_acquires() {
        let store: Arc<dyn StoreClient> = Arc::new(MockStoreClient::new());
        let elector = LeaderElector::new(store, config("a"));
        assert!(elector.try_acquire_or_renew().await);
        // Renewal by the holder succeeds regardless of lease age.
        assert!(elector.try_acquire_or_renew().await);
    }

    #[tokio::test]
    async fn sub_second_lease_keeps_its_expiry_window() {
        let store: Arc<dyn StoreClient> = Arc::new(MockStoreClient::new());
        let a = LeaderElector::new(store.clone(), config("a"));
        assert!(a.try_acquire_or_renew().await);

        // The record must persist the lease at full resolution, not a
        // truncated whole-second value.
        let record = store
            .get("elections", None, "manager-leader")
            .await
            .unwrap();
        let parsed: ElectionRecord = serde_json::from_value(record.spec).unwrap();
        assert_eq!(parsed.lease_duration_ms, 200);

        // A rival observing the fresh lease must not judge it expired.
        let b = LeaderElector::new(store.clone(), config("b"));
        assert!(!b.try_acquire_or_renew().await);
        let record = store
            .get("elections", None, "manager-leader")
            .await
            .unwrap();
        let parsed: ElectionRecord = serde_json::from_value(record.spec).unwrap();
        assert_eq!(parsed.holder_identity, "a");
    }

    #[tokio::test]
    async fn second_candidate_blocked_while_lease_fresh() {
        let store: Arc<dyn StoreClient> = Arc::new(MockStoreClient::new());
        let a = LeaderElector::new(store.clone(), config("a"));
        let b = LeaderElector::new(store, config("b"));

        assert!(a.try_acquire_or_renew().await);
        assert!(!b.try_acquire_or_renew().await);
    }

    #[tokio::test]
    async fn takeover_after_lease_expires() {
        let store: Arc<dyn StoreClient> = Arc::new(MockStoreClient::new());
        let a = LeaderElector::new(store.clone(), config("a"));
        let b = LeaderElector::new(store.clone(), config("b"));

        assert!(a.try_acquire_or_renew().await);
        // b starts its expiry timer at first observation.
        assert!(!b.try_acquire_or_renew().await);

        // a stops renewing; once b has observed no change for a full
        // lease duration it may take over.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(b.try_acquire_or_renew().await);

        let record = store
            .get("elections", None, "manager-leader")
            .await
            .unwrap();
        let parsed: ElectionRecord = serde_json::from_value(record.spec).unwrap();
        assert_eq!(parsed.holder_identity, "b");
        assert_eq!(parsed.leader_transitions, 1);
    }

    #[tokio::test]
    async fn renewal_resets_observers_timers() {
        let store: Arc<dyn StoreClient> = Arc::new(MockStoreClient::new());
        let a = LeaderElector::new(store.clone(), config("a"));
        let b = LeaderElector::new(store, config("b"));

        assert!(a.try_acquire_or_renew().await);
        assert!(!b.try_acquire_or_renew().await);

        // a keeps renewing; each renewal changes the resourceVersion and
        // restarts b's local expiry timer.
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(a.try_acquire_or_renew().await);
            assert!(!b.try_acquire_or_renew().await);
        }
    }

    #[tokio::test]
    async fn concurrent_candidates_elect_exactly_one() {
        let store: Arc<dyn StoreClient> = Arc::new(MockStoreClient::new());
        let mut handles = Vec::new();
        for i in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let elector = LeaderElector::new(store, config(&format!("c{}", i)));
                elector.try_acquire_or_renew().await
            }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn run_publishes_leadership_and_honors_stop() {
        let store: Arc<dyn StoreClient> = Arc::new(MockStoreClient::new());
        let elector = Arc::new(LeaderElector::new(store, config("a")));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (leading_tx, mut leading_rx) = watch::channel(false);

        let handle = {
            let elector = elector.clone();
            tokio::spawn(async move { elector.run(stop_rx, &leading_tx).await })
        };

        leading_rx.changed().await.unwrap();
        assert!(*leading_rx.borrow());

        stop_tx.send(true).unwrap();
        assert!(handle.await.unwrap());
        assert!(!*leading_rx.borrow());
    }
}

//! Manager wiring: one controller per resource type, gated by leader
//! election.
//!
//! The elector's leadership signal hard-gates controller launch: workers
//! only start once this replica holds the lease, and losing the lease
//! stops them. Single-replica deployments can bypass the gate via
//! configuration.

use crate::controller::Controller;
use crate::election::{ElectionConfig, LeaderElector};
use crate::error::ControllerError;
use crate::informer::Informer;
use crate::reconciler::compute::{
    FlavorReconciler, ImageReconciler, InstanceReconciler, NetworkPortReconciler,
    NetworkReconciler, RegionReconciler, VolumeReconciler, ZoneReconciler,
};
use crate::reconciler::iam::{
    IamPolicyReconciler, IamRoleReconciler, ProjectMemberReconciler, QuotaReconciler,
    ServiceAccountReconciler,
};
use crate::reconciler::Context;
use models::{
    Flavor, IamPolicy, IamRole, Image, Instance, Network, NetworkPort, ProjectMember, Quota,
    Region, ResourceMeta, ServiceAccount, Volume, Zone,
};
use std::sync::Arc;
use std::time::Duration;
use store_client::StoreClient;
use tokio::sync::watch;
use tracing::{info, warn};
use vi_client::ViClient;

const ELECTION_RECORD_NAME: &str = "manager-leader";

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub workers: usize,
    pub resync: Duration,
    pub election_disabled: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            resync: Duration::from_secs(300),
            election_disabled: false,
        }
    }
}

pub struct Manager {
    ctx: Arc<Context>,
    config: ManagerConfig,
}

impl Manager {
    pub fn new(
        store: Arc<dyn StoreClient>,
        vi: Arc<dyn ViClient>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            ctx: Context::new(store, vi),
            config,
        }
    }

    fn build_controllers(&self) -> Vec<Arc<Controller>> {
        let ctx = &self.ctx;
        let informer = |path: &'static str| {
            Informer::new(ctx.store.clone(), path).with_resync(self.config.resync)
        };
        let workers = self.config.workers;
        vec![
            Arc::new(
                Controller::new("region", informer(Region::PLURAL), RegionReconciler::new(ctx.clone()))
                    .with_workers(workers),
            ),
            Arc::new(
                Controller::new("zone", informer(Zone::PLURAL), ZoneReconciler::new(ctx.clone()))
                    .with_workers(workers),
            ),
            Arc::new(
                Controller::new("flavor", informer(Flavor::PLURAL), FlavorReconciler::new(ctx.clone()))
                    .with_workers(workers),
            ),
            Arc::new(
                Controller::new("network", informer(Network::PLURAL), NetworkReconciler::new(ctx.clone()))
                    .with_workers(workers),
            ),
            Arc::new(
                Controller::new(
                    "networkport",
                    informer(NetworkPort::PLURAL),
                    NetworkPortReconciler::new(ctx.clone()),
                )
                .with_workers(workers),
            ),
            Arc::new(
                Controller::new("image", informer(Image::PLURAL), ImageReconciler::new(ctx.clone()))
                    .with_workers(workers),
            ),
            Arc::new(
                Controller::new(
                    "instance",
                    informer(Instance::PLURAL),
                    InstanceReconciler::new(ctx.clone()),
                )
                .with_workers(workers),
            ),
            Arc::new(
                Controller::new("volume", informer(Volume::PLURAL), VolumeReconciler::new(ctx.clone()))
                    .with_workers(workers),
            ),
            Arc::new(
                Controller::new("iamrole", informer(IamRole::PLURAL), IamRoleReconciler::new(ctx.clone()))
                    .with_workers(workers),
            ),
            Arc::new(
                Controller::new(
                    "iampolicy",
                    informer(IamPolicy::PLURAL),
                    IamPolicyReconciler::new(ctx.clone()),
                )
                .with_workers(workers),
            ),
            Arc::new(
                Controller::new(
                    "serviceaccount",
                    informer(ServiceAccount::PLURAL),
                    ServiceAccountReconciler::new(ctx.clone()),
                )
                .with_workers(workers),
            ),
            Arc::new(
                Controller::new("quota", informer(Quota::PLURAL), QuotaReconciler::new(ctx.clone()))
                    .with_workers(workers),
            ),
            Arc::new(
                Controller::new(
                    "projectmember",
                    informer(ProjectMember::PLURAL),
                    ProjectMemberReconciler::new(ctx.clone()),
                )
                .with_workers(workers),
            ),
        ]
    }

    /// Launches every controller; returns the stop handle and the join
    /// handles.
    fn launch_controllers(
        &self,
    ) -> (watch::Sender<bool>, Vec<tokio::task::JoinHandle<()>>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handles = self
            .build_controllers()
            .into_iter()
            .map(|c| tokio::spawn(c.run(stop_rx.clone())))
            .collect();
        info!("controllers launched");
        (stop_tx, handles)
    }

    async fn stop_controllers(
        stop_tx: watch::Sender<bool>,
        handles: Vec<tokio::task::JoinHandle<()>>,
    ) {
        let _ = stop_tx.send(true);
        for handle in handles {
            let _ = handle.await;
        }
        info!("controllers stopped");
    }

    /// Runs until `stop` flips to true. With election enabled this
    /// acquires and holds the lease for as long as it runs; a lost lease
    /// stops the controllers and returns to the acquisition loop.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) -> Result<(), ControllerError> {
        if self.config.election_disabled {
            warn!("leader election disabled, assuming single replica");
            let (stop_tx, handles) = self.launch_controllers();
            let _ = stop.changed().await;
            Self::stop_controllers(stop_tx, handles).await;
            return Ok(());
        }

        let identity = uuid::Uuid::new_v4().to_string();
        info!(%identity, "joining leader election");
        let elector = LeaderElector::new(
            self.ctx.store.clone(),
            ElectionConfig::new(ELECTION_RECORD_NAME, identity),
        );

        loop {
            let (leading_tx, mut leading_rx) = watch::channel(false);
            let election = elector.run(stop.clone(), &leading_tx);
            tokio::pin!(election);

            // Wait to become leader (or to be stopped while waiting).
            let mut controllers: Option<(watch::Sender<bool>, Vec<_>)> = None;
            let stopped = loop {
                tokio::select! {
                    outcome = &mut election => break outcome,
                    changed = leading_rx.changed() => {
                        if changed.is_err() {
                            continue;
                        }
                        if *leading_rx.borrow() && controllers.is_none() {
                            controllers = Some(self.launch_controllers());
                        }
                    }
                }
            };

            if let Some((stop_tx, handles)) = controllers {
                Self::stop_controllers(stop_tx, handles).await;
            }
            if stopped {
                // External shutdown.
                return Ok(());
            }
            warn!("lost leadership, re-entering election");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store_client::MockStoreClient;
    use vi_client::MockViClient;

    #[tokio::test]
    async fn election_disabled_runs_until_stopped() {
        let manager = Manager::new(
            Arc::new(MockStoreClient::new()),
            Arc::new(MockViClient::new()),
            ManagerConfig {
                election_disabled: true,
                ..ManagerConfig::default()
            },
        );
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { manager.run(stop_rx).await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("manager must stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn election_gates_controller_launch() {
        let store = MockStoreClient::new();
        let manager = Manager::new(
            Arc::new(store.clone()),
            Arc::new(MockViClient::new()),
            ManagerConfig::default(),
        );
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { manager.run(stop_rx).await });

        // The manager wins the (empty) election and writes the record.
        for _ in 0..100 {
            if store.contains("elections", ELECTION_RECORD_NAME) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(store.contains("elections", ELECTION_RECORD_NAME));

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("manager must stop")
            .unwrap()
            .unwrap();
    }
}

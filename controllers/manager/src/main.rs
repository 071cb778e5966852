//! VCops Manager
//!
//! Reconciliation controllers driving virtualization infrastructure
//! toward the desired state declared in the object store:
//! - compute: Region, Zone, Flavor, Network, NetworkPort, Image,
//!   Instance, Volume
//! - iam: IamRole, IamPolicy, ServiceAccount, Quota, ProjectMember
//!
//! Exactly one replica reconciles at a time, enforced by lease-based
//! leader election against the store.

mod cache;
mod controller;
mod election;
mod error;
mod informer;
mod manager;
mod placement;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod workqueue;

use crate::error::ControllerError;
use crate::manager::{Manager, ManagerConfig};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use store_client::HttpStoreClient;
use tokio::sync::watch;
use tracing::info;
use vi_client::HttpViClient;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting VCops Manager");

    // Load configuration from environment variables
    let store_url =
        env::var("STORE_URL").unwrap_or_else(|_| "http://counter-api:8080/v1".to_string());
    let store_token = env::var("STORE_TOKEN").map_err(|_| {
        ControllerError::InvalidConfig("STORE_TOKEN environment variable is required".to_string())
    })?;
    let vi_url = env::var("VI_URL").unwrap_or_else(|_| "http://vi-gateway:8080/v1".to_string());
    let vi_username = env::var("VI_USERNAME").map_err(|_| {
        ControllerError::InvalidConfig("VI_USERNAME environment variable is required".to_string())
    })?;
    let vi_password = env::var("VI_PASSWORD").map_err(|_| {
        ControllerError::InvalidConfig("VI_PASSWORD environment variable is required".to_string())
    })?;
    let workers = env::var("WORKER_COUNT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let resync_seconds = env::var("RESYNC_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(300);
    let election_disabled = env::var("ELECTION_DISABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    info!("Configuration:");
    info!("  Store URL: {}", store_url);
    info!("  VI URL: {}", vi_url);
    info!("  Workers per controller: {}", workers);
    info!("  Resync period: {}s", resync_seconds);
    info!("  Leader election: {}", if election_disabled { "disabled" } else { "enabled" });

    let store = Arc::new(HttpStoreClient::new(store_url, Some(store_token))?);
    let vi = Arc::new(HttpViClient::new(vi_url, vi_username, vi_password)?);
    let manager = Manager::new(
        store,
        vi,
        ManagerConfig {
            workers,
            resync: Duration::from_secs(resync_seconds),
            election_disabled,
        },
    );

    // Stop everything cleanly on ctrl-c.
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = stop_tx.send(true);
        }
    });

    manager.run(stop_rx).await?;
    info!("Manager stopped");
    Ok(())
}

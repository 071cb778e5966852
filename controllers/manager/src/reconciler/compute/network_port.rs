//! NetworkPort reconciler.
//!
//! Allocates an IP (and MAC) on the owning network. Deletion blocks while
//! an instance is still wired to the port (`vcops.io/instance` label,
//! written and cleared by the instance reconciler).

use crate::controller::Reconciler;
use crate::error::ControllerError;
use crate::reconciler::compute::network::Cidr;
use crate::reconciler::{physical_delete, typed, Context};
use models::{
    DynamicObject, Network, NetworkPort, ResourceState, FINALIZER, LABEL_INSTANCE, LABEL_NETWORK,
    LABEL_PROJECT,
};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info};

pub struct NetworkPortReconciler {
    ctx: Arc<Context>,
}

impl NetworkPortReconciler {
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }

    /// IPs already claimed by sibling ports on the same network.
    async fn claimed_ips(
        &self,
        network: &str,
        except: &str,
    ) -> Result<HashSet<Ipv4Addr>, ControllerError> {
        let siblings = self
            .ctx
            .api::<NetworkPort>()
            .list(&[(LABEL_NETWORK, network)])
            .await?;
        Ok(siblings
            .iter()
            .filter(|p| p.metadata.name != except)
            .filter_map(|p| p.status.as_ref())
            .filter_map(|s| s.ip.as_deref())
            .filter_map(|ip| ip.parse().ok())
            .collect())
    }

    async fn creating(&self, port: &mut NetworkPort) -> Result<(), ControllerError> {
        let Some(namespace) = port.metadata.namespace.clone() else {
            port.set_error("network port must be namespaced");
            return Ok(());
        };
        let network = self
            .ctx
            .api_in::<Network>(&namespace)
            .get_opt(&port.spec.network)
            .await?;
        let Some(network) = network else {
            port.set_error(format!("network {} not found", port.spec.network));
            return Ok(());
        };
        if network.state() != ResourceState::Created {
            debug!(port = %port.metadata.name, network = %network.metadata.name, "waiting for network");
            return Ok(());
        }
        let Some(cidr) = Cidr::parse(&network.spec.cidr) else {
            port.set_error(format!("network {} has invalid CIDR", network.metadata.name));
            return Ok(());
        };

        let mut taken = self
            .claimed_ips(&port.spec.network, &port.metadata.name)
            .await?;
        if let Some(gw) = network.spec.gateway.as_deref().and_then(|g| g.parse().ok()) {
            taken.insert(gw);
        }

        let ip = match &port.spec.ip {
            Some(requested) => {
                let Ok(addr) = requested.parse::<Ipv4Addr>() else {
                    port.set_error(format!("invalid requested IP {}", requested));
                    return Ok(());
                };
                if !cidr.contains(addr) {
                    port.set_error(format!("requested IP {} outside {}", addr, network.spec.cidr));
                    return Ok(());
                }
                if taken.contains(&addr) {
                    port.set_error(format!("requested IP {} already allocated", addr));
                    return Ok(());
                }
                addr
            }
            None => match cidr.hosts().find(|ip| !taken.contains(ip)) {
                Some(ip) => ip,
                None => {
                    port.set_error(format!("no free IP left in {}", network.spec.cidr));
                    return Ok(());
                }
            },
        };

        let mac = port.spec.mac.clone().unwrap_or_else(generate_mac);
        info!(port = %port.metadata.name, ip = %ip, "port allocated");
        let status = port.status_mut();
        status.ip = Some(ip.to_string());
        status.mac = Some(mac);
        port.set_state(ResourceState::Created);
        Ok(())
    }

    async fn created(&self, port: &mut NetworkPort) -> Result<(), ControllerError> {
        let Some(namespace) = port.metadata.namespace.clone() else {
            return Ok(());
        };
        if self
            .ctx
            .api_in::<Network>(&namespace)
            .get_opt(&port.spec.network)
            .await?
            .is_none()
        {
            port.set_error(format!("network {} disappeared", port.spec.network));
        }
        Ok(())
    }

    fn deleting(&self, port: &mut NetworkPort) {
        if port.metadata.label(LABEL_INSTANCE).is_some() {
            debug!(port = %port.metadata.name, "deletion blocked by attached instance");
            return;
        }
        port.set_state(ResourceState::Deleted);
    }
}

/// Locally-administered unicast MAC.
fn generate_mac() -> String {
    let bytes = uuid::Uuid::new_v4();
    let b = bytes.as_bytes();
    format!("52:54:00:{:02x}:{:02x}:{:02x}", b[0], b[1], b[2])
}

#[async_trait::async_trait]
impl Reconciler for NetworkPortReconciler {
    async fn reconcile(
        &self,
        key: &str,
        object: Option<DynamicObject>,
    ) -> Result<(), ControllerError> {
        let Some(object) = object else {
            return Ok(());
        };
        let mut port: NetworkPort = typed(key, &object)?;
        let state = port.state();
        let before = port.clone();
        let api = self.ctx.api::<NetworkPort>();

        match state {
            ResourceState::ToCreate => {
                port.metadata.add_finalizer(FINALIZER);
                let network = port.spec.network.clone();
                port.metadata.set_label(LABEL_NETWORK, network);
                if let Some(ns) = port.metadata.namespace.clone() {
                    port.metadata.set_label(LABEL_PROJECT, ns);
                }
                port.set_state(ResourceState::Creating);
            }
            ResourceState::Creating => self.creating(&mut port).await?,
            ResourceState::Created => self.created(&mut port).await?,
            ResourceState::ToDelete => port.set_state(ResourceState::Deleting),
            ResourceState::Deleting => self.deleting(&mut port),
            ResourceState::Deleted => return physical_delete(&api, port).await,
            ResourceState::Error => return Ok(()),
        }

        if port != before {
            api.save(&port).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_mac_is_local_unicast() {
        let mac = generate_mac();
        assert!(mac.starts_with("52:54:00:"));
        assert_eq!(mac.len(), 17);
    }
}

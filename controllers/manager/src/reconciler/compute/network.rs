//! Network reconciler.
//!
//! A project-scoped network backed by a hypervisor port group. The CIDR
//! math lives here too; NetworkPort allocation borrows it.

use crate::controller::Reconciler;
use crate::error::ControllerError;
use crate::reconciler::{physical_delete, typed, Context};
use models::{
    DynamicObject, Network, NetworkPort, ResourceMeta, ResourceState, FINALIZER, LABEL_NETWORK,
    LABEL_PROJECT,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info};

/// Parsed IPv4 CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: u32,
    prefix: u8,
}

impl Cidr {
    pub fn parse(s: &str) -> Option<Self> {
        let (addr, prefix) = s.split_once('/')?;
        let addr: Ipv4Addr = addr.parse().ok()?;
        let prefix: u8 = prefix.parse().ok()?;
        if prefix > 32 {
            return None;
        }
        let mask = Self::mask(prefix);
        Some(Self {
            network: u32::from(addr) & mask,
            prefix,
        })
    }

    fn mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix)
        }
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & Self::mask(self.prefix) == self.network
    }

    /// Host addresses in order, excluding the network and broadcast
    /// addresses.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let first = self.network + 1;
        let last = self.network | !Self::mask(self.prefix);
        // /31 and /32 have no allocatable hosts under this convention.
        (first..last).map(Ipv4Addr::from)
    }
}

pub struct NetworkReconciler {
    ctx: Arc<Context>,
}

impl NetworkReconciler {
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }

    async fn creating(&self, network: &mut Network) -> Result<(), ControllerError> {
        let Some(cidr) = Cidr::parse(&network.spec.cidr) else {
            network.set_error(format!("invalid CIDR {}", network.spec.cidr));
            return Ok(());
        };
        if let Some(gateway) = &network.spec.gateway {
            let valid = gateway
                .parse::<Ipv4Addr>()
                .map(|g| cidr.contains(g))
                .unwrap_or(false);
            if !valid {
                network.set_error(format!("gateway {} outside {}", gateway, network.spec.cidr));
                return Ok(());
            }
        }
        if self
            .ctx
            .vi
            .find_port_group(&network.spec.port_group)
            .await?
            .is_none()
        {
            network.set_error(format!("port group {} not found", network.spec.port_group));
            return Ok(());
        }
        info!(network = %network.metadata.name, "network provisioned");
        network.set_state(ResourceState::Created);
        Ok(())
    }

    async fn created(&self, network: &mut Network) -> Result<(), ControllerError> {
        if self
            .ctx
            .vi
            .find_port_group(&network.spec.port_group)
            .await?
            .is_none()
        {
            network.set_error(format!(
                "port group {} disappeared from inventory",
                network.spec.port_group
            ));
        }
        Ok(())
    }

    async fn deleting(&self, network: &mut Network) -> Result<(), ControllerError> {
        let blockers = self
            .ctx
            .count_labeled(NetworkPort::PLURAL, LABEL_NETWORK, &network.metadata.name)
            .await?;
        if blockers > 0 {
            debug!(network = %network.metadata.name, blockers, "deletion blocked by ports");
            return Ok(());
        }
        network.set_state(ResourceState::Deleted);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Reconciler for NetworkReconciler {
    async fn reconcile(
        &self,
        key: &str,
        object: Option<DynamicObject>,
    ) -> Result<(), ControllerError> {
        let Some(object) = object else {
            return Ok(());
        };
        let mut network: Network = typed(key, &object)?;
        let state = network.state();
        let before = network.clone();
        let api = self.ctx.api::<Network>();

        match state {
            ResourceState::ToCreate => {
                network.metadata.add_finalizer(FINALIZER);
                if let Some(ns) = network.metadata.namespace.clone() {
                    network.metadata.set_label(LABEL_PROJECT, ns);
                }
                network.set_state(ResourceState::Creating);
            }
            ResourceState::Creating => self.creating(&mut network).await?,
            ResourceState::Created => self.created(&mut network).await?,
            ResourceState::ToDelete => network.set_state(ResourceState::Deleting),
            ResourceState::Deleting => self.deleting(&mut network).await?,
            ResourceState::Deleted => return physical_delete(&api, network).await,
            ResourceState::Error => return Ok(()),
        }

        if network != before {
            api.save(&network).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_parse_and_contains() {
        let cidr = Cidr::parse("10.0.10.0/24").unwrap();
        assert!(cidr.contains("10.0.10.1".parse().unwrap()));
        assert!(cidr.contains("10.0.10.254".parse().unwrap()));
        assert!(!cidr.contains("10.0.11.1".parse().unwrap()));

        assert!(Cidr::parse("10.0.10.0").is_none());
        assert!(Cidr::parse("10.0.10.0/33").is_none());
        assert!(Cidr::parse("not-an-ip/24").is_none());
    }

    #[test]
    fn hosts_exclude_network_and_broadcast() {
        let cidr = Cidr::parse("192.168.1.0/30").unwrap();
        let hosts: Vec<Ipv4Addr> = cidr.hosts().collect();
        assert_eq!(
            hosts,
            vec![
                "192.168.1.1".parse::<Ipv4Addr>().unwrap(),
                "192.168.1.2".parse::<Ipv4Addr>().unwrap(),
            ]
        );
    }

    #[test]
    fn normalizes_host_bits() {
        let a = Cidr::parse("10.0.10.7/24").unwrap();
        let b = Cidr::parse("10.0.10.0/24").unwrap();
        assert_eq!(a, b);
    }
}

//! Zone placement admission.
//!
//! A zone can host a request if at least one of its cluster's hosts has
//! enough provisionable capacity left. Capacity is the host's raw
//! resources scaled by the zone's provisioning percentages (integer
//! floor). Scheduling is first-fit; the hypervisor's own scheduler picks
//! the actual host.

use models::Zone;
use vi_client::HostInfo;

/// Resource footprint of one VM already counted against a zone.
///
/// A VM whose backing exists but whose host is not yet known (mid-clone,
/// mid-migration) is charged against every host, so placement stays
/// conservative while the picture is incomplete.
#[derive(Debug, Clone)]
pub struct VmFootprint {
    pub host: Option<String>,
    pub vcpus: u32,
    pub ram_mb: u64,
}

/// True if some host in the zone's cluster can absorb the request.
pub fn zone_fits(
    zone: &Zone,
    hosts: &[HostInfo],
    existing: &[VmFootprint],
    vcpus: u32,
    ram_mb: u64,
) -> bool {
    if !zone.spec.schedulable {
        return false;
    }
    hosts.iter().any(|host| {
        let cap_vcpus =
            u64::from(host.cpu_threads) * u64::from(zone.spec.core_provision_percent) / 100;
        let cap_ram = host.memory_mb * u64::from(zone.spec.ram_provision_percent) / 100;

        let (used_vcpus, used_ram) = existing
            .iter()
            .filter(|vm| vm.host.as_deref().map(|h| h == host.name).unwrap_or(true))
            .fold((0u64, 0u64), |(v, r), vm| {
                (v + u64::from(vm.vcpus), r + vm.ram_mb)
            });

        used_vcpus + u64::from(vcpus) <= cap_vcpus && used_ram + ram_mb <= cap_ram
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{Metadata, ZoneSpec};

    fn zone(core_pct: u32, ram_pct: u32) -> Zone {
        Zone::new(
            Metadata::named("z1"),
            ZoneSpec {
                region: "r1".to_string(),
                cluster: "cluster-1".to_string(),
                schedulable: true,
                core_provision_percent: core_pct,
                ram_provision_percent: ram_pct,
            },
        )
    }

    fn host(name: &str, threads: u32, memory_mb: u64) -> HostInfo {
        HostInfo {
            name: name.to_string(),
            cpu_threads: threads,
            memory_mb,
        }
    }

    fn vm(host: Option<&str>, vcpus: u32, ram_mb: u64) -> VmFootprint {
        VmFootprint {
            host: host.map(String::from),
            vcpus,
            ram_mb,
        }
    }

    #[test]
    fn fits_when_capacity_remains() {
        let z = zone(100, 100);
        let hosts = [host("h1", 8, 16384)];
        let existing = [vm(Some("h1"), 4, 8192)];
        assert!(zone_fits(&z, &hosts, &existing, 4, 8192));
    }

    #[test]
    fn rejects_when_vcpus_exhausted() {
        let z = zone(100, 100);
        let hosts = [host("h1", 8, 16384)];
        let existing = [vm(Some("h1"), 4, 8192)];
        // One vCPU over, even though RAM is nearly free.
        assert!(!zone_fits(&z, &hosts, &existing, 5, 1));
    }

    #[test]
    fn overprovision_percent_scales_capacity() {
        let z = zone(200, 100);
        let hosts = [host("h1", 8, 16384)];
        let existing = [vm(Some("h1"), 12, 1024)];
        // 8 threads at 200% = 16 provisionable vCPUs.
        assert!(zone_fits(&z, &hosts, &existing, 4, 1024));
        assert!(!zone_fits(&z, &hosts, &existing, 5, 1024));
    }

    #[test]
    fn underprovision_percent_floors() {
        let z = zone(50, 50);
        let hosts = [host("h1", 5, 1000)];
        // floor(5*50/100) = 2 vCPUs, floor(1000*50/100) = 500 MB.
        assert!(zone_fits(&z, &hosts, &[], 2, 500));
        assert!(!zone_fits(&z, &hosts, &[], 3, 500));
    }

    #[test]
    fn hostless_vm_charged_to_every_host() {
        let z = zone(100, 100);
        let hosts = [host("h1", 8, 16384), host("h2", 8, 16384)];
        let existing = [vm(None, 6, 8192)];
        // The hostless VM might land anywhere, so both hosts only have
        // 2 vCPUs left.
        assert!(zone_fits(&z, &hosts, &existing, 2, 1024));
        assert!(!zone_fits(&z, &hosts, &existing, 3, 1024));
    }

    #[test]
    fn any_host_with_room_is_enough() {
        let z = zone(100, 100);
        let hosts = [host("h1", 2, 4096), host("h2", 16, 65536)];
        let existing = [vm(Some("h1"), 2, 4096)];
        assert!(zone_fits(&z, &hosts, &existing, 8, 32768));
    }

    #[test]
    fn unschedulable_zone_never_fits() {
        let mut z = zone(100, 100);
        z.spec.schedulable = false;
        let hosts = [host("h1", 64, 262144)];
        assert!(!zone_fits(&z, &hosts, &[], 1, 128));
    }

    #[test]
    fn empty_cluster_never_fits() {
        let z = zone(100, 100);
        assert!(!zone_fits(&z, &[], &[], 1, 128));
    }
}

use super::region::RegionReconciler;
use crate::test_utils::TestEnv;
use models::{
    Metadata, Region, RegionSpec, ResourceMeta, ResourceState, Zone, ZoneSpec, FINALIZER,
    LABEL_REGION,
};

fn region(name: &str) -> Region {
    Region::new(
        Metadata::named(name),
        RegionSpec {
            datacenter: "dc1".to_string(),
            datastore: "ds1".to_string(),
            folder: None,
            description: None,
        },
    )
}

fn zone_in(region: &str, name: &str) -> Zone {
    let mut metadata = Metadata::named(name);
    metadata.set_label(LABEL_REGION, region);
    Zone::new(
        metadata,
        ZoneSpec {
            region: region.to_string(),
            cluster: "cl1".to_string(),
            schedulable: true,
            core_provision_percent: 100,
            ram_provision_percent: 100,
        },
    )
}

#[tokio::test]
async fn provisions_through_lifecycle() {
    let env = TestEnv::new();
    env.seed_inventory();
    let reconciler = RegionReconciler::new(env.ctx.clone());
    env.create(&region("us-east")).await;

    // ToCreate -> Creating: finalizer added.
    env.step::<Region, _>(&*reconciler, "us-east").await;
    let r: Region = env.fetch("us-east").await.unwrap();
    assert_eq!(r.state(), ResourceState::Creating);
    assert!(r.metadata.has_finalizer(FINALIZER));

    // Creating -> Created once the inventory checks pass.
    env.step::<Region, _>(&*reconciler, "us-east").await;
    let r: Region = env.fetch("us-east").await.unwrap();
    assert_eq!(r.state(), ResourceState::Created);

    // Steady state is a fixed point.
    env.step::<Region, _>(&*reconciler, "us-east").await;
    let r: Region = env.fetch("us-east").await.unwrap();
    assert_eq!(r.state(), ResourceState::Created);
}

#[tokio::test]
async fn missing_datacenter_is_a_domain_error() {
    let env = TestEnv::new();
    // Datastore exists but the datacenter does not.
    env.vi.add_datastore("ds1");
    let reconciler = RegionReconciler::new(env.ctx.clone());
    env.create(&region("us-east")).await;

    env.step::<Region, _>(&*reconciler, "us-east").await;
    env.step::<Region, _>(&*reconciler, "us-east").await;

    let r: Region = env.fetch("us-east").await.unwrap();
    assert_eq!(r.state(), ResourceState::Error);
    let message = r.status.unwrap().error_message.unwrap();
    assert!(message.contains("dc1"), "unexpected message: {}", message);

    // Error is absorbing.
    env.step::<Region, _>(&*reconciler, "us-east").await;
    let r: Region = env.fetch("us-east").await.unwrap();
    assert_eq!(r.state(), ResourceState::Error);
}

#[tokio::test]
async fn deletion_blocked_until_zone_removed() {
    let env = TestEnv::new();
    env.seed_inventory();
    let reconciler = RegionReconciler::new(env.ctx.clone());
    env.create(&region("us-east")).await;
    env.step::<Region, _>(&*reconciler, "us-east").await;
    env.step::<Region, _>(&*reconciler, "us-east").await;

    env.create(&zone_in("us-east", "us-east-a")).await;

    env.mutate::<Region>("us-east", |r| r.set_state(ResourceState::ToDelete))
        .await;

    // ToDelete -> Deleting.
    env.step::<Region, _>(&*reconciler, "us-east").await;
    let r: Region = env.fetch("us-east").await.unwrap();
    assert_eq!(r.state(), ResourceState::Deleting);

    // Blocked: the zone still references the region.
    env.step::<Region, _>(&*reconciler, "us-east").await;
    let r: Region = env.fetch("us-east").await.unwrap();
    assert_eq!(r.state(), ResourceState::Deleting);

    // Zone physically removed; deletion proceeds.
    env.api::<Zone>().delete(None, "us-east-a").await.unwrap();
    env.step::<Region, _>(&*reconciler, "us-east").await;
    let r: Region = env.fetch("us-east").await.unwrap();
    assert_eq!(r.state(), ResourceState::Deleted);

    // Deleted performs the physical delete (finalizer removal + store
    // delete).
    env.step::<Region, _>(&*reconciler, "us-east").await;
    assert!(env.fetch::<Region>("us-east").await.is_none());
    assert!(!env.store.contains(Region::PLURAL, "us-east"));
}

#[tokio::test]
async fn inventory_drift_surfaces_as_error() {
    let env = TestEnv::new();
    env.seed_inventory();
    let reconciler = RegionReconciler::new(env.ctx.clone());
    env.create(&region("us-east")).await;
    env.step::<Region, _>(&*reconciler, "us-east").await;
    env.step::<Region, _>(&*reconciler, "us-east").await;

    env.vi.remove_datacenter("dc1");
    env.step::<Region, _>(&*reconciler, "us-east").await;
    let r: Region = env.fetch("us-east").await.unwrap();
    assert_eq!(r.state(), ResourceState::Error);
}

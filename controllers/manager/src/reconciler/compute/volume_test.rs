use super::volume::VolumeReconciler;
use crate::test_utils::TestEnv;
use models::{
    Instance, InstanceSpec, Metadata, Region, RegionSpec, ResourceMeta, ResourceState, Task,
    Volume, VolumeSpec, FINALIZER, LABEL_INSTANCE, LABEL_PROJECT, LABEL_REGION,
};
use vi_client::{ViClient, VmInfo};

fn created_region(name: &str) -> Region {
    let mut region = Region::new(
        Metadata::named(name),
        RegionSpec {
            datacenter: "dc1".to_string(),
            datastore: "ds1".to_string(),
            folder: None,
            description: None,
        },
    );
    region.set_state(ResourceState::Created);
    region
}

fn volume(name: &str, size_gb: u64) -> Volume {
    Volume::new(
        Metadata::namespaced(name, "acme"),
        VolumeSpec {
            region: "us-east".to_string(),
            size_gb,
        },
    )
}

/// An already-provisioned instance backing VM attachment tests.
fn running_instance(env: &TestEnv, name: &str) -> Instance {
    let vm = format!("acme-{}", name);
    env.vi.add_vm(VmInfo {
        name: vm.clone(),
        host: Some("host-a".to_string()),
        power_state: vi_client::VmPowerState::PoweredOn,
    });
    let mut instance = Instance::new(
        Metadata::namespaced(name, "acme"),
        InstanceSpec {
            region: "us-east".to_string(),
            zone: None,
            flavor: "m1.small".to_string(),
            image: "ubuntu".to_string(),
            ports: vec![],
            root_disk_gb: None,
        },
    );
    instance.set_state(ResourceState::Created);
    instance.status_mut().vm_name = Some(vm);
    instance
}

async fn provision(env: &TestEnv, reconciler: &VolumeReconciler, key: &str) {
    env.step::<Volume, _>(reconciler, key).await;
    env.step::<Volume, _>(reconciler, key).await;
    env.step::<Volume, _>(reconciler, key).await;
    let v: Volume = env.fetch(key).await.unwrap();
    assert_eq!(v.state(), ResourceState::Created);
}

#[tokio::test]
async fn provisions_by_polling_the_create_task() {
    let env = TestEnv::new();
    env.vi.set_auto_complete(false);
    env.seed_inventory();
    env.create(&created_region("us-east")).await;
    let reconciler = VolumeReconciler::new(env.ctx.clone());
    env.create(&volume("data-1", 10)).await;

    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    let v: Volume = env.fetch("acme/data-1").await.unwrap();
    assert_eq!(v.state(), ResourceState::Creating);
    assert!(v.metadata.has_finalizer(FINALIZER));
    assert_eq!(v.metadata.label(LABEL_REGION), Some("us-east"));
    assert_eq!(v.metadata.label(LABEL_PROJECT), Some("acme"));

    // Disk create submitted; the task handle is parked in status.
    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    let v: Volume = env.fetch("acme/data-1").await.unwrap();
    assert_eq!(v.state(), ResourceState::Creating);
    let task = v.task().unwrap();
    assert_eq!(task.name, "create");
    assert_eq!(task.kwarg_str("disk"), Some("acme-data-1"));
    let task_id = task.kwarg_str("task").unwrap().to_string();

    // Still running.
    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    let v: Volume = env.fetch("acme/data-1").await.unwrap();
    assert_eq!(v.state(), ResourceState::Creating);

    env.vi.complete_task(&task_id);
    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    let v: Volume = env.fetch("acme/data-1").await.unwrap();
    assert_eq!(v.state(), ResourceState::Created);
    assert!(v.task().is_none());
    assert_eq!(
        v.status.unwrap().backing_disk.as_deref(),
        Some("acme-data-1")
    );
    let disk = env.vi.find_disk("ds1", "acme-data-1").await.unwrap().unwrap();
    assert_eq!(disk.size_gb, 10);
}

#[tokio::test]
async fn failed_create_task_surfaces_as_error() {
    let env = TestEnv::new();
    env.vi.set_auto_complete(false);
    env.seed_inventory();
    env.create(&created_region("us-east")).await;
    let reconciler = VolumeReconciler::new(env.ctx.clone());
    env.create(&volume("data-1", 10)).await;

    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    let v: Volume = env.fetch("acme/data-1").await.unwrap();
    let task_id = v.task().unwrap().kwarg_str("task").unwrap().to_string();

    env.vi.fail_task(&task_id, "datastore full");
    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    let v: Volume = env.fetch("acme/data-1").await.unwrap();
    assert_eq!(v.state(), ResourceState::Error);
    assert!(v.task().is_none());
    let message = v.status.unwrap().base.error_message.unwrap();
    assert!(message.contains("datastore full"), "unexpected message: {}", message);
}

#[tokio::test]
async fn attach_and_detach_track_the_instance() {
    let env = TestEnv::new();
    env.seed_inventory();
    env.create(&created_region("us-east")).await;
    let reconciler = VolumeReconciler::new(env.ctx.clone());
    env.create(&running_instance(&env, "web-1")).await;
    env.create(&volume("data-1", 10)).await;
    provision(&env, &reconciler, "acme/data-1").await;

    env.mutate::<Volume>("acme/data-1", |v| {
        v.set_task(Some(Task::new("attach").with_kwarg("instance", "web-1")));
    })
    .await;
    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    let v: Volume = env.fetch("acme/data-1").await.unwrap();
    assert!(v.task().is_none());
    assert_eq!(v.metadata.label(LABEL_INSTANCE), Some("web-1"));
    assert_eq!(
        v.status.as_ref().unwrap().attached_to.as_deref(),
        Some("web-1")
    );
    let disk = env.vi.find_disk("ds1", "acme-data-1").await.unwrap().unwrap();
    assert_eq!(disk.attached_to.as_deref(), Some("acme-web-1"));

    env.mutate::<Volume>("acme/data-1", |v| {
        v.set_task(Some(Task::new("detach")));
    })
    .await;
    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    let v: Volume = env.fetch("acme/data-1").await.unwrap();
    assert!(v.task().is_none());
    assert_eq!(v.metadata.label(LABEL_INSTANCE), None);
    assert_eq!(v.status.as_ref().unwrap().attached_to, None);
    let disk = env.vi.find_disk("ds1", "acme-data-1").await.unwrap().unwrap();
    assert_eq!(disk.attached_to, None);
}

#[tokio::test]
async fn grow_runs_in_two_legs() {
    let env = TestEnv::new();
    env.seed_inventory();
    env.create(&created_region("us-east")).await;
    let reconciler = VolumeReconciler::new(env.ctx.clone());
    env.create(&volume("data-1", 10)).await;
    provision(&env, &reconciler, "acme/data-1").await;

    env.mutate::<Volume>("acme/data-1", |v| {
        v.set_task(Some(Task::new("grow").with_kwarg("sizeGb", 20)));
    })
    .await;

    // First leg submits the hypervisor task and records the new size.
    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    let v: Volume = env.fetch("acme/data-1").await.unwrap();
    assert_eq!(v.spec.size_gb, 20);
    let task = v.task().unwrap();
    assert_eq!(task.name, "grow");
    assert!(task.kwarg_str("task").is_some());

    // Second leg observes completion and clears the task.
    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    let v: Volume = env.fetch("acme/data-1").await.unwrap();
    assert!(v.task().is_none());
    assert_eq!(v.state(), ResourceState::Created);
    let disk = env.vi.find_disk("ds1", "acme-data-1").await.unwrap().unwrap();
    assert_eq!(disk.size_gb, 20);
}

#[tokio::test]
async fn clone_copies_the_disk_into_a_new_volume() {
    let env = TestEnv::new();
    env.seed_inventory();
    env.create(&created_region("us-east")).await;
    let reconciler = VolumeReconciler::new(env.ctx.clone());
    env.create(&volume("data-1", 10)).await;
    provision(&env, &reconciler, "acme/data-1").await;

    env.mutate::<Volume>("acme/data-1", |v| {
        v.set_task(Some(Task::new("clone").with_kwarg("name", "data-2")));
    })
    .await;

    // First leg submits the hypervisor copy and parks the task handle.
    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    let v: Volume = env.fetch("acme/data-1").await.unwrap();
    let task = v.task().unwrap();
    assert_eq!(task.name, "clone");
    assert!(task.kwarg_str("task").is_some());

    // Second leg observes completion and materializes the new volume.
    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    let v: Volume = env.fetch("acme/data-1").await.unwrap();
    assert!(v.task().is_none());
    assert_eq!(v.state(), ResourceState::Created);
    let copy: Volume = env.fetch("acme/data-2").await.unwrap();
    assert_eq!(copy.state(), ResourceState::Created);
    assert_eq!(copy.spec.size_gb, 10);
    assert_eq!(copy.metadata.label(LABEL_REGION), Some("us-east"));
    assert_eq!(
        copy.status.as_ref().unwrap().backing_disk.as_deref(),
        Some("acme-data-2")
    );
    let disk = env.vi.find_disk("ds1", "acme-data-2").await.unwrap().unwrap();
    assert_eq!(disk.size_gb, 10);
}

#[tokio::test]
async fn shrink_is_rejected() {
    let env = TestEnv::new();
    env.seed_inventory();
    env.create(&created_region("us-east")).await;
    let reconciler = VolumeReconciler::new(env.ctx.clone());
    env.create(&volume("data-1", 10)).await;
    provision(&env, &reconciler, "acme/data-1").await;

    env.mutate::<Volume>("acme/data-1", |v| {
        v.set_task(Some(Task::new("grow").with_kwarg("sizeGb", 5)));
    })
    .await;
    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    let v: Volume = env.fetch("acme/data-1").await.unwrap();
    assert_eq!(v.state(), ResourceState::Error);
    assert_eq!(v.spec.size_gb, 10);
}

#[tokio::test]
async fn deletion_detaches_then_removes_the_disk() {
    let env = TestEnv::new();
    env.seed_inventory();
    env.create(&created_region("us-east")).await;
    let reconciler = VolumeReconciler::new(env.ctx.clone());
    env.create(&running_instance(&env, "web-1")).await;
    env.create(&volume("data-1", 10)).await;
    provision(&env, &reconciler, "acme/data-1").await;

    env.mutate::<Volume>("acme/data-1", |v| {
        v.set_task(Some(Task::new("attach").with_kwarg("instance", "web-1")));
    })
    .await;
    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;

    env.mutate::<Volume>("acme/data-1", |v| v.set_state(ResourceState::ToDelete))
        .await;

    // ToDelete pre-stages a detach for attached volumes.
    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    let v: Volume = env.fetch("acme/data-1").await.unwrap();
    assert_eq!(v.state(), ResourceState::Deleting);
    assert_eq!(v.task().unwrap().name, "detach");

    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    let v: Volume = env.fetch("acme/data-1").await.unwrap();
    assert_eq!(v.state(), ResourceState::Deleted);
    assert!(env.vi.find_disk("ds1", "acme-data-1").await.unwrap().is_none());

    env.step::<Volume, _>(&*reconciler, "acme/data-1").await;
    assert!(!env.store.contains(Volume::PLURAL, "acme/data-1"));
}

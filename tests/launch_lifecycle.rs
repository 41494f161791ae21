//! Launch and lifecycle tests against the in-process control plane
//!
//! Every test gets its own state directory and its own mock cloud.

use std::time::Duration;

use nova_mlops::control_plane::{FailureConfig, MockControlPlane, Op, ResourceKind};
use nova_mlops::launch::{LaunchSpec, Orchestrator};
use nova_mlops::lifecycle::{self, CleanupOutcome, VolumeCleanup};
use nova_mlops::{Interrupt, JobStatus, OrchestratorError, StateStore, WaitPolicy};
use nova_payload::CloudInitTemplate;
use tempfile::TempDir;

fn fast() -> WaitPolicy {
    WaitPolicy::new(Duration::from_millis(1), Duration::from_secs(2))
}

fn spec(name: &str) -> LaunchSpec {
    LaunchSpec {
        job_name: name.to_string(),
        cloud: Some("devstack".to_string()),
        image: "ubuntu-22.04".to_string(),
        flavor: "m1.small".to_string(),
        network: "private".to_string(),
        volume_size_gb: None,
        volume_name: None,
        key_name: None,
        security_group: None,
    }
}

fn orchestrator<'a>(
    mock: &'a MockControlPlane,
    payload: &'a CloudInitTemplate,
    store: &'a StateStore,
) -> Orchestrator<'a> {
    Orchestrator::new(mock, payload, store).with_policies(fast(), fast())
}

// =============================================================================
// Resolution happens before any side effect
// =============================================================================

#[test]
fn test_missing_image_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    let mock = MockControlPlane::new();
    let payload = CloudInitTemplate::Training;

    let mut launch = spec("demo");
    launch.image = "no-such-image".to_string();
    launch.volume_size_gb = Some(5);

    let err = orchestrator(&mock, &payload, &store).launch(&launch).unwrap_err();
    match err {
        OrchestratorError::ResourceNotFound { kind, name } => {
            assert_eq!(kind, ResourceKind::Image);
            assert_eq!(name, "no-such-image");
        }
        other => panic!("expected ResourceNotFound, got {:?}", other),
    }
    assert!(mock.mutations().is_empty());
    assert!(store.read("demo").unwrap().is_none());
}

#[test]
fn test_missing_network_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    let mock = MockControlPlane::new();
    let payload = CloudInitTemplate::Training;

    let mut launch = spec("demo");
    launch.network = "public".to_string();
    launch.volume_size_gb = Some(5);

    let err = orchestrator(&mock, &payload, &store).launch(&launch).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(mock.mutations().is_empty());
}

#[test]
fn test_non_positive_volume_size_skips_volume() {
    for size in [0, -1, -100] {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let mock = MockControlPlane::new();
        let payload = CloudInitTemplate::Training;

        let mut launch = spec("demo");
        launch.volume_size_gb = Some(size);

        let result = orchestrator(&mock, &payload, &store).launch(&launch).unwrap();
        assert_eq!(result.volume_id, None);
        assert_eq!(mock.call_count(Op::CreateVolume), 0, "size {}", size);
        assert_eq!(mock.instance_requests()[0].volume, None);
    }
}

// =============================================================================
// Successful launches
// =============================================================================

#[test]
fn test_launch_writes_running_record() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    let mock = MockControlPlane::new();
    mock.script_instance_statuses(&["BUILD", "BUILD"]);
    let payload = CloudInitTemplate::Nlp;

    let mut launch = spec("sentiment");
    launch.volume_size_gb = Some(10);

    let result = orchestrator(&mock, &payload, &store).launch(&launch).unwrap();

    let state = store.read("sentiment").unwrap().unwrap();
    assert_eq!(state.status, JobStatus::Running);
    assert_eq!(state.server_id(), Some(result.server_id.as_str()));
    assert_eq!(state.volume_id(), result.volume_id.as_deref());
    assert_eq!(state.cloud(), Some("devstack"));

    let remote = state.remote().unwrap();
    assert_eq!(remote.run_id.as_ref(), Some(&result.run_id));
    assert_eq!(remote.image.as_deref(), Some("ubuntu-22.04"));
    let swift = remote.swift.as_ref().unwrap();
    assert!(swift.results_object.contains(result.run_id.as_str()));
    assert_eq!(swift.container, "mlops-artifacts");
}

#[test]
fn test_volume_attached_as_secondary_disk() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    let mock = MockControlPlane::new();
    let payload = CloudInitTemplate::Training;

    let mut launch = spec("demo");
    launch.volume_size_gb = Some(5);
    launch.volume_name = Some("scratch".to_string());

    let result = orchestrator(&mock, &payload, &store).launch(&launch).unwrap();

    let volumes = mock.volumes();
    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].name.as_deref(), Some("scratch"));
    assert_eq!(volumes[0].size, 5);

    let attachment = mock.instance_requests()[0].volume.clone().unwrap();
    assert_eq!(Some(attachment.volume_id), result.volume_id);
    assert_eq!(attachment.boot_index, -1);
    assert!(!attachment.delete_on_termination);
}

#[test]
fn test_two_launches_get_distinct_runs() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    let mock = MockControlPlane::new();
    let payload = CloudInitTemplate::Training;
    let orch = orchestrator(&mock, &payload, &store);

    let first = orch.launch(&spec("demo")).unwrap();
    let second = orch.launch(&spec("demo")).unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_ne!(first.server_name, second.server_name);
    assert_ne!(first.destinations, second.destinations);

    // Last launch wins the record
    let state = store.read("demo").unwrap().unwrap();
    assert_eq!(state.server_id(), Some(second.server_id.as_str()));
}

#[test]
fn test_payload_carries_run_id_and_options_pass_through() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    let mock = MockControlPlane::new();
    let payload = CloudInitTemplate::Training;

    let mut launch = spec("demo");
    launch.key_name = Some("ops-key".to_string());
    launch.security_group = Some("ssh-only".to_string());

    let result = orchestrator(&mock, &payload, &store).launch(&launch).unwrap();

    let request = &mock.instance_requests()[0];
    assert!(request.user_data.contains(result.run_id.as_str()));
    assert!(request.user_data.starts_with("#cloud-config"));
    assert_eq!(request.key_name.as_deref(), Some("ops-key"));
    assert_eq!(request.security_group.as_deref(), Some("ssh-only"));
    assert_eq!(request.image_id, "img-ubuntu");
    assert_eq!(request.flavor_id, "flv-small");
    assert_eq!(request.network_id, "net-private");
}

// =============================================================================
// Provisioning failures
// =============================================================================

#[test]
fn test_volume_error_stops_before_instance() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    let mock = MockControlPlane::new();
    mock.script_volume_statuses(&["creating", "error"]);
    let payload = CloudInitTemplate::Training;

    let mut launch = spec("demo");
    launch.volume_size_gb = Some(5);

    let err = orchestrator(&mock, &payload, &store).launch(&launch).unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::ProvisioningFailed {
            kind: ResourceKind::Volume,
            ..
        }
    ));
    assert_eq!(err.exit_code(), 4);
    assert_eq!(mock.call_count(Op::CreateInstance), 0);
    // Not rolled back
    assert_eq!(mock.volumes().len(), 1);
    assert!(store.read("demo").unwrap().is_none());
}

#[test]
fn test_instance_error_names_server() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    let mock = MockControlPlane::new();
    mock.script_instance_statuses(&["BUILD", "ERROR"]);
    let payload = CloudInitTemplate::Training;

    let err = orchestrator(&mock, &payload, &store)
        .launch(&spec("demo"))
        .unwrap_err();
    match err {
        OrchestratorError::ProvisioningFailed { kind, id, .. } => {
            assert_eq!(kind, ResourceKind::Server);
            assert_eq!(id, mock.servers()[0].id);
        }
        other => panic!("expected ProvisioningFailed, got {:?}", other),
    }
    assert!(store.read("demo").unwrap().is_none());
}

#[test]
fn test_create_instance_remote_error() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    let mock = MockControlPlane::new();
    mock.inject(Op::CreateInstance, FailureConfig::remote("quota exceeded"));
    let payload = CloudInitTemplate::Training;

    let err = orchestrator(&mock, &payload, &store)
        .launch(&spec("demo"))
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::RemoteUnavailable(_)));
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn test_interrupt_during_volume_wait() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    let mock = MockControlPlane::new();
    let interrupt = Interrupt::new();
    mock.script_volume_statuses(&["creating"]);
    mock.interrupt_on(Op::GetVolume, interrupt.clone());
    let payload = CloudInitTemplate::Training;

    let mut launch = spec("demo");
    launch.volume_size_gb = Some(5);

    let err = orchestrator(&mock, &payload, &store)
        .with_interrupt(interrupt)
        .launch(&launch)
        .unwrap_err();
    match err {
        OrchestratorError::Interrupted { kind, ref id } => {
            assert_eq!(kind, ResourceKind::Volume);
            assert_eq!(id, &mock.volumes()[0].id);
        }
        ref other => panic!("expected Interrupted, got {:?}", other),
    }
    assert_eq!(err.exit_code(), 130);
    assert_eq!(mock.call_count(Op::CreateInstance), 0);
    assert_eq!(mock.call_count(Op::DeleteVolume), 0);
}

// =============================================================================
// Lifecycle after launch
// =============================================================================

#[test]
fn test_launch_then_logs_then_cleanup() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    let mock = MockControlPlane::new();
    let payload = CloudInitTemplate::Training;

    let mut launch = spec("demo");
    launch.volume_size_gb = Some(1);
    let result = orchestrator(&mock, &payload, &store).launch(&launch).unwrap();

    mock.set_console_output(&result.server_id, "booting\n[NOVA-MLOPS] step=done\n");
    let text = lifecycle::logs(&store, &mock, "demo", None).unwrap();
    assert!(text.contains("step=done"));

    let outcome = lifecycle::cleanup(&store, &mock, "demo", true).unwrap();
    assert_eq!(
        outcome,
        CleanupOutcome::Deleted {
            server_id: result.server_id.clone(),
            already_gone: false,
            volume: VolumeCleanup::Deleted {
                id: result.volume_id.clone().unwrap(),
            },
        }
    );
    assert!(mock.servers().is_empty());
    assert!(mock.volumes().is_empty());

    let state = lifecycle::status(&store, "demo").unwrap();
    assert_eq!(state.status, JobStatus::Deleted);
    assert!(state.finished_at.is_some());
    // Identifiers survive the status flip
    assert_eq!(state.server_id(), Some(result.server_id.as_str()));
}

#[test]
fn test_cleanup_without_record_is_noop() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    let mock = MockControlPlane::new();

    let outcome = lifecycle::cleanup(&store, &mock, "never-launched", false).unwrap();
    assert_eq!(outcome, CleanupOutcome::NothingToClean);
    assert!(mock.calls().is_empty());
    assert!(store.read("never-launched").unwrap().is_none());
}

#[test]
fn test_cleanup_after_external_delete() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    let mock = MockControlPlane::new();
    let payload = CloudInitTemplate::Training;

    let result = orchestrator(&mock, &payload, &store)
        .launch(&spec("demo"))
        .unwrap();
    mock.remove_server_externally(&result.server_id);

    let outcome = lifecycle::cleanup(&store, &mock, "demo", false).unwrap();
    assert!(matches!(
        outcome,
        CleanupOutcome::Deleted {
            already_gone: true,
            volume: VolumeCleanup::None,
            ..
        }
    ));
    assert_eq!(
        store.read("demo").unwrap().unwrap().status,
        JobStatus::Deleted
    );

    // Second cleanup is still fine
    lifecycle::cleanup(&store, &mock, "demo", false).unwrap();
    assert_eq!(
        store.read("demo").unwrap().unwrap().status,
        JobStatus::Deleted
    );
}

#[test]
fn test_status_unknown_job() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());

    let err = lifecycle::status(&store, "ghost").unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("ghost"));
}

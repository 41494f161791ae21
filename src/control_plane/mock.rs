//! Mock control plane
//!
//! In-process fake with scripted status progressions, a call log and
//! failure injection. Volumes settle to `available` and instances to
//! `ACTIVE` unless a status script says otherwise.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;

use super::failure::{FailureConfig, FailureInjector, Op};
use super::{
    tail_lines, CloudSummary, ControlPlane, ControlPlaneError, CpResult, Flavor, Image, Instance,
    InstanceRequest, Network, ResourceKind, Volume, INSTANCE_ACTIVE, VOLUME_AVAILABLE,
};
use crate::signal::Interrupt;

/// Status a freshly created volume reports
pub const MOCK_VOLUME_INITIAL_STATUS: &str = "creating";

/// Status a freshly created instance reports
pub const MOCK_INSTANCE_INITIAL_STATUS: &str = "BUILD";

/// Mutable state behind the mock
#[derive(Debug, Default)]
struct MockState {
    images: Vec<Image>,
    flavors: Vec<Flavor>,
    networks: Vec<Network>,
    volumes: BTreeMap<String, Volume>,
    servers: BTreeMap<String, Instance>,
    /// Statuses returned by successive `get_volume` calls before settling
    volume_script: VecDeque<String>,
    /// Statuses returned by successive `get_instance` calls before settling
    instance_script: VecDeque<String>,
    console: HashMap<String, String>,
    instance_requests: Vec<InstanceRequest>,
    calls: Vec<Op>,
    next_id: u32,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:04}", prefix, self.next_id)
    }
}

/// Configurable mock control plane for testing
#[derive(Debug, Clone)]
pub struct MockControlPlane {
    state: Arc<Mutex<MockState>>,
    failures: Arc<Mutex<FailureInjector>>,
    /// Raise an interrupt when the given call is made
    interrupt_on: Arc<Mutex<Option<(Op, Interrupt)>>>,
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl MockControlPlane {
    /// Mock seeded with one image (`ubuntu-22.04`), one flavor (`m1.small`)
    /// and one network (`private`)
    pub fn new() -> Self {
        let mock = Self::empty();
        mock.add_image("img-ubuntu", "ubuntu-22.04");
        mock.add_flavor("flv-small", "m1.small");
        mock.add_network("net-private", "private");
        mock
    }

    /// Mock with no images, flavors or networks
    pub fn empty() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            failures: Arc::new(Mutex::new(FailureInjector::new())),
            interrupt_on: Arc::new(Mutex::new(None)),
        }
    }

    // === Public API for test configuration ===

    pub fn add_image(&self, id: &str, name: &str) {
        self.state.lock().unwrap().images.push(Image {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    pub fn add_flavor(&self, id: &str, name: &str) {
        self.state.lock().unwrap().flavors.push(Flavor {
            id: id.to_string(),
            name: name.to_string(),
            vcpus: Some(1),
            ram: Some(2048),
            disk: Some(20),
        });
    }

    pub fn add_network(&self, id: &str, name: &str) {
        self.state.lock().unwrap().networks.push(Network {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    /// Statuses successive volume polls report before settling on `available`
    pub fn script_volume_statuses(&self, statuses: &[&str]) {
        self.state.lock().unwrap().volume_script =
            statuses.iter().map(|s| s.to_string()).collect();
    }

    /// Statuses successive instance polls report before settling on `ACTIVE`
    pub fn script_instance_statuses(&self, statuses: &[&str]) {
        self.state.lock().unwrap().instance_script =
            statuses.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_console_output(&self, server_id: &str, text: &str) {
        self.state
            .lock()
            .unwrap()
            .console
            .insert(server_id.to_string(), text.to_string());
    }

    /// Inject a failure for a call
    pub fn inject(&self, op: Op, config: FailureConfig) {
        self.failures.lock().unwrap().inject(op, config);
    }

    /// Raise `interrupt` when `op` is next called
    pub fn interrupt_on(&self, op: Op, interrupt: Interrupt) {
        *self.interrupt_on.lock().unwrap() = Some((op, interrupt));
    }

    /// Delete a server behind the orchestrator's back
    pub fn remove_server_externally(&self, server_id: &str) {
        self.state.lock().unwrap().servers.remove(server_id);
    }

    // === Inspection ===

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<Op> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that created or deleted resources
    pub fn mutations(&self) -> Vec<Op> {
        self.calls().into_iter().filter(|op| op.is_mutation()).collect()
    }

    pub fn call_count(&self, op: Op) -> usize {
        self.calls().iter().filter(|c| **c == op).count()
    }

    pub fn volumes(&self) -> Vec<Volume> {
        self.state.lock().unwrap().volumes.values().cloned().collect()
    }

    pub fn servers(&self) -> Vec<Instance> {
        self.state.lock().unwrap().servers.values().cloned().collect()
    }

    /// Requests passed to `create_instance`
    pub fn instance_requests(&self) -> Vec<InstanceRequest> {
        self.state.lock().unwrap().instance_requests.clone()
    }

    /// Record the call, fire any armed interrupt and apply injected failures
    fn enter(&self, op: Op) -> CpResult<()> {
        self.state.lock().unwrap().calls.push(op);

        if let Some((armed, interrupt)) = self.interrupt_on.lock().unwrap().as_ref() {
            if *armed == op {
                interrupt.trigger();
            }
        }

        let injected = self.failures.lock().unwrap().check(op).cloned();
        if let Some(config) = injected {
            if let Some(delay) = config.delay {
                thread::sleep(delay);
            }
            if let Some(error) = config.error {
                return Err(error);
            }
        }
        Ok(())
    }
}

fn not_found(kind: ResourceKind, name: &str) -> ControlPlaneError {
    ControlPlaneError::NotFound {
        kind,
        name: name.to_string(),
    }
}

impl ControlPlane for MockControlPlane {
    fn find_image(&self, name: &str) -> CpResult<Image> {
        self.enter(Op::FindImage)?;
        let state = self.state.lock().unwrap();
        state
            .images
            .iter()
            .find(|i| i.name == name || i.id == name)
            .cloned()
            .ok_or_else(|| not_found(ResourceKind::Image, name))
    }

    fn find_flavor(&self, name: &str) -> CpResult<Flavor> {
        self.enter(Op::FindFlavor)?;
        let state = self.state.lock().unwrap();
        state
            .flavors
            .iter()
            .find(|f| f.name == name || f.id == name)
            .cloned()
            .ok_or_else(|| not_found(ResourceKind::Flavor, name))
    }

    fn find_network(&self, name: &str) -> CpResult<Network> {
        self.enter(Op::FindNetwork)?;
        let state = self.state.lock().unwrap();
        state
            .networks
            .iter()
            .find(|n| n.name == name || n.id == name)
            .cloned()
            .ok_or_else(|| not_found(ResourceKind::Network, name))
    }

    fn create_volume(&self, name: &str, size_gb: u32) -> CpResult<Volume> {
        self.enter(Op::CreateVolume)?;
        let mut state = self.state.lock().unwrap();
        let volume = Volume {
            id: state.next_id("vol"),
            name: Some(name.to_string()),
            size: size_gb,
            status: MOCK_VOLUME_INITIAL_STATUS.to_string(),
        };
        state.volumes.insert(volume.id.clone(), volume.clone());
        Ok(volume)
    }

    fn get_volume(&self, volume_id: &str) -> CpResult<Volume> {
        self.enter(Op::GetVolume)?;
        let mut state = self.state.lock().unwrap();
        let next = state
            .volume_script
            .pop_front()
            .unwrap_or_else(|| VOLUME_AVAILABLE.to_string());
        let volume = state
            .volumes
            .get_mut(volume_id)
            .ok_or_else(|| not_found(ResourceKind::Volume, volume_id))?;
        volume.status = next;
        Ok(volume.clone())
    }

    fn create_instance(&self, request: &InstanceRequest) -> CpResult<Instance> {
        self.enter(Op::CreateInstance)?;
        let mut state = self.state.lock().unwrap();
        if let Some(attachment) = &request.volume {
            if !state.volumes.contains_key(&attachment.volume_id) {
                return Err(not_found(ResourceKind::Volume, &attachment.volume_id));
            }
        }
        let instance = Instance {
            id: state.next_id("srv"),
            name: request.name.clone(),
            status: MOCK_INSTANCE_INITIAL_STATUS.to_string(),
        };
        state.servers.insert(instance.id.clone(), instance.clone());
        state.instance_requests.push(request.clone());
        Ok(instance)
    }

    fn get_instance(&self, server_id: &str) -> CpResult<Instance> {
        self.enter(Op::GetInstance)?;
        let mut state = self.state.lock().unwrap();
        let next = state
            .instance_script
            .pop_front()
            .unwrap_or_else(|| INSTANCE_ACTIVE.to_string());
        let instance = state
            .servers
            .get_mut(server_id)
            .ok_or_else(|| not_found(ResourceKind::Server, server_id))?;
        instance.status = next;
        Ok(instance.clone())
    }

    fn console_output(&self, server_id: &str, max_lines: Option<u32>) -> CpResult<String> {
        self.enter(Op::ConsoleOutput)?;
        let state = self.state.lock().unwrap();
        if !state.servers.contains_key(server_id) {
            return Err(not_found(ResourceKind::Server, server_id));
        }
        let text = state.console.get(server_id).cloned().unwrap_or_default();
        Ok(match max_lines {
            Some(n) => tail_lines(&text, n as usize),
            None => text,
        })
    }

    fn delete_instance(&self, server_id: &str) -> CpResult<()> {
        self.enter(Op::DeleteInstance)?;
        let mut state = self.state.lock().unwrap();
        state
            .servers
            .remove(server_id)
            .map(|_| ())
            .ok_or_else(|| not_found(ResourceKind::Server, server_id))
    }

    fn delete_volume(&self, volume_id: &str) -> CpResult<()> {
        self.enter(Op::DeleteVolume)?;
        let mut state = self.state.lock().unwrap();
        state
            .volumes
            .remove(volume_id)
            .map(|_| ())
            .ok_or_else(|| not_found(ResourceKind::Volume, volume_id))
    }

    fn ping(&self) -> CpResult<CloudSummary> {
        self.enter(Op::Ping)?;
        Ok(CloudSummary {
            region: Some("RegionOne".to_string()),
            project_id: Some("mock-project".to_string()),
            user_id: Some("mock-user".to_string()),
        })
    }

    fn list_images(&self, limit: usize) -> CpResult<Vec<Image>> {
        self.enter(Op::ListImages)?;
        let state = self.state.lock().unwrap();
        Ok(state.images.iter().take(limit).cloned().collect())
    }

    fn list_flavors(&self, limit: usize) -> CpResult<Vec<Flavor>> {
        self.enter(Op::ListFlavors)?;
        let state = self.state.lock().unwrap();
        Ok(state.flavors.iter().take(limit).cloned().collect())
    }

    fn list_networks(&self, limit: usize) -> CpResult<Vec<Network>> {
        self.enter(Op::ListNetworks)?;
        let state = self.state.lock().unwrap();
        Ok(state.networks.iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::VolumeAttachment;

    fn request(name: &str, volume: Option<&str>) -> InstanceRequest {
        InstanceRequest {
            name: name.to_string(),
            image_id: "img-ubuntu".to_string(),
            flavor_id: "flv-small".to_string(),
            network_id: "net-private".to_string(),
            user_data: "#!/bin/bash\n".to_string(),
            key_name: None,
            security_group: None,
            volume: volume.map(VolumeAttachment::data_volume),
        }
    }

    #[test]
    fn test_seeded_lookups() {
        let mock = MockControlPlane::new();
        assert_eq!(mock.find_image("ubuntu-22.04").unwrap().id, "img-ubuntu");
        assert_eq!(mock.find_flavor("m1.small").unwrap().id, "flv-small");
        assert_eq!(mock.find_network("private").unwrap().id, "net-private");
        assert!(mock.find_flavor("m1.huge").unwrap_err().is_not_found());
    }

    #[test]
    fn test_volume_status_script() {
        let mock = MockControlPlane::new();
        mock.script_volume_statuses(&["creating", "downloading"]);
        let volume = mock.create_volume("v", 10).unwrap();
        assert_eq!(volume.status, "creating");
        assert_eq!(mock.get_volume(&volume.id).unwrap().status, "creating");
        assert_eq!(mock.get_volume(&volume.id).unwrap().status, "downloading");
        assert_eq!(mock.get_volume(&volume.id).unwrap().status, "available");
    }

    #[test]
    fn test_instance_lifecycle() {
        let mock = MockControlPlane::new();
        let instance = mock.create_instance(&request("srv", None)).unwrap();
        assert_eq!(instance.status, "BUILD");
        assert_eq!(mock.get_instance(&instance.id).unwrap().status, "ACTIVE");

        mock.delete_instance(&instance.id).unwrap();
        assert!(mock.get_instance(&instance.id).unwrap_err().is_not_found());
        assert!(mock.delete_instance(&instance.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_create_instance_with_unknown_volume() {
        let mock = MockControlPlane::new();
        let err = mock
            .create_instance(&request("srv", Some("vol-missing")))
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(mock.servers().is_empty());
    }

    #[test]
    fn test_console_tail() {
        let mock = MockControlPlane::new();
        let instance = mock.create_instance(&request("srv", None)).unwrap();
        mock.set_console_output(&instance.id, "a\nb\nc\nd");
        assert_eq!(mock.console_output(&instance.id, Some(2)).unwrap(), "c\nd");
        assert_eq!(mock.console_output(&instance.id, None).unwrap(), "a\nb\nc\nd");
    }

    #[test]
    fn test_injected_failure_and_call_log() {
        let mock = MockControlPlane::new();
        mock.inject(Op::CreateVolume, FailureConfig::remote("over quota"));
        assert_eq!(
            mock.create_volume("v", 1).unwrap_err(),
            ControlPlaneError::Remote("over quota".to_string())
        );
        assert!(mock.volumes().is_empty());
        assert_eq!(mock.calls(), vec![Op::CreateVolume]);
        assert_eq!(mock.mutations(), vec![Op::CreateVolume]);
    }

    #[test]
    fn test_interrupt_on_call() {
        let mock = MockControlPlane::new();
        let interrupt = Interrupt::new();
        mock.interrupt_on(Op::Ping, interrupt.clone());
        mock.ping().unwrap();
        assert!(interrupt.is_set());
    }

    #[test]
    fn test_list_limit() {
        let mock = MockControlPlane::new();
        mock.add_image("img-2", "debian-12");
        mock.add_image("img-3", "rocky-9");
        assert_eq!(mock.list_images(2).unwrap().len(), 2);
        assert_eq!(mock.list_networks(20).unwrap().len(), 1);
    }
}

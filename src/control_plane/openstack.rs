//! OpenStack control plane backed by the `openstack` command-line client
//!
//! Each call runs one `openstack` subcommand with `-f json`, parses stdout
//! and maps a non-zero exit to `NotFound` (when stderr says the resource
//! does not exist) or `Remote`. Authentication comes from `clouds.yaml` via
//! `--os-cloud`, or from the `OS_*` environment when no cloud is set.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{
    tail_lines, CloudSummary, ControlPlane, ControlPlaneError, CpResult, Flavor, Image, Instance,
    InstanceRequest, Network, ResourceKind, Volume, VolumeAttachment,
};

/// Default client program
pub const DEFAULT_OPENSTACK_PROGRAM: &str = "openstack";

/// Control plane driven through the `openstack` CLI
#[derive(Debug, Clone)]
pub struct OpenStackCli {
    program: String,
    cloud: Option<String>,
}

impl OpenStackCli {
    pub fn new(program: impl Into<String>, cloud: Option<String>) -> Self {
        Self {
            program: program.into(),
            cloud,
        }
    }

    /// clouds.yaml entry this client authenticates with
    pub fn cloud(&self) -> Option<&str> {
        self.cloud.as_deref()
    }

    /// Full argv (without the program) for a subcommand
    fn argv(&self, args: &[String]) -> Vec<String> {
        let mut argv = Vec::with_capacity(args.len() + 2);
        if let Some(ref cloud) = self.cloud {
            argv.push("--os-cloud".to_string());
            argv.push(cloud.clone());
        }
        argv.extend(args.iter().cloned());
        argv
    }

    /// Run a subcommand and return stdout
    fn run(&self, kind: ResourceKind, target: &str, args: &[String]) -> CpResult<Vec<u8>> {
        let argv = self.argv(args);
        debug!(program = %self.program, args = ?argv, "running openstack client");

        let output = Command::new(&self.program)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                ControlPlaneError::Remote(format!("failed to run '{}': {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(kind, target, &stderr));
        }

        Ok(output.stdout)
    }

    /// Run a subcommand with `-f json` and parse stdout
    fn run_json<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        target: &str,
        args: &[String],
    ) -> CpResult<T> {
        let mut args = args.to_vec();
        args.push("-f".to_string());
        args.push("json".to_string());
        let stdout = self.run(kind, target, &args)?;
        parse_json(&stdout)
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn parse_json<T: DeserializeOwned>(stdout: &[u8]) -> CpResult<T> {
    serde_json::from_slice(stdout)
        .map_err(|e| ControlPlaneError::Remote(format!("invalid openstack client output: {}", e)))
}

fn not_found_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(no \w+ with a name or id of|no \w+ found for|could not find resource|could not be found|\b404\b)",
        )
        .expect("not-found pattern is valid")
    })
}

/// Map a failed invocation's stderr to a control-plane error.
///
/// Only a missing-resource message that names `target` is `NotFound`.
/// Anything else, including catalog or endpoint lookups that say "not
/// found" about the cloud itself, stays `Remote`.
pub fn classify_failure(kind: ResourceKind, target: &str, stderr: &str) -> ControlPlaneError {
    let names_target = !target.is_empty() && stderr.contains(target);
    if names_target && not_found_pattern().is_match(stderr) {
        ControlPlaneError::NotFound {
            kind,
            name: target.to_string(),
        }
    } else {
        let message = stderr.trim();
        ControlPlaneError::Remote(if message.is_empty() {
            format!("openstack client failed on {} {}", kind, target)
        } else {
            message.to_string()
        })
    }
}

/// `--block-device` value for a data volume
pub fn block_device_arg(attachment: &VolumeAttachment) -> String {
    format!(
        "uuid={},source_type=volume,destination_type=volume,boot_index={},delete_on_termination={},device_name={}",
        attachment.volume_id,
        attachment.boot_index,
        attachment.delete_on_termination,
        attachment
            .device_name
            .trim_start_matches("/dev/"),
    )
}

/// Arguments for `server create`, given a file holding the user data
pub fn server_create_args(request: &InstanceRequest, user_data_path: &Path) -> Vec<String> {
    let mut args = strings(&[
        "server",
        "create",
        "--image",
        request.image_id.as_str(),
        "--flavor",
        request.flavor_id.as_str(),
        "--nic",
    ]);
    args.push(format!("net-id={}", request.network_id));
    args.push("--user-data".to_string());
    args.push(user_data_path.display().to_string());

    if let Some(ref key_name) = request.key_name {
        args.push("--key-name".to_string());
        args.push(key_name.clone());
    }
    if let Some(ref group) = request.security_group {
        args.push("--security-group".to_string());
        args.push(group.clone());
    }
    if let Some(ref attachment) = request.volume {
        args.push("--block-device".to_string());
        args.push(block_device_arg(attachment));
    }

    args.push(request.name.clone());
    args
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigurationInfo {
    #[serde(default)]
    region_name: Option<String>,
}

impl ControlPlane for OpenStackCli {
    fn find_image(&self, name: &str) -> CpResult<Image> {
        self.run_json(ResourceKind::Image, name, &strings(&["image", "show", name]))
    }

    fn find_flavor(&self, name: &str) -> CpResult<Flavor> {
        self.run_json(ResourceKind::Flavor, name, &strings(&["flavor", "show", name]))
    }

    fn find_network(&self, name: &str) -> CpResult<Network> {
        self.run_json(
            ResourceKind::Network,
            name,
            &strings(&["network", "show", name]),
        )
    }

    fn create_volume(&self, name: &str, size_gb: u32) -> CpResult<Volume> {
        let size = size_gb.to_string();
        self.run_json(
            ResourceKind::Volume,
            name,
            &strings(&["volume", "create", "--size", size.as_str(), name]),
        )
    }

    fn get_volume(&self, volume_id: &str) -> CpResult<Volume> {
        self.run_json(
            ResourceKind::Volume,
            volume_id,
            &strings(&["volume", "show", volume_id]),
        )
    }

    fn create_instance(&self, request: &InstanceRequest) -> CpResult<Instance> {
        let mut user_data = tempfile::NamedTempFile::new().map_err(|e| {
            ControlPlaneError::Remote(format!("failed to stage user data: {}", e))
        })?;
        user_data
            .write_all(request.user_data.as_bytes())
            .and_then(|_| user_data.flush())
            .map_err(|e| ControlPlaneError::Remote(format!("failed to stage user data: {}", e)))?;

        let args = server_create_args(request, user_data.path());
        self.run_json(ResourceKind::Server, &request.name, &args)
    }

    fn get_instance(&self, server_id: &str) -> CpResult<Instance> {
        self.run_json(
            ResourceKind::Server,
            server_id,
            &strings(&["server", "show", server_id]),
        )
    }

    fn console_output(&self, server_id: &str, max_lines: Option<u32>) -> CpResult<String> {
        let mut args = strings(&["console", "log", "show"]);
        if let Some(n) = max_lines {
            args.push("--lines".to_string());
            args.push(n.to_string());
        }
        args.push(server_id.to_string());

        let stdout = self.run(ResourceKind::Server, server_id, &args)?;
        let text = String::from_utf8_lossy(&stdout).into_owned();
        Ok(match max_lines {
            Some(n) => tail_lines(&text, n as usize),
            None => text,
        })
    }

    fn delete_instance(&self, server_id: &str) -> CpResult<()> {
        self.run(
            ResourceKind::Server,
            server_id,
            &strings(&["server", "delete", server_id]),
        )
        .map(|_| ())
    }

    fn delete_volume(&self, volume_id: &str) -> CpResult<()> {
        self.run(
            ResourceKind::Volume,
            volume_id,
            &strings(&["volume", "delete", volume_id]),
        )
        .map(|_| ())
    }

    fn ping(&self) -> CpResult<CloudSummary> {
        // A missing clouds.yaml entry is a connectivity failure, not a lookup miss
        let token: TokenInfo = self
            .run_json(ResourceKind::Server, "token", &strings(&["token", "issue"]))
            .map_err(|e| match e {
                ControlPlaneError::NotFound { .. } => ControlPlaneError::Remote(format!(
                    "authentication failed for cloud '{}'",
                    self.cloud.as_deref().unwrap_or("<environment>")
                )),
                other => other,
            })?;

        // Region is informational only
        let region = self
            .run_json::<ConfigurationInfo>(
                ResourceKind::Server,
                "configuration",
                &strings(&["configuration", "show"]),
            )
            .ok()
            .and_then(|c| c.region_name);

        Ok(CloudSummary {
            region,
            project_id: token.project_id,
            user_id: token.user_id,
        })
    }

    fn list_images(&self, limit: usize) -> CpResult<Vec<Image>> {
        let rows: Vec<Image> =
            self.run_json(ResourceKind::Image, "*", &strings(&["image", "list"]))?;
        Ok(rows.into_iter().take(limit).collect())
    }

    fn list_flavors(&self, limit: usize) -> CpResult<Vec<Flavor>> {
        let rows: Vec<Flavor> =
            self.run_json(ResourceKind::Flavor, "*", &strings(&["flavor", "list"]))?;
        Ok(rows.into_iter().take(limit).collect())
    }

    fn list_networks(&self, limit: usize) -> CpResult<Vec<Network>> {
        let rows: Vec<Network> =
            self.run_json(ResourceKind::Network, "*", &strings(&["network", "list"]))?;
        Ok(rows.into_iter().take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request() -> InstanceRequest {
        InstanceRequest {
            name: "mlops-demo-r1".to_string(),
            image_id: "img-1".to_string(),
            flavor_id: "flv-1".to_string(),
            network_id: "net-1".to_string(),
            user_data: "#cloud-config\n".to_string(),
            key_name: None,
            security_group: None,
            volume: None,
        }
    }

    #[test]
    fn test_argv_with_and_without_cloud() {
        let args = strings(&["image", "list"]);
        let with_cloud = OpenStackCli::new("openstack", Some("devstack".to_string()));
        assert_eq!(
            with_cloud.argv(&args),
            vec!["--os-cloud", "devstack", "image", "list"]
        );

        let env_auth = OpenStackCli::new("openstack", None);
        assert_eq!(env_auth.argv(&args), vec!["image", "list"]);
    }

    #[test]
    fn test_server_create_args_minimal() {
        let args = server_create_args(&request(), &PathBuf::from("/tmp/ud"));
        assert_eq!(
            args,
            vec![
                "server",
                "create",
                "--image",
                "img-1",
                "--flavor",
                "flv-1",
                "--nic",
                "net-id=net-1",
                "--user-data",
                "/tmp/ud",
                "mlops-demo-r1",
            ]
        );
    }

    #[test]
    fn test_server_create_args_full() {
        let mut req = request();
        req.key_name = Some("mykey".to_string());
        req.security_group = Some("ssh".to_string());
        req.volume = Some(VolumeAttachment::data_volume("vol-9"));

        let args = server_create_args(&req, &PathBuf::from("/tmp/ud"));
        let joined = args.join(" ");
        assert!(joined.contains("--key-name mykey"));
        assert!(joined.contains("--security-group ssh"));
        assert!(joined.contains(
            "--block-device uuid=vol-9,source_type=volume,destination_type=volume,boot_index=-1,delete_on_termination=false,device_name=vdb"
        ));
        assert_eq!(args.last().unwrap(), "mlops-demo-r1");
    }

    #[test]
    fn test_classify_not_found() {
        for (target, stderr) in [
            ("centos-7", "No Image found for centos-7"),
            ("m1.huge", "Could not find resource m1.huge"),
            ("abc", "No server with a name or ID of 'abc' exists."),
            ("vol-1", "Volume vol-1 could not be found. (HTTP 404)"),
        ] {
            let err = classify_failure(ResourceKind::Image, target, stderr);
            assert!(err.is_not_found(), "not classified as not found: {}", stderr);
        }
    }

    #[test]
    fn test_classify_endpoint_missing_is_remote() {
        let stderr = "public endpoint for compute service in RegionOne region not found\n";
        let err = classify_failure(ResourceKind::Server, "srv-1", stderr);
        assert_eq!(
            err,
            ControlPlaneError::Remote(
                "public endpoint for compute service in RegionOne region not found".to_string()
            )
        );
    }

    #[test]
    fn test_classify_other_resource_missing_is_remote() {
        // 404 about a different resource
        let err = classify_failure(
            ResourceKind::Server,
            "srv-1",
            "Flavor flv-9 could not be found. (HTTP 404)",
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_classify_remote() {
        let err = classify_failure(
            ResourceKind::Volume,
            "v",
            "VolumeLimitExceeded: Maximum number of volumes allowed (10) exceeded\n",
        );
        assert_eq!(
            err,
            ControlPlaneError::Remote(
                "VolumeLimitExceeded: Maximum number of volumes allowed (10) exceeded".to_string()
            )
        );

        let empty = classify_failure(ResourceKind::Server, "srv-1", "");
        assert!(matches!(empty, ControlPlaneError::Remote(ref m) if m.contains("srv-1")));
    }

    #[test]
    fn test_parse_show_outputs() {
        let volume: Volume = parse_json(
            br#"{"id": "v1", "name": "mlops-demo-results", "size": 10, "status": "creating", "bootable": "false"}"#,
        )
        .unwrap();
        assert_eq!(volume.status, "creating");
        assert_eq!(volume.size, 10);

        let server: Instance = parse_json(
            br#"{"id": "s1", "name": "mlops-demo-r1", "status": "BUILD", "flavor": "m1.small"}"#,
        )
        .unwrap();
        assert_eq!(server.status, "BUILD");
    }

    #[test]
    fn test_parse_list_output() {
        let images: Vec<Image> = parse_json(
            br#"[{"ID": "i1", "Name": "ubuntu-22.04", "Status": "active"}, {"ID": "i2", "Name": "cirros", "Status": "active"}]"#,
        )
        .unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[1].name, "cirros");
    }

    #[test]
    fn test_parse_garbage_is_remote_error() {
        let result: CpResult<Image> = parse_json(b"Missing value auth-url");
        assert!(matches!(result, Err(ControlPlaneError::Remote(_))));
    }

    #[test]
    fn test_missing_program_is_remote_error() {
        let cli = OpenStackCli::new("/nonexistent/openstack-client", None);
        let err = cli.find_image("ubuntu").unwrap_err();
        assert!(matches!(err, ControlPlaneError::Remote(ref m) if m.contains("failed to run")));
    }
}

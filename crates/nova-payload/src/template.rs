//! Concrete cloud-init templates.
//!
//! Both templates emit plain `#cloud-config` text. Nothing is base64-encoded
//! here; the control plane hands the string to the compute service as-is.

use std::fmt;
use std::str::FromStr;

use serde_json::json;

use crate::{check_size, ObjectDestinations, PayloadBuilder, PayloadError};

/// Guest directory holding the job descriptor and runner script.
const GUEST_ROOT: &str = "/opt/nova-mlops";

/// Mount point for the optional data volume (attached as /dev/vdb).
const RESULTS_MOUNT: &str = "/mnt/results";

/// Inference script run inside the guest. Reads `job.json`, writes
/// results/manifest/log, and uploads them when swift credentials exist.
const NLP_RUNNER: &str = r#"import datetime
import json
import os
import shutil
import subprocess

from vaderSentiment.vaderSentiment import SentimentIntensityAnalyzer

job = json.load(open("/opt/nova-mlops/job.json"))
out_dir = "/mnt/results" if os.path.ismount("/mnt/results") else "/opt/nova-mlops/out"
os.makedirs(out_dir, exist_ok=True)

texts = [
    "I love this product.",
    "This is the worst experience I've had.",
    "The service was okay, nothing special.",
]

analyzer = SentimentIntensityAnalyzer()
rows = []
for text in texts:
    score = analyzer.polarity_scores(text)
    rows.append({"text": text, "compound": score["compound"]})
    print("[NOVA-MLOPS] job=%s run=%s compound=%+.3f" % (job["job"], job["run_id"], score["compound"]))

results_path = os.path.join(out_dir, "results.json")
with open(results_path, "w") as f:
    json.dump({"job": job["job"], "run_id": job["run_id"], "results": rows}, f, indent=2)

manifest_path = os.path.join(out_dir, "manifest.json")
with open(manifest_path, "w") as f:
    json.dump({
        "job": job["job"],
        "run_id": job["run_id"],
        "finished_at": datetime.datetime.utcnow().replace(microsecond=0).isoformat() + "Z",
        "objects": job["destinations"],
    }, f, indent=2)

uploads = [
    (results_path, job["destinations"]["results_object"]),
    (manifest_path, job["destinations"]["manifest_object"]),
    ("/var/log/nova-mlops.log", job["destinations"]["log_object"]),
]

if shutil.which("swift") and os.environ.get("OS_AUTH_URL"):
    for path, name in uploads:
        subprocess.call(["swift", "upload", job["destinations"]["container"], path, "--object-name", name])
        print("[NOVA-MLOPS] uploaded %s" % name)
else:
    print("[NOVA-MLOPS] object upload skipped: no swift credentials in guest")

print("[NOVA-MLOPS] job=%s run=%s step=done" % (job["job"], job["run_id"]))
"#;

/// Available payload templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloudInitTemplate {
    /// Sentiment inference demo with result upload
    #[default]
    Nlp,
    /// Console-only training progress demo
    Training,
}

impl fmt::Display for CloudInitTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudInitTemplate::Nlp => write!(f, "nlp"),
            CloudInitTemplate::Training => write!(f, "training"),
        }
    }
}

impl FromStr for CloudInitTemplate {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nlp" => Ok(CloudInitTemplate::Nlp),
            "training" => Ok(CloudInitTemplate::Training),
            _ => Err(PayloadError::UnknownTemplate(s.to_string())),
        }
    }
}

impl PayloadBuilder for CloudInitTemplate {
    fn build(
        &self,
        job_name: &str,
        run_id: &str,
        destinations: &ObjectDestinations,
    ) -> Result<String, PayloadError> {
        let payload = match self {
            CloudInitTemplate::Nlp => nlp_payload(job_name, run_id, destinations)?,
            CloudInitTemplate::Training => training_payload(job_name, run_id),
        };
        check_size(&payload)?;
        Ok(payload)
    }
}

fn training_payload(job_name: &str, run_id: &str) -> String {
    let tag = format!("[NOVA-MLOPS] job={} run={}", job_name, run_id);
    format!(
        "#cloud-config\n\
         runcmd:\n\
         \x20 - echo \"{tag} step=setup\"\n\
         \x20 - sleep 2\n\
         \x20 - echo \"{tag} step=train epoch=1 loss=0.91\"\n\
         \x20 - sleep 2\n\
         \x20 - echo \"{tag} step=train epoch=2 loss=0.73\"\n\
         \x20 - sleep 2\n\
         \x20 - echo \"{tag} step=done\"\n",
        tag = tag
    )
}

fn nlp_payload(
    job_name: &str,
    run_id: &str,
    destinations: &ObjectDestinations,
) -> Result<String, PayloadError> {
    let descriptor = json!({
        "job": job_name,
        "run_id": run_id,
        "destinations": destinations,
    });
    let descriptor = serde_json::to_string_pretty(&descriptor)
        .map_err(|e| PayloadError::Render(e.to_string()))?;

    let mut out = String::new();
    out.push_str("#cloud-config\n");
    out.push_str("package_update: true\n");
    out.push_str("packages:\n  - python3-pip\n\n");
    out.push_str("write_files:\n");
    out.push_str(&format!("  - path: {}/job.json\n", GUEST_ROOT));
    out.push_str("    permissions: '0644'\n");
    out.push_str("    content: |\n");
    out.push_str(&indent(&descriptor, 6));
    out.push_str(&format!("  - path: {}/run.py\n", GUEST_ROOT));
    out.push_str("    permissions: '0755'\n");
    out.push_str("    content: |\n");
    out.push_str(&indent(NLP_RUNNER, 6));
    out.push('\n');
    out.push_str("runcmd:\n");
    out.push_str(&format!(
        "  - [ sh, -c, \"if [ -b /dev/vdb ]; then blkid /dev/vdb || mkfs.ext4 -q /dev/vdb; mkdir -p {m} && mount /dev/vdb {m}; fi\" ]\n",
        m = RESULTS_MOUNT
    ));
    out.push_str("  - pip3 install -q vaderSentiment python-swiftclient\n");
    out.push_str(&format!(
        "  - [ sh, -c, \"python3 {}/run.py 2>&1 | tee /var/log/nova-mlops.log\" ]\n",
        GUEST_ROOT
    ));
    Ok(out)
}

/// Indent every line of `text` by `width` spaces, keeping a trailing newline.
fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    let mut out = String::with_capacity(text.len() + width * 8);
    for line in text.lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str(&pad);
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

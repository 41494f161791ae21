//! Local runner tests
//!
//! These spawn real processes (`true`, `false`, `sh`), so they only run on
//! unix hosts.

#![cfg(unix)]

use std::fs;
use std::path::Path;

use nova_mlops::job::JobSpec;
use nova_mlops::local::{run_local, LocalRunError};
use nova_mlops::state::{JobStatus, StateStore};
use tempfile::TempDir;

fn write_spec(dir: &Path, file: &str, content: &str) -> JobSpec {
    let path = dir.join(file);
    fs::write(&path, content).unwrap();
    JobSpec::from_file(&path).unwrap()
}

fn toml_spec(dir: &Path, name: &str, entrypoint: &str) -> JobSpec {
    let content = format!(
        "name = \"{}\"\n\n[run]\nentrypoint = \"{}\"\n\n[artifacts]\noutput_dir = \"{}\"\n",
        name,
        entrypoint,
        dir.join("artifacts").display()
    );
    write_spec(dir, &format!("{}.toml", name), &content)
}

#[test]
fn test_true_succeeds() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("state"));
    let job = toml_spec(dir.path(), "t1", "true");

    assert_eq!(run_local(&job, &store).unwrap(), 0);

    let state = store.read("t1").unwrap().unwrap();
    assert_eq!(state.status, JobStatus::Succeeded);
    let local = state.local().unwrap();
    assert_eq!(local.returncode, Some(0));
    assert_eq!(local.cmd[0], "true");
    assert!(state.started_at.is_some());
    assert!(state.finished_at.is_some());
}

#[test]
fn test_false_fails_with_returncode_one() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("state"));
    let job = toml_spec(dir.path(), "t1", "false");

    assert_eq!(run_local(&job, &store).unwrap(), 1);

    let state = store.read("t1").unwrap().unwrap();
    assert_eq!(state.status, JobStatus::Failed);
    assert_eq!(state.local().unwrap().returncode, Some(1));
}

#[test]
fn test_exit_code_three_recorded() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("state"));
    let script = dir.path().join("exit3.sh");
    fs::write(&script, "exit 3\n").unwrap();
    let job = toml_spec(dir.path(), "three", &format!("sh {}", script.display()));

    assert_eq!(run_local(&job, &store).unwrap(), 3);

    let state = store.read("three").unwrap().unwrap();
    assert_eq!(state.status, JobStatus::Failed);
    assert_eq!(state.local().unwrap().returncode, Some(3));
}

#[test]
fn test_args_and_output_dir_reach_child() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("state"));
    let script = dir.path().join("echo_args.sh");
    // Writes its arguments into the output dir it is handed last
    fs::write(
        &script,
        "for last; do :; done\necho \"$@\" > \"$last/args.txt\"\n",
    )
    .unwrap();
    let content = format!(
        "name = \"echo\"\n\n[run]\nentrypoint = \"sh {}\"\n\n[run.args]\nepochs = 2\nmodel = \"tiny\"\n\n[artifacts]\noutput_dir = \"{}\"\n",
        script.display(),
        dir.path().join("artifacts").display()
    );
    let job = write_spec(dir.path(), "echo.toml", &content);

    assert_eq!(run_local(&job, &store).unwrap(), 0);

    let out_dir = dir.path().join("artifacts").join("echo");
    let args = fs::read_to_string(out_dir.join("args.txt")).unwrap();
    assert_eq!(
        args.trim(),
        format!("--epochs 2 --model tiny --output_dir {}", out_dir.display())
    );
}

#[test]
fn test_json_spec_file() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("state"));
    let content = format!(
        r#"{{"name": "from-json", "run": {{"entrypoint": "false"}}, "artifacts": {{"output_dir": "{}"}}}}"#,
        dir.path().join("artifacts").display()
    );
    let job = write_spec(dir.path(), "job.json", &content);

    assert_eq!(run_local(&job, &store).unwrap(), 1);
    assert_eq!(
        store.read("from-json").unwrap().unwrap().status,
        JobStatus::Failed
    );
}

#[test]
fn test_rerun_overwrites_record() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("state"));

    run_local(&toml_spec(dir.path(), "again", "false"), &store).unwrap();
    run_local(&toml_spec(dir.path(), "again", "true"), &store).unwrap();

    let state = store.read("again").unwrap().unwrap();
    assert_eq!(state.status, JobStatus::Succeeded);
}

#[test]
fn test_missing_program_is_spawn_error() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("state"));
    let job = toml_spec(dir.path(), "ghost", "definitely-not-a-real-binary-xyz");

    let err = run_local(&job, &store).unwrap_err();
    assert!(matches!(err, LocalRunError::Spawn { .. }));
    assert_eq!(err.exit_code(), 127);
    assert_eq!(
        store.read("ghost").unwrap().unwrap().status,
        JobStatus::Failed
    );
}

// tests/config_loading.rs

use std::fs;
use std::path::Path;

use streamdag::cli::CliArgs;
use streamdag::config::{load_and_validate, WorkloadStep};
use streamdag::errors::SchedError;
use streamdag::types::{DependencyPolicyKind, IssuePolicyKind};
use streamdag_test_utils::{init_tracing, with_timeout};
use tempfile::tempdir;

const WORKLOAD: &str = r#"
[config]
issue_policy = "deferred"
batch_size = 2

[array.x]
type = "float"
len = 256

[array.y]
type = "float"
len = 256

[kernel.scale]
signature = "pointer float, float"

[kernel.axpy]
signature = "const pointer float, pointer float, sint32"

[[launch]]
kernel = "scale"
args = ["x", 2.0]
grid = 4
block = 64

[[launch]]
kernel = "axpy"
args = ["x", "y", 256]

[[launch]]
access = "y"
"#;

fn write_workload(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("Workload.toml");
    fs::write(&path, contents).unwrap();
    path
}

fn args_for(workload: std::path::PathBuf) -> CliArgs {
    CliArgs {
        workload,
        dependency_policy: None,
        issue_policy: None,
        dot: None,
        dry_run: false,
        log_level: None,
    }
}

#[test]
fn workload_file_is_loaded_and_validated() {
    let dir = tempdir().unwrap();
    let path = write_workload(dir.path(), WORKLOAD);

    let workload = load_and_validate(&path).unwrap();
    assert_eq!(workload.config.issue_policy, IssuePolicyKind::Deferred);
    assert_eq!(workload.config.batch_size, 2);
    assert_eq!(
        workload.config.dependency_policy,
        DependencyPolicyKind::default()
    );
    assert_eq!(workload.arrays.len(), 2);
    assert_eq!(workload.kernels.len(), 2);

    let described: Vec<String> = workload.steps.iter().map(WorkloadStep::describe).collect();
    assert_eq!(described, vec!["scale(x, 2)", "axpy(x, y, 256)", "read y"]);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, SchedError::IoError(_)));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let dir = tempdir().unwrap();
    let path = write_workload(dir.path(), "[[launch]\nkernel = ");
    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, SchedError::TomlError(_)));
}

#[test]
fn undeclared_kernel_is_rejected() {
    let dir = tempdir().unwrap();
    let path = write_workload(
        dir.path(),
        r#"
[array.x]
type = "float"
len = 4

[[launch]]
kernel = "missing"
args = ["x"]
"#,
    );
    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, SchedError::UnknownKernel(name) if name == "missing"));
}

#[tokio::test]
async fn dry_run_schedules_nothing() {
    init_tracing();
    let dir = tempdir().unwrap();
    let dot = dir.path().join("graph.dot");
    let mut args = args_for(write_workload(dir.path(), WORKLOAD));
    args.dry_run = true;
    args.dot = Some(dot.clone());

    with_timeout(streamdag::run(args)).await.unwrap();
    assert!(!dot.exists());
}

#[tokio::test]
async fn replay_writes_the_dag_as_dot() {
    init_tracing();
    let dir = tempdir().unwrap();
    let dot = dir.path().join("graph.dot");
    let mut args = args_for(write_workload(dir.path(), WORKLOAD));
    args.dot = Some(dot.clone());
    args.dependency_policy = Some(DependencyPolicyKind::Conservative);

    with_timeout(streamdag::run(args)).await.unwrap();

    let text = fs::read_to_string(&dot).unwrap();
    assert!(text.starts_with("digraph"));
    assert!(text.contains("scale"));
    assert!(text.contains("axpy"));
}

#[tokio::test]
async fn replay_of_a_missing_workload_fails() {
    let dir = tempdir().unwrap();
    let args = args_for(dir.path().join("nope.toml"));
    let err = with_timeout(streamdag::run(args)).await.unwrap_err();
    assert!(err.to_string().contains("loading workload"));
}

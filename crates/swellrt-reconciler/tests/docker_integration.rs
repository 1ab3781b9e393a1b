//! Real Docker integration tests
//! Run with: cargo test --test docker_integration -- --ignored

use bollard::container::{InspectContainerOptions, RemoveContainerOptions};
use bollard::Docker;
use std::sync::Arc;
use swellrt_common::{ContainerRuntime, ContainerSpec};
use swellrt_reconciler::{require_docker, DockerRuntime, ReconcileAction, Reconciler};

const IMAGE: &str = "alpine";
const TAG: &str = "3.19";

fn sleeper(name: &str, tag: &str) -> ContainerSpec {
    let mut spec = ContainerSpec::new(name, IMAGE, tag);
    spec.command = Some("sleep 300".to_string());
    spec
}

async fn cleanup(docker: &Docker, names: &[&str]) {
    for name in names {
        let _ = docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
    }
}

async fn is_running(docker: &Docker, name: &str) -> bool {
    docker
        .inspect_container(name, None::<InspectContainerOptions>)
        .await
        .ok()
        .and_then(|c| c.state)
        .and_then(|s| s.running)
        .unwrap_or(false)
}

#[tokio::test]
#[ignore = "Requires Docker"]
async fn test_real_lifecycle() {
    require_docker!();
    let docker = Arc::new(Docker::connect_with_local_defaults().unwrap());
    let name = "swellrt-it-lifecycle";
    cleanup(&docker, &[name]).await;

    let runtime = Arc::new(DockerRuntime::new(docker.clone()));
    let reconciler = Reconciler::new(runtime.clone());
    let spec = sleeper(name, TAG);

    // Absent -> created
    let report = reconciler.reconcile(&spec).await.unwrap();
    assert_eq!(report.action, ReconcileAction::Created);
    assert!(is_running(&docker, name).await);

    // Running -> noop
    let report = reconciler.reconcile(&spec).await.unwrap();
    assert_eq!(report.action, ReconcileAction::AlreadyRunning);

    // Stopped -> started in place
    docker
        .stop_container(name, None)
        .await
        .unwrap();
    let stopped = reconciler.reconcile(&spec).await.unwrap();
    assert_eq!(stopped.action, ReconcileAction::Started);
    assert_eq!(stopped.container_id, report.container_id);
    assert!(is_running(&docker, name).await);

    // Other tag -> recreated
    let upgraded = reconciler.reconcile(&sleeper(name, "3.20")).await.unwrap();
    assert_eq!(upgraded.action, ReconcileAction::Recreated);
    assert_ne!(upgraded.container_id, report.container_id);

    cleanup(&docker, &[name]).await;
}

#[tokio::test]
#[ignore = "Requires Docker"]
async fn test_real_link() {
    require_docker!();
    let docker = Arc::new(Docker::connect_with_local_defaults().unwrap());
    let (primary, linked) = ("swellrt-it-primary", "swellrt-it-primary-db");
    cleanup(&docker, &[primary, linked]).await;

    let mut spec = sleeper(primary, TAG);
    spec.links.insert("db".to_string(), sleeper(linked, TAG));

    let runtime = Arc::new(DockerRuntime::new(docker.clone()));
    let report = Reconciler::new(runtime.clone())
        .reconcile(&spec)
        .await
        .unwrap();
    assert_eq!(report.links.len(), 1);
    assert!(is_running(&docker, linked).await);
    assert!(is_running(&docker, primary).await);

    let listed = runtime.list_containers().await.unwrap();
    assert!(listed.iter().any(|c| c.has_name(primary)));
    assert!(listed.iter().any(|c| c.has_name(linked)));

    cleanup(&docker, &[primary, linked]).await;
}

#[tokio::test]
#[ignore = "Requires Docker"]
async fn test_missing_image_is_pull_fault() {
    require_docker!();
    let runtime = Arc::new(DockerRuntime::connect().unwrap());
    let spec = ContainerSpec::new(
        "swellrt-it-missing",
        "swellrt-reconciler/does-not-exist",
        "never",
    );

    let err = Reconciler::new(runtime).reconcile(&spec).await.unwrap_err();
    assert!(!err.is_permission_denied());
    assert!(err.to_string().contains("pull"));
}

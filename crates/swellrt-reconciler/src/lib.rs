use std::sync::Arc;
use swellrt_common::{ContainerRuntime, Result as CommonResult};

// Re-export dependencies potentially needed by consumers (like the CLI)
pub use bollard;
pub use swellrt_common as common;

pub mod config;
pub mod docker;
pub mod options;
pub mod reconcile;
pub mod request;
pub mod test_utils;

pub use docker::{container_config, is_permission_denied, DockerError, DockerRuntime};
pub use options::ContainerOptions;
pub use reconcile::{ObservedState, PlannedStep, ReconcileAction, ReconcileReport, Reconciler};

/// Merges `options` over the SwellRT defaults, reconciles every linked
/// container and then the primary one, and calls `on_complete` exactly once
/// when everything is running. On error `on_complete` is never called.
pub async fn ensure_running<R, F>(
    runtime: Arc<R>,
    options: &ContainerOptions,
    on_complete: F,
) -> CommonResult<ReconcileReport>
where
    R: ContainerRuntime,
    F: FnOnce() + Send,
{
    let merged = options::merge(&ContainerOptions::swellrt_defaults(), options);
    let spec = options::resolve(&merged)?;
    Reconciler::new(runtime)
        .reconcile_then(&spec, on_complete)
        .await
}

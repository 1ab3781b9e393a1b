//! Drives one container spec, and the containers it links to, to the
//! running state.
//!
//! Each spec moves through
//!
//! ```text
//! Absent          --create & start-->           Satisfied
//! StoppedCorrect  --start-->                    Satisfied
//! WrongVersion    --remove--> Absent --create & start--> Satisfied
//! RunningCorrect  --noop-->                     Satisfied
//! ```
//!
//! Links are always satisfied before their dependent container is looked at.

use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use serde::Serialize;
use swellrt_common::{ContainerRuntime, ContainerSpec, ObservedContainer, Result};
use tracing::{error, info, info_span, Instrument};

use crate::request::build_request;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ObservedState {
    Absent,
    RunningCorrect { id: String },
    StoppedCorrect { id: String },
    WrongVersion { id: String, image: String },
}

impl ObservedState {
    /// What `Reconciler::reconcile` does from this state.
    pub fn action(&self) -> ReconcileAction {
        match self {
            ObservedState::Absent => ReconcileAction::Created,
            ObservedState::RunningCorrect { .. } => ReconcileAction::AlreadyRunning,
            ObservedState::StoppedCorrect { .. } => ReconcileAction::Started,
            ObservedState::WrongVersion { .. } => ReconcileAction::Recreated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    AlreadyRunning,
    Started,
    Created,
    Recreated,
}

impl std::fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ReconcileAction::AlreadyRunning => "already running",
            ReconcileAction::Started => "start existing container",
            ReconcileAction::Created => "pull, create and start",
            ReconcileAction::Recreated => "remove, then pull, create and start",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub name: String,
    pub tagged_image: String,
    pub container_id: String,
    pub action: ReconcileAction,
    pub links: Vec<ReconcileReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub name: String,
    pub tagged_image: String,
    pub state: ObservedState,
    pub action: ReconcileAction,
}

/// Classifies `spec` against the listed containers. Only the first
/// container named `spec.name` is considered.
pub fn observe(spec: &ContainerSpec, containers: &[ObservedContainer]) -> ObservedState {
    let tagged_image = spec.tagged_image();
    match containers.iter().find(|c| c.has_name(&spec.name)) {
        None => ObservedState::Absent,
        Some(c) if c.image != tagged_image => ObservedState::WrongVersion {
            id: c.id.clone(),
            image: c.image.clone(),
        },
        Some(c) if c.is_running() => ObservedState::RunningCorrect { id: c.id.clone() },
        Some(c) => ObservedState::StoppedCorrect { id: c.id.clone() },
    }
}

pub struct Reconciler<R> {
    runtime: Arc<R>,
}

impl<R> Clone for Reconciler<R> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
        }
    }
}

impl<R: ContainerRuntime> Reconciler<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    /// Reconciles every link of `spec` (concurrently, each recursively) and
    /// then `spec` itself. The first runtime error aborts the whole run.
    pub fn reconcile<'a>(&'a self, spec: &'a ContainerSpec) -> BoxFuture<'a, Result<ReconcileReport>> {
        let span = info_span!("reconcile", name = %spec.name);
        async move {
            let links = try_join_all(spec.links.values().map(|link| self.reconcile(link))).await?;

            let (container_id, action) = self.reconcile_container(spec).await?;
            Ok(ReconcileReport {
                name: spec.name.clone(),
                tagged_image: spec.tagged_image(),
                container_id,
                action,
                links,
            })
        }
        .instrument(span)
        .boxed()
    }

    /// Runs `reconcile` and calls `on_complete` once it succeeded.
    pub async fn reconcile_then<F>(&self, spec: &ContainerSpec, on_complete: F) -> Result<ReconcileReport>
    where
        F: FnOnce() + Send,
    {
        let report = self.reconcile(spec).await?;
        on_complete();
        Ok(report)
    }

    /// Reports what `reconcile` would do, links first, without changing
    /// anything.
    pub async fn plan(&self, spec: &ContainerSpec) -> Result<Vec<PlannedStep>> {
        let containers = self.list().await?;
        let mut steps = Vec::new();
        collect_plan(spec, &containers, &mut steps);
        Ok(steps)
    }

    async fn reconcile_container(&self, spec: &ContainerSpec) -> Result<(String, ReconcileAction)> {
        let containers = self.list().await?;
        let state = observe(spec, &containers);
        let action = state.action();

        let id = match state {
            ObservedState::Absent => {
                info!(name = %spec.name, "Container does not exist");
                self.create_and_start(spec).await?
            }
            ObservedState::RunningCorrect { id } => {
                info!(name = %spec.name, %id, "Container already running");
                id
            }
            ObservedState::StoppedCorrect { id } => {
                info!(name = %spec.name, %id, "Container is stopped");
                self.runtime.start_container(&id).await?;
                info!(name = %spec.name, %id, "Started");
                id
            }
            ObservedState::WrongVersion { id, image } => {
                info!(
                    name = %spec.name,
                    %id,
                    found = %image,
                    wanted = %spec.tagged_image(),
                    "Container has other version"
                );
                self.runtime.remove_container(&id, true).await?;
                info!(name = %spec.name, %id, "Removed");
                self.create_and_start(spec).await?
            }
        };
        Ok((id, action))
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String> {
        let request = build_request(spec)?;

        info!(image = %request.image, "Pulling");
        self.runtime.pull_image(&request.image).await?;

        info!(name = %request.name, "Creating");
        let id = self.runtime.create_container(&request).await?;

        info!(name = %request.name, %id, "Starting");
        self.runtime.start_container(&id).await?;
        info!(name = %request.name, %id, "Started");
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<ObservedContainer>> {
        self.runtime.list_containers().await.map_err(|err| {
            if err.is_permission_denied() {
                error!("Cannot access docker. You probably need to add your user to the docker group");
                error!("Try: sudo adduser <your_user> docker and log in again");
            }
            err
        })
    }
}

fn collect_plan(spec: &ContainerSpec, containers: &[ObservedContainer], steps: &mut Vec<PlannedStep>) {
    for link in spec.links.values() {
        collect_plan(link, containers, steps);
    }
    let state = observe(spec, containers);
    steps.push(PlannedStep {
        name: spec.name.clone(),
        tagged_image: spec.tagged_image(),
        action: state.action(),
        state,
    });
}

//! The bollard-backed `ContainerRuntime`.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerSummary, HostConfig, PortBinding as DockerPortBinding};
use bollard::Docker;
use futures::TryStreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use swellrt_common::{
    ContainerRequest, ContainerRuntime, ObservedContainer, Operation, Result as CommonResult,
    SwellError,
};
use thiserror::Error;
use tracing::{debug, info, instrument};

// --- Custom Error Type ---
#[derive(Error, Debug)]
pub enum DockerError {
    #[error("Docker connection failed: {0}")]
    ConnectFailed(#[source] BollardError),
    #[error("Container listing failed: {0}")]
    ListFailed(#[source] BollardError),
    #[error("Image pull failed for {image}: {source}")]
    PullFailed {
        image: String,
        #[source]
        source: BollardError,
    },
    #[error("Container creation failed: {0}")]
    CreationFailed(#[source] BollardError),
    #[error("Container start failed: {0}")]
    StartFailed(#[source] BollardError),
    #[error("Container removal failed: {0}")]
    RemovalFailed(#[source] BollardError),
}

impl DockerError {
    pub fn operation(&self) -> Operation {
        match self {
            DockerError::ConnectFailed(_) => Operation::Connect,
            DockerError::ListFailed(_) => Operation::List,
            DockerError::PullFailed { .. } => Operation::Pull,
            DockerError::CreationFailed(_) => Operation::Create,
            DockerError::StartFailed(_) => Operation::Start,
            DockerError::RemovalFailed(_) => Operation::Remove,
        }
    }

    fn bollard_error(&self) -> &BollardError {
        match self {
            DockerError::ConnectFailed(e)
            | DockerError::ListFailed(e)
            | DockerError::CreationFailed(e)
            | DockerError::StartFailed(e)
            | DockerError::RemovalFailed(e) => e,
            DockerError::PullFailed { source, .. } => source,
        }
    }
}

// Socket access problems get their own kind so callers can tell the operator what to fix
impl From<DockerError> for SwellError {
    fn from(err: DockerError) -> Self {
        if is_permission_denied(err.bollard_error()) {
            SwellError::PermissionDenied(err.to_string())
        } else {
            SwellError::runtime(err.operation(), err.to_string())
        }
    }
}

// Define local Result using the crate's Error type
pub type Result<T> = std::result::Result<T, DockerError>;

/// Whether `err` is an EACCES on the socket (anywhere in its source chain)
/// or a 403 from the daemon, as authorization plugins and socket proxies
/// answer.
pub fn is_permission_denied(err: &BollardError) -> bool {
    match err {
        BollardError::IOError { err } if err.kind() == std::io::ErrorKind::PermissionDenied => {
            return true
        }
        BollardError::DockerResponseServerError {
            status_code: 403, ..
        } => return true,
        _ => {}
    }

    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::PermissionDenied {
                return true;
            }
        }
        current = e.source();
    }
    false
}

// --- DockerRuntime Implementation ---

#[derive(Clone)]
pub struct DockerRuntime {
    docker_client: Arc<Docker>,
}

impl DockerRuntime {
    pub fn new(docker_client: Arc<Docker>) -> Self {
        Self { docker_client }
    }

    /// Connects using `DOCKER_HOST` or the platform's default socket.
    ///
    /// The connection is lazy: an inaccessible socket surfaces on the first
    /// call, usually the container listing.
    pub fn connect() -> CommonResult<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(DockerError::ConnectFailed)?;
        Ok(Self::new(Arc::new(docker)))
    }

    pub fn client(&self) -> &Arc<Docker> {
        &self.docker_client
    }
}

fn observed_container(summary: ContainerSummary) -> ObservedContainer {
    ObservedContainer {
        id: summary.id.unwrap_or_default(),
        names: summary.names.unwrap_or_default(),
        image: summary.image.unwrap_or_default(),
        status: summary.status.unwrap_or_default(),
    }
}

/// Translates a request into bollard's create body.
pub fn container_config(request: &ContainerRequest) -> Config<String> {
    let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
    let mut bindings: HashMap<String, Vec<DockerPortBinding>> = HashMap::new();
    for binding in &request.port_bindings {
        exposed_ports.insert(binding.container_port.clone(), HashMap::new());
        bindings
            .entry(binding.container_port.clone())
            .or_default()
            .push(DockerPortBinding {
                host_ip: Some(binding.host_ip.clone()),
                host_port: Some(binding.host_port.clone()),
            });
    }
    let port_bindings: HashMap<String, Option<Vec<DockerPortBinding>>> = bindings
        .into_iter()
        .map(|(port, list)| (port, Some(list)))
        .collect();

    Config {
        image: Some(request.image.clone()),
        hostname: request.hostname.clone(),
        cmd: (!request.cmd.is_empty()).then(|| request.cmd.clone()),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        host_config: Some(HostConfig {
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            links: (!request.links.is_empty()).then(|| request.links.clone()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    #[instrument(skip(self))]
    async fn list_containers(&self) -> CommonResult<Vec<ObservedContainer>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let containers = self
            .docker_client
            .list_containers(Some(options))
            .await
            .map_err(DockerError::ListFailed)?;
        Ok(containers.into_iter().map(observed_container).collect())
    }

    #[instrument(skip(self))]
    async fn pull_image(&self, tagged_image: &str) -> CommonResult<()> {
        let options = CreateImageOptions {
            from_image: tagged_image.to_string(),
            ..Default::default()
        };
        let mut stream = std::pin::pin!(self.docker_client.create_image(Some(options), None, None));

        // Drain the whole progress stream; the image is only usable once it ends
        while let Some(progress) = stream.try_next().await.map_err(|source| {
            DockerError::PullFailed {
                image: tagged_image.to_string(),
                source,
            }
        })? {
            if let Some(status) = progress.status.as_deref() {
                debug!(
                    image = %tagged_image,
                    status,
                    progress = progress.progress.as_deref().unwrap_or(""),
                    "pull"
                );
            }
        }
        info!(image = %tagged_image, "Image pulled");
        Ok(())
    }

    #[instrument(skip(self, request), fields(name = %request.name, image = %request.image))]
    async fn create_container(&self, request: &ContainerRequest) -> CommonResult<String> {
        let create_options = CreateContainerOptions {
            name: request.name.clone(),
            ..Default::default()
        };
        let created = self
            .docker_client
            .create_container(Some(create_options), container_config(request))
            .await
            .map_err(DockerError::CreationFailed)?;
        for warning in &created.warnings {
            tracing::warn!(name = %request.name, %warning, "Docker warning on create");
        }
        Ok(created.id)
    }

    #[instrument(skip(self))]
    async fn start_container(&self, id: &str) -> CommonResult<()> {
        self.docker_client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(DockerError::StartFailed)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_container(&self, id: &str, force: bool) -> CommonResult<()> {
        let remove_opts = Some(RemoveContainerOptions {
            force,
            ..Default::default()
        });
        self.docker_client
            .remove_container(id, remove_opts)
            .await
            .map_err(DockerError::RemovalFailed)?;
        Ok(())
    }
}

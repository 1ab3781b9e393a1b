// Re-export dependencies used in public interfaces of common types

use std::collections::BTreeMap;
use std::fmt::Display;

use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port the SwellRT server always listens on inside its container.
pub const INTERNAL_PORT: &str = "9898/tcp";

/// Host address every published port is bound to.
pub const BIND_ALL_INTERFACES: &str = "0.0.0.0";

/// Docker Engine call that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Connect,
    List,
    Pull,
    Create,
    Start,
    Remove,
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Connect => "connect",
            Operation::List => "list",
            Operation::Pull => "pull",
            Operation::Create => "create",
            Operation::Start => "start",
            Operation::Remove => "remove",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SwellError {
    #[error(
        "Cannot access docker ({0}). You probably need to add your user to the docker group: \
         try `sudo adduser <your_user> docker` and log in again"
    )]
    PermissionDenied(String),

    #[error("Docker {operation} failed: {message}")]
    Runtime { operation: Operation, message: String },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

impl SwellError {
    pub fn runtime(operation: Operation, message: impl Into<String>) -> Self {
        SwellError::Runtime {
            operation,
            message: message.into(),
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, SwellError::PermissionDenied(_))
    }
}

// Define the primary Result type for reconciliation
pub type Result<T> = std::result::Result<T, SwellError>;

/// Fully merged desired state of one container.
///
/// `links` holds the containers this one depends on, keyed by the alias under
/// which they are reachable from inside this container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    pub tag: String,
    pub name: String,
    pub host: Option<String>,
    pub port: Option<String>,
    pub command: Option<String>,
    #[serde(default)]
    pub links: BTreeMap<String, ContainerSpec>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: tag.into(),
            name: name.into(),
            host: None,
            port: None,
            command: None,
            links: BTreeMap::new(),
        }
    }

    /// Image reference in `repository:tag` form. Always derived from the
    /// current `image` and `tag`.
    pub fn tagged_image(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

impl Display for ContainerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.tagged_image())
    }
}

/// Snapshot of a container as reported by the runtime's list call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedContainer {
    pub id: String,
    /// Docker reports names with a leading `/`.
    pub names: Vec<String>,
    pub image: String,
    pub status: String,
}

impl ObservedContainer {
    pub fn has_name(&self, name: &str) -> bool {
        self.names
            .iter()
            .any(|n| n.strip_prefix('/') == Some(name))
    }

    pub fn is_running(&self) -> bool {
        self.status.starts_with("Up")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub container_port: String,
    pub host_ip: String,
    pub host_port: String,
}

/// Everything needed to create one container, built once per reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRequest {
    pub image: String,
    pub name: String,
    pub hostname: Option<String>,
    pub cmd: Vec<String>,
    pub port_bindings: Vec<PortBinding>,
    /// Entries in Docker's `<container>:<alias>` form.
    pub links: Vec<String>,
}

/// The subset of the Docker Engine API the reconciler drives.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Lists all containers, stopped ones included.
    async fn list_containers(&self) -> Result<Vec<ObservedContainer>>;

    /// Pulls `tagged_image`, returning only once the pull has fully finished.
    async fn pull_image(&self, tagged_image: &str) -> Result<()>;

    /// Creates a container and returns its id.
    async fn create_container(&self, request: &ContainerRequest) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_image_tracks_fields() {
        let mut spec = ContainerSpec::new("app", "x", "1");
        assert_eq!(spec.tagged_image(), "x:1");

        spec.tag = "2".to_string();
        assert_eq!(spec.tagged_image(), "x:2");

        spec.image = "registry.local/y".to_string();
        assert_eq!(spec.tagged_image(), "registry.local/y:2");
    }

    #[test]
    fn test_observed_container_name_and_status() {
        let container = ObservedContainer {
            id: "abc".to_string(),
            names: vec!["/other".to_string(), "/app".to_string()],
            image: "x:1".to_string(),
            status: "Up 3 hours".to_string(),
        };
        assert!(container.has_name("app"));
        assert!(!container.has_name("ap"));
        assert!(!container.has_name("/app"));
        assert!(container.is_running());

        let stopped = ObservedContainer {
            status: "Exited (0) 2 days ago".to_string(),
            ..container
        };
        assert!(!stopped.is_running());
    }

    #[test]
    fn test_permission_error_message() {
        let err = SwellError::PermissionDenied("/var/run/docker.sock".to_string());
        assert!(err.is_permission_denied());
        assert!(err.to_string().contains("docker group"));

        let err = SwellError::runtime(Operation::Pull, "manifest unknown");
        assert!(!err.is_permission_denied());
        assert_eq!(err.to_string(), "Docker pull failed: manifest unknown");
    }

    #[test]
    fn test_serialization() {
        let mut spec = ContainerSpec::new("app", "p2pvalue/swellrt", "latest");
        spec.links
            .insert("mongo".to_string(), ContainerSpec::new("app-mongo", "mongo", "latest"));
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("app-mongo"));

        let back: ContainerSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}

//! Builds the typed create request for one container.

use swellrt_common::{
    ContainerRequest, ContainerSpec, PortBinding, Result, SwellError, BIND_ALL_INTERFACES,
    INTERNAL_PORT,
};

use crate::options::MONGO_ALIAS;

/// JVM property SwellRT reads its MongoDB host from.
pub const MONGO_HOST_PROPERTY: &str = "-Dcore.mongodb_host";

/// Flags the container needs to reach its links.
pub fn link_flags(spec: &ContainerSpec) -> Vec<String> {
    spec.links
        .iter()
        .filter(|(alias, _)| alias.as_str() == MONGO_ALIAS)
        .map(|(_, link)| format!("{MONGO_HOST_PROPERTY}={}", link.name))
        .collect()
}

/// Link flags first, then the caller's command split with shell quoting
/// rules. Empty `host` and `port` values mean "not set".
pub fn build_request(spec: &ContainerSpec) -> Result<ContainerRequest> {
    let mut cmd = link_flags(spec);
    if let Some(command) = spec.command.as_deref() {
        let args = shell_words::split(command)
            .map_err(|e| SwellError::Config(format!("invalid command `{command}`: {e}")))?;
        cmd.extend(args);
    }

    let port_bindings = spec
        .port
        .iter()
        .filter(|port| !port.is_empty())
        .map(|port| PortBinding {
            container_port: INTERNAL_PORT.to_string(),
            host_ip: BIND_ALL_INTERFACES.to_string(),
            host_port: port.clone(),
        })
        .collect();

    let links = spec
        .links
        .iter()
        .map(|(alias, link)| format!("{}:{alias}", link.name))
        .collect();

    Ok(ContainerRequest {
        image: spec.tagged_image(),
        name: spec.name.clone(),
        hostname: spec.host.clone().filter(|host| !host.is_empty()),
        cmd,
        port_bindings,
        links,
    })
}

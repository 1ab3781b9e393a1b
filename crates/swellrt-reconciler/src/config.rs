//! Options files. YAML is accepted, and JSON files parse too since YAML is
//! a superset of it.

use std::path::Path;

use swellrt_common::{Result, SwellError};
use tracing::debug;

use crate::options::ContainerOptions;

pub fn load_options(path: &Path) -> Result<ContainerOptions> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| SwellError::Config(format!("cannot read {}: {e}", path.display())))?;
    debug!(path = %path.display(), "Loaded options file");
    parse_options(&text).map_err(|err| match err {
        SwellError::Config(message) => SwellError::Config(format!("{}: {message}", path.display())),
        other => other,
    })
}

pub fn parse_options(text: &str) -> Result<ContainerOptions> {
    // An empty document is `null` to serde_yaml, not an empty map
    if text.trim().is_empty() {
        return Ok(ContainerOptions::default());
    }
    serde_yaml::from_str(text).map_err(|e| SwellError::Config(e.to_string()))
}

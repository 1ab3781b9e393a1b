//! Caller-supplied container options and their merge over the built-in
//! SwellRT defaults.
//!
//! Every field is optional. A field counts as provided when it is `Some`,
//! even if it holds an empty string, so `command: ""` clears a default
//! command instead of falling back to it.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use swellrt_common::{ContainerSpec, Result, SwellError};

pub const DEFAULT_IMAGE: &str = "p2pvalue/swellrt";
pub const DEFAULT_TAG: &str = "latest";
pub const DEFAULT_HOST: &str = "swellrt";
pub const DEFAULT_NAME: &str = "gulp-swellrt";
pub const DEFAULT_PORT: &str = "9898";

/// Alias of the MongoDB link; its container name is passed to SwellRT.
pub const MONGO_ALIAS: &str = "mongo";
pub const MONGO_IMAGE: &str = "mongo";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(
        default,
        deserialize_with = "port_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub port: Option<String>,
    #[serde(default, alias = "cmd", skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Linked containers keyed by alias.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, ContainerOptions>,
    /// Shorthand for `links.mongo`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mongo: Option<Box<ContainerOptions>>,
}

// Ports show up both as `"9898"` and `9898` in option files
fn port_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Port>::deserialize(deserializer)?.map(|port| match port {
        Port::Text(text) => text,
        Port::Number(number) => number.to_string(),
    }))
}

impl ContainerOptions {
    /// The SwellRT server on port 9898 with a MongoDB link.
    pub fn swellrt_defaults() -> Self {
        let mongo = ContainerOptions {
            image: Some(MONGO_IMAGE.to_string()),
            tag: Some(DEFAULT_TAG.to_string()),
            ..Default::default()
        };

        ContainerOptions {
            image: Some(DEFAULT_IMAGE.to_string()),
            tag: Some(DEFAULT_TAG.to_string()),
            name: Some(DEFAULT_NAME.to_string()),
            host: Some(DEFAULT_HOST.to_string()),
            port: Some(DEFAULT_PORT.to_string()),
            command: None,
            links: BTreeMap::from([(MONGO_ALIAS.to_string(), mongo)]),
            mongo: None,
        }
    }

    /// Folds the `mongo` shorthand into `links`, recursively. The shorthand
    /// wins over a `links.mongo` entry given in the same options.
    fn normalized(mut self) -> Self {
        if let Some(mongo) = self.mongo.take() {
            let merged = match self.links.remove(MONGO_ALIAS) {
                Some(base) => merge(&base, &mongo),
                None => (*mongo).normalized(),
            };
            self.links.insert(MONGO_ALIAS.to_string(), merged);
        }
        self.links = self
            .links
            .into_iter()
            .map(|(alias, link)| (alias, link.normalized()))
            .collect();
        self
    }
}

/// Field-by-field merge: `overrides` wins wherever it provides a value.
/// Links merge per alias, so overriding one field of a link keeps the
/// defaults for the rest of it.
pub fn merge(defaults: &ContainerOptions, overrides: &ContainerOptions) -> ContainerOptions {
    let defaults = defaults.clone().normalized();
    let overrides = overrides.clone().normalized();

    let mut links = defaults.links;
    for (alias, link) in overrides.links {
        let merged = match links.remove(&alias) {
            Some(base) => merge(&base, &link),
            None => link,
        };
        links.insert(alias, merged);
    }

    ContainerOptions {
        image: overrides.image.or(defaults.image),
        tag: overrides.tag.or(defaults.tag),
        name: overrides.name.or(defaults.name),
        host: overrides.host.or(defaults.host),
        port: overrides.port.or(defaults.port),
        command: overrides.command.or(defaults.command),
        links,
        mongo: None,
    }
}

/// Turns merged options into a complete spec. Missing tags become
/// `latest` and unnamed links are named `<name>-<alias>`. An empty name
/// counts as unset.
pub fn resolve(options: &ContainerOptions) -> Result<ContainerSpec> {
    resolve_named(options.clone().normalized(), None)
}

fn resolve_named(options: ContainerOptions, fallback_name: Option<String>) -> Result<ContainerSpec> {
    let name = options
        .name
        .filter(|name| !name.is_empty())
        .or(fallback_name)
        .ok_or_else(|| SwellError::Config("container options have no name".to_string()))?;
    let image = options
        .image
        .ok_or_else(|| SwellError::Config(format!("container `{name}` has no image")))?;

    let links = options
        .links
        .into_iter()
        .map(|(alias, link)| {
            let link_name = format!("{name}-{alias}");
            resolve_named(link, Some(link_name)).map(|spec| (alias, spec))
        })
        .collect::<Result<BTreeMap<_, _>>>()?;

    Ok(ContainerSpec {
        image,
        tag: options.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
        name,
        host: options.host,
        port: options.port,
        command: options.command,
        links,
    })
}

//! Runtime settings: optional TOML file, command-line overrides, defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hwmonua_core::config::{DEFAULT_HOST, DEFAULT_MAX_PENDING_REQUESTS, DEFAULT_PORT};
use hwmonua_core::{DenyListAccessControl, NodeId};
use hwmonua_sensors::{SensorInitPolicy, DEFAULT_HWMON_ROOT};
use serde::Deserialize;

/// Contents of the configuration file. Every key is optional.
///
/// ```toml
/// host = "127.0.0.1"
/// port = 4840
/// hwmon_root = "/sys/class/hwmon"
/// denied_nodes = ["ns=1;i=1337"]
/// sensor_init_policy = "degrade"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub application_name: Option<String>,
    pub application_uri: Option<String>,
    pub hwmon_root: Option<PathBuf>,
    pub denied_nodes: Option<Vec<String>>,
    pub sensor_init_policy: Option<SensorInitPolicy>,
    pub max_pending_requests: Option<usize>,
}

impl FileSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }
}

/// Values given on the command line; they win over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub hwmon_root: Option<PathBuf>,
    pub strict_sensors: bool,
}

/// Resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub application_name: String,
    pub application_uri: String,
    pub hwmon_root: PathBuf,
    pub denied_nodes: Vec<NodeId>,
    pub sensor_init_policy: SensorInitPolicy,
    pub max_pending_requests: usize,
}

impl Settings {
    pub fn resolve(file: FileSettings, overrides: Overrides) -> Result<Self> {
        let denied_nodes = match file.denied_nodes {
            Some(nodes) => nodes
                .iter()
                .map(|raw| {
                    raw.parse::<NodeId>()
                        .with_context(|| format!("Invalid entry in denied_nodes: {}", raw))
                })
                .collect::<Result<Vec<_>>>()?,
            None => vec![DenyListAccessControl::default_denied_node()],
        };

        let sensor_init_policy = if overrides.strict_sensors {
            SensorInitPolicy::Abort
        } else {
            file.sensor_init_policy.unwrap_or_default()
        };

        Ok(Self {
            host: overrides
                .host
                .or(file.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: overrides.port.or(file.port).unwrap_or(DEFAULT_PORT),
            application_name: file
                .application_name
                .unwrap_or_else(|| "hwmonua".to_string()),
            application_uri: file
                .application_uri
                .unwrap_or_else(|| "urn:hwmonua:server".to_string()),
            hwmon_root: overrides
                .hwmon_root
                .or(file.hwmon_root)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HWMON_ROOT)),
            denied_nodes,
            sensor_init_policy,
            max_pending_requests: file
                .max_pending_requests
                .unwrap_or(DEFAULT_MAX_PENDING_REQUESTS),
        })
    }
}

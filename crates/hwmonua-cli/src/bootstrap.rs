//! Startup sequence: security material, server, sensors, run-loop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use hwmonua_core::config::load_file;
use hwmonua_core::{DenyListAccessControl, RunningFlag, Server, ServerConfig, StatusCode};
use hwmonua_sensors::{discover, register_sensors, Hwmon};

use crate::settings::Settings;

/// Security files named on the command line.
#[derive(Debug, Default, Clone)]
pub struct SecurityArgs {
    pub certificate: Option<PathBuf>,
    #[cfg(feature = "encryption")]
    pub private_key: Option<PathBuf>,
    #[cfg(feature = "encryption")]
    pub trust_list: Vec<PathBuf>,
}

/// Build the server configuration from settings and security files.
///
/// Missing files degrade to an unsecured endpoint with a warning. Files that
/// are named but cannot be read are fatal.
pub fn server_config(settings: &Settings, security: &SecurityArgs) -> Result<ServerConfig> {
    let config = security_config(settings.port, security)?;
    let access_control = DenyListAccessControl::new(settings.denied_nodes.iter().cloned());

    Ok(config
        .with_host(settings.host.as_str())
        .with_application_name(settings.application_name.as_str())
        .with_application_uri(settings.application_uri.as_str())
        .with_max_pending_requests(settings.max_pending_requests)
        .with_access_control(Arc::new(access_control)))
}

#[cfg(feature = "encryption")]
fn security_config(port: u16, security: &SecurityArgs) -> Result<ServerConfig> {
    let (Some(certificate), Some(private_key)) = (&security.certificate, &security.private_key)
    else {
        tracing::warn!(
            "Missing arguments for encryption support. Arguments are \
             <server-certificate> <private-key> [<trust-list> ...]"
        );
        return Ok(ServerConfig::minimal(port, None));
    };

    let certificate = load_file(certificate).context("Unable to load server certificate")?;
    let private_key = load_file(private_key).context("Unable to load private key")?;
    let trust_list = security
        .trust_list
        .iter()
        .map(|path| load_file(path).context("Unable to load trust list entry"))
        .collect::<Result<Vec<_>>>()?;

    Ok(ServerConfig::secured(port, certificate, private_key, trust_list))
}

#[cfg(not(feature = "encryption"))]
fn security_config(port: u16, security: &SecurityArgs) -> Result<ServerConfig> {
    let certificate = match &security.certificate {
        Some(path) => Some(load_file(path).context("Unable to load server certificate")?),
        None => {
            tracing::warn!("Missing argument for the server certificate");
            None
        }
    };
    Ok(ServerConfig::minimal(port, certificate))
}

/// Construct the server, publish the sensors and run until `running` clears.
///
/// `Err` means the server never started. Once running, the outcome is the
/// run-loop status.
pub async fn run(
    settings: &Settings,
    security: &SecurityArgs,
    running: RunningFlag,
) -> Result<StatusCode> {
    let config = server_config(settings, security)?;
    let mut server = Server::new(config).context("Unable to create server")?;

    let root = settings.hwmon_root.clone();
    let inventory = discover(move || Hwmon::init(root), settings.sensor_init_policy)
        .context("Unable to initialize sensors")?;

    if let Err(e) = register_sensors(server.address_space_mut(), &inventory) {
        tracing::error!("Sensor registration incomplete: {}", e);
    }

    Ok(server.run(running).await)
}

/// Process exit code for a run-loop status. Good maps to 0; any bad status
/// maps to its sub-code byte, never 0.
pub fn exit_code(status: StatusCode) -> u8 {
    if status.is_good() {
        0
    } else {
        (((status.bits() >> 16) & 0xFF) as u8).max(1)
    }
}

//! Command-line entry point: publishes hwmon sensors as read-only nodes.

mod bootstrap;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use hwmonua_core::{install_signal_handlers, RunningFlag};

use crate::bootstrap::SecurityArgs;
use crate::settings::{FileSettings, Overrides, Settings};

/// HwmonUA - publish hwmon sensors as read-only nodes of a protocol server.
#[derive(Parser, Debug)]
#[command(name = "hwmonua")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server certificate.
    certificate: Option<PathBuf>,

    /// Private key of the server certificate.
    #[cfg(feature = "encryption")]
    private_key: Option<PathBuf>,

    /// Trusted client certificates.
    #[cfg(feature = "encryption")]
    trust_list: Vec<PathBuf>,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to.
    #[arg(short, long)]
    port: Option<u16>,

    /// Root of the hwmon class directory.
    #[arg(long)]
    hwmon_root: Option<PathBuf>,

    /// Exit if the sensor subsystem cannot be initialized.
    #[arg(long)]
    strict_sensors: bool,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn security(&self) -> SecurityArgs {
        SecurityArgs {
            certificate: self.certificate.clone(),
            #[cfg(feature = "encryption")]
            private_key: self.private_key.clone(),
            #[cfg(feature = "encryption")]
            trust_list: self.trust_list.clone(),
        }
    }

    fn settings(&self) -> anyhow::Result<Settings> {
        let file = match &self.config {
            Some(path) => FileSettings::load(path)?,
            None => FileSettings::default(),
        };
        Settings::resolve(
            file,
            Overrides {
                host: self.host.clone(),
                port: self.port,
                hwmon_root: self.hwmon_root.clone(),
                strict_sensors: self.strict_sensors,
            },
        )
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let settings = match args.settings() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::from(1);
        }
    };

    let running = RunningFlag::new();
    let signals = match install_signal_handlers(running.clone()) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Failed to install signal handlers: {}", e);
            return ExitCode::from(1);
        }
    };

    let code = match bootstrap::run(&settings, &args.security(), running).await {
        Ok(status) => bootstrap::exit_code(status),
        Err(e) => {
            tracing::error!("{:#}", e);
            1
        }
    };

    signals.abort();
    ExitCode::from(code)
}

fn init_logging(verbose: bool) {
    // HWMONUA_LOG_JSON=true switches to structured output
    let json_logging = std::env::var("HWMONUA_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "hwmonua={0},hwmonua_core={0},hwmonua_sensors={0}",
            default_level
        ))
        .add_directive(tracing::Level::WARN.into())
    });

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .compact()
            .init();
    }
}

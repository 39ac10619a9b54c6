use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use courier_config::AppConfig;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app::{AppMode, Application};
use crate::shutdown::ShutdownManager;

/// CLI builder: the argument skeleton shared by both binaries.
pub struct CliBuilder {
    command: Command,
}

impl CliBuilder {
    pub fn new(name: &'static str, about: &'static str) -> Self {
        let command = Command::new(name)
            .version(env!("CARGO_PKG_VERSION"))
            .about(about);
        Self { command }
    }

    pub fn with_long_about(mut self, long_about: &'static str) -> Self {
        self.command = self.command.long_about(long_about);
        self
    }

    /// Common arguments: log level and format.
    pub fn with_common_args(mut self) -> Self {
        self.command = self
            .command
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level")
                    .value_parser(["trace", "debug", "info", "warn", "error"])
                    .default_value("info"),
            )
            .arg(
                Arg::new("log-format")
                    .long("log-format")
                    .value_name("FORMAT")
                    .help("Log output format")
                    .value_parser(["json", "pretty"])
                    .default_value("pretty"),
            );
        self
    }

    pub fn with_args(mut self, args: Vec<Arg>) -> Self {
        for arg in args {
            self.command = self.command.arg(arg);
        }
        self
    }

    pub fn build(self) -> ArgMatches {
        self.command.get_matches()
    }
}

fn init_tracing(matches: &ArgMatches) {
    let level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let json = matches
        .get_one::<String>("log-format")
        .is_some_and(|f| f == "json");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Shared binary entry point: parse arguments, install logging, load
/// configuration, wire signals, run the application.
///
/// SIGINT/SIGTERM trigger graceful shutdown and the process exits zero;
/// an initialization failure returns Err and the process exits nonzero
/// (workers are then restarted by the supervisor).
pub async fn run_cli(
    name: &'static str,
    about: &'static str,
    long_about: &'static str,
    custom_args: Vec<Arg>,
    mode_fn: impl FnOnce(&ArgMatches) -> Result<AppMode>,
) -> Result<()> {
    let matches = CliBuilder::new(name, about)
        .with_long_about(long_about)
        .with_common_args()
        .with_args(custom_args)
        .build();

    init_tracing(&matches);

    let config = AppConfig::from_env().context("loading configuration")?;
    let mode = mode_fn(&matches)?;

    let shutdown = ShutdownManager::new();
    spawn_signal_handler(shutdown.clone());

    info!("{name} starting, mode: {mode:?}");
    let application = Application::new(config);
    if let Err(e) = application.run(mode, shutdown).await {
        error!("{name} exited with error: {e:#}");
        return Err(e);
    }
    Ok(())
}

fn spawn_signal_handler(shutdown: ShutdownManager) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(signal) => signal,
                    Err(e) => {
                        error!("cannot install SIGTERM handler: {e}");
                        let _ = ctrl_c.await;
                        shutdown.shutdown().await;
                        return;
                    }
                };

            tokio::select! {
                _ = ctrl_c => info!("SIGINT received"),
                _ = sigterm.recv() => info!("SIGTERM received"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("SIGINT received");
        }

        shutdown.shutdown().await;
    });
}

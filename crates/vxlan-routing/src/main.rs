//! vxlan-routingd entry point.
//!
//! Loads the configuration, seeds the operational database and runs the
//! routing daemon until Ctrl-C.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use vxlan_oper_db::OperDb;
use vxlan_routing::audit;
use vxlan_routing::config::RoutingConfig;
use vxlan_routing::daemon::{RoutingDaemon, RoutingDaemonConfig};
use vxlan_routing::xmpp::LoggingAdvertiser;
use vxlan_types::Ipv4Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Plain text through env_logger
    Text,
    /// JSON lines through tracing-subscriber
    Json,
}

/// VXLAN inter-VRF routing daemon
#[derive(Parser, Debug)]
#[command(name = "vxlan-routingd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Address of this compute node
    #[arg(long)]
    router_id: Option<Ipv4Address>,

    /// Interval between queue drains in milliseconds
    #[arg(long)]
    tick_interval_ms: Option<u64>,

    /// Seconds between introspection dumps (0 disables them)
    #[arg(long)]
    dump_interval_secs: Option<u64>,
}

fn load_config(args: &Args) -> anyhow::Result<RoutingConfig> {
    let mut config = match &args.config {
        Some(path) => RoutingConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RoutingConfig::default(),
    };

    if let Some(router_id) = args.router_id {
        config.db.router_id = router_id;
    }
    if let Some(tick) = args.tick_interval_ms {
        config.tick_interval_ms = tick;
    }
    if let Some(dump) = args.dump_interval_secs {
        config.dump_interval_secs = dump;
    }
    config.validate().context("command line overrides")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match args.log_format {
        LogFormat::Text => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
                .init()
        }
        LogFormat::Json => audit::init_logging(&args.log_level),
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Starting vxlan-routingd");
    info!("Router id: {}", config.db.router_id);
    info!("Fabric VRF: {}", config.db.fabric_vrf);
    info!("Fabric policy VRF: {}", config.db.fabric_policy_vrf);
    info!("Tick interval: {}ms, batch size: {}", config.tick_interval_ms, config.batch_size);

    let db = Arc::new(OperDb::new(config.db.clone()));
    let daemon = Arc::new(RoutingDaemon::new(
        RoutingDaemonConfig::from(&config),
        Arc::clone(&db),
        Arc::new(LoggingAdvertiser),
    ));

    if !daemon.init() {
        error!("Failed to initialize vxlan-routingd");
        return ExitCode::FAILURE;
    }

    if !config.seed.is_empty() {
        info!(
            "Seeding {} VRF(s), {} VN(s), {} interface(s), {} route(s)",
            config.seed.vrfs.len(),
            config.seed.vns.len(),
            config.seed.interfaces.len(),
            config.seed.routes.len()
        );
        config.seed.apply(&db);
    }

    let stop = daemon.stop_handle();
    let shutdown_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received SIGINT, shutting down gracefully...");
                stop.stop();
            }
            Err(err) => {
                error!("Failed to listen for ctrl-c: {}", err);
            }
        }
    });

    daemon.run().await;
    shutdown_handle.abort();

    info!("vxlan-routingd shutdown complete");
    ExitCode::SUCCESS
}

#![forbid(unsafe_code)]

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use relay_core::{balancer, EdgeDiscovery, HttpLoader, PlaylistCache};

use crate::config::AppConfig;

fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");

    if GIT_HASH.is_empty() {
        // Leak is fine, called once and alive for the program's lifetime.
        Box::leak(VERSION.to_string().into_boxed_str())
    } else {
        Box::leak(format!("{VERSION} ({GIT_HASH})").into_boxed_str())
    }
}

/// HLS playlist proxy that rewrites playlists to route segments through edges.
#[derive(Parser)]
#[command(name = "hls-relay", version = version_string(), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the playlist proxy server.
    Serve {
        /// Listen address (e.g. 0.0.0.0:8080). Overrides the config file.
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Path to TOML config file.
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a config file and exit.
    CheckConfig {
        /// Path to TOML config file.
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { listen, config } => run_serve(listen, config).await,
        Commands::CheckConfig { config } => run_check_config(config),
    }
}

fn run_check_config(path: PathBuf) {
    init_tracing("pretty");
    match AppConfig::load(&path) {
        Ok(_) => {
            println!("{}: ok", path.display());
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn run_serve(listen_override: Option<SocketAddr>, config_path: PathBuf) {
    let config = match AppConfig::load(&config_path) {
        Ok(config) => {
            init_tracing(&config.server.log_format);
            tracing::info!(path = %config_path.display(), "Loaded config file");
            config
        }
        Err(e) => {
            init_tracing("pretty");
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let listen = listen_override.unwrap_or(config.server.listen);

    let client = HttpLoader::build_client(config.upstream.request_timeout());

    let loader = Arc::new(HttpLoader::with_client(
        config.upstream.servers.clone(),
        client.clone(),
    ));
    let cache = Arc::new(PlaylistCache::new(loader, config.upstream.cache_ttl()));

    let discovery = config.discovery.as_ref().map(|section| {
        Arc::new(EdgeDiscovery::new(
            section.to_discovery_config(),
            client.clone(),
        ))
    });

    let balancer =
        match balancer::from_config(&config.balancer.to_balancer_config(), discovery.as_ref()) {
            Ok(balancer) => balancer,
            Err(e) => {
                tracing::error!(error = %e, "Invalid balancer configuration");
                std::process::exit(1);
            }
        };

    // Started after balancer construction so the first tick's events land on
    // a live subscriber.
    if let Some(ref discovery) = discovery {
        if let Err(e) = discovery.start() {
            tracing::error!(error = %e, "Failed to start edge discovery");
            std::process::exit(1);
        }
    }

    let mut state = relay_api::state::AppState::new(cache, balancer)
        .with_ip_header_name(config.server.ip_header_name.clone())
        .with_cors_origins(config.server.cors_origins.clone());
    if let Some(ref discovery) = discovery {
        state = state.with_discovery(Arc::clone(discovery));
    }

    tracing::info!(%listen, "Starting HLS relay server");
    if let Err(e) =
        relay_api::serve_with_state(listen, state, relay_api::shutdown_signal()).await
    {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }

    tracing::info!("Shutdown signal received");

    if let Some(ref discovery) = discovery {
        discovery.stop();
        tracing::info!("Edge discovery stopped");
    }

    tracing::info!("Shutdown complete");
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format {
        "json" => {
            fmt().with_env_filter(filter).json().init();
        }
        _ => {
            fmt().with_env_filter(filter).init();
        }
    }
}

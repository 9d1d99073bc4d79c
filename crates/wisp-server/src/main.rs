// ============================================
// File: crates/wisp-server/src/main.rs
// ============================================
//! # Wisp Server Entry Point
//!
//! ## Creation Reason
//! Main entry point for the wisp controller binary.
//! Handles CLI parsing, logging setup, and server start.
//!
//! ## Usage
//! ```bash
//! wisp-server start                    # run the controller
//! wisp-server validate                 # check the config file
//! wisp-server pubkey                   # print the controller public key
//! wisp-server start -c ./server.toml   # non-default config location
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A missing config file means defaults; a broken one is an error
//! - `RUST_LOG` overrides `[logging] level`
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wisp_server::management::{deriver_for, load_controller_key};
use wisp_server::{Server, ServerConfig};

// ============================================
// CLI Definition
// ============================================

/// Wisp WiFi fleet controller
#[derive(Parser, Debug)]
#[command(name = "wisp-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the controller
    Start {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/wisp/server.toml")]
        config: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/wisp/server.toml")]
        config: PathBuf,
    },

    /// Derive and print the controller tunnel public key
    Pubkey {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/wisp/server.toml")]
        config: PathBuf,
    },
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Execute command
    let result = match cli.command {
        Commands::Start { config } => cmd_start(config).await,
        Commands::Validate { config } => cmd_validate(config).await,
        Commands::Pubkey { config } => cmd_pubkey(config).await,
    };

    // Handle errors
    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Starts the controller.
async fn cmd_start(config_path: PathBuf) -> anyhow::Result<()> {
    let config = load_config(&config_path).await?;
    init_logging(&config.logging.level);

    info!(
        control = %config.control_addr(),
        raw = %config.network.raw_auth_addr,
        data_dir = %config.storage.data_dir.display(),
        "Configuration ready"
    );

    let server = Server::new(config);
    server.run().await?;

    Ok(())
}

/// Validates configuration file.
async fn cmd_validate(config_path: PathBuf) -> anyhow::Result<()> {
    init_logging("warn");

    if !config_path.exists() {
        println!("⚠️  Config file not found: {}", config_path.display());
        println!("   Controller will use default values.");
        return Ok(());
    }

    let config = ServerConfig::load(&config_path).await?;

    println!("✅ Configuration is valid");
    println!();
    println!("Listeners:");
    println!("   Control:    {}", config.control_addr());
    println!("   Raw auth:   {}", config.network.raw_auth_addr);
    println!("   Asset port: {}", config.network.asset_port);
    println!();
    println!("Tunnel:");
    println!("   Controller IP: {}", config.tunnel.controller_ip);
    println!("   Listen port:   {}", config.tunnel.listen_port);
    if let Some(ep) = &config.tunnel.public_endpoint {
        println!("   Endpoint:      {ep}");
    }
    println!();
    println!("Control:");
    println!("   Heartbeat:     {}s", config.control.heartbeat_interval_secs);
    println!("   Push debounce: {}ms", config.control.push_debounce_ms);
    println!("   Station TTL:   {}s", config.control.station_ttl_secs);
    println!();

    Ok(())
}

/// Prints the controller public key.
async fn cmd_pubkey(config_path: PathBuf) -> anyhow::Result<()> {
    init_logging("warn");
    let config = load_config(&config_path).await?;

    let deriver = deriver_for(&config.tunnel.pubkey_command)?;
    let (_, public_key) = load_controller_key(&config.tunnel.private_key_file, deriver.as_ref()).await;

    match public_key {
        Some(key) => {
            println!("{key}");
            Ok(())
        }
        None => anyhow::bail!(
            "could not derive a public key from {}",
            config.tunnel.private_key_file.display()
        ),
    }
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

/// Loads the config file, or defaults when it does not exist.
async fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
    if path.exists() {
        Ok(ServerConfig::load(path).await?)
    } else {
        Ok(ServerConfig::default())
    }
}

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use sdwan_mcp::catalog;
use sdwan_mcp::commands;
use sdwan_mcp::forwarder::RequestForwarder;
use sdwan_mcp::gateway;
use sdwan_mcp::server::{stdio, Dispatcher};
use sdwan_mcp::session::{Credentials, SessionManager};
use sdwan_mcp::Config;

/// MCP tool server for SD-WAN controller REST APIs.
#[derive(Parser, Debug)]
#[command(name = "sdwan-mcp")]
#[command(version)]
#[command(about = "Expose an SD-WAN controller's REST API as MCP tools.", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve MCP over stdin/stdout (the transport MCP clients spawn)
    Serve,

    /// Serve MCP over HTTP (POST /mcp)
    Gateway {
        /// Port to bind (default from config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind (default from config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Show configuration and credential status
    Status,

    /// List the tools this server exposes
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("SDWAN_MCP_CONFIG_DIR", config_dir);
    }

    // Logging goes to stderr: stdout belongs to the stdio transport.
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut config = Config::load_or_init().await?;
    config.apply_env_overrides();

    match cli.command {
        Commands::Serve => {
            config.validate_credentials()?;
            let dispatcher = connect(&config).await?;
            stdio::run(dispatcher).await
        }

        Commands::Gateway { port, host } => {
            config.validate_credentials()?;
            let port = port.unwrap_or(config.gateway.port);
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let dispatcher = connect(&config).await?;
            gateway::run(dispatcher, &host, port).await
        }

        Commands::Status => {
            println!("sdwan-mcp {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Config:       {}", config.config_path.display());
            println!("Controller:   {}", config.controller.base_url);
            println!("TLS verify:   {}", !config.controller.insecure_tls);
            println!("Timeout:      {}s", config.controller.timeout_secs);
            println!(
                "Credentials:  {}",
                match config.validate_credentials() {
                    Ok(()) => "complete".to_string(),
                    Err(e) => format!("incomplete ({e})"),
                }
            );
            Ok(())
        }

        Commands::Tools => {
            println!("Endpoint tools:");
            for spec in catalog::ENDPOINTS {
                println!("  {:<34} {}", spec.name, spec.title);
            }
            println!();
            println!("Composite tools:");
            println!("  appliance_live_status  (commands: {})", join_refs(commands::live_status().references()));
            println!("  eip_cache_lookup       (commands: {})", join_refs(commands::eip_cache().references()));
            println!("  fetch_all_records");
            Ok(())
        }
    }
}

fn join_refs(refs: Vec<&'static str>) -> String {
    refs.join(", ")
}

/// Authenticate eagerly and wire the dispatcher. Failing here, before any
/// transport comes up, turns bad credentials into a clean startup error.
async fn connect(config: &Config) -> Result<Arc<Dispatcher>> {
    let timeout = Duration::from_secs(config.controller.timeout_secs);
    let creds = Credentials::from(&config.controller);
    let base_url = creds.base_url.clone();

    let session = Arc::new(SessionManager::new(
        creds,
        config.controller.insecure_tls,
        timeout,
    )?);
    session.connect().await?;
    info!("Authenticated against {base_url}");

    let forwarder = Arc::new(RequestForwarder::new(
        Arc::clone(&session),
        config.controller.insecure_tls,
        timeout,
    )?);
    Ok(Arc::new(Dispatcher::new(forwarder)))
}

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use usdstand::{CatalogServer, Config, ServerConfig};

#[derive(Parser)]
#[command(name = "usdstand", version, about = "Serve recorded usdz archives for AR preview")]
struct Cli {
    /// Path to the config file (defaults to usdstand.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish the archive directory over HTTP until interrupted
    Serve {
        /// Directory to scan for archives
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { dir, port } => {
            let mut server_config = ServerConfig::from(&config.server);
            if let Some(dir) = dir {
                server_config.directory = Some(dir);
            }
            if let Some(port) = port {
                server_config.port = port;
            }

            let mut server = CatalogServer::new(server_config);
            let addr = server.start().await?;
            tracing::info!("usdz catalog available at http://{addr}/");

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupt received, shutting down");
                }
                _ = server.wait_for_exit() => {}
            }
            server.stop();
        }
    }

    Ok(())
}

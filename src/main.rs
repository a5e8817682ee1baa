use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use butler::{Config, Server};

#[derive(Parser, Debug)]
#[command(name = "butler")]
#[command(about = "An HTTP/1.1 edge server with a dynamic backend registrar")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server from a YAML config file.
    Serve { config: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Command::Serve { config } => serve(&config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    info!("starting butler");

    let config = Config::load(config_path).await?;
    let server = Server::new(&config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!("server error: {e}");
            }
            result.map_err(Into::into)
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            server.close();
            Ok(())
        }
    }
}

use anyhow::Context;
use clap::{Parser, Subcommand};

use aircastd::relay::{RelayConfig, RelayServer, DEFAULT_MAX_PROTOCOL_ERRORS};

#[derive(Debug, Parser)]
#[command(name = "aircastd")]
#[command(about = "Pairing relay for aircast live call sessions")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the relay until interrupted.
    Serve {
        /// Listen address for websocket connections.
        #[arg(long, default_value = "127.0.0.1:9400")]
        bind: String,

        /// Consecutive protocol violations tolerated per connection before
        /// it is dropped.
        #[arg(long, default_value_t = DEFAULT_MAX_PROTOCOL_ERRORS)]
        max_protocol_errors: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aircastd=debug,info".into()),
        )
        .try_init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Serve {
            bind,
            max_protocol_errors,
        } => {
            let server = RelayServer::bind(&bind, RelayConfig {
                max_protocol_errors,
            })
            .await
            .context("start relay")?;
            server.run().await;
        }
    }
    Ok(())
}

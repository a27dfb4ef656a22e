use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use klaxon::auth::CredentialVerifier;
use klaxon::config::{DEV_JWT_SECRET, ServerConfig, ServerConfigOverrides};
use klaxon::server::{AppState, create_router};
use klaxon::store::{SqliteStore, Store};

#[derive(Parser)]
#[command(name = "klaxon")]
#[command(about = "Real-time alarm coordination server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Path to a TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("klaxon=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            data_dir,
            config,
        } => {
            let config = ServerConfig::load_with_overrides(
                config.as_deref(),
                ServerConfigOverrides {
                    host,
                    port,
                    data_dir,
                },
            )?;

            if config.jwt_secret == DEV_JWT_SECRET {
                warn!(
                    "using the built-in development JWT secret; set jwt_secret or KLAXON_JWT_SECRET"
                );
            }

            fs::create_dir_all(&config.data_dir)?;

            let store = SqliteStore::new(config.db_path())?;
            store.initialize()?;
            info!("database ready at {}", config.db_path().display());

            let credentials =
                CredentialVerifier::new(&config.jwt_secret, config.token_ttl_minutes);
            let state = Arc::new(AppState::new(
                Arc::new(store),
                credentials,
                config.send_queue_depth,
            ));

            let app = create_router(state);
            let addr = config.socket_addr()?;

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use calmerge::config::Config;
use calmerge::db::Database;
use calmerge::routes::{self, AppState};

#[derive(Parser)]
#[command(name = "calmerge", version, about = "Group polled sources into feeds")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "calmerge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the web interface (default)
    Serve,
    /// Drop all tables and recreate the schema. Destroys existing data.
    InitDb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calmerge=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load_or_default(&cli.config)?.with_env_overrides();
    info!("Using database {}", config.database_url);

    let db = Database::new(&config.database_url, config.trace_queries).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::InitDb => {
            db.reset().await?;
            println!("Created database at {}", config.database_url);
        }
        Command::Serve => {
            db.initialize().await?;
            info!("Database initialized");

            let state = Arc::new(AppState { db: Arc::new(db) });
            let app = routes::router(state);

            let listener = tokio::net::TcpListener::bind(&config.listen).await?;
            info!("Server starting on http://{}", config.listen);

            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

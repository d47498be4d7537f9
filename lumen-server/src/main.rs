use std::sync::Arc;

use clap::Parser;
use lumen_core::LumenConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use lumen_server::http::{self, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "lumen.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match LumenConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Connect to DB
    let pool = match lumen_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match lumen_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }

        println!("✅ Lumen DB health check passed");
        return Ok(());
    }

    // Completion backend (exactly one active per deployment)
    let provider = match lumen_core::provider::create_backend(&config.provider) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Failed to create provider backend: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(backend = provider.name(), model = %config.provider.model, "Provider backend ready");

    let state = Arc::new(HttpState {
        store: Arc::new(lumen_core::store::PgChatStore::new(pool)),
        provider: Arc::from(provider),
    });

    // Shutdown wiring
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let addr = format!("{}:{}", config.http.host, config.http.port);
    http::start_http_server(&addr, state, tx.subscribe()).await?;

    Ok(())
}

//! lumen-cli — terminal frontend for the Lumen chat relay
//!
//! # Subcommands
//! - `ask <message> [--json]` — relay a prompt and print the reply
//! - `status`                 — show server health

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "lumen-cli", version, about = "Lumen chat relay CLI")]
struct Cli {
    /// Lumen HTTP server URL (overrides LUMEN_HTTP_URL env var)
    #[arg(long, env = "LUMEN_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send a message and print the model's reply
    Ask {
        /// The message to relay to the model
        message: String,

        /// Print the full stored record as JSON instead of just the reply
        #[arg(long)]
        json: bool,
    },

    /// Show Lumen server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

/// A stored chat exchange from POST /api/chat
#[derive(Debug, Deserialize)]
struct ChatRecord {
    #[allow(dead_code)]
    id: String,
    #[allow(dead_code)]
    prompt: String,
    response: String,
    #[serde(rename = "createdAt")]
    #[allow(dead_code)]
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    database: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Commands
// ============================================================================

fn ask(server: &str, message: &str, json: bool) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::new();
    let resp = client
        .post(format!("{}/api/chat", server))
        .json(&serde_json::json!({ "message": message }))
        .send()
        .with_context(|| format!("Failed to reach Lumen server at {}", server))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let message = resp
            .json::<ErrorResponse>()
            .map(|e| e.error)
            .unwrap_or_else(|_| "unknown error".to_string());
        bail!("Server returned {}: {}", status, message);
    }

    let body = resp.text().context("Failed to read response body")?;
    if json {
        println!("{}", body);
        return Ok(());
    }

    let record: ChatRecord =
        serde_json::from_str(&body).context("Unexpected response shape from /api/chat")?;
    println!("{}", record.response);
    Ok(())
}

fn status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::new();
    let resp = client
        .get(format!("{}/api/health", server))
        .send()
        .with_context(|| format!("Failed to reach Lumen server at {}", server))?;

    let code = resp.status();
    let health: HealthResponse = resp
        .json()
        .context("Unexpected response shape from /api/health")?;

    println!("server:   {} ({})", server, code);
    println!("status:   {}", health.status);
    println!("database: {}", health.database);

    if health.status != "ok" {
        std::process::exit(1);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Ask { message, json } => ask(&cli.server, message, *json),
        Commands::Status => status(&cli.server),
    }
}

//! caddie-admin: operator tools that work directly on the backend's state
//! file and audit log. Stop the backend before writing to its state file.

mod seed;

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use caddie_backend::audit::{read_log, verify_chain};
use caddie_backend::auth::AuthEngine;
use caddie_backend::config::AppConfig;
use caddie_backend::persistence::JsonFileStore;
use caddie_backend::ratings;
use caddie_backend::state::Role;
use uuid::Uuid;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "caddie-admin", about = "Caddie booking maintenance tools")]
struct Args {
    /// State file (defaults to STATE_FILE, then data/state.json)
    #[arg(long, global = true)]
    state: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upsert clubs, caddies and golfers from a TOML fixture
    Seed {
        #[arg(short, long)]
        fixture: String,
    },
    /// Rebuild every caddie and golfer rating aggregate from booking history
    RecomputeRatings,
    /// Check the hash chain of the audit log
    VerifyAudit {
        /// Audit log (defaults to AUDIT_LOG_PATH, then data/booking-audit.jsonl)
        #[arg(long)]
        log: Option<String>,
    },
    /// Print a bearer token signed with JWT_SECRET
    Token {
        #[arg(long)]
        user_id: Uuid,
        #[arg(long, value_enum)]
        role: RoleArg,
        #[arg(long, default_value = "")]
        email: String,
        /// Lifetime in hours
        #[arg(long, default_value = "24")]
        hours: i64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RoleArg {
    Golfer,
    Caddie,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Golfer => Role::Golfer,
            RoleArg::Caddie => Role::Caddie,
            RoleArg::Admin => Role::Admin,
        }
    }
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "caddie_admin=info,caddie_backend=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env();
    let state_file = args.state.unwrap_or(config.state_file);

    match args.command {
        Command::Seed { fixture } => {
            let text = tokio::fs::read_to_string(&fixture)
                .await
                .with_context(|| format!("reading {fixture}"))?;
            let store = JsonFileStore::open(&state_file).await;
            seed::apply(&store, seed::parse(&text)?).await?;
            info!("🌱 Fixture {fixture} written to {state_file}");
        }
        Command::RecomputeRatings => {
            let store = JsonFileStore::open(&state_file).await;
            let (caddies, golfers) = ratings::recompute_all(&store).await?;
            info!("⭐ Ratings rebuilt: {caddies} caddies, {golfers} golfers");
        }
        Command::VerifyAudit { log } => {
            let path = log.unwrap_or(config.audit_log_path);
            let blocks = read_log(Path::new(&path)).await?;
            match verify_chain(&blocks) {
                Ok(()) => info!("🔗 {path}: {} blocks, chain intact", blocks.len()),
                Err(i) => bail!("{path}: chain broken at block {i}"),
            }
        }
        Command::Token { user_id, role, email, hours } => {
            let auth = AuthEngine::new(&config.jwt_secret);
            let token = auth.issue(user_id, &email, role.into(), chrono::Duration::hours(hours))?;
            println!("{token}");
        }
    }
    Ok(())
}

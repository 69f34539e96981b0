//! Offline maintenance tasks run by hand against the production database

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchlog::{
    db::{create_pool, PgStore, WatchlistRepository},
    models::CreateInvitationRequest,
    services::{
        accounts::{issue_invitation, DEFAULT_INVITATION_DAYS},
        telemetry::purge_telemetry,
    },
};

#[derive(Parser, Debug)]
#[command(name = "watchlog-maintenance")]
#[command(about = "Maintenance tasks for the watchlog database")]
#[command(version)]
struct Args {
    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill missing weighted ratings from the user's own rating
    BackfillWeightedRatings {
        /// Count the rows that would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete recommendation telemetry older than the retention period
    PurgeTelemetry {
        #[arg(long, env = "TELEMETRY_RETENTION_DAYS", default_value_t = 90)]
        days: i64,
    },
    /// Issue an invitation that no user created, e.g. for the first account
    CreateInvitation {
        #[arg(long)]
        email: String,
        /// Days until the invitation expires
        #[arg(long, default_value_t = DEFAULT_INVITATION_DAYS)]
        days: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watchlog=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let pool = create_pool(&args.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    let store = PgStore::new(pool);

    match args.command {
        Command::BackfillWeightedRatings { dry_run } => {
            let rows = store.backfill_weighted_ratings(dry_run).await?;
            if dry_run {
                info!(rows, "Dry run: weighted ratings that would be filled");
            } else {
                info!(rows, "Weighted ratings filled");
            }
        }
        Command::PurgeTelemetry { days } => {
            let removed = purge_telemetry(&store, days).await?;
            info!(removed, days, "Telemetry purged");
        }
        Command::CreateInvitation { email, days } => {
            let request = CreateInvitationRequest {
                email,
                expires_in_days: Some(days),
            };
            let invitation = issue_invitation(&store, None, request).await?;
            info!(email = %invitation.email, expires_at = %invitation.expires_at, "Invitation created");
            println!("{}", invitation.token);
        }
    }

    Ok(())
}

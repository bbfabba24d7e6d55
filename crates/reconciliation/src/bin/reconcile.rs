//! Operator CLI for seat counter reconciliation.

use std::process;

use booking_store::PostgresBookingStore;
use clap::{Args, Parser, Subcommand};
use common::TripDateId;
use reconciliation::{Reconciler, ResetConfirmation};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(name = "reconcile", about = "Seat counter reconciliation", long_about = None)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true, global = true)]
    database_url: Option<String>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compare one date's cached counter with its reservations
    Diagnose(DiagnoseArgs),
    /// Recompute every date's counter from its reservations
    Sync,
    /// Delete all bookings and payments and zero every counter
    Reset(ResetArgs),
}

#[derive(Debug, Args)]
struct DiagnoseArgs {
    /// Trip date UUID
    #[arg(long)]
    trip_date: TripDateId,
}

#[derive(Debug, Args)]
struct ResetArgs {
    /// Must be RESET
    #[arg(long)]
    confirm: String,

    /// Must be RESET again
    #[arg(long)]
    confirm_again: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(error) = run(cli).await {
        eprintln!("{error}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    // Validate the confirmation before touching the database
    let confirmation = match &cli.command {
        Commands::Reset(args) => Some(
            ResetConfirmation::new(&args.confirm, &args.confirm_again)
                .map_err(|error| error.to_string())?,
        ),
        _ => None,
    };

    let database_url = cli
        .database_url
        .ok_or_else(|| "DATABASE_URL is required".to_string())?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;
    let reconciler = Reconciler::new(PostgresBookingStore::new(pool));

    match cli.command {
        Commands::Diagnose(args) => {
            let report = reconciler
                .diagnose(args.trip_date)
                .await
                .map_err(|error| format!("diagnosis failed: {error}"))?;
            if cli.json {
                return print_json(&report);
            }
            println!("trip date:    {}", report.trip_date_id);
            println!("capacity:     {}", report.capacity);
            println!("occupied:     {}", report.occupied);
            println!("remaining:    {}", report.remaining);
            println!("active total: {}", report.active_total);
            for line in &report.reservations {
                let marker = if line.over_capacity { "  OVER" } else { "" };
                println!(
                    "  {} {:>11} party {:>3} cumulative {:>4}{marker}",
                    line.number,
                    line.status.as_str(),
                    line.party_size,
                    line.cumulative
                );
            }
            if report.oversold {
                println!("oversold: active reservations exceed capacity");
            }
            if report.drift {
                println!("drift: cached occupied differs from active reservations");
            }
            if report.is_healthy() {
                println!("ok");
            }
        }
        Commands::Sync => {
            let summary = reconciler
                .reconcile_all()
                .await
                .map_err(|error| format!("reconciliation failed: {error}"))?;
            if cli.json {
                return print_json(&summary);
            }
            for change in &summary.changed {
                println!(
                    "{}: {} -> {} ({:+})",
                    change.trip_date_id,
                    change.before,
                    change.after,
                    change.delta()
                );
            }
            println!(
                "examined {} dates, corrected {}",
                summary.examined,
                summary.changed.len()
            );
        }
        Commands::Reset(_) => {
            let confirmation =
                confirmation.ok_or_else(|| "reset confirmation missing".to_string())?;
            let summary = reconciler
                .reset_all(confirmation)
                .await
                .map_err(|error| format!("reset failed: {error}"))?;
            if cli.json {
                return print_json(&summary);
            }
            println!(
                "deleted {} payments, {} reservations, {} purchases, {} cart items, {} carts",
                summary.payments,
                summary.reservations,
                summary.purchases,
                summary.cart_items,
                summary.carts
            );
            println!("reset {} trip dates", summary.trip_dates_reset);
        }
    }

    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|error| format!("failed to encode report: {error}"))?;
    println!("{json}");
    Ok(())
}

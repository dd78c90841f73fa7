// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc, Weekday};
use clap::{Parser, Subcommand};
use std::fs;
use streak_engine::config::Config;
use streak_engine::engine::{interval_key, Leaderboard};
use streak_engine::logging;
use streak_engine::models::{Competition, IntervalBucket};
use streak_engine::service::CompetitionService;
use tracing::info;

#[derive(Parser)]
#[command(name = "streak-engine")]
#[command(about = "Scoring, standings and settlement for fitness competitions")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the leaderboard for a competition snapshot (JSON)
    Standings {
        /// Path to the competition snapshot
        #[arg(long)]
        snapshot: String,

        /// Day to score as of (defaults to today, UTC)
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Mark this participant as the viewer
        #[arg(long)]
        user: Option<String>,
    },
    /// Print the interval key a date falls into
    IntervalKey {
        #[arg(long)]
        date: NaiveDate,

        /// day, week or month
        #[arg(long, default_value = "day")]
        bucket: String,

        /// First day of the week, e.g. Mon or Sunday
        #[arg(long)]
        first_weekday: Option<Weekday>,
    },
    /// Settle every scheduled or active competition in the database
    Settle,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_from_env()?;

    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    match cli.command {
        Commands::Standings { snapshot, as_of, user } => {
            let content = fs::read_to_string(&snapshot)
                .with_context(|| format!("Failed to read snapshot: {}", snapshot))?;
            let competition: Competition = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse snapshot: {}", snapshot))?;
            competition.validate_with_calendar(config.engine.first_weekday)?;

            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            let leaderboard = Leaderboard::build(&competition, as_of, user.as_deref(), &config.engine);
            println!("{}", serde_json::to_string_pretty(&leaderboard)?);
        }
        Commands::IntervalKey { date, bucket, first_weekday } => {
            let bucket: IntervalBucket = bucket.parse()?;
            let first_weekday = first_weekday.unwrap_or(config.engine.first_weekday);
            println!("{}", interval_key(date, bucket, first_weekday));
        }
        Commands::Settle => {
            let service = CompetitionService::from_config(&config).await?;
            let outcomes = service.settle_all().await?;
            let changed = outcomes.iter().filter(|o| o.status_changed()).count();
            info!(
                settled = outcomes.len(),
                status_changed = changed,
                "Settlement pass complete"
            );
        }
    }

    Ok(())
}

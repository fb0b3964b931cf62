mod collect;
mod config;
mod db;
mod error;
mod extract;
mod fallback;
mod fetch;
mod formats;
mod ident;
mod orchestrate;
mod timeparse;
mod venues;

use std::time::Instant;

use anyhow::{bail, Context};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};

use crate::fetch::FetchClient;
use crate::venues::venue_slugs;

#[derive(Parser)]
#[command(name = "listings_scraper", about = "Repertory cinema listings scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape one venue and upsert its screenings
    Scrape {
        /// Venue slug (e.g. "ica", "bfi-southbank")
        venue: String,
    },
    /// Scrape every configured venue, merge, and upsert once
    ScrapeAll,
    /// Screenings for one UTC day, joined with film and cinema
    Listings {
        /// Day as YYYY-MM-DD
        #[arg(short, long)]
        day: String,
        /// Restrict to one cinema id (see `cinemas`)
        #[arg(short, long)]
        cinema: Option<i64>,
    },
    /// Known cinemas, ordered by name
    Cinemas,
    /// Days within a month that have at least one screening
    Days {
        /// Month as YYYY-MM
        #[arg(short, long)]
        month: String,
    },
    /// Storage totals
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scrape { venue } => {
            if !venue_slugs().contains(&venue.as_str()) {
                bail!(
                    "unknown venue '{}' (configured: {})",
                    venue,
                    venue_slugs().join(", ")
                );
            }
            let summary = scrape(&[venue.as_str()]).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::ScrapeAll => {
            let slugs = venue_slugs();
            let summary = scrape(&slugs).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::Listings { day, cinema } => {
            let conn = open_db()?;
            let (from, to) = day_range(&day)?;
            let rows = db::screenings_between(&conn, &from, &to, cinema)?;
            if rows.is_empty() {
                println!("No screenings on {}.", day);
                return Ok(());
            }
            println!(
                "{:<17} | {:<40} | {:<6} | {:<20} | {}",
                "Start (UTC)", "Film", "Year", "Cinema", "Format"
            );
            println!("{}", "-".repeat(100));
            for r in &rows {
                let year = r.year.map(|y| y.to_string()).unwrap_or_else(|| "-".into());
                println!(
                    "{:<17} | {:<40} | {:<6} | {:<20} | {}",
                    &r.start_time[..16.min(r.start_time.len())],
                    truncate(&r.title, 40),
                    year,
                    truncate(&r.cinema, 20),
                    r.format.as_deref().unwrap_or("")
                );
            }
            println!("\n{} screenings", rows.len());
            Ok(())
        }
        Commands::Cinemas => {
            let conn = open_db()?;
            let cinemas = db::list_cinemas(&conn)?;
            if cinemas.is_empty() {
                println!("No cinemas yet. Run 'scrape-all' first.");
                return Ok(());
            }
            for (id, name) in &cinemas {
                println!("{:>4}  {}", id, name);
            }
            Ok(())
        }
        Commands::Days { month } => {
            let conn = open_db()?;
            let (from, to) = month_range(&month)?;
            let days = db::screening_days(&conn, &from, &to)?;
            if days.is_empty() {
                println!("No screenings in {}.", month);
                return Ok(());
            }
            for d in &days {
                println!("{}", d);
            }
            println!("\n{} days with screenings", days.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = open_db()?;
            let s = db::get_stats(&conn)?;
            println!("Cinemas:    {}", s.cinemas);
            println!("Films:      {}", s.films);
            println!("Screenings: {}", s.screenings);
            println!("Upcoming:   {}", s.upcoming);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }

    result
}

/// Configuration is validated before any network activity; a missing
/// required variable is the only fatal failure class.
async fn scrape(slugs: &[&str]) -> anyhow::Result<orchestrate::RunSummary> {
    let config = config::load()?;
    let conn = db::connect(&config.db_path)?;
    db::init_schema(&conn)?;
    let fetcher = FetchClient::new(&config)?;
    Ok(orchestrate::run(&conn, &fetcher, slugs).await?)
}

fn open_db() -> anyhow::Result<rusqlite::Connection> {
    let path = std::env::var("LISTINGS_DB").unwrap_or_else(|_| "data/screenings.sqlite".into());
    let conn = db::connect(&path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

fn day_range(day: &str) -> anyhow::Result<(String, String)> {
    let d = NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .with_context(|| format!("invalid day '{day}', expected YYYY-MM-DD"))?;
    let next = d.succ_opt().context("day out of range")?;
    Ok((format!("{d}T00:00:00Z"), format!("{next}T00:00:00Z")))
}

fn month_range(month: &str) -> anyhow::Result<(String, String)> {
    let first = NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d")
        .with_context(|| format!("invalid month '{month}', expected YYYY-MM"))?;
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    }
    .context("month out of range")?;
    Ok((format!("{first}T00:00:00Z"), format!("{next}T00:00:00Z")))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

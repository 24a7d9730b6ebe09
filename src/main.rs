use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};
use url::Url;

use senscritique_harvester::cache::MemoryCache;
use senscritique_harvester::config::AppConfig;
use senscritique_harvester::models::{ProfileOptions, ReviewRecord};
use senscritique_harvester::pipeline::Assembler;
use senscritique_harvester::scraper::harvest::extract_reviews;
use senscritique_harvester::scraper::{ProfileSource, SensCritiqueScraper, dates};
use senscritique_harvester::utils::{self, Clock, SystemClock};

#[derive(Parser)]
#[command(name = "sc-harvest", about = "SensCritique profile & review harvester", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a full profile and print it as JSON
    Profile {
        username: String,

        #[arg(long)]
        no_reviews: bool,

        #[arg(long)]
        no_favorites: bool,

        #[arg(long)]
        no_cache: bool,

        /// Cache TTL in milliseconds (default: cache.ttl_ms from config)
        #[arg(long)]
        cache_ms: Option<u64>,

        #[arg(long)]
        pretty: bool,
    },

    /// Harvest reviews only and print a summary
    Reviews { username: String },

    /// Run extraction + normalization on a saved review page
    Extract {
        file: PathBuf,

        /// Author named in "Critique de … par USER" headers (any author if empty)
        #[arg(short, long, default_value = "")]
        user: String,

        /// Reference instant for relative dates, RFC 3339 (default: now)
        #[arg(long)]
        now: Option<String>,
    },

    /// Show how a date text is normalized
    ParseDate {
        text: String,

        #[arg(long)]
        now: Option<String>,
    },
}

fn parse_now(now: Option<&str>) -> Result<DateTime<Utc>> {
    match now {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("Invalid --now value {:?}", s))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

fn print_reviews(reviews: &[ReviewRecord], now: DateTime<Utc>) {
    println!("─────────────────────────────────────────────────────────────");
    println!("  {} reviews", utils::fmt_count(reviews.len()));
    println!("─────────────────────────────────────────────────────────────");
    for r in reviews {
        let when = r
            .date_instant
            .and_then(|i| dates::time_ago(i, now))
            .or_else(|| r.date_display.clone())
            .unwrap_or_else(|| "—".into());
        let rating = r.rating.map(|n| format!("{:>2}/10", n)).unwrap_or_else(|| "   —".into());
        println!("  {:<22} {}  {}", when, rating, r.title);
    }
    println!("─────────────────────────────────────────────────────────────");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "senscritique_harvester=info,sc_harvest=info,warn",
        1 => "senscritique_harvester=debug,sc_harvest=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Command::Profile {
            username,
            no_reviews,
            no_favorites,
            no_cache,
            cache_ms,
            pretty,
        } => {
            let _t = utils::Timer::start(format!("Profile {}", username));
            let scraper = SensCritiqueScraper::new(&config, Arc::clone(&clock))
                .context("Failed to build scraper")?;
            let assembler = Assembler::new(Arc::new(scraper), Arc::new(MemoryCache::new()), clock);

            let options = ProfileOptions {
                load_reviews: !no_reviews,
                load_favorites: !no_favorites,
                use_cache: config.cache.enabled && !no_cache,
                cache_time_ms: cache_ms.unwrap_or(config.cache.ttl_ms),
            };
            let assembled = assembler
                .load(&username, options)
                .await
                .with_context(|| format!("Could not assemble profile for {}", username))?;

            let out = serde_json::json!({
                "profile": &*assembled.profile,
                "report": assembled.report,
            });
            let json = if pretty {
                serde_json::to_string_pretty(&out)?
            } else {
                serde_json::to_string(&out)?
            };
            println!("{}", json);
        }

        Command::Reviews { username } => {
            let _t = utils::Timer::start(format!("Reviews {}", username));
            let scraper = SensCritiqueScraper::new(&config, Arc::clone(&clock))
                .context("Failed to build scraper")?;
            let reviews = scraper.fetch_reviews(&username).await?;
            print_reviews(&reviews, clock.now());
        }

        Command::Extract { file, user, now } => {
            let now = parse_now(now.as_deref())?;
            let markup = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let base = Url::parse(&config.scraper.base_url).context("Invalid scraper.base_url")?;

            info!("Extracting from {:?} ({} bytes)", file, markup.len());
            let reviews = extract_reviews(&markup, &user, &base, now);
            print_reviews(&reviews, now);
        }

        Command::ParseDate { text, now } => {
            let now = parse_now(now.as_deref())?;
            match dates::parse_date_text(&text, now) {
                Ok(instant) => {
                    println!("  Text     : {}", text);
                    println!("  Instant  : {}", instant.to_rfc3339());
                    println!(
                        "  Time ago : {}",
                        dates::time_ago(instant, now).unwrap_or_else(|| "—".into())
                    );
                }
                Err(e) => println!("  {}", e),
            }
        }
    }

    Ok(())
}

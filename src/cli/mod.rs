//! Command-line interface.
//!
//! Without a subcommand the binary runs the HTTP server. The subcommands work
//! directly against the local database:
//! - `slots` - Show the occupancy grid at a given time
//! - `reservations` - List bookings overlapping a day
//! - `config check` - Validate configuration file
//! - `db migrate` / `db status` - Apply or inspect schema migrations

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::db;
use crate::ledger::window::{format_timestamp, parse_date, parse_timestamp};
use crate::ledger::{Ledger, SlotCatalogue, Window};

#[derive(Parser, Debug)]
#[command(name = "parkslot")]
#[command(author, version, about = "Parking slot reservations for a small lot", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "PARKSLOT_CONFIG", default_value = "parkslot.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long, env = "PARKSLOT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Override the data directory from the config file
    #[arg(long, env = "PARKSLOT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Show which slots are occupied
    Slots {
        /// Instant to inspect as "YYYY-MM-DD HH:MM" (default: now)
        #[arg(long)]
        at: Option<String>,
    },

    /// List reservations overlapping a calendar day
    Reservations {
        /// Day as YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

#[derive(Subcommand, Debug)]
pub enum DbCommands {
    /// Apply pending schema migrations
    Migrate,
    /// Show the current schema version
    Status,
}

impl Cli {
    /// Load the config file and apply command-line overrides.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(&self.config)?;
        if let Some(dir) = &self.data_dir {
            config.server.data_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        Ok(config)
    }
}

/// Run a non-server subcommand
pub async fn run_command(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Some(Commands::Slots { at }) => cmd_slots(config, at.as_deref()).await,
        Some(Commands::Reservations { date }) => cmd_reservations(config, date.as_deref()).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        Some(Commands::Db(DbCommands::Migrate)) => cmd_db_migrate(config).await,
        Some(Commands::Db(DbCommands::Status)) => cmd_db_status(config).await,
        // Serving is handled in main.rs
        Some(Commands::Serve) | None => Ok(()),
    }
}

async fn open_ledger(config: &Config) -> Result<Ledger> {
    let pool = db::init(&config.server.data_dir)
        .await
        .context("Failed to open database")?;
    Ok(Ledger::new(pool, SlotCatalogue::standard()))
}

async fn cmd_slots(config: &Config, at: Option<&str>) -> Result<()> {
    let at = match at {
        Some(raw) => parse_timestamp(raw)
            .with_context(|| format!("Invalid time '{}', expected YYYY-MM-DD HH:MM", raw))?,
        None => config.clock.now(),
    };

    let ledger = open_ledger(config).await?;
    let occupied = ledger.occupancy(at).await?;
    let catalogue = ledger.catalogue();

    println!("Occupancy at {}", format_timestamp(at));
    println!();

    let mut row: Option<char> = None;
    for slot in catalogue.slots() {
        let prefix = slot.as_str().chars().next();
        if row.is_some() && row != prefix {
            println!();
        }
        row = prefix;
        let mark = if occupied.contains(slot) { "##" } else { "--" };
        print!("{:<4}{} ", slot.as_str(), mark);
    }
    println!();
    println!();
    println!("{} of {} slots occupied", occupied.len(), catalogue.len());

    Ok(())
}

async fn cmd_reservations(config: &Config, date: Option<&str>) -> Result<()> {
    let day: NaiveDate = match date {
        Some(raw) => parse_date(raw)
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", raw))?,
        None => config.clock.now().date(),
    };
    let next = day
        .checked_add_days(Days::new(1))
        .context("Date out of range")?;
    let window = Window::new(day.and_time(chrono::NaiveTime::MIN), next.and_time(chrono::NaiveTime::MIN))?;

    let ledger = open_ledger(config).await?;
    let reservations = ledger.list_overlapping(&window).await?;

    if reservations.is_empty() {
        println!("No reservations on {}", day);
        return Ok(());
    }

    let now = config.clock.now();
    println!(
        "{:<6} {:<17} {:<17} {:<9} {}",
        "SLOT", "START", "END", "STATUS", "ID"
    );
    for r in &reservations {
        println!(
            "{:<6} {:<17} {:<17} {:<9} {}",
            r.slot,
            r.start_at,
            r.end_at,
            r.status_at(now),
            r.id
        );
    }
    println!();
    println!("{} reservation(s)", reservations.len());

    Ok(())
}

fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!("[!!] Configuration file not found: {}", config_path.display());
        println!();
        println!("A default configuration will be used when starting the server.");
        println!("To customize, copy parkslot.example.toml to parkslot.toml");
        return Ok(());
    }

    let config = cli.load_config()?;
    let enabled = |on: bool| if on { "Enabled" } else { "Disabled" };

    println!("[OK] Configuration file is valid!");
    println!();
    println!("Server:");
    println!("  Listen:       {}:{}", config.server.host, config.server.port);
    println!("  Data Dir:     {}", config.server.data_dir.display());
    println!();
    println!("Auth:");
    println!("  Session TTL:  {}h", config.auth.session_ttl_hours);
    println!("  Min Password: {} chars", config.auth.min_password_length);
    println!();
    println!("Clock:");
    println!(
        "  Zone:         {}",
        config
            .clock
            .offset_label()
            .map(|o| format!("UTC{}", o))
            .unwrap_or_else(|| "host local time".to_string())
    );
    println!();
    println!("Rate Limiting: {}", enabled(config.rate_limit.enabled));
    println!(
        "  API:          {} req / {}s",
        config.rate_limit.api_requests_per_window, config.rate_limit.window_seconds
    );
    println!(
        "  Auth:         {} req / {}s",
        config.rate_limit.auth_requests_per_window, config.rate_limit.window_seconds
    );
    println!(
        "Session Cleanup: {} (every {}s)",
        enabled(config.cleanup.enabled),
        config.cleanup.interval_seconds
    );

    Ok(())
}

async fn cmd_db_migrate(config: &Config) -> Result<()> {
    // init() applies pending migrations
    let pool = db::init(&config.server.data_dir)
        .await
        .context("Failed to open database")?;
    let version = db::schema_version(&pool).await?;
    println!(
        "Database at {} is at schema version {}",
        config.server.data_dir.join(db::DB_FILE).display(),
        version
    );
    Ok(())
}

async fn cmd_db_status(config: &Config) -> Result<()> {
    let pool = db::init(&config.server.data_dir)
        .await
        .context("Failed to open database")?;
    let version = db::schema_version(&pool).await?;
    let latest = db::latest_schema_version();
    println!("Schema version: {} (latest: {})", version, latest);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults_to_server() {
        let cli = Cli::try_parse_from(["parkslot"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("parkslot.toml"));
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["parkslot", "slots", "--at", "2024-05-01 10:00"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Slots { at: Some(_) })));

        let cli = Cli::try_parse_from(["parkslot", "db", "migrate"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Db(DbCommands::Migrate))));

        let cli = Cli::try_parse_from(["parkslot", "-c", "other.toml", "config", "check"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert!(matches!(cli.command, Some(Commands::Config(ConfigCommands::Check))));
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let cli = Cli::try_parse_from([
            "parkslot",
            "--config",
            "/nonexistent/parkslot.toml",
            "--data-dir",
            "/tmp/lot",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.server.data_dir, PathBuf::from("/tmp/lot"));
        assert_eq!(config.logging.level, "debug");
    }

    #[tokio::test]
    async fn test_db_migrate_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.data_dir = dir.path().to_path_buf();

        cmd_db_migrate(&config).await.unwrap();
        assert!(dir.path().join(db::DB_FILE).exists());
    }
}

//! Command-line interface for the KukuConnect server.
//!
//! Without a subcommand (or with `serve`) the binary starts the HTTP server.
//! - `config check` - Validate and summarise the configuration file
//! - `db migrate` - Apply the database schema and exit

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "kukuconnect")]
#[command(author, version, about = "Agricultural marketplace backend", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "kukuconnect.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Token signing secret; overrides `auth.jwt_secret` from the file
    #[arg(long, env = "KUKUCONNECT_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

/// Database subcommands
#[derive(Subcommand, Debug)]
pub enum DbCommands {
    /// Create the database if needed and apply the schema
    Migrate,
}

impl Cli {
    /// Whether this invocation should start the server
    pub fn is_serve(&self) -> bool {
        matches!(self.command, None | Some(Commands::Serve))
    }

    /// Load the configuration file and apply command-line overrides
    pub fn load_config(&self) -> Result<Config> {
        let config = Config::load(&self.config)?;
        match &self.jwt_secret {
            Some(secret) => {
                let config = config.with_jwt_secret(secret.clone());
                config.validate()?;
                Ok(config)
            }
            None => Ok(config),
        }
    }
}

/// Run a CLI command
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli).await,
        Some(Commands::Db(DbCommands::Migrate)) => cmd_db_migrate(cli).await,
        Some(Commands::Serve) | None => {
            // Starting the server is handled in main.rs
            Ok(())
        }
    }
}

/// Validate configuration file
async fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!("A default configuration will be used when starting the server.");
        println!("To create a custom configuration, copy kukuconnect.example.toml to kukuconnect.toml");
        return Ok(());
    }

    match cli.load_config() {
        Ok(config) => {
            println!("[OK] Configuration file is valid!");
            println!();
            println!("=== Configuration Summary ===");
            println!();
            println!("Server:");
            println!("  Host:         {}", config.server.host);
            println!("  Port:         {}", config.server.port);
            println!("  Data Dir:     {}", config.server.data_dir.display());
            println!("  Database:     {}", config.server.database_url());
            println!(
                "  CORS:         {}",
                if config.server.cors_allowed_origins.is_empty() {
                    "Disabled".to_string()
                } else {
                    config.server.cors_allowed_origins.join(", ")
                }
            );
            println!();
            println!("Auth:");
            println!("  Access TTL:   {} minutes", config.auth.access_token_minutes);
            println!("  Refresh TTL:  {} days", config.auth.refresh_token_days);
            println!();
            println!("Security:");
            println!(
                "  Rate Limiting: {}",
                if config.rate_limit.enabled {
                    format!(
                        "Enabled ({} requests / {}s)",
                        config.rate_limit.auth_requests_per_window,
                        config.rate_limit.window_seconds
                    )
                } else {
                    "Disabled".to_string()
                }
            );
            println!();

            let mut warnings = Vec::new();

            if config.auth.jwt_secret_generated {
                warnings.push(
                    "No jwt_secret set - a random secret is generated at startup and tokens will not survive a restart",
                );
            }

            if !config.rate_limit.enabled {
                warnings.push("Rate limiting is disabled - login attempts are unthrottled");
            }

            if !warnings.is_empty() {
                println!("Warnings:");
                for warning in warnings {
                    println!("  [!] {}", warning);
                }
                println!();
            }

            Ok(())
        }
        Err(e) => {
            println!("[!!] Configuration file is invalid!");
            println!();
            println!("Error: {:#}", e);
            println!();
            println!("Please check the configuration file syntax and try again.");
            anyhow::bail!("Invalid configuration file");
        }
    }
}

/// Apply the schema to the configured database
async fn cmd_db_migrate(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;
    let database_url = config.server.database_url();

    let pool = crate::db::init(&config.server.data_dir, &database_url).await?;
    pool.close().await;

    println!("[OK] Database schema is up to date: {}", database_url);
    Ok(())
}

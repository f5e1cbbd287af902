use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the `uploads/` folder.
    pub upload_root: String,
    pub database_url: String,
    /// Seconds between background archival sweeps; 0 disables the sweep.
    pub archive_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            upload_root: "./data".into(),
            database_url: "sqlite://./data/lost_found.db?mode=rwc".into(),
            archive_interval_secs: 86_400,
        }
    }
}

/// What the process should do after configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve,
    /// Apply migrations and exit.
    Migrate,
    /// Run one archival sweep and exit.
    ArchiveOld,
    /// Register an account and print its id.
    CreateUser(String),
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Lost-and-found item registry API")]
pub struct Args {
    /// Host to bind to (overrides LOST_FOUND_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides LOST_FOUND_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded photos live (overrides LOST_FOUND_UPLOAD_ROOT)
    #[arg(long)]
    pub upload_root: Option<String>,

    /// Database URL (overrides LOST_FOUND_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Seconds between archival sweeps, 0 to disable (overrides LOST_FOUND_ARCHIVE_INTERVAL_SECS)
    #[arg(long)]
    pub archive_interval_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Archive stale items once and exit
    #[arg(long, conflicts_with = "migrate")]
    pub archive_old: bool,

    /// Create an account with this username, print its id and exit
    #[arg(long, value_name = "USERNAME", conflicts_with_all = ["migrate", "archive_old"])]
    pub create_user: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        Self::merge(Args::parse(), |key| env::var(key))
    }

    /// CLI flags win over environment variables, which win over defaults.
    fn merge<F>(args: Args, var: F) -> Result<(Self, Command)>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let defaults = Self::default();

        let env_host = env_or(&var, "LOST_FOUND_HOST", defaults.host)?;
        let env_port = env_or(&var, "LOST_FOUND_PORT", defaults.port)?;
        let env_root = env_or(&var, "LOST_FOUND_UPLOAD_ROOT", defaults.upload_root)?;
        let env_db = env_or(&var, "LOST_FOUND_DATABASE_URL", defaults.database_url)?;
        let env_interval = env_or(
            &var,
            "LOST_FOUND_ARCHIVE_INTERVAL_SECS",
            defaults.archive_interval_secs,
        )?;

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            upload_root: args.upload_root.unwrap_or(env_root),
            database_url: args.database_url.unwrap_or(env_db),
            archive_interval_secs: args.archive_interval_secs.unwrap_or(env_interval),
        };

        let command = if args.migrate {
            Command::Migrate
        } else if args.archive_old {
            Command::ArchiveOld
        } else if let Some(name) = args.create_user {
            Command::CreateUser(name)
        } else {
            Command::Serve
        };

        Ok((cfg, command))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or<F, T>(var: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Result<String, env::VarError>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

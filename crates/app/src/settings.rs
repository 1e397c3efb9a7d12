//! Settings of the sync, read from `config/budgetbridge.toml` (or the file
//! given with `--config`) and `BUDGETBRIDGE__*` environment variables.
//! Command line flags win over both.

use chrono::NaiveDate;
use clap::Parser;
use config::ConfigError;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_CONFIG_PATH: &str = "config/budgetbridge.toml";
const ENV_PREFIX: &str = "BUDGETBRIDGE";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Ledger {
    pub access_token: String,
    #[serde(default = "default_ledger_url")]
    pub base_url: String,
}

fn default_ledger_url() -> String {
    engine::ledger::DEFAULT_LEDGER_URL.to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Cache {
    pub dir: Option<String>,
    pub create_missing_dir: bool,
    /// Persist budgets and categories between runs.
    pub categories: bool,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    pub ledger: Ledger,
    #[serde(default)]
    pub budget_id: Option<String>,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u64,
    /// Deadline of the whole run.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub cache: Cache,
    /// Provider tables by registered name, in file order.
    #[serde(default)]
    pub providers: IndexMap<String, Value>,
    #[serde(skip)]
    pub dry_run: bool,
    #[serde(skip)]
    pub since: Option<NaiveDate>,
}

fn default_lookback_days() -> u64 {
    30
}

#[derive(Debug, Parser)]
#[command(name = "budgetbridge", version, about)]
pub struct Args {
    /// Config file path (TOML or JSON).
    #[arg(long)]
    config: Option<String>,
    /// Log the transactions that would be created without creating them.
    #[arg(long)]
    dry_run: bool,
    /// Fetch expenses since this day (YYYY-MM-DD) instead of asking the ledger.
    #[arg(long)]
    since: Option<NaiveDate>,
    /// Override the log level.
    #[arg(long)]
    log_level: Option<String>,
}

pub fn load() -> Result<Settings, ConfigError> {
    load_from(Args::parse())
}

fn load_from(args: Args) -> Result<Settings, ConfigError> {
    let config_path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let settings = config::Config::builder()
        .add_source(config::File::with_name(config_path).required(args.config.is_some()))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;
    let mut settings: Settings = settings.try_deserialize()?;

    if let Some(level) = args.log_level {
        settings.app.level = level;
    }
    settings.dry_run = args.dry_run;
    settings.since = args.since;

    Ok(settings)
}

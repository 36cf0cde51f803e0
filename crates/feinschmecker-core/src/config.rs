use std::{
    env,
    path::{Path, PathBuf},
};

use ::config as cfg;
use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Knobs of the filter validator and the paginator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QuerySettings {
    #[serde(default = "QuerySettings::default_min_difficulty")]
    pub min_difficulty: i64,
    #[serde(default = "QuerySettings::default_max_difficulty")]
    pub max_difficulty: i64,
    #[serde(default = "QuerySettings::default_meal_types")]
    pub valid_meal_types: Vec<String>,
    #[serde(default = "QuerySettings::default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "QuerySettings::default_max_page_size")]
    pub max_page_size: u32,
    /// Upper bound on the number of `ingredients` terms in one request.
    #[serde(default = "QuerySettings::default_max_ingredient_terms")]
    pub max_ingredient_terms: usize,
}

impl QuerySettings {
    fn default_min_difficulty() -> i64 {
        1
    }

    fn default_max_difficulty() -> i64 {
        3
    }

    fn default_meal_types() -> Vec<String> {
        vec!["Breakfast".into(), "Lunch".into(), "Dinner".into()]
    }

    fn default_page_size() -> u32 {
        20
    }

    fn default_max_page_size() -> u32 {
        100
    }

    fn default_max_ingredient_terms() -> usize {
        10
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            min_difficulty: Self::default_min_difficulty(),
            max_difficulty: Self::default_max_difficulty(),
            valid_meal_types: Self::default_meal_types(),
            default_page_size: Self::default_page_size(),
            max_page_size: Self::default_max_page_size(),
            max_ingredient_terms: Self::default_max_ingredient_terms(),
        }
    }
}

/// Background execution: retry budget, backoff cap, execution budget and pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaskSettings {
    #[serde(default = "TaskSettings::default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "TaskSettings::default_backoff_cap")]
    pub backoff_cap_secs: u64,
    #[serde(default = "TaskSettings::default_execution_budget")]
    pub execution_budget_secs: u64,
    #[serde(default = "TaskSettings::default_workers")]
    pub workers: usize,
    #[serde(default = "TaskSettings::default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long a finished task stays pollable before it is evicted.
    #[serde(default = "TaskSettings::default_retention")]
    pub retention_secs: u64,
}

impl TaskSettings {
    fn default_max_retries() -> u32 {
        3
    }

    fn default_backoff_cap() -> u64 {
        60
    }

    fn default_execution_budget() -> u64 {
        300
    }

    fn default_workers() -> usize {
        num_cpus::get().max(1)
    }

    fn default_queue_capacity() -> usize {
        1024
    }

    fn default_retention() -> u64 {
        3600
    }
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            max_retries: Self::default_max_retries(),
            backoff_cap_secs: Self::default_backoff_cap(),
            execution_budget_secs: Self::default_execution_budget(),
            workers: Self::default_workers(),
            queue_capacity: Self::default_queue_capacity(),
            retention_secs: Self::default_retention(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct StoreSettings {
    /// Recipe document file (JSON array) loaded into the knowledge store at startup.
    #[serde(default)]
    pub recipes_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Settings {
    #[serde(default = "Settings::default_env")]
    pub env: String,
    #[serde(default)]
    pub query: QuerySettings,
    #[serde(default)]
    pub tasks: TaskSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: Self::default_env(),
            query: QuerySettings::default(),
            tasks: TaskSettings::default(),
            store: StoreSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    fn default_env() -> String {
        env::var("APP_ENV")
            .ok()
            .or_else(|| env::var("RUST_ENV").ok())
            .unwrap_or_else(|| "development".to_string())
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.query.min_difficulty <= self.query.max_difficulty,
            "query.min_difficulty must not exceed query.max_difficulty"
        );
        anyhow::ensure!(
            !self.query.valid_meal_types.is_empty(),
            "query.valid_meal_types cannot be empty"
        );
        anyhow::ensure!(
            self.query.max_page_size >= 1,
            "query.max_page_size must be >= 1"
        );
        anyhow::ensure!(
            (1..=self.query.max_page_size).contains(&self.query.default_page_size),
            "query.default_page_size must be 1..=query.max_page_size"
        );
        anyhow::ensure!(
            self.query.max_ingredient_terms >= 1,
            "query.max_ingredient_terms must be >= 1"
        );
        anyhow::ensure!(
            self.tasks.backoff_cap_secs >= 1,
            "tasks.backoff_cap_secs must be >= 1"
        );
        anyhow::ensure!(
            self.tasks.execution_budget_secs >= 1,
            "tasks.execution_budget_secs must be >= 1"
        );
        anyhow::ensure!(self.tasks.workers >= 1, "tasks.workers must be >= 1");
        anyhow::ensure!(
            self.tasks.queue_capacity >= 1,
            "tasks.queue_capacity must be >= 1"
        );
        Ok(())
    }
}

#[derive(Debug)]
pub struct ConfigManager {
    settings: Settings,
    config_dir: PathBuf,
    env: String,
}

impl ConfigManager {
    pub fn new(env_override: Option<String>) -> Result<Self> {
        let config_dir = Self::default_config_dir();
        Self::from_dir(config_dir, env_override)
    }

    pub fn from_dir(config_dir: PathBuf, env_override: Option<String>) -> Result<Self> {
        let env_name = env_override.unwrap_or_else(Settings::default_env);
        let settings = Self::load_from_sources(&config_dir, &env_name)?;
        settings.validate()?;
        Ok(Self {
            settings,
            config_dir,
            env: env_name,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    /// Get the default configuration directory.
    ///
    /// Priority order:
    /// 1. ~/.feinschmecker/ (user-level config)
    /// 2. ./config/ (project-level config)
    /// 3. Current directory (fallback)
    pub fn default_config_dir() -> PathBuf {
        if let Some(home_dir) = dirs::home_dir() {
            let user_dir = home_dir.join(".feinschmecker");
            if user_dir.exists() {
                info!("Using config directory: {:?}", user_dir);
                return user_dir;
            }
        }

        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let project_config = cwd.join("config");
        if project_config.exists() {
            info!("Using config directory: {:?}", project_config);
            return project_config;
        }

        info!("Using config directory: {:?}", cwd);
        cwd
    }

    pub fn load_from_sources(config_dir: &Path, env_name: &str) -> Result<Settings> {
        let settings: Settings = cfg::Config::builder()
            .add_source(cfg::File::from(config_dir.join("default.toml")).required(false))
            .add_source(cfg::File::from(config_dir.join("default.json")).required(false))
            .add_source(
                cfg::File::from(config_dir.join(format!("{}.toml", env_name))).required(false),
            )
            .add_source(
                cfg::File::from(config_dir.join(format!("{}.json", env_name))).required(false),
            )
            .add_source(cfg::File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                cfg::Environment::with_prefix("FEINSCHMECKER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("query.valid_meal_types")
                    .try_parsing(true),
            )
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")?;
        Ok(settings)
    }

    /// JSON schema of [`Settings`], for documentation and editor tooling.
    pub fn schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Settings)).unwrap_or(serde_json::Value::Null)
    }
}

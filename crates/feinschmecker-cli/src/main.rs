use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use feinschmecker_core::{ConfigManager, FeinschmeckerError, RawParams, Settings};
use feinschmecker_graph::StoreHandle;
use feinschmecker_query::{QueryResponse, RecipeRecord, RecipeSearchEngine, SearchReply};
use feinschmecker_queue::{
    EngineExecutor, Priority, RetryPolicy, TaskQueue, TaskRunner, TaskTransport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "feinschmecker")]
#[command(about = "Feinschmecker - recipe search over a cooking knowledge graph", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Directory holding default.toml / <env>.toml / local.toml
    #[arg(long, global = true, env = "FEINSCHMECKER_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Configuration environment (development, production, ...)
    #[arg(long, global = true)]
    env: Option<String>,

    /// Recipe document file, overrides store.recipes_path
    #[arg(short, long, global = true, env = "FEINSCHMECKER_RECIPES")]
    recipes: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Search recipes synchronously
    Search {
        /// Filter parameters as key=value (e.g. vegan=true time=30 ingredients=egg,flour)
        #[arg(value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Run a search as a background task and wait for its terminal state
    Submit {
        /// Filter parameters as key=value
        #[arg(value_parser = parse_param)]
        params: Vec<(String, String)>,

        #[arg(short, long, value_enum, default_value = "normal")]
        priority: PriorityArg,
    },

    /// Show a single recipe by its identity (e.g. vegan_chilli)
    Recipe { slug: String },

    /// Summary of the loaded knowledge graph
    Info,

    /// Effective configuration after layering files and environment
    Config,

    /// JSON schema of the configuration or of a recipe record
    Schema {
        #[arg(value_enum, default_value = "settings")]
        target: SchemaTarget,
    },
}

#[derive(Clone, ValueEnum)]
enum PriorityArg {
    Low,
    Normal,
    High,
    Critical,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::High => Priority::High,
            PriorityArg::Critical => Priority::Critical,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum SchemaTarget {
    Settings,
    Recipe,
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn init_tracing(settings: &Settings) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<ConfigManager> {
    match &cli.config_dir {
        Some(dir) => ConfigManager::from_dir(dir.clone(), cli.env.clone()),
        None => ConfigManager::new(cli.env.clone()),
    }
    .context("Failed to load configuration")
}

fn open_store(cli: &Cli, settings: &Settings) -> Result<Arc<StoreHandle>> {
    let store = Arc::new(StoreHandle::empty());
    let path = cli.recipes.clone().or_else(|| settings.store.recipes_path.clone());
    if let Some(path) = path {
        let (generation, stats) = store
            .reload_from_path(&path)
            .with_context(|| format!("Failed to load recipes from {}", path.display()))?;
        info!(
            generation,
            recipes = stats.recipes,
            skipped = stats.skipped_duplicates,
            "Recipe store ready"
        );
    }
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    init_tracing(config.settings());

    match execute_command(&cli, config.settings()).await {
        Ok((output, status)) => {
            print_output(&cli.output, &output)?;
            if status != 0 {
                std::process::exit(status);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Output value and process exit status.
async fn execute_command(cli: &Cli, settings: &Settings) -> Result<(serde_json::Value, i32)> {
    match &cli.command {
        Commands::Search { params } => {
            let engine = RecipeSearchEngine::new(open_store(cli, settings)?, settings.query.clone());
            let reply = engine.respond(&raw_params(params));
            let status = exit_status(&reply);
            Ok((serde_json::to_value(reply)?, status))
        }
        Commands::Submit { params, priority } => {
            execute_submit(cli, settings, &raw_params(params), priority.clone().into()).await
        }
        Commands::Recipe { slug } => {
            let engine = RecipeSearchEngine::new(open_store(cli, settings)?, settings.query.clone());
            match engine.recipe(slug)? {
                Some(record) => Ok((serde_json::to_value(record)?, 0)),
                None => anyhow::bail!("Recipe '{}' not found", slug),
            }
        }
        Commands::Info => {
            let engine = RecipeSearchEngine::new(open_store(cli, settings)?, settings.query.clone());
            Ok((serde_json::to_value(engine.store_info()?)?, 0))
        }
        Commands::Config => Ok((serde_json::to_value(settings)?, 0)),
        Commands::Schema { target } => {
            let schema = match target {
                SchemaTarget::Settings => ConfigManager::schema(),
                SchemaTarget::Recipe => {
                    serde_json::to_value(schemars::schema_for!(RecipeRecord))?
                }
            };
            Ok((schema, 0))
        }
    }
}

async fn execute_submit(
    cli: &Cli,
    settings: &Settings,
    raw: &RawParams,
    priority: Priority,
) -> Result<(serde_json::Value, i32)> {
    let engine = Arc::new(RecipeSearchEngine::new(
        open_store(cli, settings)?,
        settings.query.clone(),
    ));

    // Background tasks carry validated payloads only.
    let query = match engine.validator().validate(raw) {
        Ok(query) => query,
        Err(errors) => {
            let reply = SearchReply::from(Err::<QueryResponse, _>(FeinschmeckerError::from(errors)));
            let status = exit_status(&reply);
            return Ok((serde_json::to_value(reply)?, status));
        }
    };

    let runner = TaskRunner::new(
        Arc::new(EngineExecutor::new(engine)),
        RetryPolicy::from(&settings.tasks),
    );
    let queue = TaskQueue::with_retention(
        runner,
        settings.tasks.queue_capacity,
        Duration::from_secs(settings.tasks.retention_secs),
    );
    queue.start(settings.tasks.workers);

    let tasks: Arc<dyn TaskTransport> = queue.clone();
    let id = tasks.submit(query, priority).await?;
    let record = tasks.wait(id).await?;
    queue.shutdown();

    let status = if record.error.is_some() { 1 } else { 0 };
    Ok((serde_json::to_value(record)?, status))
}

fn raw_params(params: &[(String, String)]) -> RawParams {
    params.iter().cloned().collect()
}

fn exit_status(reply: &SearchReply) -> i32 {
    match reply {
        SearchReply::Ok(_) => 0,
        SearchReply::Err(err) => match err.code().http_status() {
            400 => 2,
            503 => 3,
            _ => 1,
        },
    }
}

fn print_output(format: &OutputFormat, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => {
            print_pretty(value, 0)?;
        }
    }
    Ok(())
}

fn print_pretty(value: &serde_json::Value, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    serde_json::Value::String(s) => {
                        println!("{}{}: {}", indent, key_colored, s.green());
                    }
                    serde_json::Value::Number(n) => {
                        println!("{}{}: {}", indent, key_colored, n.to_string().yellow());
                    }
                    serde_json::Value::Bool(b) => {
                        let val_colored = if *b { "true".green() } else { "false".red() };
                        println!("{}{}: {}", indent, key_colored, val_colored);
                    }
                    serde_json::Value::Null => {
                        println!("{}{}: {}", indent, key_colored, "-".dimmed());
                    }
                    _ => {
                        println!("{}{}:", indent, key_colored);
                        print_pretty(val, depth + 1)?;
                    }
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                match item {
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        println!(
                            "{}{}{}:",
                            indent,
                            "Item ".cyan(),
                            (i + 1).to_string().yellow()
                        );
                        print_pretty(item, depth + 1)?;
                    }
                    serde_json::Value::String(s) => println!("{}- {}", indent, s),
                    _ => println!("{}- {}", indent, item),
                }
            }
        }
        _ => {
            println!("{}{}", indent, value);
        }
    }
    Ok(())
}

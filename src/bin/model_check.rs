//! Model Check CLI
//!
//! Validates JSON documents against a model type declared in a JSON schema
//! file, and prints the normalized records.
//!
//! Usage:
//!   model-check --schema user.json --name User users.json
//!   model-check --schema user.json --format json users.json

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use familiar_models::{config, EngineConfig, Model, ModelType};
use serde_json::Value as Json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "model-check")]
#[command(about = "Validate JSON documents against a model schema")]
struct Cli {
    /// JSON file mapping field names to type descriptions
    #[arg(short, long)]
    schema: PathBuf,

    /// Model type name used in messages
    #[arg(short, long, default_value = "Model")]
    name: String,

    /// Documents to check; each holds one object or an array of objects
    #[arg(required = true)]
    documents: Vec<PathBuf>,

    /// Configuration file (defaults to the usual search path)
    #[arg(short, long)]
    config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();

    let engine_config = match EngineConfig::load_from(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Warning: failed to load config ({}), using defaults", e);
            EngineConfig::default()
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&engine_config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    config::install(engine_config);

    match run(&cli) {
        Ok(0) => {}
        Ok(failures) => {
            eprintln!("{} document(s) failed validation", failures);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

/// Returns the number of records that failed validation
fn run(cli: &Cli) -> anyhow::Result<usize> {
    let schema = read_json(&cli.schema)?;
    let model_type = ModelType::from_json(&cli.name, &schema)
        .with_context(|| format!("Invalid schema in {}", cli.schema.display()))?;
    model_type
        .schema()
        .with_context(|| format!("Cannot resolve schema in {}", cli.schema.display()))?;

    let mut failures = 0;
    let mut accepted = Vec::new();
    for path in &cli.documents {
        let records = match read_json(path)? {
            Json::Array(items) => items,
            object @ Json::Object(_) => vec![object],
            other => bail!("{}: expected an object or array, found {}", path.display(), other),
        };

        for (index, record) in records.into_iter().enumerate() {
            match Model::new(&model_type, record) {
                Ok(model) => {
                    tracing::debug!(file = %path.display(), index, "record accepted");
                    if matches!(cli.format, Format::Text) {
                        println!("✅ {}[{}]", path.display(), index);
                    }
                    accepted.push(model.to_json()?);
                }
                Err(e) => {
                    failures += 1;
                    println!("❌ {}[{}]: {}", path.display(), index, e);
                }
            }
        }
    }

    if matches!(cli.format, Format::Json) {
        println!("{}", serde_json::to_string_pretty(&accepted)?);
    }
    Ok(failures)
}

fn read_json(path: &Path) -> anyhow::Result<Json> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse JSON in {}", path.display()))
}

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use log::warn;

use wheretodine::api::{RecommendationRequest, RecommendationResponse};
use wheretodine::catalog::{Catalog, RawRecord};
use wheretodine::engine::{Recommender, RecommenderConfig};
use wheretodine::error::EngineError;

#[derive(Parser)]
#[command(
    name = "wheretodine",
    version,
    about = "Dual-signal restaurant recommendation engine"
)]
struct Cli {
    /// Restaurant dataset, CSV or a JSON array (decided by extension)
    #[arg(short, long)]
    data: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce recommendations for a JSON request read from stdin
    Recommend {
        /// Minimum votes for a candidate to rank
        #[arg(long, default_value_t = 50)]
        min_votes: u32,
        /// Final list length after combining both signals
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Minimum resolvable restaurants per request
        #[arg(long, default_value_t = 3)]
        min_selections: usize,
        /// Append request/response audit rows to CSV files in this directory
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Print every restaurant name as a JSON array
    Names,
    /// Resolve one free-text name against the catalog
    Resolve {
        /// Name to resolve
        name: String,
    },
    /// Match dishes against every menu in the catalog
    Dishes {
        /// Dish names
        #[arg(required = true)]
        dishes: Vec<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let cli = Cli::parse();

    let records = load_records(&cli.data)?;
    let catalog = Catalog::load(records);

    match cli.command {
        Commands::Recommend {
            min_votes,
            limit,
            min_selections,
            log_dir,
        } => {
            let config = RecommenderConfig {
                min_votes,
                final_count: limit,
                min_selections,
                ..RecommenderConfig::default()
            };
            cmd_recommend(catalog, config, log_dir.as_deref())
        }
        Commands::Names => cmd_names(catalog),
        Commands::Resolve { name } => cmd_resolve(catalog, &name),
        Commands::Dishes { dishes } => cmd_dishes(catalog, &dishes),
    }
}

fn cmd_recommend(catalog: Catalog, config: RecommenderConfig, log_dir: Option<&Path>) -> Result<()> {
    let engine = Recommender::with_config(catalog, config)?;
    let request: RecommendationRequest =
        serde_json::from_str(&read_stdin()?).context("invalid request JSON on stdin")?;
    let response = match engine.recommend(&request) {
        Ok(response) => response,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };
    if let Some(dir) = log_dir {
        append_audit_rows(dir, &request, &response)?;
    }
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn cmd_names(catalog: Catalog) -> Result<()> {
    let engine = Recommender::new(catalog)?;
    println!("{}", serde_json::to_string_pretty(&engine.all_names())?);
    Ok(())
}

fn cmd_resolve(catalog: Catalog, name: &str) -> Result<()> {
    let engine = Recommender::new(catalog)?;
    match engine.resolve(name) {
        Some(id) => {
            let entry = engine.catalog().entry(id);
            let found = serde_json::json!({
                "id": entry.id,
                "name": entry.name,
                "address": entry.address,
                "cuisines": entry.cuisines,
            });
            println!("{}", serde_json::to_string_pretty(&found)?);
            Ok(())
        }
        None => {
            let err = EngineError::NotFound {
                name: name.to_string(),
            };
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}

fn cmd_dishes(catalog: Catalog, dishes: &[String]) -> Result<()> {
    let engine = Recommender::new(catalog)?;
    println!("{}", serde_json::to_string_pretty(&engine.match_dishes(dishes))?);
    Ok(())
}

// ── Dataset loading ──────────────────────────────────────────────────────────

fn load_records(path: &Path) -> Result<Vec<RawRecord>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "json" => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&text).context("dataset is not a JSON array of records")
        }
        "csv" => {
            let file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
            let mut records = Vec::new();
            for (i, row) in reader.deserialize::<RawRecord>().enumerate() {
                match row {
                    Ok(record) => records.push(record),
                    // line 1 holds the headers
                    Err(err) => warn!("skipping dataset line {}: {err}", i + 2),
                }
            }
            Ok(records)
        }
        other => bail!("unsupported dataset extension {other:?} (expected .csv or .json)"),
    }
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read stdin")?;
    Ok(buf)
}

// ── Audit trail ──────────────────────────────────────────────────────────────

/// Append one row per request to `recommendation_inputs.csv` and one to
/// `recommendation_outputs.csv`, creating either file with headers on first
/// use. List-valued columns hold JSON.
fn append_audit_rows(
    dir: &Path,
    request: &RecommendationRequest,
    response: &RecommendationResponse,
) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let selected: Vec<&str> = request.restaurants.iter().map(|r| r.name.as_str()).collect();
    let mut inputs = audit_writer(
        &dir.join("recommendation_inputs.csv"),
        &[
            "timestamp",
            "recommendation_id",
            "selected_restaurants",
            "favorite_dishes",
        ],
    )?;
    inputs.write_record([
        Local::now().to_rfc3339(),
        response.recommendation_id.clone(),
        serde_json::to_string(&selected)?,
        serde_json::to_string(&request.dish_names())?,
    ])?;
    inputs.flush()?;

    let mut outputs = audit_writer(
        &dir.join("recommendation_outputs.csv"),
        &["recommendation_id", "recommended_restaurants", "similar_dishes"],
    )?;
    outputs.write_record([
        response.recommendation_id.clone(),
        serde_json::to_string(&response.recommended_restaurants)?,
        serde_json::to_string(&response.similar_dishes)?,
    ])?;
    outputs.flush()?;
    Ok(())
}

fn audit_writer(path: &Path, headers: &[&str]) -> Result<csv::Writer<File>> {
    let new_file = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if new_file {
        writer.write_record(headers)?;
    }
    Ok(writer)
}

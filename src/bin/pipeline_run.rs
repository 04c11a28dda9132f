//! Pipeline Run - one full batch reconciliation and publish
//!
//! Usage:
//!   cargo run --release --bin pipeline_run -- storefront=orders.jsonl payment_processor=charges.jsonl
//!
//! Each argument is `<source_system>=<path>` naming one adapter extract.
//! Environment variables:
//!   ORPHAN_GRACE_HOURS      - required, orphan detection grace window
//!   FUZZY_MATCH_THRESHOLD   - required, B2B fuzzy match confidence floor
//!   REVFLOW_OUTPUT_PATH     - SQLite db or JSONL directory (default: ./revflow.db)
//!   OUTPUT_BACKEND          - sqlite | jsonl (default: sqlite)
//!   COGS_RATES_PATH         - per-product COGS rate table (optional)

use dotenv::dotenv;
use log::{error, info};
use revflow::normalize::JsonlFileSource;
use revflow::{PipelineRun, RunConfig, SourceSystem};
use std::env;
use std::process;

fn parse_source_arg(arg: &str) -> Result<JsonlFileSource, String> {
    let (system, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected <source_system>=<path>, got {}", arg))?;

    let source = match system {
        "storefront" => SourceSystem::Storefront,
        "payment_processor" => SourceSystem::PaymentProcessor,
        "crm" => SourceSystem::Crm,
        "product_catalog" => SourceSystem::ProductCatalog,
        other => return Err(format!("unknown source system: {}", other)),
    };
    Ok(JsonlFileSource::new(source, path))
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match RunConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {}", e);
            process::exit(2);
        }
    };

    let mut sources = Vec::new();
    for arg in env::args().skip(1) {
        match parse_source_arg(&arg) {
            Ok(source) => sources.push(source),
            Err(e) => {
                error!("bad argument: {}", e);
                process::exit(2);
            }
        }
    }
    if sources.is_empty() {
        error!("no adapter extracts given; pass <source_system>=<path> arguments");
        process::exit(2);
    }

    info!("starting reconciliation run");
    info!("   output: {} ({:?})", config.output_path, config.backend);
    info!("   orphan grace: {}h", config.orphan_grace_hours);
    info!("   fuzzy threshold: {}", config.fuzzy_match_threshold);
    info!("   sources: {}", sources.len());

    match PipelineRun::new(config).execute(sources).await {
        Ok(summary) => {
            info!(
                "run {} published: {} records -> {} entities, {} events, {} exceptions",
                summary.run_id,
                summary.records_seen,
                summary.entity_count,
                summary.event_count,
                summary.exception_count
            );
        }
        Err(e) => {
            // Run-level failure: nothing was published, last good snapshot stands
            error!("run failed, snapshot not published: {}", e);
            process::exit(1);
        }
    }
}

pub mod aggregator;
pub mod analyzer;
pub mod cli;
pub mod competitor;
pub mod config;
pub mod crawler;
pub mod engine;
pub mod error;
pub mod http_client;
pub mod keywords;
pub mod models;
pub mod performance;
pub mod qa;
pub mod readability;
pub mod renderer;
pub mod reporter;
pub mod robots;
pub mod schema;
pub mod scorer;
pub mod url_normalizer;

pub use engine::AuditEngine;
pub use error::{AddOnError, AuditError, FetchError};
pub use models::AuditResult;

use anyhow::{Context, Result};
use cli::Cli;
use colored::*;
use config::{AuditOptions, Config};
use reporter::Reporter;
use std::path::Path;

fn load_config(args: &Cli) -> Result<Option<Config>> {
    match &args.config {
        Some(path) => Config::from_file(Path::new(path)).map(Some),
        None => Config::from_default_paths(),
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let config = load_config(&args)?.unwrap_or_default();
    let args = config.merge_with_cli(&args);
    let settings = config.engine_settings(&args);
    let options = AuditOptions::from(&args);
    let json_output = args.output == "json";

    if !json_output {
        println!("{}", "SiteLens - Website Audit".bright_cyan().bold());
        println!("{}", "=".repeat(50).bright_blue());
        println!();

        let (max_pages, max_depth) = options.crawl_budget();
        println!("{} {}", "Auditing:".bright_white().bold(), args.url);
        println!("{} {:?}", "Tier:".bright_white().bold(), options.tier);
        println!("{} {}", "Max depth:".bright_white().bold(), max_depth);
        println!("{} {}", "Max pages:".bright_white().bold(), max_pages);
        println!();
    }

    let engine = AuditEngine::new(settings)
        .await
        .context("Failed to start the audit engine")?;
    let (result, qa) = engine.run_audit_with_report(&args.url, options).await?;

    if args.verbose && !qa.remaining_issues.is_empty() {
        println!(
            "{} {} unresolved consistency issue(s) after {} repair attempt(s)",
            "QA:".yellow().bold(),
            qa.remaining_issues.len(),
            qa.attempts
        );
    }

    match args.output.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&result)?;
            println!("{}", json);
        }
        _ => {
            Reporter::print_text_report(&result);
        }
    }

    if let Some(filename) = &args.save {
        Reporter::save_json_report(&result, filename)?;
    }

    Ok(())
}

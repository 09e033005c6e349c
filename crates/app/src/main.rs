mod cli;
mod pipeline;
mod sync;
mod telemetry;
mod throttle;

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use contentgen_core::{LocaleTable, WorkPlan};
use contentgen_providers::{LinkSynergyClient, OllamaClient};
use contentgen_storage::Database;
use contentgen_util::{load_env_file, AppConfig, GenerationConfig};

use crate::cli::{Cli, Command, GenerateArgs};
use crate::pipeline::{Clock, ContentPipeline, PipelineOptions};
use crate::sync::MerchantSync;
use crate::throttle::Throttle;

const LINKSYNERGY_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(config.environment)?;
    let metrics = telemetry::init_metrics()?;
    let locales = load_locales(&config.generation)?;

    if let Command::Locales(args) = &cli.command {
        for item in WorkPlan::new(&locales, &args.filter()) {
            println!(
                "{}\t{}\t{}",
                item.locale.country_code, item.locale.language, item.locale.country_name
            );
        }
        return Ok(());
    }

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "app", env = %config.environment.as_str(), "database ready");

    let clock: Clock = Arc::new(Utc::now);
    let outcome = tokio::select! {
        outcome = execute(&cli.command, &config, database, locales, clock) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!(stage = "app", "interrupted; stopping at the subject in flight");
            Err("run interrupted".into())
        }
    };

    if let Some(path) = cli.metrics_file.as_ref().or(config.metrics_file.as_ref()) {
        metrics.write_file(path)?;
    }
    outcome
}

async fn execute(
    command: &Command,
    config: &AppConfig,
    database: Database,
    locales: LocaleTable,
    clock: Clock,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Generate(args) => generate(args, &config.generation, database, locales, clock).await,
        Command::SyncMerchants => {
            let http = reqwest::Client::builder()
                .timeout(LINKSYNERGY_TIMEOUT)
                .build()?;
            let client = LinkSynergyClient::new(config.merchant.base_url.clone(), http);
            let throttle = Arc::new(Throttle::new(1, config.merchant.interval));
            let summary = MerchantSync::new(database, client, throttle, &config.merchant, clock)?
                .run()
                .await?;
            info!(stage = "app", ?summary, "merchant sync complete");
            Ok(())
        }
        Command::Locales(_) => Ok(()),
    }
}

async fn generate(
    args: &GenerateArgs,
    config: &GenerationConfig,
    database: Database,
    locales: LocaleTable,
    clock: Clock,
) -> Result<(), Box<dyn std::error::Error>> {
    let http = reqwest::Client::builder().timeout(config.timeout).build()?;
    let client = OllamaClient::new(config.model.clone(), config.base_url.clone(), http);
    let throttle = Arc::new(Throttle::new(config.burst, config.interval));

    let options = PipelineOptions {
        kind: args.kind,
        filter: args.locales.filter(),
        page_size: args.page_size.unwrap_or(config.page_size),
        workers: args.workers.unwrap_or(config.workers).max(1),
        tone: config.tone.clone(),
        force: args.force,
        resume: args.resume,
        lenient: args.lenient,
    };

    let summary = ContentPipeline::new(database, client, throttle, locales, clock)
        .run(&options)
        .await?;
    info!(stage = "app", ?summary, "generation complete");
    Ok(())
}

fn load_locales(config: &GenerationConfig) -> Result<LocaleTable, Box<dyn std::error::Error>> {
    match &config.locales_file {
        Some(path) => {
            let table = LocaleTable::from_path(path)?;
            info!(stage = "app", path = %path.display(), countries = table.countries().len(), "loaded locale table");
            Ok(table)
        }
        None => Ok(LocaleTable::builtin()),
    }
}

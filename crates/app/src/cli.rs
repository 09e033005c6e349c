use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use contentgen_core::{PlanFilter, SubjectKind};

/// Batch jobs that enrich reference records with generated, localized content.
#[derive(Parser, Debug)]
#[command(name = "contentgen", version)]
pub struct Cli {
    /// Write the Prometheus text exposition to this file when the command ends.
    ///
    /// Overrides `CONTENTGEN_METRICS_FILE`.
    #[arg(long, global = true)]
    pub metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate content for every eligible subject of a kind in every locale.
    Generate(GenerateArgs),
    /// Mirror the affiliate advertiser list and fetch missing merchant details.
    SyncMerchants,
    /// Print the locales a generation run would cover.
    Locales(LocaleArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Subject kind: `postal-code` or `bank-code`.
    pub kind: SubjectKind,

    /// Regenerate content that already exists.
    #[arg(long)]
    pub force: bool,

    /// Skip locales a previous run completed without failures.
    #[arg(long)]
    pub resume: bool,

    /// Store structurally valid replies even when they break the content rules.
    #[arg(long)]
    pub lenient: bool,

    #[command(flatten)]
    pub locales: LocaleArgs,

    /// Subjects fetched per page. Defaults to `PAGE_SIZE`.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub page_size: Option<u32>,

    /// Subjects processed concurrently within a page. Defaults to `GENERATION_WORKERS`.
    #[arg(long)]
    pub workers: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LocaleArgs {
    /// Restrict the run to these country codes (repeatable).
    #[arg(long = "country", value_name = "CODE")]
    pub countries: Vec<String>,

    /// Restrict the run to these language codes (repeatable).
    #[arg(long = "language", value_name = "CODE")]
    pub languages: Vec<String>,
}

impl LocaleArgs {
    pub fn filter(&self) -> PlanFilter {
        PlanFilter {
            countries: self.countries.clone(),
            languages: self.languages.clone(),
        }
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ig_core::{current_year, year_range, ScrapeOptions};
use ig_sync::{load_registry, run_scrape, Collaborators, ScrapeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "ig-cli")]
#[command(about = "Archive inspector general reports to disk")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch, validate and store reports for the selected inspectors.
    Scrape(ScrapeArgs),
    /// Print the years a scrape with these flags would cover.
    Years(YearArgs),
}

#[derive(Debug, Args)]
struct YearArgs {
    /// Scrape from this year through the current one.
    #[arg(long)]
    since: Option<String>,
    /// Scrape a single year.
    #[arg(long)]
    year: Option<String>,
    /// Start from the inspector's earliest archived year.
    #[arg(long)]
    archive: bool,
    /// Restrict to this inspector; repeat for several.
    #[arg(long = "inspector")]
    inspectors: Vec<String>,
    /// Directory holding inspectors.yaml and the captured bundles.
    #[arg(long)]
    workspace_root: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ScrapeArgs {
    #[command(flatten)]
    years: YearArgs,
    /// Record metadata only; skip downloads and text extraction.
    #[arg(long)]
    dry_run: bool,
    /// With --dry-run, don't check that report URLs respond.
    #[arg(long)]
    quick: bool,
    /// Where reports are stored (overrides IG_DATA_DIR).
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

impl YearArgs {
    fn options(&self) -> ScrapeOptions {
        ScrapeOptions {
            since: self.since.clone(),
            year: self.year.clone(),
            archive: self.archive,
            inspectors: self.inspectors.clone(),
            ..ScrapeOptions::default()
        }
    }

    fn config(&self) -> ScrapeConfig {
        let mut config = ScrapeConfig::from_env();
        if let Some(root) = &self.workspace_root {
            config.workspace_root = root.clone();
        }
        config
    }
}

async fn scrape(args: ScrapeArgs) -> Result<ExitCode> {
    let mut config = args.years.config();
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    let options = ScrapeOptions {
        dry_run: args.dry_run,
        quick: args.quick,
        ..args.years.options()
    };

    let collaborators = Collaborators::standard(&config)?;
    let summary = run_scrape(&config, &options, collaborators).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "scrape complete: run_id={} inspectors={} saved={} failed_downloads={} invalid={} unsaved={} duplicates={}",
            summary.run_id,
            summary.inspectors,
            summary.saved_reports,
            summary.failed_downloads,
            summary.invalid_reports,
            summary.failed_saves,
            summary.duplicate_messages.len()
        );
        for empty in &summary.empty_inspectors {
            eprintln!("{empty}");
        }
    }

    Ok(if summary.found_nothing_somewhere() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn years(args: YearArgs) -> Result<ExitCode> {
    let options = args.options();
    let this_year = current_year();

    if !options.archive {
        let years = year_range(&options, None, this_year)?;
        println!("{}", join_years(&years));
        return Ok(ExitCode::SUCCESS);
    }

    let config = args.config();
    let registry = load_registry(&config.workspace_root).await?;
    for entry in registry
        .inspectors
        .iter()
        .filter(|i| options.inspectors.is_empty() || options.inspectors.contains(&i.inspector))
    {
        let source = ig_adapters::source_for_inspector(
            &entry.inspector,
            config.workspace_root.join(&entry.bundle),
        )
        .with_context(|| format!("opening source for {}", entry.inspector))?;
        let archive_year = entry.archive.or_else(|| source.archive_year());
        let years = year_range(&options, archive_year, this_year)?;
        println!("{}: {}", entry.inspector, join_years(&years));
    }
    Ok(ExitCode::SUCCESS)
}

fn join_years(years: &[i32]) -> String {
    years
        .iter()
        .map(i32::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Scrape(args) => scrape(args).await,
        Commands::Years(args) => years(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn scrape_flags_map_onto_options() {
        let cli = Cli::try_parse_from([
            "ig-cli",
            "scrape",
            "--dry-run",
            "--quick",
            "--since",
            "2019",
            "--inspector",
            "epa",
            "--inspector",
            "doj",
        ])
        .unwrap();
        let Commands::Scrape(args) = cli.command else {
            panic!("expected scrape");
        };
        assert!(args.dry_run && args.quick);
        let options = args.years.options();
        assert_eq!(options.since.as_deref(), Some("2019"));
        assert_eq!(options.inspectors, vec!["epa", "doj"]);
        assert!(!options.dry_run);
    }

    #[test]
    fn year_list_is_space_separated() {
        assert_eq!(join_years(&[2019, 2020]), "2019 2020");
    }
}

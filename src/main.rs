// Entry point and CLI flow.
//
// `run` rebuilds everything from the raw exports: it loads and normalizes
// the sheets, reports mismatched facility names, applies the correction
// rules, unifies the years and writes the reports. The other commands expose
// single steps for investigating the data.
mod config;
mod corrections;
mod error;
mod loader;
mod mismatch;
mod output;
mod pipeline;
mod reports;
mod rules;
mod schema;
mod sheet;
mod store;
mod types;
mod unify;
mod util;
mod yearly;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use config::PipelineConfig;
use error::{PipelineError, Result};
use pipeline::{Pipeline, PipelineOutcome};

#[derive(Parser)]
#[command(name = "uc-fire")]
#[command(about = "Reconcile yearly wildfire sheets of federal conservation units into one historical table")]
#[command(version)]
struct Cli {
    /// Pipeline config (defaults to ./uc-fire.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the full pipeline from the raw CSV exports")]
    Run,
    #[command(about = "List facility names that do not match the reference table")]
    Detect,
    #[command(about = "Apply the correction rules to the persisted snapshots")]
    Correct,
    #[command(about = "Search reference units by words of their full name")]
    Search {
        #[arg(required = true)]
        keywords: Vec<String>,
    },
    #[command(about = "Print the effective correction ruleset")]
    Rules,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::from(map_exit_code(&e))
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "uc_fire=debug" } else { "uc_fire=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn map_exit_code(error: &PipelineError) -> u8 {
    match error {
        PipelineError::MalformedRow { .. }
        | PipelineError::Csv(_)
        | PipelineError::MissingColumn { .. } => 2,
        PipelineError::Config(_)
        | PipelineError::Toml(_)
        | PipelineError::InvalidRule { .. }
        | PipelineError::UnknownYear(_)
        | PipelineError::NotText { .. } => 3,
        _ => 1,
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = cli.store_dir {
        config.store_dir = dir;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    let rules = config.load_rules()?;
    let pipeline = Pipeline::new(config, rules)?;

    match cli.command {
        Commands::Run => handle_run(&pipeline),
        Commands::Detect => handle_detect(&pipeline),
        Commands::Correct => handle_correct(&pipeline),
        Commands::Search { keywords } => handle_search(&pipeline, &keywords),
        Commands::Rules => {
            print!("{}", pipeline.rules().to_toml_string()?);
            Ok(())
        }
    }
}

fn handle_run(pipeline: &Pipeline) -> Result<()> {
    let outcome = pipeline.run()?;
    print_mismatches("Unmatched facility names before corrections", &outcome.mismatches_before);

    let applied = outcome.corrections.iter().filter(|o| o.changed > 0).count();
    println!(
        "Applied {} of {} rule/table pairs from ruleset {} ({} rows changed).",
        util::format_int(applied),
        util::format_int(outcome.corrections.len()),
        outcome.ruleset_version,
        util::format_int(outcome.corrections.iter().map(|o| o.changed).sum::<usize>())
    );
    print_mismatches("Unmatched facility names after corrections", &outcome.mismatches_after);

    let files = pipeline.write_reports(&outcome)?;
    print_reports(pipeline, &outcome);
    println!(
        "Historical table: {} rows ({} dropped at join) exported to {}",
        util::format_int(outcome.unified.records.len()),
        util::format_int(outcome.unified.report.rows_dropped()),
        files.history.display()
    );
    println!("Summary written to {}\n", files.summary.display());
    Ok(())
}

fn print_reports(pipeline: &Pipeline, outcome: &PipelineOutcome) {
    let records = &outcome.unified.records;
    let config = pipeline.config();

    let totals = reports::generate_yearly_totals(records);
    output::preview_table(
        "Burned Area by Year",
        Some("SUM of burned area per year"),
        &totals,
        totals.len(),
    );

    let top = reports::generate_top_units(records, &config.years, config.top_n);
    output::preview_table(
        "Most Affected Units",
        Some("Top units per year by total burned area, with predominant biome"),
        &top,
        top.len(),
    );

    let unburned = reports::generate_unburned_units(&outcome.reference, records);
    output::preview_table(
        "Units Without Fire Records",
        Some("Check each unit's creation date before drawing conclusions"),
        &unburned,
        10,
    );
}

fn print_mismatches(title: &str, mismatches: &pipeline::MismatchReport) {
    println!("{}", title);
    for (year, names) in mismatches {
        if names.is_empty() {
            println!("  {}: none", year);
            continue;
        }
        println!("  {}: {}", year, names.len());
        for name in names {
            println!("    {:?}", name);
        }
    }
    println!();
}

fn handle_detect(pipeline: &Pipeline) -> Result<()> {
    let sources = pipeline.load_sources()?;
    let mismatches = Pipeline::detect(&sources.reference, &sources.yearly)?;
    print_mismatches("Unmatched facility names", &mismatches);
    Ok(())
}

fn handle_correct(pipeline: &Pipeline) -> Result<()> {
    let outcomes = pipeline.correct_persisted()?;
    println!("Corrections applied to {}", pipeline.store().root().display());
    for o in &outcomes {
        let status = if o.skipped {
            "skipped".to_string()
        } else {
            format!("{} matched, {} changed", o.matched, o.changed)
        };
        println!("  [{}] {}: {}", o.year, o.rule, status);
    }
    println!();
    Ok(())
}

fn handle_search(pipeline: &Pipeline, keywords: &[String]) -> Result<()> {
    let hits = pipeline.search(keywords)?;
    output::preview_table(
        "Reference Units",
        Some(format!("full name contains any of: {}", keywords.join(", ")).as_str()),
        &hits,
        hits.len(),
    );
    Ok(())
}

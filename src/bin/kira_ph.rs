use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_pdb_homology::config::{ConfigLoader, ConfigOverrides, ResolvedConfig};
use kira_pdb_homology::domain::ThresholdMode;
use kira_pdb_homology::error::KiraError;
use kira_pdb_homology::input::read_fasta;
use kira_pdb_homology::lookup::CompoundLookup;
use kira_pdb_homology::metadata::RcsbGraphqlHttpClient;
use kira_pdb_homology::output::{JsonOutput, OutputMode};
use kira_pdb_homology::pipeline::{Pipeline, PipelineResult, TracingSink};
use kira_pdb_homology::search::RcsbSearchHttpClient;

#[derive(Parser)]
#[command(name = "kira-ph")]
#[command(about = "Structural homology lookup for protein batches against RCSB PDB")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Search a FASTA file of proteins and report EC-diverse PDB hits")]
    Search(SearchArgs),
    #[command(about = "Print the resolved configuration")]
    Config(ConfigArgs),
}

#[derive(Args, Clone)]
struct ConfigArgs {
    #[arg(long)]
    config: Option<String>,

    #[command(flatten)]
    overrides: OverrideArgs,
}

#[derive(Args, Clone)]
struct SearchArgs {
    input: PathBuf,

    #[arg(long)]
    config: Option<String>,

    #[arg(long, short)]
    output: Option<PathBuf>,

    #[command(flatten)]
    overrides: OverrideArgs,
}

#[derive(Args, Clone, Default)]
struct OverrideArgs {
    #[arg(long)]
    threshold_mode: Option<ThresholdMode>,

    #[arg(long)]
    threshold: Option<f64>,

    #[arg(long)]
    max_hits: Option<usize>,

    #[arg(long)]
    bundle_size: Option<usize>,

    #[arg(long)]
    result_cap: Option<usize>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    inchikey_map: Option<Utf8PathBuf>,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        ConfigOverrides {
            threshold_mode: args.threshold_mode,
            threshold: args.threshold,
            result_cap: args.result_cap,
            bundle_size: args.bundle_size,
            max_hits: args.max_hits,
            workers: args.workers,
            inchikey_map: args.inchikey_map,
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    if error.is_input_error() {
        2
    } else if error.is_remote_unavailable() {
        3
    } else {
        1
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Search(args) => run_search(args, output_mode),
        Commands::Config(args) => {
            let resolved = ConfigLoader::resolve(args.config.as_deref(), args.overrides.into())?;
            JsonOutput::print_config(&resolved).into_diagnostic()
        }
    }
}

fn run_search(args: SearchArgs, output_mode: OutputMode) -> miette::Result<()> {
    let resolved = ConfigLoader::resolve(args.config.as_deref(), args.overrides.into())?;
    let queries = read_fasta(&args.input)?;
    let lookup = load_lookup(&resolved)?;

    let search = RcsbSearchHttpClient::new(resolved.search_url.clone(), resolved.search_timeout())?;
    let metadata =
        RcsbGraphqlHttpClient::new(resolved.graphql_url.clone(), resolved.metadata_timeout())?;
    let pipeline = Pipeline::new(search, metadata, lookup, resolved.pipeline_options());

    let result = match output_mode {
        OutputMode::Interactive => pipeline.run(&queries, &TracingSink)?,
        OutputMode::NonInteractive => pipeline.run(&queries, &JsonOutput)?,
    };

    match &args.output {
        Some(path) => JsonOutput::write_result(&result, path)?,
        None => JsonOutput::print_result(&result).into_diagnostic()?,
    }
    if matches!(output_mode, OutputMode::Interactive) {
        print_summary(&result, args.output.as_deref());
    }
    Ok(())
}

fn load_lookup(resolved: &ResolvedConfig) -> Result<CompoundLookup, KiraError> {
    match &resolved.inchikey_map {
        Some(path) => CompoundLookup::from_tsv(path.as_std_path()),
        None => Ok(CompoundLookup::new()),
    }
}

fn print_summary(result: &PipelineResult, output: Option<&std::path::Path>) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";
    let summary = &result.summary;

    eprintln!("{cyan}KIRA-PH summary{reset}");
    eprintln!(
        "{green}proteins with hits: {} of {}{reset}",
        summary.proteins_with_hits, summary.proteins
    );
    eprintln!(
        "{green}distinct structures: {} ({} metadata requests){reset}",
        summary.distinct_structures, summary.metadata_requests
    );
    eprintln!("{green}rows retained: {}{reset}", summary.rows);
    if !summary.missing_structures.is_empty() {
        eprintln!(
            "{yellow}structures unknown to RCSB: {}{reset}",
            summary.missing_structures.join(", ")
        );
    }
    if let Some(path) = output {
        eprintln!("{cyan}written to {}{reset}", path.display());
    }
}

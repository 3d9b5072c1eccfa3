use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use proteomics_archiver::app::{App, RunReport, TransferOptions};
use proteomics_archiver::backend::{DestinationBackend, NameAddressedBackend, PathAddressedBackend};
use proteomics_archiver::config::{ConfigLoader, ResolvedConfig, ResolvedDestination, ResolvedSource};
use proteomics_archiver::destination::LocalDirectory;
use proteomics_archiver::domain::{Category, Decision};
use proteomics_archiver::drive::DriveHttpClient;
use proteomics_archiver::error::ArchiverError;
use proteomics_archiver::fs_util::{descriptive_size, write_atomic};
use proteomics_archiver::generator::{GeneratorOptions, ManifestGenerator, parse_experiment_ids};
use proteomics_archiver::manifest::{
    ManifestParser, filter_manifest, filtered_manifest_path, inclusion_set, render_manifest,
};
use proteomics_archiver::naming::{KeywordTranslator, SpecialFolderNaming};
use proteomics_archiver::output::{CategoryInfo, ConsoleProgress, JsonOutput, OutputMode};
use proteomics_archiver::sftp::{SftpDestination, SftpSource};
use proteomics_archiver::source::{LocalSource, SourceClient};

#[derive(Parser)]
#[command(name = "parch")]
#[command(about = "Moves categorized proteomics files to remote archives and cloud drives")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Transfer every dataset of a manifest")]
    Transfer(TransferArgs),
    #[command(about = "Generate a manifest from experiment folders at the source")]
    Generate(GenerateArgs),
    #[command(about = "Keep only the DTASelect entries listed in an inclusion file")]
    Filter(FilterArgs),
    #[command(about = "List the file categories")]
    Categories {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct TransferArgs {
    #[arg(long)]
    manifest: PathBuf,

    #[arg(long)]
    config: Option<String>,

    /// Replace duplicates at name-addressed destinations.
    #[arg(long = "override")]
    override_existing: bool,

    #[arg(long)]
    submission: Option<String>,

    /// Only transfer this dataset.
    #[arg(long)]
    dataset: Option<String>,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct GenerateArgs {
    #[arg(long)]
    config: Option<String>,

    /// Comma separated ids; overrides `experiment_ids` from the config.
    #[arg(long)]
    experiments: Option<String>,

    #[arg(long)]
    include_dtaselect: bool,

    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    manifest: PathBuf,

    #[arg(long)]
    base_path: String,

    #[arg(long)]
    inclusion: PathBuf,

    /// Defaults to `Filtered_<manifest name>` beside the manifest.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ArchiverError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ArchiverError) -> u8 {
    match error {
        ArchiverError::DatasetNotFound(_) => 2,
        err if err.is_fatal() => 2,
        ArchiverError::SshConnect(_)
        | ArchiverError::SshAuth(_)
        | ArchiverError::DriveHttp(_)
        | ArchiverError::DriveStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Transfer(args) => run_transfer(args),
        Commands::Generate(args) => run_generate(args),
        Commands::Filter(args) => run_filter(args),
        Commands::Categories { json } => run_categories(json),
    }
}

fn build_source(resolved: &ResolvedConfig) -> Box<dyn SourceClient> {
    match &resolved.source {
        ResolvedSource::Local { root: Some(root) } => Box::new(LocalSource::with_root(root.clone())),
        ResolvedSource::Local { root: None } => Box::new(LocalSource::new()),
        ResolvedSource::Sftp(endpoint) => Box::new(SftpSource::new(endpoint.clone())),
    }
}

fn build_backend(
    resolved: &ResolvedConfig,
    override_existing: bool,
) -> Result<Box<dyn DestinationBackend>, ArchiverError> {
    let layout = resolved.layout.clone();
    let backend: Box<dyn DestinationBackend> = match resolved.require_destination()? {
        ResolvedDestination::Local { path } => Box::new(PathAddressedBackend::new(
            LocalDirectory::new(path.clone()),
            layout,
        )),
        ResolvedDestination::Sftp(endpoint) => Box::new(PathAddressedBackend::new(
            SftpDestination::new(endpoint.clone()),
            layout,
        )),
        ResolvedDestination::Drive { access_token } => Box::new(NameAddressedBackend::new(
            DriveHttpClient::new(access_token.clone())?,
            layout,
            resolved.size_tolerance,
            override_existing,
        )),
    };
    Ok(backend)
}

fn run_transfer(args: TransferArgs) -> miette::Result<()> {
    let resolved = ConfigLoader::resolve(args.config.as_deref())?;
    let translator = KeywordTranslator::new(resolved.keyword_translations.clone());
    let parser = ManifestParser::new(
        translator.clone(),
        Box::new(SpecialFolderNaming::new(resolved.special_folders.clone())),
    );
    let mut datasets = parser.parse_file(&args.manifest)?;
    if let Some(name) = &args.dataset {
        datasets.retain(|dataset, _| dataset == name);
        if datasets.is_empty() {
            return Err(ArchiverError::DatasetNotFound(name.clone()).into());
        }
    }
    tracing::info!(
        datasets = datasets.len(),
        manifest = %args.manifest.display(),
        "manifest parsed"
    );

    let override_existing = args.override_existing || resolved.override_existing;
    let backend = build_backend(&resolved, override_existing)?;
    let options = TransferOptions {
        submission_name: args.submission.or_else(|| resolved.submission_name.clone()),
        project_base_path: resolved.project_base_path.clone(),
    };
    let mut app = App::new(build_source(&resolved), backend, translator, options);

    let mode = if args.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    match mode {
        OutputMode::Json => {
            let report = app.transfer_datasets(&datasets, &JsonOutput);
            JsonOutput::print_report(&report).into_diagnostic()?;
        }
        OutputMode::Human => {
            let report = app.transfer_datasets(&datasets, &ConsoleProgress);
            print_transfer_summary(&report);
        }
    }
    Ok(())
}

fn run_generate(args: GenerateArgs) -> miette::Result<()> {
    let resolved = ConfigLoader::resolve(args.config.as_deref())?;
    let experiment_ids = match &args.experiments {
        Some(text) => parse_experiment_ids(text)?,
        None => resolved.experiment_ids.clone(),
    };
    if experiment_ids.is_empty() {
        return Err(ArchiverError::MissingProperty("experiment_ids".to_string()).into());
    }
    let options = GeneratorOptions {
        project_name: resolved.project_name.clone(),
        project_base_path: resolved.require_project_base_path()?.to_string(),
        experiment_ids,
        include_dtaselect: args.include_dtaselect,
    };

    let source = build_source(&resolved);
    let dataset = ManifestGenerator::new(&*source).generate(&options)?;
    let text = render_manifest([&dataset]);
    match args.output {
        Some(path) => {
            write_atomic(&path, text.as_bytes())?;
            tracing::info!(path = %path.display(), paths = dataset.path_count(), "manifest written");
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn run_filter(args: FilterArgs) -> miette::Result<()> {
    let manifest = fs::read_to_string(&args.manifest)
        .map_err(|_| ArchiverError::ManifestRead(args.manifest.clone()))?;
    let inclusion = fs::read_to_string(&args.inclusion)
        .map_err(|_| ArchiverError::ManifestRead(args.inclusion.clone()))?;

    let included = inclusion_set(inclusion.lines(), &args.base_path);
    let kept = filter_manifest(manifest.lines(), &args.base_path, &included);
    let mut text = kept.join("\n");
    text.push('\n');
    let output = args
        .output
        .unwrap_or_else(|| filtered_manifest_path(&args.manifest));
    write_atomic(&output, text.as_bytes())?;
    tracing::info!(path = %output.display(), lines = kept.len(), "filtered manifest written");
    Ok(())
}

fn run_categories(json: bool) -> miette::Result<()> {
    let infos: Vec<CategoryInfo> = Category::ALL.into_iter().map(CategoryInfo::from).collect();
    if json {
        JsonOutput::print_categories(&infos).into_diagnostic()?;
        return Ok(());
    }
    for info in &infos {
        let pattern = match (info.default_filename, info.default_extension) {
            (Some(filename), _) => filename.to_string(),
            (None, Some(extension)) => format!("*.{extension}"),
            (None, None) => "*".to_string(),
        };
        println!("{:<12} {:<18} {pattern}", info.name, info.label);
    }
    Ok(())
}

fn print_transfer_summary(report: &RunReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}parch summary{reset}");
    for dataset in &report.datasets {
        println!(
            "{green}{}: {} credited, {} moved{reset}",
            dataset.name,
            descriptive_size(dataset.bytes_credited),
            descriptive_size(dataset.bytes_moved)
        );
        println!(
            "   transferred {}, skipped {}, duplicates replaced {}",
            dataset.count(Decision::Transfer),
            dataset.count(Decision::Skip),
            dataset.count(Decision::ReplaceDuplicates)
        );
        let warnings = dataset.integrity_warnings();
        if warnings > 0 {
            println!("{yellow}   integrity warnings: {warnings}{reset}");
        }
        for failure in &dataset.failures {
            println!(
                "{red}   failed {} {}: {}{reset}",
                failure.category, failure.path, failure.error
            );
        }
    }
    println!(
        "{cyan}total: {} credited, {} moved, {} failures{reset}",
        descriptive_size(report.bytes_credited),
        descriptive_size(report.bytes_moved),
        report.failure_count()
    );
}

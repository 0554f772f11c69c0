use std::fs::File;
use std::io::{self, BufWriter};
use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kira_ortholog_mapper::client::ApiClient;
use kira_ortholog_mapper::config::ConfigLoader;
use kira_ortholog_mapper::domain::{Organism, OrganismCode};
use kira_ortholog_mapper::error::OrthoError;
use kira_ortholog_mapper::export::{coverage, ordered_genes, write_csv};
use kira_ortholog_mapper::output::{ExportReport, JsonOutput};
use kira_ortholog_mapper::pipeline::Pipeline;
use kira_ortholog_mapper::progress::{FileProgressStore, ProgressTracker};
use kira_ortholog_mapper::store::{FileGeneStore, GeneStore};

#[derive(Parser)]
#[command(name = "kira-om")]
#[command(about = "Genome-wide ortholog discovery over KEGG")]
#[command(version, author)]
struct Cli {
    /// Data directory for organisms, genes and job progress.
    #[arg(long, global = true)]
    store: Option<String>,

    /// Config file (defaults to ./kira-om.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Register and list organisms")]
    Organism(OrganismArgs),
    #[command(about = "Find orthologs for every gene of an organism")]
    Process(CodeArgs),
    #[command(about = "Show job progress for an organism")]
    Progress(CodeArgs),
    #[command(about = "Write genes and their orthologs as CSV")]
    Export(ExportArgs),
}

#[derive(Args)]
struct OrganismArgs {
    #[command(subcommand)]
    command: OrganismCommand,
}

#[derive(Subcommand)]
enum OrganismCommand {
    #[command(about = "Register an organism by KEGG code")]
    Add(AddArgs),
    #[command(about = "List registered organisms")]
    List,
}

#[derive(Args)]
struct AddArgs {
    code: String,

    #[arg(long)]
    name: Option<String>,
}

#[derive(Args)]
struct CodeArgs {
    code: String,
}

#[derive(Args)]
struct ExportArgs {
    code: String,

    #[arg(long)]
    out: Option<String>,

    #[arg(long)]
    with_orthologs_only: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<OrthoError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &OrthoError) -> u8 {
    match error {
        OrthoError::OrganismNotFound(_)
        | OrthoError::ProgressNotFound(_)
        | OrthoError::NotFound(_)
        | OrthoError::InvalidOrganismCode(_)
        | OrthoError::InvalidGeneId(_)
        | OrthoError::ConfigRead(_)
        | OrthoError::ConfigParse(_)
        | OrthoError::InvalidConfig(_) => 2,
        OrthoError::Http(_)
        | OrthoError::TransientFetch { .. }
        | OrthoError::UpstreamStatus { .. }
        | OrthoError::PipelineFatal(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    runtime.block_on(dispatch(cli))
}

async fn dispatch(cli: Cli) -> miette::Result<()> {
    let root = match &cli.store {
        Some(path) => Utf8PathBuf::from(path),
        None => FileGeneStore::default_root()?,
    };
    let store = Arc::new(FileGeneStore::new(root.clone()));

    match cli.command {
        Commands::Organism(args) => match args.command {
            OrganismCommand::Add(args) => {
                let code: OrganismCode = args.code.parse()?;
                let mut organism = store
                    .organism(&code)
                    .await?
                    .unwrap_or_else(|| Organism::new(code.clone(), None));
                if args.name.is_some() {
                    organism.name = args.name;
                }
                store.save_organism(&organism).await?;
                JsonOutput::print_organism(&organism).into_diagnostic()?;
                Ok(())
            }
            OrganismCommand::List => {
                let organisms = store.list_organisms().await?;
                JsonOutput::print_organisms(&organisms).into_diagnostic()?;
                Ok(())
            }
        },
        Commands::Process(args) => {
            let code: OrganismCode = args.code.parse()?;
            let settings = ConfigLoader::resolve(cli.config.as_deref())?;
            let client = ApiClient::from_settings(&settings)?;
            let progress = Arc::new(FileProgressStore::new(root));
            let pipeline = Pipeline::new(settings, client, store, progress)?;
            let job = pipeline.start_processing(&code).await?;
            info!(organism = %code, job_id = %job.job_id, "processing");
            let summary = job.wait().await?;
            JsonOutput::print_summary(&summary).into_diagnostic()?;
            Ok(())
        }
        Commands::Progress(args) => {
            let code: OrganismCode = args.code.parse()?;
            let settings = ConfigLoader::resolve(cli.config.as_deref())?;
            let progress_store = Arc::new(FileProgressStore::new(root));
            let tracker = ProgressTracker::new(progress_store, settings.progress_ttl());
            let progress = tracker.read(code.as_str()).await?;
            JsonOutput::print_progress(&progress).into_diagnostic()?;
            Ok(())
        }
        Commands::Export(args) => run_export(args, store.as_ref()).await,
    }
}

async fn run_export(args: ExportArgs, store: &FileGeneStore) -> miette::Result<()> {
    let code: OrganismCode = args.code.parse()?;
    if store.organism(&code).await?.is_none() {
        return Err(OrthoError::OrganismNotFound(code.to_string()).into());
    }
    let genes = ordered_genes(store.genes(&code).await?);
    let summary = coverage(&genes);

    match &args.out {
        Some(path) => {
            let file = File::create(path)
                .map_err(|err| OrthoError::Storage(format!("create {path}: {err}")))?;
            let rows = write_csv(BufWriter::new(file), &genes, args.with_orthologs_only)?;
            JsonOutput::print_export(&ExportReport {
                organism: code.as_str(),
                path: Some(path.as_str()),
                rows,
                coverage: &summary,
            })
            .into_diagnostic()?;
        }
        None => {
            let rows = write_csv(io::stdout().lock(), &genes, args.with_orthologs_only)?;
            info!(
                organism = %code,
                rows,
                coverage = summary.percent,
                with_orthologs = summary.with_orthologs,
                "export written"
            );
        }
    }
    Ok(())
}

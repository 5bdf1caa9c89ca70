use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_cbioportal::cache::{BlobStore, DiskStore, ResultCache};
use kira_cbioportal::config::ConfigLoader;
use kira_cbioportal::domain::{GeneIdType, GeneSelector, Projection, SampleSelector};
use kira_cbioportal::error::CbioError;
use kira_cbioportal::output::JsonOutput;
use kira_cbioportal::planner::{CbioPortal, GeneDataQuery};
use kira_cbioportal::transport::HttpTransport;

#[derive(Parser)]
#[command(name = "kira-cbio")]
#[command(about = "Query the cBioPortal cancer genomics API")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    hostname: Option<String>,

    /// Bearer token, or path to a file with a `token: <value>` line
    #[arg(long, global = true)]
    token: Option<String>,

    /// Expected SHA-256 of the API descriptor
    #[arg(long, global = true)]
    descriptor_checksum: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List studies")]
    Studies,
    #[command(about = "List molecular profiles of a study")]
    Profiles(ProfilesArgs),
    #[command(about = "Patient and sample clinical data of a study")]
    Clinical(StudyArgs),
    #[command(about = "List sample lists of a study")]
    SampleLists(StudyArgs),
    #[command(about = "Sample IDs in sample lists")]
    SamplesInLists(SampleListArgs),
    #[command(about = "Look up gene records")]
    Genes(GenesArgs),
    #[command(about = "List gene panels, or the genes of one panel")]
    GenePanels(GenePanelArgs),
    #[command(about = "Molecular data for genes across profiles")]
    DataByGenes(DataByGenesArgs),
    #[command(about = "List API operations")]
    Ops(OpsArgs),
    #[command(about = "Manage the local cache")]
    Cache(CacheArgs),
}

#[derive(Args)]
struct StudyArgs {
    study_id: String,
}

#[derive(Args)]
struct ProfilesArgs {
    study_id: String,

    #[arg(long, value_enum, default_value_t = Projection::Summary)]
    projection: Projection,
}

#[derive(Args)]
struct SampleListArgs {
    #[arg(required = true)]
    sample_list_ids: Vec<String>,
}

#[derive(Args)]
struct GenesArgs {
    #[arg(required = true)]
    genes: Vec<String>,

    #[arg(long, value_enum, default_value_t = GeneIdType::HugoGeneSymbol)]
    by: GeneIdType,
}

#[derive(Args)]
struct GenePanelArgs {
    gene_panel_id: Option<String>,
}

#[derive(Args)]
struct DataByGenesArgs {
    #[arg(long)]
    study: String,

    #[arg(long = "profile", required = true)]
    profiles: Vec<String>,

    #[arg(long = "gene", conflicts_with = "panel")]
    genes: Vec<String>,

    #[arg(long, value_enum, default_value_t = GeneIdType::HugoGeneSymbol)]
    by: GeneIdType,

    #[arg(long)]
    panel: Option<String>,

    #[arg(long = "sample", conflicts_with = "sample_list")]
    samples: Vec<String>,

    #[arg(long)]
    sample_list: Option<String>,

    /// Recompute even when a cached result exists
    #[arg(long)]
    refresh: bool,
}

#[derive(Args)]
struct OpsArgs {
    pattern: Option<String>,
}

#[derive(Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    #[command(about = "Remove every cached response and result")]
    Clear,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CbioError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CbioError) -> u8 {
    match error {
        CbioError::Configuration(_)
        | CbioError::ConfigRead(_)
        | CbioError::ConfigParse(_)
        | CbioError::UnknownOperation(_) => 2,
        CbioError::RemoteEmpty(_) => 2,
        CbioError::Transport(_) | CbioError::TransportStatus { .. } => 3,
        CbioError::Integrity { .. } => 4,
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
    let mut resolved = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(hostname) = cli.hostname {
        resolved.client.hostname = hostname;
    }
    if let Some(token) = cli.token {
        resolved.client.token = Some(token);
    }
    if let Some(checksum) = cli.descriptor_checksum {
        resolved.client.descriptor_checksum = Some(checksum);
    }

    let store: Arc<dyn BlobStore> = match &resolved.cache_dir {
        Some(dir) => Arc::new(DiskStore::new_with_root(dir.clone())),
        None => Arc::new(DiskStore::new()?),
    };

    if let Commands::Cache(CacheArgs {
        command: CacheCommand::Clear,
    }) = cli.command
    {
        store.clear()?;
        return Ok(());
    }

    let mut transport = HttpTransport::new(resolved.timeout)?;
    if resolved.transport_cache {
        transport = transport.with_response_cache(store.clone());
    }
    let portal = CbioPortal::connect(transport, &resolved.client, ResultCache::new(store))?;

    match cli.command {
        Commands::Studies => JsonOutput::print_table(&portal.studies()?).into_diagnostic(),
        Commands::Profiles(args) => {
            let result = portal.molecular_profiles(&args.study_id, args.projection)?;
            JsonOutput::print_profiles(&result).into_diagnostic()
        }
        Commands::Clinical(args) => {
            JsonOutput::print_table_outcome(&portal.clinical_data(&args.study_id)?).into_diagnostic()
        }
        Commands::SampleLists(args) => {
            JsonOutput::print_table(&portal.sample_lists(&args.study_id)?).into_diagnostic()
        }
        Commands::SamplesInLists(args) => {
            let outcome = portal.samples_in_sample_lists(&args.sample_list_ids)?;
            JsonOutput::print_sample_lists(&outcome).into_diagnostic()
        }
        Commands::Genes(args) => {
            let table = portal.query_gene_table(args.by, &args.genes)?;
            JsonOutput::print_table(&table).into_diagnostic()
        }
        Commands::GenePanels(args) => {
            let table = match args.gene_panel_id {
                Some(panel) => portal.get_gene_panel(&panel)?,
                None => portal.gene_panels()?,
            };
            JsonOutput::print_table(&table).into_diagnostic()
        }
        Commands::DataByGenes(args) => {
            let genes = match args.panel {
                Some(panel) => GeneSelector::Panel(panel),
                None => GeneSelector::Genes {
                    by: args.by,
                    ids: args.genes,
                },
            };
            let samples = match (args.sample_list, args.samples.is_empty()) {
                (Some(list), _) => SampleSelector::SampleList(list),
                (None, false) => SampleSelector::Ids(args.samples),
                (None, true) => SampleSelector::AllInStudy,
            };
            let query = GeneDataQuery {
                study_id: args.study,
                genes,
                molecular_profile_ids: args.profiles,
                samples,
                use_cache: !args.refresh,
            };
            let outcome = portal.get_data_by_genes(&query)?;
            JsonOutput::print_profile_tables(&outcome).into_diagnostic()
        }
        Commands::Ops(args) => {
            let registry = portal.client().registry();
            let names = match args.pattern.as_deref() {
                Some(pattern) => registry.search(pattern),
                None => registry.names(),
            };
            JsonOutput::print_names(&names).into_diagnostic()
        }
        Commands::Cache(_) => Ok(()),
    }
}

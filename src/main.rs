use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use dalgen::codegen::{write_output, CSharpGenerator, CodeGenerator};
use dalgen::config::DbConfig;
use dalgen::introspect::{CatalogIntrospector, Introspector, MemoryCatalog};
use dalgen::params::GenerationParameters;
use dalgen::schema::Schema;

#[derive(Parser, Debug)]
#[command(name = "dalgen")]
#[command(version, about, long_about = None)]
struct Cli {
    /// YAML file with generation parameters
    settings: PathBuf,

    /// Path to .env file for connection config
    #[arg(long, default_value = "./.env")]
    env_file: PathBuf,

    /// Read the catalog from a YAML snapshot instead of a live database
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Output file path (overrides export_file_name)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    if let Err(e) = run() {
        error!(error = ?e, "Fatal error");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("dalgen v{}", env!("CARGO_PKG_VERSION"));

    let mut params = GenerationParameters::load(&cli.settings).context("Failed to load generation parameters")?;
    if let Some(output) = cli.output {
        params.export_file_name = output;
    }
    info!(
        settings = ?cli.settings,
        output = ?params.export_file_name,
        namespace = ?params.code_namespace,
        use_sps = params.use_sps,
        "Starting code generation"
    );

    let schema = match &cli.snapshot {
        Some(path) => introspect_snapshot(path, &params)?,
        None => {
            let config = DbConfig::load(&cli.env_file).context("Failed to load database configuration")?;
            debug!(connection = ?config.redacted_connection_string(), "Loaded configuration");
            introspect_mssql(&config, &params)?
        }
    };

    if schema.tables.is_empty() && schema.views.is_empty() && schema.procedures.is_empty() {
        warn!("Catalog contains no objects to generate");
    }

    for table in schema.tables.iter().chain(&schema.views) {
        debug!(
            object = ?table.name,
            kind = table.kind.as_str(),
            fields = table.fields.len(),
            keys = table.key_fields().len(),
            "Catalog object"
        );
    }

    let generator = CSharpGenerator::from_params(params).context("Failed to set up code generator")?;
    let code = generator.generate(&schema).context("Code generation failed")?;

    let output = &generator.params().export_file_name;
    write_output(output, &code).with_context(|| format!("Failed to write {}", output.display()))?;
    info!(path = ?output, bytes = code.len(), "Generated C# file");

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn introspect_snapshot(path: &Path, params: &GenerationParameters) -> Result<Schema> {
    info!(path = ?path, "Reading catalog snapshot");
    let mut catalog = MemoryCatalog::load(path).context("Failed to load catalog snapshot")?;
    let mut introspector = CatalogIntrospector::new(&mut catalog, params);
    let schema = introspector.introspect().context("Failed to introspect catalog")?;
    Ok(schema)
}

#[cfg(feature = "mssql")]
fn introspect_mssql(config: &DbConfig, params: &GenerationParameters) -> Result<Schema> {
    use dalgen::MssqlCatalog;

    info!(connection = ?config.redacted_connection_string(), "Connecting to SQL Server");

    let mut catalog = MssqlCatalog::connect(config, &params.catalog_schema).with_context(|| {
        format!(
            "Failed to connect to SQL Server at {}",
            config.redacted_connection_string()
        )
    })?;

    info!("Connected to database");

    let mut introspector = CatalogIntrospector::new(&mut catalog, params);
    let schema = introspector.introspect().context("Failed to introspect catalog")?;

    Ok(schema)
}

#[cfg(not(feature = "mssql"))]
fn introspect_mssql(_config: &DbConfig, _params: &GenerationParameters) -> Result<Schema> {
    bail!("SQL Server support not enabled. Rebuild with --features mssql or pass --snapshot")
}

pub mod cli;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod export;
pub mod import;
pub mod io_utils;
pub mod loader;
pub mod parallel;
pub mod rejects;
pub mod report;
pub mod schema;
pub mod storage;
pub mod validate;
pub mod worker;

use std::{
    env,
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::OnceLock,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands},
    config::EtlConfig,
    context::RunContext,
    storage::SqliteStore,
};

static LOGGER: OnceLock<()> = OnceLock::new();

/// Copies every log line to stderr and to the configured log file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

fn init_logging(log_file: Option<&Path>) {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_etl", LevelFilter::Info);
        }
        let mut file_error = None;
        if let Some(path) = log_file {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => {
                    builder.target(env_logger::Target::Pipe(Box::new(TeeWriter { file })));
                }
                Err(err) => file_error = Some(err),
            }
        }
        let _ = builder.format_timestamp_millis().try_init();
        if let (Some(path), Some(err)) = (log_file, file_error) {
            warn!("Could not open log file {path:?}: {err}; logging to stderr only");
        }
    });
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    if let Commands::Init(args) = &cli.command {
        init_logging(None);
        return handle_init(&cli.config, args.force);
    }

    let created = !cli.config.exists();
    let config = EtlConfig::load_or_init(&cli.config)
        .with_context(|| format!("Loading configuration from {:?}", cli.config))?;
    init_logging(config.logging.file.as_deref());
    if created {
        info!("Created default configuration at {:?}", cli.config);
    }
    debug!("Configuration: {config:?}");

    match cli.command {
        Commands::Init(_) => Ok(()),
        Commands::Import(args) => handle_import(config, &args),
        Commands::Export(args) => handle_export(config, &args),
        Commands::ListTables => handle_list_tables(config),
        Commands::Infer(args) => handle_infer(&config, &args),
    }
}

fn handle_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{path:?} already exists; pass --force to overwrite it");
    }
    let config = EtlConfig::default();
    config
        .write_default(path)
        .with_context(|| format!("Writing default configuration to {path:?}"))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn open_context(config: EtlConfig) -> Result<RunContext> {
    let store = SqliteStore::open(&config.database.path, config.database.busy_timeout())
        .with_context(|| format!("Opening database {:?}", config.database.path))?;
    Ok(RunContext::new(config, Box::new(store))?)
}

fn handle_import(mut config: EtlConfig, args: &cli::ImportArgs) -> Result<()> {
    if let Some(folder) = &args.input_folder {
        config.import.input_folder = folder.clone();
    }
    if let Some(workers) = args.workers {
        config.import.max_workers = Some(workers);
    }
    config
        .create_folders()
        .context("Creating working folders")?;
    info!(
        "Importing from '{}' with delimiter '{}'",
        config.import.input_folder.display(),
        printable_delimiter(config.import.delimiter_byte()?)
    );

    let ctx = open_context(config)?;
    let input_folder = ctx.config().import.input_folder.clone();
    let summary = import::run_import(&ctx, &input_folder)
        .with_context(|| format!("Importing CSV files from {input_folder:?}"))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if summary.outcomes.is_empty() {
        println!("No CSV files found in {}", input_folder.display());
    } else {
        print!("{}", report::render_import_summary(&summary));
    }
    Ok(())
}

fn handle_export(mut config: EtlConfig, args: &cli::ExportArgs) -> Result<()> {
    if let Some(folder) = &args.export_folder {
        config.export.export_folder = folder.clone();
    }
    let ctx = open_context(config)?;
    let dest = ctx.config().export.export_folder.clone();
    let tables = (!args.tables.is_empty()).then_some(args.tables.as_slice());
    let summary = export::run_export(&ctx, &dest, tables)
        .with_context(|| format!("Exporting tables to {dest:?}"))?;
    if summary.exports.is_empty() {
        println!("No export tables found");
    } else {
        print!("{}", report::render_export_summary(&summary));
    }
    Ok(())
}

fn handle_list_tables(config: EtlConfig) -> Result<()> {
    let ctx = open_context(config)?;
    let tables = export::discover_export_tables(ctx.storage(), &ctx.config().import.table_prefix)
        .context("Listing tables")?;
    if tables.is_empty() {
        println!("No export tables found");
    } else {
        println!("Available export tables:");
        for table in tables {
            println!("  - {table}");
        }
    }
    Ok(())
}

fn handle_infer(config: &EtlConfig, args: &cli::InferArgs) -> Result<()> {
    let delimiter = match args.delimiter {
        Some(delimiter) => delimiter,
        None => config.import.delimiter_byte()?,
    };
    let encoding = io_utils::resolve_encoding(config.import.input_encoding.as_deref())?;
    let sample_rows = args.sample_rows.unwrap_or(config.import.sample_rows);
    let max_text_length = args
        .max_text_length
        .unwrap_or(config.import.max_text_length);
    if max_text_length == 0 {
        bail!("--max-text-length must be positive");
    }
    info!(
        "Inferring '{}' with delimiter '{}'",
        args.input.display(),
        printable_delimiter(delimiter)
    );

    let schema = schema::infer_schema(
        &args.input,
        delimiter,
        encoding,
        sample_rows,
        max_text_length,
    )
    .with_context(|| format!("Inferring schema from {:?}", args.input))?;

    match &args.output {
        Some(path) => {
            schema
                .save(path)
                .with_context(|| format!("Writing schema to {path:?}"))?;
            info!(
                "Inferred schema for {} column(s) written to {:?}",
                schema.len(),
                path
            );
        }
        None => print!("{}", report::render_schema(&schema)),
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}

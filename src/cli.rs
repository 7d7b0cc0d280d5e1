use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Debug, Parser)]
#[command(author, version, about = "Load folders of CSV files into typed tables and export them back", long_about = None)]
pub struct Cli {
    /// YAML configuration file (created with defaults when missing)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a default configuration file and create the working folders
    Init(InitArgs),
    /// Import every CSV file in the input folder into its own table
    Import(ImportArgs),
    /// Export tables to timestamped CSV files
    Export(ExportArgs),
    /// List the tables produced by previous imports
    ListTables,
    /// Infer column types for a single CSV file
    Infer(InferArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Folder to scan for CSV files (overrides import.input_folder)
    #[arg(long = "input-folder")]
    pub input_folder: Option<PathBuf>,
    /// Maximum number of files imported concurrently
    #[arg(long = "workers")]
    pub workers: Option<usize>,
    /// Print the run summary as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Tables to export (defaults to every table carrying the import prefix)
    pub tables: Vec<String>,
    /// Destination folder (overrides export.export_folder)
    #[arg(long = "export-folder")]
    pub export_folder: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct InferArgs {
    /// Input CSV file to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Number of rows to sample when inferring types (0 means full scan)
    #[arg(long)]
    pub sample_rows: Option<usize>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Upper bound for text column widths
    #[arg(long)]
    pub max_text_length: Option<usize>,
    /// Write the inferred schema as YAML to this path
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err(format!("Delimiter must be a single character, got '{other}'"));
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

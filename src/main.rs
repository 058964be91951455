//! atomtrace: import statsd atoms from a Perfetto trace and print them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fmt;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use atomtrace::storage::StatEntry;
use atomtrace::{ImportConfig, SliceRecord, TraceProcessor};

#[derive(Parser)]
#[command(name = "atomtrace")]
#[command(about = "Import statsd atoms from Perfetto traces")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins if set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a trace and print every atom slice
    Import {
        /// Path to the trace (.pb, or .pb.gz)
        trace: PathBuf,

        /// JSON import config
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Binary FileDescriptorSet with the atom schema, overrides the config
        #[arg(short, long)]
        descriptor: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// List the atoms the schema knows
    Atoms {
        /// Binary FileDescriptorSet with the atom schema
        #[arg(short, long)]
        descriptor: Option<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(config: Option<PathBuf>, descriptor: Option<PathBuf>) -> Result<ImportConfig> {
    let mut import_config = match config {
        Some(path) => ImportConfig::load(&path)?,
        None => ImportConfig::default(),
    };
    if descriptor.is_some() {
        import_config.descriptor_path = descriptor;
    }
    debug!("Using config {:?}", import_config);
    Ok(import_config)
}

fn run_import(
    trace: PathBuf,
    config: Option<PathBuf>,
    descriptor: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let config = load_config(config, descriptor)?;
    let mut tp = TraceProcessor::from_config(&config).context("Failed to set up import")?;
    tp.parse_trace_file(&trace)?;

    let slices = tp.storage().export_slices();
    let stats: Vec<StatEntry> = tp
        .storage()
        .stats()
        .into_iter()
        .filter(|s| s.value != 0)
        .collect();

    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "slices": slices,
                "stats": stats,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            print!("{}", slice_table(&slices));
            if !stats.is_empty() {
                println!();
                print!("{}", stats_table(&stats));
            }
        }
    }

    eprintln!("\n{} atoms imported", slices.len());
    Ok(())
}

fn slice_table(slices: &[SliceRecord]) -> Table {
    let mut table = Table::new(&["ts", "name", "args"]);
    for slice in slices {
        let args: Vec<String> = slice
            .args
            .iter()
            .map(|arg| format!("{}={}", arg.key, arg.value))
            .collect();
        table.push(vec![slice.ts.to_string(), slice.name.clone(), args.join(" ")]);
    }
    table
}

fn stats_table(stats: &[StatEntry]) -> Table {
    let mut table = Table::new(&["stat", "severity", "value", "description"]);
    for s in stats {
        table.push(vec![
            s.name.to_string(),
            s.severity.name().to_string(),
            s.value.to_string(),
            s.description.to_string(),
        ]);
    }
    table
}

fn run_atoms(descriptor: Option<PathBuf>) -> Result<()> {
    let config = load_config(None, descriptor)?;
    let schema = config.load_schema()?;
    let Some(atom) = schema.atom_descriptor() else {
        anyhow::bail!("Atom message {} not found in schema", schema.atom_message_name());
    };

    let mut table = Table::new(&["id", "name", "type"]);
    for field in atom.fields().values() {
        table.push(vec![
            field.number.to_string(),
            field.name.clone(),
            field.type_name.trim_start_matches('.').to_string(),
        ]);
    }
    print!("{table}");
    eprintln!(
        "\n{} atoms in {}",
        table.rows.len(),
        atom.full_name().trim_start_matches('.')
    );
    Ok(())
}

/// Cells wider than this are cut and end in "...".
const MAX_COLUMN_WIDTH: usize = 80;

/// Plain text table shared by every listing the CLI prints.
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }
        widths.into_iter().map(|w| w.min(MAX_COLUMN_WIDTH)).collect()
    }
}

fn fit(cell: &str, width: usize) -> String {
    if cell.chars().count() <= width || width <= 3 {
        return format!("{cell:width$}");
    }
    let head: String = cell.chars().take(width - 3).collect();
    format!("{head}...")
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return writeln!(f, "(no results)");
        }

        let widths = self.widths();
        let line = |cells: &[String]| -> String {
            let cells: Vec<String> = widths
                .iter()
                .zip(cells)
                .map(|(width, cell)| fit(cell, *width))
                .collect();
            cells.join(" | ").trim_end().to_string()
        };

        writeln!(f, "{}", line(&self.headers))?;
        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", sep.join("-+-"))?;
        for row in &self.rows {
            writeln!(f, "{}", line(row))?;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Import {
            trace,
            config,
            descriptor,
            format,
        } => run_import(trace, config, descriptor, format),
        Commands::Atoms { descriptor } => run_atoms(descriptor),
    }
}

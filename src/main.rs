use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod io;
mod runtime;

use item_writer::config::RunConfig;
use item_writer::{Naming, NamingConvention};

#[derive(Parser)]
#[command(name = "itemw")]
#[command(about = "Buffered item writer - convert JSONL and Parquet inputs into JSONL, CSV, Parquet or SQL INSERT files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a conversion from YAML configuration
    Run {
        /// Path to run YAML file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a run configuration
    Validate {
        /// Path to run YAML file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print identifiers as normalized by the naming convention
    Normalize {
        identifiers: Vec<String>,
        /// Keep identifiers as given, only trimmed
        #[arg(long)]
        direct: bool,
        /// Shorten identifiers longer than this many bytes
        #[arg(long)]
        max_length: Option<usize>,
    },
    /// Show version information
    Version,
}

fn main() -> anyhow::Result<()> {
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("Failed to set logger: {e:?}");
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let run = RunConfig::from_yaml_file(&config)?;
            runtime::run(&run)?;
        }
        Commands::Validate { config } => {
            let run = RunConfig::from_yaml_file(&config)?;
            println!("✓ Run configuration is valid");
            println!("  output format: {}", run.output.resolved_format()?);
            for column in &run.table_schema() {
                println!("  {}: {}", column.name, column.data_type);
            }
        }
        Commands::Normalize {
            identifiers,
            direct,
            max_length,
        } => {
            let convention = if direct {
                NamingConvention::Direct
            } else {
                NamingConvention::SnakeCase
            };
            let naming = Naming {
                convention,
                max_length,
            };
            naming.validate()?;
            for identifier in &identifiers {
                println!("{}", naming.normalize_identifier(identifier));
            }
        }
        Commands::Version => {
            println!("itemw version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

//! pir_encode: Runs the responder's encoding jobs over local artifacts.
//!
//! `exp-table` precomputes modular powers of the encrypted query elements, `hash-partition` turns JSON-lines records into
//! hash indices and fixed-width partitions. Both write one line per output record.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use pir_encode::{Responder, ResponderConfig};

#[derive(Parser)]
#[command(name = "pir_encode")]
#[command(about = "Responder-side encoding jobs of a PIR scheme")]
#[command(version)]
struct Args {
    /// Responder configuration file (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Maximum level of emitted log events
    #[arg(long, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    job: Job,
}

#[derive(Subcommand)]
enum Job {
    /// Precompute `element^power mod N^2` for every power a data partition can take
    ExpTable {
        /// Comma-separated query vector indices; every index if omitted
        #[arg(long, value_delimiter = ',')]
        indices: Vec<usize>,

        /// Output file, one `index<TAB>power-value` line per entry; stdout if omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Hash and partition records, one JSON object per input line
    HashPartition {
        /// JSON-lines input file
        #[arg(long)]
        input: PathBuf,

        /// Output file, one JSON object per emitted record; stdout if omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn open_output(output: Option<&PathBuf>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create output file {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder().with_max_level(args.log_level).with_target(false).with_writer(io::stderr).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ResponderConfig::from_file(&args.config).with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    let responder = Responder::setup(&config).context("Failed to set up responder")?;

    let start = Instant::now();

    match args.job {
        Job::ExpTable { indices, output } => {
            let table = if indices.is_empty() {
                responder.build_full_exp_table()
            } else {
                responder.build_exp_table(&indices)
            }
            .context("Failed to build exponentiation table")?;

            let mut writer = open_output(output.as_ref())?;
            for (index, power_value) in table.records() {
                writeln!(writer, "{}\t{}", index, power_value)?;
            }
            writer.flush()?;

            info!("Wrote {} table entries in {:.2?}", table.len(), start.elapsed());
        }
        Job::HashPartition { input, output } => {
            let file = File::open(&input).with_context(|| format!("Failed to open input {}", input.display()))?;
            let mut reader = BufReader::new(file);

            let (encoded, report) = responder
                .hash_and_partition_json_lines(&mut reader, &input.display().to_string())
                .context("Failed to read input records")?;

            let mut writer = open_output(output.as_ref())?;
            for record in &encoded {
                let line = serde_json::json!({ "hash_index": record.hash_index, "partitions": record.chunk_bytes() });
                writeln!(writer, "{}", line)?;
            }
            writer.flush()?;

            info!("{} in {:.2?}", report, start.elapsed());
        }
    }

    Ok(())
}

//! `minhash` — streams a JSONL corpus on stdin through n-gram shingling and
//! MinHash computation, writing one bucket-major MinHash file (component A).

use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use banddedupe::{init_tracing_once, run_producer, ProducerConfig};

/// Compute a MinHash bucket file from a JSON-Lines corpus on stdin.
#[derive(Parser, Debug)]
#[command(name = "minhash", about = "Compute a MinHash bucket file from a JSONL corpus on stdin")]
struct Args {
    /// Output basename; the MinHash file is written here verbatim.
    basename: PathBuf,

    /// N-gram width, in Unicode code points.
    #[arg(short = 'n', long = "ngram", default_value_t = 5)]
    ngram: usize,

    /// Rows per band (num_hash_values).
    #[arg(short = 'b', long = "rows", default_value_t = 20)]
    rows: u16,

    /// First band index (inclusive).
    #[arg(short = 'e', long = "begin", default_value_t = 0)]
    begin: u32,

    /// Last band index (exclusive).
    #[arg(short = 'r', long = "end", default_value_t = 40)]
    end: u32,

    /// Name of the JSON field holding document text.
    #[arg(short = 't', long = "text-field", default_value = "text")]
    text_field: String,

    /// Suppress the progress bar.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn main() {
    init_tracing_once();
    if let Err(err) = run() {
        tracing::error!("{err:#}");
        eprintln!("minhash: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let cfg = ProducerConfig::default()
        .with_ngram_size(args.ngram)
        .with_bands(args.begin, args.end)
        .with_num_hash_values(args.rows)
        .with_text_field(args.text_field)
        .with_quiet(args.quiet);

    let stdin = io::stdin();
    let report = run_producer(&cfg, BufReader::new(stdin.lock()), &args.basename)?;

    tracing::info!(
        num_items = report.num_items,
        num_parse_errors = report.num_parse_errors,
        basename = %args.basename.display(),
        "Result"
    );

    #[derive(serde::Serialize)]
    struct Summary<'a> {
        basename: &'a str,
        #[serde(flatten)]
        report: banddedupe::ProducerReport,
    }
    let basename = args.basename.display().to_string();
    println!("{}", serde_json::to_string(&Summary { basename: &basename, report })?);
    Ok(())
}

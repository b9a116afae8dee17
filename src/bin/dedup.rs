//! `dedup` — single-group deduplication (component E). Reads a list of
//! MinHash file paths from stdin, processes every LSH band in order, and
//! writes `<basename>.dup`, `<basename>.src`, `<basename>.log`, and the
//! per-band split index files.

use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use banddedupe::{DedupeConfig, GroupDeduplicator};

/// Deduplicate one group of MinHash files against each other.
#[derive(Parser, Debug)]
#[command(name = "dedup", about = "Deduplicate a group of MinHash files")]
struct Args {
    /// Output basename; `<basename>.dup`, `.src`, `.log`, and the per-band
    /// index files are all written alongside it.
    basename: PathBuf,

    /// Reverse mode: within a duplicate run, the highest ordinal survives.
    #[arg(short = 'r', long = "reverse")]
    reverse: bool,

    /// Console log level.
    #[arg(short = 'l', long = "console-level", default_value = "info")]
    console_level: String,

    /// File log level (written to `<basename>.log`).
    #[arg(short = 'L', long = "file-level", default_value = "info")]
    file_level: String,
}

fn main() {
    let args = Args::parse();
    // The CLI always needs the trimmed `.idx` layout, since `merge` consumes
    // it; library callers that never run `merge` can build a `DedupeConfig`
    // with `trim = false` instead.
    let cfg = DedupeConfig::default()
        .with_reverse(args.reverse)
        .with_trim(true)
        .with_console_level(args.console_level.clone())
        .with_file_level(args.file_level.clone());

    let log_path = with_suffix(&args.basename, ".log");
    // Keep the tracing guard alive for the whole of `main`, not just `run()`,
    // so a fatal error logged after `run()` returns still reaches the file
    // appender before it flushes on drop.
    let _guard = match banddedupe::init_tracing_with_file(&cfg.console_level, &cfg.file_level, &log_path) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("dedup: {err:#}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(args, cfg) {
        tracing::error!("{err:#}");
        eprintln!("dedup: {err:#}");
        std::process::exit(1);
    }
}

fn run(args: Args, cfg: DedupeConfig) -> Result<()> {
    let stdin = io::stdin();
    // `dedup` runs a single group; the group number is assigned later by the
    // merge driver's source order, so group 0 is the only sensible default here.
    let mut dedup = GroupDeduplicator::new(0).with_trim(cfg.trim);
    let mut num_files = 0usize;
    for line in stdin.lock().lines() {
        let line = line?;
        let path = line.trim();
        if path.is_empty() {
            continue;
        }
        dedup.append_file(PathBuf::from(path));
        num_files += 1;
    }
    if num_files == 0 {
        anyhow::bail!("no MinHash file paths were read from stdin");
    }

    dedup.initialize()?;
    let num_items = dedup.num_items();
    let reports = dedup.run(&args.basename, cfg.reverse)?;
    dedup.save_flag(&args.basename)?;
    dedup.save_source_list(&args.basename)?;

    let active_after = reports.last().map(|r| r.active_after).unwrap_or(num_items);
    tracing::info!(num_items, num_files, bands = reports.len(), active_after, "Result");

    #[derive(serde::Serialize)]
    struct Summary {
        num_items: u64,
        num_files: usize,
        active_after: u64,
        bands: Vec<banddedupe::BandReport>,
    }
    println!(
        "{}",
        serde_json::to_string(&Summary { num_items, num_files, active_after, bands: reports })?
    );
    Ok(())
}

fn with_suffix(basename: &std::path::Path, suffix: &str) -> PathBuf {
    let mut s = basename.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

//! `merge` — cross-group merge (component F). Reconciles duplicates across
//! several already-deduplicated groups' `.dup` flag files and `.idx` split
//! index files, writing `<src>.dup.merge` per source and `<out>.log`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use banddedupe::{CrossGroupMerger, MergeConfig};

/// Merge duplicate flags across several already-deduplicated groups.
#[derive(Parser, Debug)]
#[command(name = "merge", about = "Merge duplicate flags across deduplicated groups")]
struct Args {
    /// Log basename; only `<output>.log` is written under this name.
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Group basenames, in the order that decides tie-breaks.
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Reverse mode: among groups tied on a bucket, the highest-index group survives.
    #[arg(short = 'r', long = "reverse")]
    reverse: bool,

    /// First band index (inclusive).
    #[arg(short = 's', long = "start", default_value_t = 0)]
    begin: u32,

    /// Last band index (exclusive).
    #[arg(short = 'e', long = "end", default_value_t = 40)]
    end: u32,

    /// Console log level.
    #[arg(short = 'l', long = "console-level", default_value = "info")]
    console_level: String,

    /// File log level (written to `<output>.log`).
    #[arg(short = 'L', long = "file-level", default_value = "info")]
    file_level: String,
}

fn main() {
    let args = Args::parse();
    let cfg = MergeConfig::default()
        .with_reverse(args.reverse)
        .with_range(args.begin, args.end)
        .with_console_level(args.console_level.clone())
        .with_file_level(args.file_level.clone());

    let log_path = with_suffix(&args.output, ".log");
    // Keep the tracing guard alive for the whole of `main`, not just `run()`,
    // so a fatal error logged after `run()` returns still reaches the file
    // appender before it flushes on drop.
    let _guard = match banddedupe::init_tracing_with_file(&cfg.console_level, &cfg.file_level, &log_path) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("merge: {err:#}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(args, cfg) {
        tracing::error!("{err:#}");
        eprintln!("merge: {err:#}");
        std::process::exit(1);
    }
}

fn run(args: Args, cfg: MergeConfig) -> Result<()> {
    // Merge reads each source's trimmed `.idx` split files, matching the
    // external interface's documented input set; see DESIGN.md.
    let mut merger = CrossGroupMerger::new(true);
    for src in &args.sources {
        merger.append_source(src)?;
    }

    let reports = merger.run(cfg.begin, cfg.end, cfg.reverse)?;
    merger.save_flags()?;

    let marked: u64 = reports.iter().map(|r| r.marked_duplicate).sum();
    tracing::info!(num_groups = merger.num_groups(), bands = reports.len(), marked_duplicate = marked, "Result");

    #[derive(serde::Serialize)]
    struct Summary {
        num_groups: usize,
        marked_duplicate: u64,
        bands: Vec<banddedupe::MergeBandReport>,
    }
    println!(
        "{}",
        serde_json::to_string(&Summary { num_groups: merger.num_groups(), marked_duplicate: marked, bands: reports })?
    );
    Ok(())
}

fn with_suffix(basename: &std::path::Path, suffix: &str) -> PathBuf {
    let mut s = basename.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

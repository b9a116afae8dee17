//! `flagfilter` — legacy flag-apply filter. Reads a flag file path as its
//! first argument, then streams stdin lines to stdout, keeping a line iff
//! its corresponding flag byte is `'1'`. Both streams must reach EOF
//! together, or the process exits non-zero.
//!
//! This deliberately keeps the original `'0'`/`'1'` encoding rather than the
//! modern flag vector's `' '`/`'D'` — see DESIGN.md. A caller piping a
//! `.dup`/`.dup.merge` file into this tool must translate each byte first
//! (`' '` -> `'1'`, `'D'` -> `'0'`).

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};

use banddedupe::init_tracing_once;

fn main() -> ExitCode {
    init_tracing_once();
    let mut args = env::args_os();
    let _argv0 = args.next();
    let flag_path = match args.next() {
        Some(p) => PathBuf::from(p),
        None => {
            eprintln!("flagfilter: usage: flagfilter <flag-file>");
            return ExitCode::FAILURE;
        }
    };
    match run(&flag_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("flagfilter: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// `Some(true)` to keep the line, `Some(false)` to drop it, `None` if the
/// byte is not a legal legacy flag byte.
fn keep_byte(b: u8) -> Option<bool> {
    match b {
        b'1' => Some(true),
        b'0' => Some(false),
        _ => None,
    }
}

fn run(flag_path: &std::path::Path) -> Result<()> {
    let flags = fs::read(flag_path).with_context(|| format!("read {}", flag_path.display()))?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut idx = 0usize;
    for line in stdin.lock().lines() {
        let line = line.context("read stdin line")?;
        let byte = *flags
            .get(idx)
            .ok_or_else(|| anyhow::anyhow!("stdin has more lines than the {}-byte flag file", flags.len()))?;
        let keep = keep_byte(byte)
            .ok_or_else(|| anyhow::anyhow!("flag file byte {idx} has unrecognized value {byte:#04x}"))?;
        if keep {
            writeln!(out, "{line}").context("write stdout line")?;
        }
        idx += 1;
    }

    if idx != flags.len() {
        anyhow::bail!("flag file has {} bytes but stdin had only {idx} lines", flags.len());
    }
    Ok(())
}

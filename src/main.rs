//! Diskscope — disk space analyzer.
//!
//! Thin console entry point. All logic lives in the `diskscope-core`
//! crate; this binary wires the coordinator to a terminal: progress on
//! stderr, summary on stdout.

use anyhow::Context;
use diskscope_core::model::size::{format_count, format_size};
use diskscope_core::source::SCANNER_DEBUG_ENV;
use diskscope_core::{scan, ScanProgress};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let debug = std::env::var(SCANNER_DEBUG_ENV).as_deref() == Ok("1");
    tracing_subscriber::fmt()
        .with_max_level(if debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let root: PathBuf = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: diskscope <volume-or-directory>")?;

    let cancel = Arc::new(AtomicBool::new(false));
    let mut report = |p: ScanProgress| {
        eprint!(
            "\r[{:>5.1}%] {} entries, {:.1?}   ",
            p.percent,
            format_count(p.files_processed),
            p.elapsed
        );
        let _ = std::io::stderr().flush();
    };

    let result = scan(&root, &mut report, &cancel)?;
    eprintln!();

    let drive = &result.drive;
    println!("Volume {}", drive.letter_or_label);
    println!(
        "  capacity {}  used {}  free {}",
        format_size(drive.total_bytes),
        format_size(drive.used_bytes),
        format_size(drive.free_bytes)
    );
    println!(
        "Scanned {} files, {} directories in {:.1?} via {}{}",
        format_count(result.stats.files),
        format_count(result.stats.directories),
        result.stats.elapsed,
        result.stats.strategy,
        if result.stats.incomplete {
            " (tree incomplete)"
        } else {
            ""
        }
    );
    println!("Tree total: {}", format_size(result.root.size_bytes));

    if !result.top_files.is_empty() {
        println!("\nLargest files:");
        for item in &result.top_files {
            println!("  {:>10}  {}", format_size(item.size_bytes), item.full_path);
        }
    }

    if !result.by_extension.is_empty() {
        println!("\nBy extension:");
        for group in &result.by_extension {
            println!(
                "  {:>10}  .{} ({} files)",
                format_size(group.total_size),
                group.extension,
                format_count(group.file_count)
            );
        }
    }

    Ok(())
}

//! `retained-heap` — prints the top objects and threads by retained heap
//! size for a snapshot file.

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use memmap2::Mmap;
use tracing::error;

use pyheap::aggregations::{objects_by_retained_heap, threads_by_retained_heap};
use pyheap::cache::{provide_with_caching, RetainedHeapCache};
use pyheap::config::Config;
use pyheap::inbound_index::InboundIndex;
use pyheap::retained_heap::RetainedHeapEngine;
use pyheap::str_repr;
use pyheap::SnapshotReader;

const STR_REPR_MAX_WIDTH: usize = 80;

#[derive(Parser)]
#[command(name = "retained-heap", about = "Analyze retained heap size from a PyHeap snapshot")]
struct Cli {
    /// Path to the snapshot file.
    #[arg(short, long)]
    file: PathBuf,

    /// How many objects to print, ranked by retained size.
    #[arg(short = 'n', long, default_value_t = 100)]
    top_n: usize,

    /// Override the cache directory (defaults to PYHEAP_CACHE_DIR or the
    /// snapshot's own directory).
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Force the sequential calculator instead of the parallel one.
    #[arg(long)]
    sequential: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "retained-heap failed");
            eprintln!("error: {:?}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config {
        top_n: cli.top_n,
        parallel: !cli.sequential,
        ..Config::default()
    }
    .with_cache_dir(cli.cache_dir.clone());

    let file = File::open(&cli.file)
        .with_context(|| format!("opening {}", cli.file.display()))?;
    // SAFETY: the snapshot file is not expected to be mutated concurrently
    // with this process reading it.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("mapping {}", cli.file.display()))?;

    let reader = SnapshotReader::open(&mmap)?;
    let heap = reader.heap();

    let inbound = InboundIndex::build(heap);
    let engine = RetainedHeapEngine::new(heap, &inbound);
    let cache = RetainedHeapCache::new(config.cache_dir.clone());

    let retained = provide_with_caching(&cache, &cli.file, &mmap, || {
        engine.calculate(config.parallel, config.chunk_size)
    })?;

    println!("Top {} objects by retained heap:", config.top_n);
    println!("{:<20} {:<24} {:>14}  repr", "address", "type", "retained");
    for (address, size) in objects_by_retained_heap(&retained).into_iter().take(config.top_n) {
        let type_name = heap
            .objects()
            .get(&address)
            .and_then(|o| heap.types().get(&o.type_id()))
            .map(|s| s.as_str())
            .unwrap_or("?");
        let repr = str_repr::resolve(&reader, address).unwrap_or_default();
        let repr = truncate(&repr, STR_REPR_MAX_WIDTH);
        println!("{:<20} {:<24} {:>14}  {}", address, type_name, size, repr);
    }

    println!();
    println!("Threads by retained heap:");
    for (name, size) in threads_by_retained_heap(&retained) {
        println!("{:<40} {:>14}", name, size);
    }

    println!();
    println!("Total heap size: {}", heap.total_heap_size());

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", truncated)
    }
}

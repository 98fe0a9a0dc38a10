pub mod error;
pub mod params;

pub mod align;
pub mod chimeric;
pub mod classify;
pub mod genome;
pub mod index;
pub mod io;
pub mod stats;

#[cfg(test)]
mod testutil;

use std::path::Path;

use anyhow::Context;
use log::info;
use rayon::prelude::*;

use crate::align::{AlignOptions, AlignmentRecord, TiledAligner};
use crate::genome::ReferenceGenome;
use crate::index::generate::generate_tile_table_file;
use crate::index::{TileIndex, TileIndexBuilder};
use crate::io::{PslWriter, QueryReader};
use crate::params::{Parameters, RunMode};
use crate::stats::MatchMetrics;

/// Queries read and aligned per parallel batch.
const QUERY_BATCH_SIZE: usize = 10_000;

/// Top-level dispatcher. Called from `main()` after CLI parsing.
pub fn run(params: &Parameters) -> anyhow::Result<()> {
    params.validate()?;

    info!("tiledAligner v{}", env!("CARGO_PKG_VERSION"));
    info!("runMode: {}", params.run_mode);
    info!("runThreadN: {}", params.run_thread_n);

    match params.run_mode {
        RunMode::TileGenerate => tile_generate(params),
        RunMode::IndexGenerate => index_generate(params),
        RunMode::AlignReads => align_reads(params),
    }
}

fn tile_generate(params: &Parameters) -> anyhow::Result<()> {
    let tile_table = params
        .tile_table
        .as_deref()
        .context("--tileTable is required for tileGenerate")?;
    log_fasta_files(params);

    let genome = ReferenceGenome::from_fasta_files(&params.genome_fasta_files)?;
    generate_tile_table_file(&genome, params.tile_common_cutoff, tile_table)?;

    info!("Tile generation complete!");
    Ok(())
}

fn index_generate(params: &Parameters) -> anyhow::Result<()> {
    let tile_table = params
        .tile_table
        .as_deref()
        .context("--tileTable is required for indexGenerate")?;
    let tile_index = params
        .tile_index
        .as_deref()
        .context("--tileIndex is required for indexGenerate")?;

    let index = build_index(params, tile_table)?;
    index.write_binary(tile_index)?;

    info!("Index generation complete!");
    Ok(())
}

fn build_index(params: &Parameters, tile_table: &Path) -> anyhow::Result<TileIndex> {
    let index = TileIndexBuilder::new()
        .workers(params.run_thread_n)
        .queue_capacity(params.build_queue_capacity)
        .build_from_path(tile_table)?;
    info!(
        "Tile index: {} tiles, {} positions, {} too common",
        index.len(),
        index.n_positions(),
        index.n_common()
    );
    Ok(index)
}

/// Binary index when one was given, otherwise build from the tile table.
fn load_index(params: &Parameters) -> anyhow::Result<TileIndex> {
    match (&params.tile_index, &params.tile_table) {
        (Some(path), _) => Ok(TileIndex::load_binary(path)?),
        (None, Some(table)) => build_index(params, table),
        (None, None) => anyhow::bail!("alignReads needs --tileIndex or --tileTable"),
    }
}

fn align_reads(params: &Parameters) -> anyhow::Result<()> {
    log_fasta_files(params);
    info!(
        "readFilesIn: {:?}",
        params
            .read_files_in
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
    );

    let genome = ReferenceGenome::from_fasta_files(&params.genome_fasta_files)?;
    let index = load_index(params)?;

    let metrics = MatchMetrics::new();
    let aligner = TiledAligner::new(&index, &genome, &genome)
        .with_options(AlignOptions::from_params(params))
        .with_metrics(&metrics);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.run_thread_n)
        .build()
        .context("Failed to build thread pool")?;

    let output_path = params.output_path("Aligned.out.psl");
    let mut writer = PslWriter::create(&output_path)?;
    let mut remaining = params.query_limit().unwrap_or(usize::MAX);

    'files: for path in &params.read_files_in {
        let mut reader = QueryReader::open(path)?;
        while remaining > 0 {
            let batch = reader.read_batch(QUERY_BATCH_SIZE.min(remaining))?;
            if batch.is_empty() {
                continue 'files;
            }
            remaining -= batch.len();

            // Collecting keeps input order in the output.
            let results: Vec<Vec<AlignmentRecord>> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|query| aligner.align(&query.name, &query.sequence))
                    .collect::<Result<_, _>>()
            })?;
            for records in &results {
                writer.write_records(records)?;
            }
            info!(
                "Aligned {} queries",
                metrics.queries.load(std::sync::atomic::Ordering::Relaxed)
            );
        }
        break;
    }

    let written = writer.records_written();
    writer.finish()?;

    metrics.print_summary();
    info!("Wrote {} records to {}", written, output_path.display());
    Ok(())
}

fn log_fasta_files(params: &Parameters) {
    info!(
        "genomeFastaFiles: {:?}",
        params
            .genome_fasta_files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
    );
}

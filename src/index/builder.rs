/// Concurrent tile-index builder.
///
/// One reader streams the tile table and routes each line to the worker that
/// owns the line's tile key (`key % workers`). Every worker fills a private
/// shard, and the shards are merged once all workers have drained their
/// queues, so the hot insertion path takes no locks and the result does not
/// depend on the number of workers.
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use flate2::read::GzDecoder;
use log::{debug, info};

use crate::error::Error;
use crate::index::position::PackedPosition;
use crate::index::tile;
use crate::index::TileIndex;

/// Lines handed to a worker in one message.
const BATCH_SIZE: usize = 512;
const PROGRESS_INTERVAL: usize = 10_000_000;

type LineBatch = Vec<(usize, u32, String)>;
type Shard = HashMap<u32, Vec<PackedPosition>>;

/// Build-time configuration.
#[derive(Debug, Clone)]
pub struct TileIndexBuilder {
    workers: usize,
    queue_capacity: usize,
}

impl Default for TileIndexBuilder {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 64,
        }
    }
}

impl TileIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of parsing workers (and shards). At least 1.
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n.max(1);
        self
    }

    /// Capacity of each worker queue, in batches. At least 1.
    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n.max(1);
        self
    }

    /// Build from a tile-table file, gunzipping when the name ends in `.gz`.
    pub fn build_from_path(&self, path: &Path) -> Result<TileIndex, Error> {
        info!("Loading tile table from {}...", path.display());

        let file = File::open(path).map_err(|e| Error::io(e, path))?;
        let path_str = path.to_string_lossy();
        let reader: Box<dyn BufRead> = if path_str.ends_with(".gz") || path_str.ends_with(".gzip")
        {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        self.build(reader)
    }

    /// Build from any line-oriented tile-table stream.
    ///
    /// Each line is `<tile>\t<p1,p2,...>` or `<tile>\tC<count>`. Blank lines are
    /// skipped; any other malformed line aborts the build.
    pub fn build<R: BufRead>(&self, reader: R) -> Result<TileIndex, Error> {
        let n_workers = self.workers;
        let (senders, receivers): (Vec<Sender<LineBatch>>, Vec<Receiver<LineBatch>>) =
            (0..n_workers).map(|_| bounded(self.queue_capacity)).unzip();

        let (produced, shard_results) = thread::scope(|scope| {
            let handles: Vec<_> = receivers
                .into_iter()
                .map(|rx| scope.spawn(move || fill_shard(rx)))
                .collect();

            // Senders are moved in and dropped when the reader finishes, which is
            // what lets each worker's recv loop end.
            let produced = route_lines(reader, senders);

            let shard_results: Vec<Result<Shard, Error>> = handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(Error::Index("tile index worker panicked".to_string()))
                    })
                })
                .collect();
            (produced, shard_results)
        });

        let mut errors = Vec::new();
        let n_lines = match produced {
            Ok(n) => n,
            Err(e) => {
                errors.push(e);
                0
            }
        };
        let mut shards = Vec::with_capacity(n_workers);
        for result in shard_results {
            match result {
                Ok(shard) => shards.push(shard),
                Err(e) => errors.push(e),
            }
        }
        // Report the earliest malformed line regardless of which worker saw it.
        if let Some(err) = errors.into_iter().min_by_key(error_line) {
            return Err(err);
        }

        let index = merge_shards(shards);
        info!(
            "Tile index built from {} lines: {} tiles ({} too common), {} positions, {} workers",
            n_lines,
            index.len(),
            index.n_common(),
            index.n_positions(),
            n_workers
        );
        Ok(index)
    }
}

/// Reader side: read lines, key them and hand them to the owning worker.
fn route_lines<R: BufRead>(reader: R, senders: Vec<Sender<LineBatch>>) -> Result<usize, Error> {
    let n_workers = senders.len();
    let mut batches: Vec<LineBatch> = (0..n_workers)
        .map(|_| Vec::with_capacity(BATCH_SIZE))
        .collect();
    let mut n_lines = 0;

    for (idx, line_result) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line_result?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }

        let (tile_str, _) = trimmed
            .split_once('\t')
            .ok_or_else(|| Error::tile_table(line_no, "expected <tile>\\t<positions>"))?;
        let key = tile::encode(tile_str.as_bytes())
            .ok_or_else(|| Error::tile_table(line_no, format!("invalid tile '{tile_str}'")))?;

        let owner = key as usize % n_workers;
        batches[owner].push((line_no, key, line));
        if batches[owner].len() >= BATCH_SIZE {
            let batch = std::mem::replace(&mut batches[owner], Vec::with_capacity(BATCH_SIZE));
            if senders[owner].send(batch).is_err() {
                // The worker bailed out on a bad line; its error is reported instead.
                return Ok(n_lines);
            }
        }

        n_lines += 1;
        if n_lines % PROGRESS_INTERVAL == 0 {
            info!("  ... {} tile-table lines read", n_lines);
        }
    }

    for (owner, batch) in batches.into_iter().enumerate() {
        if !batch.is_empty() {
            senders[owner].send(batch).ok();
        }
    }
    debug!("Tile-table reader finished after {} lines", n_lines);
    Ok(n_lines)
}

/// Worker side: drain the queue into a private shard.
fn fill_shard(rx: Receiver<LineBatch>) -> Result<Shard, Error> {
    let mut shard = Shard::new();
    // recv() fails only once the queue is empty and the reader has hung up.
    while let Ok(batch) = rx.recv() {
        for (line_no, key, line) in batch {
            let positions = parse_positions(&line, line_no)?;
            shard.entry(key).or_default().extend(positions);
        }
    }
    Ok(shard)
}

/// Parse the field after the tab: a position list or a `C<count>` marker.
fn parse_positions(line: &str, line_no: usize) -> Result<Vec<PackedPosition>, Error> {
    let (_, field) = line
        .trim_end()
        .split_once('\t')
        .ok_or_else(|| Error::tile_table(line_no, "expected <tile>\\t<positions>"))?;

    if let Some(count) = field.strip_prefix('C') {
        let count: u64 = count.parse().map_err(|_| {
            Error::tile_table(line_no, format!("invalid common-tile count '{count}'"))
        })?;
        return Ok(vec![PackedPosition::common(count)]);
    }

    let positions = field
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            let value: u64 = s
                .parse()
                .map_err(|_| Error::tile_table(line_no, format!("invalid position '{s}'")))?;
            if value > PackedPosition::MAX_COORDINATE {
                return Err(Error::tile_table(
                    line_no,
                    format!("position {value} exceeds the addressable genome"),
                ));
            }
            Ok(PackedPosition::new(value))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    if positions.is_empty() {
        return Err(Error::tile_table(line_no, "empty position list"));
    }
    Ok(positions)
}

fn merge_shards(shards: Vec<Shard>) -> TileIndex {
    let total: usize = shards.iter().map(|s| s.len()).sum();
    let mut entries = HashMap::with_capacity(total);
    for shard in shards {
        for (key, positions) in shard {
            entries.insert(key, finalize_entry(positions));
        }
    }
    TileIndex::from_entries(entries)
}

/// A sentinel anywhere in an entry makes the whole tile too common.
fn finalize_entry(mut positions: Vec<PackedPosition>) -> Box<[PackedPosition]> {
    if let Some(count) = positions.iter().filter_map(|p| p.common_count()).max() {
        return vec![PackedPosition::common(count)].into_boxed_slice();
    }
    positions.sort_unstable();
    positions.dedup();
    positions.into_boxed_slice()
}

fn error_line(err: &Error) -> usize {
    match err {
        Error::TileTable { line, .. } => *line,
        _ => 0,
    }
}

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::Error;
use crate::index::position::PackedPosition;
use crate::index::tile::TILE_KEY_SPACE;
use crate::index::TileIndex;

const MAGIC: &[u8; 4] = b"TIDX";
const FORMAT_VERSION: u32 = 1;
/// Magic, version and entry count.
const HEADER_LEN: u64 = 16;
/// Key and position count.
const ENTRY_HEADER_LEN: u64 = 8;

fn corrupt(path: &Path, what: String) -> Error {
    Error::Index(format!("{} is corrupt: bad {what}", path.display()))
}

impl TileIndex {
    /// Write the index to disk in the binary cache format.
    ///
    /// Layout (little-endian): magic `TIDX`, u32 version, u64 entry count, then
    /// per entry in key order: u32 key, u32 position count, raw u64 positions.
    pub fn write_binary(&self, path: &Path) -> Result<(), Error> {
        log::info!("Writing tile index to {}...", path.display());
        let file = File::create(path).map_err(|e| Error::io(e, path))?;
        let mut w = BufWriter::new(file);
        self.write_to(&mut w).map_err(|e| Error::io(e, path))?;
        w.flush().map_err(|e| Error::io(e, path))?;
        Ok(())
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(MAGIC)?;
        w.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        w.write_u64::<LittleEndian>(self.len() as u64)?;
        for (key, positions) in self.iter_sorted() {
            w.write_u32::<LittleEndian>(key)?;
            w.write_u32::<LittleEndian>(positions.len() as u32)?;
            for p in positions {
                w.write_u64::<LittleEndian>(p.raw())?;
            }
        }
        Ok(())
    }

    /// Load an index written by [`TileIndex::write_binary`].
    pub fn load_binary(path: &Path) -> Result<Self, Error> {
        log::info!("Loading tile index from {}...", path.display());
        let file = File::open(path).map_err(|e| Error::io(e, path))?;
        let mut r = BufReader::new(file);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic).map_err(|e| Error::io(e, path))?;
        if &magic != MAGIC {
            return Err(Error::Index(format!(
                "{} is not a tile index (bad magic)",
                path.display()
            )));
        }
        let version = r
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::io(e, path))?;
        if version != FORMAT_VERSION {
            return Err(Error::Index(format!(
                "unsupported tile index version {version} (expected {FORMAT_VERSION})"
            )));
        }

        let file_len = r
            .get_ref()
            .metadata()
            .map_err(|e| Error::io(e, path))?
            .len();
        // Bytes left after the header.
        let mut remaining = file_len.saturating_sub(HEADER_LEN);

        let n_entries = r
            .read_u64::<LittleEndian>()
            .map_err(|e| Error::io(e, path))?;
        if n_entries > u64::from(TILE_KEY_SPACE) || n_entries * ENTRY_HEADER_LEN > remaining {
            return Err(corrupt(path, format!("entry count {n_entries}")));
        }
        let mut entries = HashMap::with_capacity(n_entries as usize);
        for _ in 0..n_entries {
            let key = r
                .read_u32::<LittleEndian>()
                .map_err(|e| Error::io(e, path))?;
            let count = r
                .read_u32::<LittleEndian>()
                .map_err(|e| Error::io(e, path))?;
            remaining = remaining.saturating_sub(ENTRY_HEADER_LEN);
            if key >= TILE_KEY_SPACE {
                return Err(corrupt(path, format!("tile key {key}")));
            }
            let bytes = u64::from(count) * 8;
            if bytes > remaining {
                return Err(corrupt(path, format!("position count {count} for key {key}")));
            }
            remaining -= bytes;

            let mut positions = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let raw = r
                    .read_u64::<LittleEndian>()
                    .map_err(|e| Error::io(e, path))?;
                positions.push(PackedPosition::from_raw(raw));
            }
            if entries.insert(key, positions.into_boxed_slice()).is_some() {
                return Err(corrupt(path, format!("duplicate tile key {key}")));
            }
        }

        let index = TileIndex::from_entries(entries);
        log::info!(
            "Loaded tile index: {} tiles ({} too common), {} positions",
            index.len(),
            index.n_common(),
            index.n_positions()
        );
        Ok(index)
    }
}

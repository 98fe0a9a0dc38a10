/// FASTA query reader with decompression support
use crate::error::Error;
use flate2::read::GzDecoder;
use noodles::fasta;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One query sequence, bases as read from the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub name: String,
    pub sequence: Vec<u8>,
}

/// FASTA reader that handles gzip input
pub struct QueryReader {
    inner: fasta::io::Reader<Box<dyn BufRead + Send>>,
    path: PathBuf,
}

impl QueryReader {
    /// Open a FASTA file, gunzipping when the name ends in `.gz` or `.gzip`.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let path_str = path.to_string_lossy();
        let is_gzipped = path_str.ends_with(".gz") || path_str.ends_with(".gzip");

        let file = File::open(path).map_err(|e| Error::io(e, path))?;
        let reader: Box<dyn BufRead + Send> = if is_gzipped {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        Ok(Self {
            inner: fasta::io::Reader::new(reader),
            path: path.to_path_buf(),
        })
    }

    pub fn next_query(&mut self) -> Result<Option<Query>, Error> {
        match self.inner.records().next() {
            Some(Ok(record)) => {
                let name: &[u8] = record.name().as_ref();
                let name = String::from_utf8_lossy(name).into_owned();
                let sequence: &[u8] = record.sequence().as_ref();
                Ok(Some(Query {
                    name,
                    sequence: sequence.to_vec(),
                }))
            }
            Some(Err(e)) => Err(Error::io(e, &self.path)),
            None => Ok(None),
        }
    }

    /// Read up to `batch_size` queries; shorter only at end of file.
    pub fn read_batch(&mut self, batch_size: usize) -> Result<Vec<Query>, Error> {
        let mut batch = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            match self.next_query()? {
                Some(query) => batch.push(query),
                None => break,
            }
        }
        Ok(batch)
    }
}

/// PSL output writer
use crate::align::AlignmentRecord;
use crate::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes records as tab-separated PSL lines, no header.
pub struct PslWriter<W: Write> {
    writer: W,
    path: PathBuf,
    written: u64,
}

impl PslWriter<BufWriter<File>> {
    pub fn create(output_path: &Path) -> Result<Self, Error> {
        let file = File::create(output_path).map_err(|e| Error::io(e, output_path))?;
        Ok(Self::new(BufWriter::new(file), output_path))
    }
}

impl<W: Write> PslWriter<W> {
    pub fn new(writer: W, path: impl Into<PathBuf>) -> Self {
        Self {
            writer,
            path: path.into(),
            written: 0,
        }
    }

    /// Write one query's records in the order given.
    pub fn write_records(&mut self, records: &[AlignmentRecord]) -> Result<(), Error> {
        for record in records {
            writeln!(self.writer, "{record}").map_err(|e| Error::io(e, &self.path))?;
        }
        self.written += records.len() as u64;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.written
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, Error> {
        self.writer.flush().map_err(|e| Error::io(e, &self.path))?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{Block, Strand};

    fn record(t_start: u64) -> AlignmentRecord {
        AlignmentRecord::from_blocks(
            "read1",
            50,
            Strand::Forward,
            "chr1",
            1000,
            &[Block::new(0, t_start, 50)],
            0,
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_write_records() {
        let mut writer = PslWriter::new(Vec::new(), "<memory>");
        writer.write_records(&[record(10), record(500)]).unwrap();
        writer.write_records(&[]).unwrap();
        assert_eq!(writer.records_written(), 2);

        let out = String::from_utf8(writer.finish().unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split('\t').count(), 21);
        assert!(lines[1].ends_with("\t500,"));
        let parsed: AlignmentRecord = lines[0].parse().unwrap();
        assert_eq!(parsed, record(10));
    }

    #[test]
    fn test_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.psl");
        let mut writer = PslWriter::create(&path).unwrap();
        writer.write_records(&[record(0)]).unwrap();
        writer.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("50\t0\t0\t0\t"));
    }
}

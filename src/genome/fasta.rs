use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::Error;

/// A single reference contig loaded from FASTA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contig {
    pub name: String,
    /// Upper-case bases; anything outside A/C/G/T is stored as `N`.
    pub sequence: Vec<u8>,
}

/// Parse reference FASTA files (plain or `.gz`) into contigs.
///
/// - Header name is the text after `>` up to the first whitespace
/// - Bases are upper-cased; IUPAC codes and other letters become `N`
/// - Control characters are skipped
pub fn parse_fasta_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Contig>, Error> {
    let mut contigs = Vec::new();

    for path in paths {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(e, path))?;
        let reader: Box<dyn BufRead> = if path.to_string_lossy().ends_with(".gz") {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let mut current_name: Option<String> = None;
        let mut current_seq: Vec<u8> = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(|e| Error::io(e, path))?;

            if line.is_empty() {
                continue;
            }

            if let Some(stripped) = line.strip_prefix('>') {
                if let Some(name) = current_name.take() {
                    contigs.push(Contig {
                        name,
                        sequence: std::mem::take(&mut current_seq),
                    });
                }

                let name = stripped
                    .split_whitespace()
                    .next()
                    .ok_or_else(|| {
                        Error::Fasta(format!(
                            "empty contig name at {}:{}",
                            path.display(),
                            line_num + 1
                        ))
                    })?
                    .to_string();

                current_name = Some(name);
            } else {
                if current_name.is_none() {
                    return Err(Error::Fasta(format!(
                        "sequence data before first header at {}:{}",
                        path.display(),
                        line_num + 1
                    )));
                }

                current_seq.extend(
                    line.bytes()
                        .filter(|&b| b >= 32 && !b.is_ascii_whitespace())
                        .map(normalize_base),
                );
            }
        }

        if let Some(name) = current_name {
            contigs.push(Contig {
                name,
                sequence: current_seq,
            });
        }
    }

    if contigs.is_empty() {
        return Err(Error::Fasta("no contigs found in FASTA files".to_string()));
    }

    Ok(contigs)
}

#[inline]
fn normalize_base(byte: u8) -> u8 {
    match byte {
        b'A' | b'a' => b'A',
        b'C' | b'c' => b'C',
        b'G' | b'g' => b'G',
        b'T' | b't' => b'T',
        _ => b'N',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parse_single_contig() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, ">chr1").unwrap();
        writeln!(file, "ACGT").unwrap();
        writeln!(file, "NNRY").unwrap();

        let contigs = parse_fasta_files(&[file.path()]).unwrap();
        assert_eq!(contigs.len(), 1);
        assert_eq!(contigs[0].name, "chr1");
        assert_eq!(contigs[0].sequence, b"ACGTNNNN".to_vec());
    }

    #[test]
    fn parse_multiple_contigs() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, ">chr1 some comment").unwrap();
        writeln!(file, "ACG").unwrap();
        writeln!(file, ">chr2").unwrap();
        writeln!(file, "TGA").unwrap();

        let contigs = parse_fasta_files(&[file.path()]).unwrap();
        assert_eq!(contigs.len(), 2);
        assert_eq!(contigs[0].name, "chr1");
        assert_eq!(contigs[0].sequence, b"ACG".to_vec());
        assert_eq!(contigs[1].name, "chr2");
        assert_eq!(contigs[1].sequence, b"TGA".to_vec());
    }

    #[test]
    fn lower_case_is_upper_cased() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, ">test").unwrap();
        writeln!(file, "AaCcGgTt").unwrap();

        let contigs = parse_fasta_files(&[file.path()]).unwrap();
        assert_eq!(contigs[0].sequence, b"AACCGGTT".to_vec());
    }

    #[test]
    fn gzip_input() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let tmpfile = tempfile::Builder::new().suffix(".fa.gz").tempfile().unwrap();
        let mut encoder = GzEncoder::new(tmpfile.as_file(), Compression::default());
        writeln!(encoder, ">chrZ").unwrap();
        writeln!(encoder, "GATTACA").unwrap();
        encoder.finish().unwrap();

        let contigs = parse_fasta_files(&[tmpfile.path()]).unwrap();
        assert_eq!(contigs[0].name, "chrZ");
        assert_eq!(contigs[0].sequence, b"GATTACA".to_vec());
    }

    #[test]
    fn empty_file_error() {
        let file = NamedTempFile::new().unwrap();
        let result = parse_fasta_files(&[file.path()]);
        assert!(result.unwrap_err().to_string().contains("no contigs"));
    }

    #[test]
    fn sequence_before_header_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ACGT").unwrap();

        let result = parse_fasta_files(&[file.path()]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("sequence data before first header"));
    }
}

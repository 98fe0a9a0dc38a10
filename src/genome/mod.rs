pub mod fasta;

use std::collections::HashMap;
use std::path::Path;

use crate::error::Error;
use crate::index::PackedPosition;

pub use fasta::{parse_fasta_files, Contig};

/// A location on a named contig, resolved from a packed genome position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChrPosition {
    pub contig: String,
    /// 0-based offset within the contig.
    pub offset: u64,
    pub contig_length: u64,
    pub reverse: bool,
}

/// Access to reference bases.
pub trait ReferenceSource: Sync {
    /// Bases of `contig` in `[start, end)`, clamped to the contig bounds.
    fn subsequence(&self, contig: &str, start: u64, end: u64) -> Result<Vec<u8>, Error>;

    /// Contig names and lengths in index order.
    fn chromosomes(&self) -> Vec<(String, u64)>;
}

/// Mapping between flat genome coordinates and contig positions.
pub trait CoordinateTranslator: Sync {
    fn to_chr_position(&self, position: PackedPosition) -> Option<ChrPosition>;

    fn to_packed(&self, contig: &str, offset: u64, reverse: bool) -> Option<PackedPosition>;
}

/// In-memory reference with contigs laid end to end in file order.
///
/// Contig `i` occupies the flat coordinates `starts[i]..starts[i] + len_i`.
#[derive(Debug, Clone)]
pub struct ReferenceGenome {
    contigs: Vec<Contig>,
    starts: Vec<u64>,
    by_name: HashMap<String, usize>,
}

impl ReferenceGenome {
    /// Load every contig from one or more FASTA files.
    pub fn from_fasta_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, Error> {
        let contigs = parse_fasta_files(paths)?;
        let genome = Self::from_contigs(contigs)?;
        log::info!(
            "Loaded reference: {} contigs, {} bases",
            genome.contigs.len(),
            genome.total_length()
        );
        Ok(genome)
    }

    pub fn from_contigs(contigs: Vec<Contig>) -> Result<Self, Error> {
        let mut starts = Vec::with_capacity(contigs.len());
        let mut by_name = HashMap::with_capacity(contigs.len());
        let mut next: u64 = 0;

        for (i, contig) in contigs.iter().enumerate() {
            if contig.sequence.is_empty() {
                return Err(Error::Fasta(format!(
                    "contig '{}' has zero length",
                    contig.name
                )));
            }
            if by_name.insert(contig.name.clone(), i).is_some() {
                return Err(Error::Fasta(format!(
                    "duplicate contig name '{}'",
                    contig.name
                )));
            }
            starts.push(next);
            next += contig.sequence.len() as u64;
        }

        if next > PackedPosition::MAX_COORDINATE {
            return Err(Error::Fasta(format!(
                "reference of {next} bases exceeds the addressable genome"
            )));
        }

        Ok(Self {
            contigs,
            starts,
            by_name,
        })
    }

    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    /// Flat coordinate of the first base of contig `idx`.
    pub fn contig_start(&self, idx: usize) -> u64 {
        self.starts[idx]
    }

    pub fn total_length(&self) -> u64 {
        self.contigs.iter().map(|c| c.sequence.len() as u64).sum()
    }

    fn contig(&self, name: &str) -> Result<&Contig, Error> {
        self.by_name
            .get(name)
            .map(|&i| &self.contigs[i])
            .ok_or_else(|| Error::Reference(format!("unknown contig '{name}'")))
    }
}

impl ReferenceSource for ReferenceGenome {
    fn subsequence(&self, contig: &str, start: u64, end: u64) -> Result<Vec<u8>, Error> {
        let seq = &self.contig(contig)?.sequence;
        let len = seq.len() as u64;
        let start = start.min(len) as usize;
        let end = end.min(len) as usize;
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(seq[start..end].to_vec())
    }

    fn chromosomes(&self) -> Vec<(String, u64)> {
        self.contigs
            .iter()
            .map(|c| (c.name.clone(), c.sequence.len() as u64))
            .collect()
    }
}

impl CoordinateTranslator for ReferenceGenome {
    fn to_chr_position(&self, position: PackedPosition) -> Option<ChrPosition> {
        if position.is_common() {
            return None;
        }
        let linear = position.coordinate();
        // Last contig whose start is <= linear.
        let idx = self.starts.partition_point(|&s| s <= linear).checked_sub(1)?;
        let contig = &self.contigs[idx];
        let offset = linear - self.starts[idx];
        let contig_length = contig.sequence.len() as u64;
        if offset >= contig_length {
            return None;
        }
        Some(ChrPosition {
            contig: contig.name.clone(),
            offset,
            contig_length,
            reverse: position.is_reverse(),
        })
    }

    fn to_packed(&self, contig: &str, offset: u64, reverse: bool) -> Option<PackedPosition> {
        let &idx = self.by_name.get(contig)?;
        if offset >= self.contigs[idx].sequence.len() as u64 {
            return None;
        }
        Some(PackedPosition::new(self.starts[idx] + offset).with_reverse(reverse))
    }
}

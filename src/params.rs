use std::path::PathBuf;

use clap::Parser;

use crate::align::{AlignOptions, SwMode};
use crate::error::Error;

// ---------------------------------------------------------------------------
// Run mode enum
// ---------------------------------------------------------------------------

/// `--runMode` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    TileGenerate,
    IndexGenerate,
    AlignReads,
}

impl std::str::FromStr for RunMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tileGenerate" => Ok(Self::TileGenerate),
            "indexGenerate" => Ok(Self::IndexGenerate),
            "alignReads" => Ok(Self::AlignReads),
            _ => Err(format!(
                "unknown runMode '{s}'; expected 'tileGenerate', 'indexGenerate' or 'alignReads'"
            )),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TileGenerate => write!(f, "tileGenerate"),
            Self::IndexGenerate => write!(f, "indexGenerate"),
            Self::AlignReads => write!(f, "alignReads"),
        }
    }
}

// ---------------------------------------------------------------------------
// Smith-Waterman preference
// ---------------------------------------------------------------------------

impl std::str::FromStr for SwMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            _ => Err(format!(
                "unknown swPreferredMode '{s}'; expected 'strict' or 'lenient'"
            )),
        }
    }
}

impl std::fmt::Display for SwMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lenient => write!(f, "lenient"),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters struct
// ---------------------------------------------------------------------------

/// Command-line parameters, with `--camelCase` argument names.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tiledAligner",
    about = "Tiled-index approximate DNA sequence aligner",
    version
)]
pub struct Parameters {
    // ── Run ─────────────────────────────────────────────────────────────
    /// Run mode: tileGenerate, indexGenerate or alignReads
    #[arg(long = "runMode", default_value = "alignReads")]
    pub run_mode: RunMode,

    /// Number of threads
    #[arg(long = "runThreadN", default_value_t = 1)]
    pub run_thread_n: usize,

    // ── Reference and index ─────────────────────────────────────────────
    /// FASTA file(s) with reference sequences
    #[arg(long = "genomeFastaFiles", num_args = 1..)]
    pub genome_fasta_files: Vec<PathBuf>,

    /// Tile table (written by tileGenerate, read by indexGenerate)
    #[arg(long = "tileTable")]
    pub tile_table: Option<PathBuf>,

    /// Binary tile index (written by indexGenerate, read by alignReads)
    #[arg(long = "tileIndex")]
    pub tile_index: Option<PathBuf>,

    /// Tiles seen more often than this are stored as a count only
    #[arg(long = "tileCommonCutoff", default_value_t = 1000)]
    pub tile_common_cutoff: usize,

    /// Batches queued per index-build worker
    #[arg(long = "buildQueueCapacity", default_value_t = 64)]
    pub build_queue_capacity: usize,

    // ── Query files ─────────────────────────────────────────────────────
    /// Query FASTA file (plain or gzip)
    #[arg(long = "readFilesIn", num_args = 1)]
    pub read_files_in: Vec<PathBuf>,

    /// Number of queries to align; -1 = all
    #[arg(long = "readMapNumber", default_value_t = -1, allow_hyphen_values = true)]
    pub read_map_number: i64,

    // ── Output ──────────────────────────────────────────────────────────
    /// Output file name prefix (including path)
    #[arg(long = "outFileNamePrefix", default_value = "./")]
    pub out_file_name_prefix: PathBuf,

    /// Records scoring below this are not reported
    #[arg(long = "outRecordScoreMin", default_value_t = 20)]
    pub out_record_score_min: i64,

    // ── Alignment ───────────────────────────────────────────────────────
    /// Chains considered by the split assembler
    #[arg(long = "alignCandidateMax", default_value_t = 20)]
    pub align_candidate_max: usize,

    /// Chain quality tiers searched for split partners
    #[arg(long = "alignTierMax", default_value_t = 3)]
    pub align_tier_max: usize,

    /// Max candidate windows aligned per query
    #[arg(long = "alignSwCountMax", default_value_t = 80)]
    pub align_sw_count_max: usize,

    /// Smith-Waterman parameter set tried first: strict or lenient
    #[arg(long = "swPreferredMode", default_value = "strict")]
    pub sw_preferred_mode: SwMode,
}

impl Parameters {
    /// Output file path: prefix followed by `suffix`.
    pub fn output_path(&self, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.out_file_name_prefix.display(), suffix))
    }

    /// Query limit from `--readMapNumber`.
    pub fn query_limit(&self) -> Option<usize> {
        usize::try_from(self.read_map_number).ok()
    }

    /// Validate parameter combinations that clap alone cannot enforce.
    pub fn validate(&self) -> Result<(), Error> {
        match self.run_mode {
            RunMode::TileGenerate => {
                self.require(!self.genome_fasta_files.is_empty(), "--genomeFastaFiles")?;
                self.require(self.tile_table.is_some(), "--tileTable")?;
            }
            RunMode::IndexGenerate => {
                self.require(self.tile_table.is_some(), "--tileTable")?;
                self.require(self.tile_index.is_some(), "--tileIndex")?;
            }
            RunMode::AlignReads => {
                self.require(!self.genome_fasta_files.is_empty(), "--genomeFastaFiles")?;
                self.require(!self.read_files_in.is_empty(), "--readFilesIn")?;
                self.require(
                    self.tile_index.is_some() || self.tile_table.is_some(),
                    "--tileIndex or --tileTable",
                )?;
            }
        }

        if self.run_thread_n == 0 {
            return Err(Error::Parameter("--runThreadN must be >= 1".into()));
        }
        if self.build_queue_capacity == 0 {
            return Err(Error::Parameter("--buildQueueCapacity must be >= 1".into()));
        }
        if self.tile_common_cutoff == 0 {
            return Err(Error::Parameter("--tileCommonCutoff must be >= 1".into()));
        }
        if self.align_sw_count_max == 0 {
            return Err(Error::Parameter("--alignSwCountMax must be >= 1".into()));
        }
        if self.align_tier_max == 0 {
            return Err(Error::Parameter("--alignTierMax must be >= 1".into()));
        }

        Ok(())
    }

    fn require(&self, present: bool, flag: &str) -> Result<(), Error> {
        if present {
            Ok(())
        } else {
            Err(Error::Parameter(format!(
                "{flag} is required when --runMode {}",
                self.run_mode
            )))
        }
    }
}

impl AlignOptions {
    pub fn from_params(params: &Parameters) -> Self {
        Self {
            candidate_max: params.align_candidate_max,
            tier_max: params.align_tier_max,
            sw_count_max: params.align_sw_count_max,
            sw_mode: params.sw_preferred_mode,
            record_score_min: params.out_record_score_min,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: parse a command line (without program name).
    fn parse(args: &[&str]) -> Parameters {
        let mut full = vec!["tiledAligner"];
        full.extend_from_slice(args);
        Parameters::parse_from(full)
    }

    #[test]
    fn defaults() {
        let p = parse(&["--readFilesIn", "queries.fa"]);
        assert_eq!(p.run_mode, RunMode::AlignReads);
        assert_eq!(p.run_thread_n, 1);
        assert!(p.genome_fasta_files.is_empty());
        assert!(p.tile_table.is_none());
        assert!(p.tile_index.is_none());
        assert_eq!(p.tile_common_cutoff, 1000);
        assert_eq!(p.build_queue_capacity, 64);
        assert_eq!(p.read_map_number, -1);
        assert_eq!(p.out_file_name_prefix, PathBuf::from("./"));
        assert_eq!(p.out_record_score_min, 20);
        assert_eq!(p.align_candidate_max, 20);
        assert_eq!(p.align_tier_max, 3);
        assert_eq!(p.align_sw_count_max, 80);
        assert_eq!(p.sw_preferred_mode, SwMode::Strict);
    }

    #[test]
    fn tile_generate_mode() {
        let p = parse(&[
            "--runMode",
            "tileGenerate",
            "--genomeFastaFiles",
            "chr1.fa",
            "chr2.fa",
            "--tileTable",
            "/data/tiles.tsv.gz",
            "--tileCommonCutoff",
            "500",
        ]);
        assert_eq!(p.run_mode, RunMode::TileGenerate);
        assert_eq!(
            p.genome_fasta_files,
            vec![PathBuf::from("chr1.fa"), PathBuf::from("chr2.fa")]
        );
        assert_eq!(p.tile_table, Some(PathBuf::from("/data/tiles.tsv.gz")));
        assert_eq!(p.tile_common_cutoff, 500);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn typical_align_command() {
        let p = parse(&[
            "--runMode",
            "alignReads",
            "--genomeFastaFiles",
            "genome.fa",
            "--tileIndex",
            "genome.tidx",
            "--readFilesIn",
            "queries.fa.gz",
            "--runThreadN",
            "16",
            "--outFileNamePrefix",
            "/out/sample1_",
            "--alignSwCountMax",
            "40",
            "--swPreferredMode",
            "lenient",
            "--readMapNumber",
            "1000",
        ]);
        assert!(p.validate().is_ok());
        assert_eq!(p.run_thread_n, 16);
        assert_eq!(
            p.output_path("Aligned.out.psl"),
            PathBuf::from("/out/sample1_Aligned.out.psl")
        );
        assert_eq!(p.query_limit(), Some(1000));

        let options = AlignOptions::from_params(&p);
        assert_eq!(options.sw_count_max, 40);
        assert_eq!(options.sw_mode, SwMode::Lenient);
        assert_eq!(options.split_shortcut_max, AlignOptions::default().split_shortcut_max);
    }

    #[test]
    fn query_limit_all() {
        let p = parse(&["--readFilesIn", "q.fa"]);
        assert_eq!(p.query_limit(), None);
    }

    #[test]
    fn run_mode_round_trip() {
        for mode in ["tileGenerate", "indexGenerate", "alignReads"] {
            let parsed: RunMode = mode.parse().unwrap();
            assert_eq!(parsed.to_string(), mode);
        }
        assert!("genomeGenerate".parse::<RunMode>().is_err());
    }

    #[test]
    fn invalid_sw_mode() {
        let result = Parameters::try_parse_from(["tiledAligner", "--swPreferredMode", "loose"]);
        assert!(result.is_err());
    }

    #[test]
    fn validate_tile_generate_needs_output() {
        let p = parse(&[
            "--runMode",
            "tileGenerate",
            "--genomeFastaFiles",
            "genome.fa",
        ]);
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("--tileTable"));
    }

    #[test]
    fn validate_index_generate() {
        let p = parse(&["--runMode", "indexGenerate", "--tileTable", "tiles.tsv"]);
        assert!(p.validate().is_err());
        let p = parse(&[
            "--runMode",
            "indexGenerate",
            "--tileTable",
            "tiles.tsv",
            "--tileIndex",
            "tiles.tidx",
        ]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn validate_align_needs_index() {
        let p = parse(&["--genomeFastaFiles", "genome.fa", "--readFilesIn", "q.fa"]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_zero_threads() {
        let p = parse(&[
            "--genomeFastaFiles",
            "genome.fa",
            "--readFilesIn",
            "q.fa",
            "--tileTable",
            "tiles.tsv",
            "--runThreadN",
            "0",
        ]);
        assert!(p.validate().is_err());
    }
}

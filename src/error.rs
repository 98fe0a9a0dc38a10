use std::path::PathBuf;

/// Errors that can occur in the tiled aligner.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    Parameter(String),

    #[error("I/O error: {source} ({path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("FASTA parsing error: {0}")]
    Fasta(String),

    #[error("malformed tile table at line {line}: {message}")]
    TileTable { line: usize, message: String },

    #[error("tile index error: {0}")]
    Index(String),

    #[error("reference error: {0}")]
    Reference(String),

    #[error("alignment error: {0}")]
    Alignment(String),
}

impl Error {
    /// Convenience for wrapping an `io::Error` with a path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }

    pub(crate) fn tile_table(line: usize, message: impl Into<String>) -> Self {
        Self::TileTable {
            line,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            source: err,
            path: PathBuf::from("<unknown>"),
        }
    }
}

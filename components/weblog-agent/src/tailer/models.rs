// Local crates
use crate::tailer::{state::FileIdentity, wakeups::FsWakeups};

// External crates
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::{fs::File, io::BufReader};

#[derive(Debug, Error)]
pub enum TailError {
    #[error("failed to open {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read from tailed file")]
    Read(#[source] std::io::Error),

    #[error("{} disappeared, waiting for it to come back", path.display())]
    Missing { path: PathBuf },

    #[error("line in {} exceeds {limit} bytes, skipping to the next newline", path.display())]
    LineTooLong { path: PathBuf, limit: usize },

    #[error("{} has no non-empty line to learn from", path.display())]
    EmptyFile { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Unit of output of a running tailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    /// One complete line, without its terminator.
    Line(String),
    /// The path was rotated or truncated and reading restarted at offset 0.
    Reopened,
    /// A non-fatal I/O problem. The tailer keeps going.
    Error(String),
}

#[derive(Debug, Clone, Copy)]
pub struct TailerOptions {
    /// Upper bound on how long EOF waits before re-checking the file.
    pub poll_interval: Duration,
    /// Start at offset 0 instead of the current end of file.
    pub read_from_start: bool,
    /// Longest line kept. Anything longer is dropped up to its newline.
    pub max_line_bytes: usize,
}

impl Default for TailerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            read_from_start: false,
            max_line_bytes: 1024 * 1024,
        }
    }
}

/// Follows a single path. Owns the open file handle; dropping the tailer
/// releases it.
pub struct Tailer {
    pub(crate) path: PathBuf,
    pub(crate) options: TailerOptions,
    pub(crate) reader: BufReader<File>,
    pub(crate) identity: FileIdentity,
    /// Offset of the first byte of `pending`.
    pub(crate) committed: u64,
    /// Bytes of the line currently being assembled.
    pub(crate) pending: Vec<u8>,
    /// Bytes up to the next newline belong to a line that is not emitted.
    pub(crate) discarding: bool,
    pub(crate) wakeups: Option<FsWakeups>,
    pub(crate) missing_reported: bool,
    pub(crate) reopens: u64,
}

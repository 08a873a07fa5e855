use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config does not list any channels")]
    NoChannels,
    #[error("Config lists channel {0} more than once")]
    DuplicateChannel(String),
    #[error("Config refers to channel {0} which is not in the channel list")]
    UnknownChannel(String),
    #[error("Config has an invalid rolling window size {0}; must be at least 1")]
    InvalidWindow(usize),
    #[error("Config has min_periods {min_periods} which must be between 1 and the window size {window}")]
    InvalidMinPeriods { min_periods: usize, window: usize },
    #[error("Config has an invalid {name} capacity {value}; must be at least {min}")]
    InvalidCapacity {
        name: &'static str,
        value: usize,
        min: usize,
    },
    #[error("Config has a tick period of zero milliseconds")]
    InvalidTickPeriod,
}

#[derive(Debug, Clone, Error)]
pub enum BufferError {
    #[error("WindowedBuffer received a batch with columns {found:?}; expected {expected:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV export failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("CSV export failed due to CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("CSV export could not move the snapshot into place: {0}")]
    PersistError(#[from] tempfile::PersistError),
    #[error("CSV file {0:?} has no index column")]
    MissingIndex(PathBuf),
    #[error("CSV file has a non-numeric entry {value:?} on line {line}")]
    BadNumber { line: u64, value: String },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session failed due to configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Session does not know channel {0}")]
    UnknownChannel(String),
    #[error("Session failed due to export error: {0}")]
    ExportError(#[from] ExportError),
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("Poller could not spawn its tick thread: {0}")]
    SpawnError(#[from] std::io::Error),
    #[error("Poller tick thread panicked and could not be joined")]
    WorkerPanicked,
}

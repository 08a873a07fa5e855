use indicatif::ProgressBar;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

use libbeam_monitor::channel::Channel;
use libbeam_monitor::registry::SampleSink;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Replay file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Replay failed due to CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

/// One line of a replay file: `channel,timestamp,value`
#[derive(Debug, Clone, Deserialize)]
struct ReplayRow {
    channel: String,
    timestamp: f64,
    value: String,
}

/// A recorded sample ready to be pushed into the registry
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySample {
    pub channel: Channel,
    pub timestamp: f64,
    pub value: f64,
}

/// Read a replay file, sorted by timestamp.
///
/// Values that do not parse as numbers are kept as NaN so the aligner can report them.
pub fn read_replay(path: &Path) -> Result<Vec<ReplaySample>, ReplayError> {
    if !path.exists() {
        return Err(ReplayError::BadFilePath(path.to_path_buf()));
    }
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut samples = Vec::new();
    for row in reader.deserialize() {
        let row: ReplayRow = row?;
        let value = row.value.parse::<f64>().unwrap_or(f64::NAN);
        samples.push(ReplaySample {
            channel: Channel::from(row.channel),
            timestamp: row.timestamp,
            value,
        });
    }
    samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    Ok(samples)
}

/// Push the samples into the sink.
///
/// With a positive `speed` the gaps between timestamps are reproduced, divided by
/// `speed`; otherwise samples are pushed as fast as possible.
pub fn feed(samples: &[ReplaySample], sink: &dyn SampleSink, speed: f64, pb: &ProgressBar) {
    let start = Instant::now();
    let first = samples.first().map(|s| s.timestamp).unwrap_or_default();
    for sample in samples {
        if speed > 0.0 {
            let offset = Duration::from_secs_f64(((sample.timestamp - first) / speed).max(0.0));
            let wait = (start + offset).saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
        }
        sink.on_sample(&sample.channel, sample.timestamp, sample.value);
        pb.inc(1);
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use super::channel::{Channel, Sample};
use super::channel_log::{ChannelLog, SampleSource};
use super::config::Config;

/// Typed subscription callback. Transports call this once per reading.
pub trait SampleSink: Send + Sync {
    fn on_sample(&self, channel: &Channel, timestamp: f64, value: f64);
}

/// A mapping from channel to the log holding its samples.
pub trait LogProvider {
    type Source: SampleSource;

    fn log(&self, channel: &Channel) -> Option<&Self::Source>;
}

impl<S: SampleSource> LogProvider for BTreeMap<Channel, S> {
    type Source = S;

    fn log(&self, channel: &Channel) -> Option<&S> {
        self.get(channel)
    }
}

/// ChannelRegistry holds one ChannelLog per physical signal.
///
/// There is one registry per process, shared (via `Arc`) between the transport that
/// fills it and every dashboard session reading from it. All derived state lives in
/// the sessions; the registry only stores raw samples.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    logs: BTreeMap<Channel, Arc<ChannelLog>>,
}

impl ChannelRegistry {
    /// Create a registry with an empty log of the given capacity for each channel
    pub fn new(channels: impl IntoIterator<Item = Channel>, log_capacity: usize) -> Self {
        let logs = channels
            .into_iter()
            .map(|channel| (channel, Arc::new(ChannelLog::new(log_capacity))))
            .collect();
        Self { logs }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.channel_list(), config.log_capacity)
    }

    pub fn get(&self, channel: &Channel) -> Option<&Arc<ChannelLog>> {
        self.logs.get(channel)
    }

    /// Look a channel up by name
    pub fn find(&self, name: &str) -> Option<&Channel> {
        self.logs.keys().find(|c| c.name() == name)
    }

    pub fn contains(&self, channel: &Channel) -> bool {
        self.logs.contains_key(channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.logs.keys()
    }

    pub fn push(&self, channel: &Channel, sample: Sample) -> bool {
        match self.logs.get(channel) {
            Some(log) => {
                log.push(sample);
                true
            }
            None => false,
        }
    }

    /// The cursor of every channel positioned at the end of its log
    pub fn end_cursors(&self) -> BTreeMap<Channel, u64> {
        self.logs
            .iter()
            .map(|(channel, log)| (channel.clone(), log.next_cursor()))
            .collect()
    }
}

impl LogProvider for ChannelRegistry {
    type Source = ChannelLog;

    fn log(&self, channel: &Channel) -> Option<&ChannelLog> {
        self.logs.get(channel).map(Arc::as_ref)
    }
}

impl SampleSink for ChannelRegistry {
    fn on_sample(&self, channel: &Channel, timestamp: f64, value: f64) {
        if !self.push(channel, Sample::new(timestamp, value)) {
            log::warn!("Dropped a sample for unregistered channel {channel}");
        }
    }
}

use std::collections::BTreeMap;

use super::channel::{Channel, Sample};
use super::channel_log::SampleSource;
use super::frame::JoinedFrame;
use super::registry::LogProvider;

/// Read position of a session in every channel log.
///
/// A channel without an entry is read from the start of its log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursors {
    positions: BTreeMap<Channel, u64>,
}

impl Cursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: &Channel) -> u64 {
        self.positions.get(channel).copied().unwrap_or(0)
    }

    pub fn set(&mut self, channel: Channel, cursor: u64) {
        self.positions.insert(channel, cursor);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Channel, &u64)> {
        self.positions.iter()
    }
}

impl From<BTreeMap<Channel, u64>> for Cursors {
    fn from(positions: BTreeMap<Channel, u64>) -> Self {
        Self { positions }
    }
}

/// A sample that could not take part in alignment
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentIssue {
    /// The value or timestamp was not a finite number
    NonNumeric { channel: Channel, sample: Sample },
    /// The ring evicted samples before this session could read them
    Evicted { channel: Channel, count: u64 },
}

/// EventAligner joins the samples of independently clocked channels into one frame.
///
/// Each call reads only the samples past the given cursors, so samples are joined
/// exactly once. The union of all timestamps becomes the row set; cells are filled
/// only where a channel has a sample at that timestamp.
#[derive(Debug)]
pub struct EventAligner {
    channels: Vec<Channel>,
    issues: Vec<AlignmentIssue>,
    dropped_total: u64,
}

impl EventAligner {
    /// Create a new EventAligner producing frames with these columns, in this order
    pub fn new(channels: Vec<Channel>) -> Self {
        EventAligner {
            channels,
            issues: Vec::new(),
            dropped_total: 0,
        }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Align every sample past `cursors` into a JoinedFrame.
    ///
    /// Returns the frame and the advanced cursors. Samples with non-finite values are
    /// skipped and logged; the cursor still moves past them. Channels the provider
    /// does not know are treated as having no new samples. An empty frame means
    /// there was nothing new to read.
    pub fn align<L: LogProvider>(&mut self, logs: &L, cursors: &Cursors) -> (JoinedFrame, Cursors) {
        self.issues.clear();
        let mut next = cursors.clone();
        let mut entries: Vec<Entry> = Vec::new();

        for (column, channel) in self.channels.iter().enumerate() {
            let Some(source) = logs.log(channel) else {
                continue;
            };
            let slice = source.since(cursors.get(channel));
            if slice.evicted > 0 {
                log::warn!(
                    "{} samples of {channel} were evicted before they could be aligned",
                    slice.evicted
                );
                self.issues.push(AlignmentIssue::Evicted {
                    channel: channel.clone(),
                    count: slice.evicted,
                });
            }
            // Samples of this channel already seen at each timestamp
            let mut seen: BTreeMap<u64, usize> = BTreeMap::new();
            for sample in slice.samples {
                if sample.is_finite() {
                    let rank = seen.entry(sample.timestamp.to_bits()).or_insert(0);
                    entries.push(Entry {
                        timestamp: sample.timestamp,
                        rank: *rank,
                        column,
                        value: sample.value,
                    });
                    *rank += 1;
                } else {
                    log::warn!(
                        "Skipping non-numeric sample of {channel} (timestamp: {}, value: {})",
                        sample.timestamp,
                        sample.value
                    );
                    self.dropped_total += 1;
                    self.issues.push(AlignmentIssue::NonNumeric {
                        channel: channel.clone(),
                        sample,
                    });
                }
            }
            next.set(channel.clone(), slice.next_cursor);
        }

        (self.build_frame(entries), next)
    }

    /// Issues found during the last call to align
    pub fn last_issues(&self) -> &[AlignmentIssue] {
        &self.issues
    }

    /// Number of samples dropped as non-numeric since this aligner was created
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    // The k-th sample of every channel at a given timestamp goes to the k-th row for
    // that timestamp, so duplicates within one channel become separate rows and
    // samples of different channels still share a row.
    fn build_frame(&self, mut entries: Vec<Entry>) -> JoinedFrame {
        entries.sort_by(|a, b| {
            a.timestamp
                .total_cmp(&b.timestamp)
                .then(a.rank.cmp(&b.rank))
                .then(a.column.cmp(&b.column))
        });
        let mut frame = JoinedFrame::new(self.channels.clone());
        let mut cells: Vec<Option<f64>> = vec![None; self.channels.len()];
        let mut current: Option<(f64, usize)> = None;

        for entry in entries {
            let starts_row = match current {
                Some((t, rank)) => t.total_cmp(&entry.timestamp).is_ne() || rank != entry.rank,
                None => true,
            };
            if starts_row {
                if let Some((t, _)) = current {
                    frame.push_row(t, &cells);
                }
                cells.iter_mut().for_each(|cell| *cell = None);
                current = Some((entry.timestamp, entry.rank));
            }
            cells[entry.column] = Some(entry.value);
        }
        if let Some((t, _)) = current {
            frame.push_row(t, &cells);
        }
        frame
    }
}

/// One finite sample waiting to be placed in a row
#[derive(Debug, Clone, Copy)]
struct Entry {
    timestamp: f64,
    /// Earlier samples of the same channel at the same timestamp
    rank: usize,
    column: usize,
    value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_log::ChannelLog;
    use crate::registry::{ChannelRegistry, SampleSink};
    use proptest::prelude::*;

    fn registry() -> (ChannelRegistry, Channel, Channel) {
        let ipm2 = Channel::new("ipm2");
        let ebeam = Channel::new("ebeam");
        let registry = ChannelRegistry::new([ipm2.clone(), ebeam.clone()], 1000);
        (registry, ipm2, ebeam)
    }

    #[test]
    fn test_ipm2_ebeam_scenario() {
        let (registry, ipm2, ebeam) = registry();
        registry.on_sample(&ipm2, 0.0, 1.0);
        registry.on_sample(&ipm2, 1.0, 2.0);
        registry.on_sample(&ipm2, 2.0, 3.0);
        registry.on_sample(&ebeam, 0.0, 10.0);
        registry.on_sample(&ebeam, 2.0, 30.0);

        let mut aligner = EventAligner::new(vec![ipm2.clone(), ebeam.clone()]);
        let (frame, cursors) = aligner.align(&registry, &Cursors::new());
        assert_eq!(frame.len(), 3);
        let (t, cells) = frame.row(1).unwrap();
        assert_eq!(t, 1.0);
        assert_eq!(cells, vec![Some(2.0), None]);
        assert_eq!(cursors.get(&ipm2), 3);
        assert_eq!(cursors.get(&ebeam), 2);
    }

    #[test]
    fn test_cursor_advances_without_reprocessing() {
        let (registry, ipm2, ebeam) = registry();
        let mut aligner = EventAligner::new(vec![ipm2.clone(), ebeam.clone()]);
        for i in 0..5 {
            registry.on_sample(&ipm2, i as f64, 1.0);
        }
        let (first, cursors) = aligner.align(&registry, &Cursors::new());
        for i in 5..8 {
            registry.on_sample(&ipm2, i as f64, 1.0);
            registry.on_sample(&ebeam, i as f64, 2.0);
        }
        let (second, cursors) = aligner.align(&registry, &cursors);
        assert_eq!(first.len(), 5);
        assert_eq!(second.len(), 3);
        assert!(first.last_timestamp().unwrap() < second.first_timestamp().unwrap());

        let (third, _) = aligner.align(&registry, &cursors);
        assert!(third.is_empty());
    }

    #[test]
    fn test_identical_timestamps_share_a_row() {
        let (registry, ipm2, ebeam) = registry();
        registry.on_sample(&ipm2, 5.0, 1.0);
        registry.on_sample(&ebeam, 5.0, 2.0);
        registry.on_sample(&ipm2, 5.0, 3.0);

        let mut aligner = EventAligner::new(vec![ipm2, ebeam]);
        let (frame, _) = aligner.align(&registry, &Cursors::new());
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.row(0).unwrap().1, vec![Some(1.0), Some(2.0)]);
        assert_eq!(frame.row(1).unwrap().1, vec![Some(3.0), None]);
    }

    #[test]
    fn test_duplicates_pair_by_occurrence() {
        let (registry, ipm2, ebeam) = registry();
        registry.on_sample(&ipm2, 5.0, 1.0);
        registry.on_sample(&ipm2, 5.0, 2.0);
        registry.on_sample(&ebeam, 5.0, 10.0);
        registry.on_sample(&ebeam, 5.0, 20.0);
        registry.on_sample(&ebeam, 6.0, 30.0);

        let mut aligner = EventAligner::new(vec![ipm2, ebeam]);
        let (frame, _) = aligner.align(&registry, &Cursors::new());
        assert_eq!(frame.timestamps(), &[5.0, 5.0, 6.0]);
        assert_eq!(frame.row(0).unwrap().1, vec![Some(1.0), Some(10.0)]);
        assert_eq!(frame.row(1).unwrap().1, vec![Some(2.0), Some(20.0)]);
        assert_eq!(frame.row(2).unwrap().1, vec![None, Some(30.0)]);
    }

    #[test]
    fn test_non_numeric_samples_are_skipped() {
        let (registry, ipm2, ebeam) = registry();
        registry.on_sample(&ipm2, 0.0, 1.0);
        registry.on_sample(&ipm2, 1.0, f64::NAN);
        registry.on_sample(&ipm2, 2.0, 3.0);

        let mut aligner = EventAligner::new(vec![ipm2.clone(), ebeam]);
        let (frame, cursors) = aligner.align(&registry, &Cursors::new());
        assert_eq!(frame.timestamps(), &[0.0, 2.0]);
        assert_eq!(cursors.get(&ipm2), 3);
        assert_eq!(aligner.dropped_total(), 1);
        assert!(matches!(
            aligner.last_issues(),
            [AlignmentIssue::NonNumeric { .. }]
        ));
    }

    #[test]
    fn test_evicted_samples_are_reported() {
        let ipm2 = Channel::new("ipm2");
        let mut logs = BTreeMap::new();
        let log = ChannelLog::new(2);
        for i in 0..4 {
            log.push(Sample::new(i as f64, 1.0));
        }
        logs.insert(ipm2.clone(), log);

        let mut aligner = EventAligner::new(vec![ipm2.clone()]);
        let (frame, cursors) = aligner.align(&logs, &Cursors::new());
        assert_eq!(frame.len(), 2);
        assert_eq!(cursors.get(&ipm2), 4);
        assert_eq!(
            aligner.last_issues(),
            &[AlignmentIssue::Evicted {
                channel: ipm2,
                count: 2
            }]
        );
    }

    #[test]
    fn test_empty_logs_give_empty_frame() {
        let (registry, ipm2, ebeam) = registry();
        let mut aligner = EventAligner::new(vec![ipm2, ebeam, Channel::new("unknown")]);
        let (frame, cursors) = aligner.align(&registry, &Cursors::new());
        assert!(frame.is_empty());
        assert_eq!(frame.channels().len(), 3);
        assert_eq!(cursors.get(&Channel::new("unknown")), 0);
    }

    proptest! {
        #[test]
        fn prop_disjoint_channels_union(
            a in proptest::collection::btree_set(0u32..10_000, 0..60),
            b in proptest::collection::btree_set(0u32..10_000, 0..60),
        ) {
            let b: Vec<u32> = b.difference(&a).copied().collect();
            let (registry, ipm2, ebeam) = registry();
            for t in a.iter() {
                registry.on_sample(&ipm2, *t as f64, 1.0);
            }
            for t in b.iter() {
                registry.on_sample(&ebeam, *t as f64, 2.0);
            }
            let mut aligner = EventAligner::new(vec![ipm2, ebeam]);
            let (frame, _) = aligner.align(&registry, &Cursors::new());
            prop_assert_eq!(frame.len(), a.len() + b.len());
            for i in 0..frame.len() {
                let (_, cells) = frame.row(i).unwrap();
                prop_assert_eq!(cells.iter().filter(|c| c.is_some()).count(), 1);
            }
            prop_assert!(frame.timestamps().windows(2).all(|w| w[0] <= w[1]));
        }
    }
}

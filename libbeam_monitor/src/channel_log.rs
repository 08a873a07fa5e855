use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::channel::Sample;

/// The samples of a channel read from a given cursor onward.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogSlice {
    pub samples: Vec<Sample>,
    /// Cursor to use on the next read
    pub next_cursor: u64,
    /// Samples past the requested cursor that were already evicted from the ring
    pub evicted: u64,
}

/// Anything which can hand out the samples of one channel past a cursor.
///
/// Cursors are sequence numbers: the n-th sample ever appended to a channel has
/// sequence number n-1, regardless of how many older samples were since evicted.
pub trait SampleSource {
    /// Copy every retained sample with sequence number >= cursor
    fn since(&self, cursor: u64) -> LogSlice;
    /// Number of samples currently retained
    fn len(&self) -> usize;
    /// Sequence number the next appended sample will receive
    fn next_cursor(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct LogRing {
    samples: VecDeque<Sample>,
    first_sequence: u64,
    capacity: usize,
}

/// ChannelLog is the FIFO ring of raw samples for one channel.
///
/// The log is written by the transport (device subscription or message socket
/// receiver) and read by every dashboard session. Reads copy the requested slice
/// under a single short lock, so a session never observes the ring mid-append.
/// Once `capacity` samples are held the oldest are evicted.
#[derive(Debug)]
pub struct ChannelLog {
    ring: Mutex<LogRing>,
}

impl ChannelLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(LogRing {
                samples: VecDeque::with_capacity(capacity.min(4096)),
                first_sequence: 0,
                capacity: capacity.max(1),
            }),
        }
    }

    /// Append a sample, evicting the oldest if the ring is full
    pub fn push(&self, sample: Sample) {
        let mut ring = self.lock();
        if ring.samples.len() == ring.capacity {
            ring.samples.pop_front();
            ring.first_sequence += 1;
        }
        ring.samples.push_back(sample);
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    // A panic while holding the lock cannot leave the ring half written (push and
    // pop are each a single VecDeque call) so poisoning is ignored
    fn lock(&self) -> MutexGuard<'_, LogRing> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SampleSource for ChannelLog {
    fn since(&self, cursor: u64) -> LogSlice {
        let ring = self.lock();
        let next_cursor = ring.first_sequence + ring.samples.len() as u64;
        let evicted = ring.first_sequence.saturating_sub(cursor);
        let start = cursor.saturating_sub(ring.first_sequence) as usize;
        let samples = if start < ring.samples.len() {
            ring.samples.range(start..).copied().collect()
        } else {
            Vec::new()
        };
        LogSlice {
            samples,
            next_cursor,
            evicted,
        }
    }

    fn len(&self) -> usize {
        self.lock().samples.len()
    }

    fn next_cursor(&self) -> u64 {
        let ring = self.lock();
        ring.first_sequence + ring.samples.len() as u64
    }
}

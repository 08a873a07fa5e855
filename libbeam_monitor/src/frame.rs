use super::channel::Channel;

/// JoinedFrame is the time-ordered table produced by aligning several channels.
///
/// Storage is column-major: one timestamp per row and one `Option<f64>` cell per
/// channel per row. A cell is `None` when the channel had no sample at that
/// timestamp; cells are never zero-filled.
///
/// Invariants: rows are sorted ascending by timestamp and every row has at least
/// one populated cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinedFrame {
    channels: Vec<Channel>,
    timestamps: Vec<f64>,
    columns: Vec<Vec<Option<f64>>>,
}

impl JoinedFrame {
    /// Create an empty frame with the given columns
    pub fn new(channels: Vec<Channel>) -> Self {
        let columns = vec![Vec::new(); channels.len()];
        Self {
            channels,
            timestamps: Vec::new(),
            columns,
        }
    }

    /// Build a frame from unordered rows.
    ///
    /// Rows are stably sorted by timestamp and rows without any populated cell are
    /// discarded. Each row must have one cell per channel.
    pub fn from_rows(channels: Vec<Channel>, mut rows: Vec<(f64, Vec<Option<f64>>)>) -> Self {
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut frame = Self::new(channels);
        for (timestamp, cells) in rows {
            frame.push_row(timestamp, &cells);
        }
        frame
    }

    /// Append a row. The row must not be older than the last row, and must have
    /// one cell per channel. Rows with no populated cell are ignored.
    pub fn push_row(&mut self, timestamp: f64, cells: &[Option<f64>]) {
        debug_assert_eq!(cells.len(), self.channels.len());
        debug_assert!(self.timestamps.last().map_or(true, |last| *last <= timestamp));
        if cells.iter().all(Option::is_none) {
            return;
        }
        self.timestamps.push(timestamp);
        for (column, cell) in self.columns.iter_mut().zip(cells) {
            column.push(*cell);
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn first_timestamp(&self) -> Option<f64> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }

    pub fn column(&self, channel: &Channel) -> Option<&[Option<f64>]> {
        self.channels
            .iter()
            .position(|c| c == channel)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// The cells of a single row, in channel order
    pub fn row(&self, index: usize) -> Option<(f64, Vec<Option<f64>>)> {
        let timestamp = *self.timestamps.get(index)?;
        let cells = self.columns.iter().map(|column| column[index]).collect();
        Some((timestamp, cells))
    }

    /// Timestamps and values of the rows where the channel is populated
    pub fn present(&self, channel: &Channel) -> (Vec<f64>, Vec<f64>) {
        let Some(column) = self.column(channel) else {
            return (Vec::new(), Vec::new());
        };
        self.timestamps
            .iter()
            .zip(column)
            .filter_map(|(t, cell)| cell.map(|v| (*t, v)))
            .unzip()
    }

    /// Rows where both channels are populated, as (timestamp, x, y)
    pub fn pairs(&self, x: &Channel, y: &Channel) -> Vec<(f64, f64, f64)> {
        let (Some(xs), Some(ys)) = (self.column(x), self.column(y)) else {
            return Vec::new();
        };
        self.timestamps
            .iter()
            .zip(xs.iter().zip(ys))
            .filter_map(|(t, (x, y))| Some((*t, (*x)?, (*y)?)))
            .collect()
    }

    /// Project the frame onto a subset of its columns.
    ///
    /// Rows left with no populated cell are dropped. Channels the frame does not
    /// have are returned as fully absent columns.
    pub fn select(&self, channels: &[Channel]) -> JoinedFrame {
        let picked: Vec<Option<usize>> = channels
            .iter()
            .map(|c| self.channels.iter().position(|own| own == c))
            .collect();
        let mut frame = JoinedFrame::new(channels.to_vec());
        let mut cells = vec![None; channels.len()];
        for (row, timestamp) in self.timestamps.iter().enumerate() {
            for (cell, idx) in cells.iter_mut().zip(&picked) {
                *cell = idx.and_then(|i| self.columns[i][row]);
            }
            frame.push_row(*timestamp, &cells);
        }
        frame
    }

    /// A copy of the last `n` rows
    pub fn tail(&self, n: usize) -> JoinedFrame {
        let start = self.len().saturating_sub(n);
        JoinedFrame {
            channels: self.channels.clone(),
            timestamps: self.timestamps[start..].to_vec(),
            columns: self.columns.iter().map(|c| c[start..].to_vec()).collect(),
        }
    }

    /// Drop the oldest rows so that at most `n` remain
    pub fn keep_last(&mut self, n: usize) {
        let excess = self.len().saturating_sub(n);
        if excess == 0 {
            return;
        }
        self.timestamps.drain(..excess);
        for column in self.columns.iter_mut() {
            column.drain(..excess);
        }
    }

    /// Append the rows of another frame with the same columns.
    ///
    /// An incoming row whose timestamp already exists is merged into the first
    /// existing row at that timestamp whose populated cells it does not overlap, so
    /// an event whose channels arrived in different ticks ends up as one row. Other
    /// rows are inserted after any rows with an equal or smaller timestamp.
    pub fn append(&mut self, other: &JoinedFrame) {
        debug_assert_eq!(self.channels, other.channels);
        if other.is_empty() {
            return;
        }
        let in_order = match (self.last_timestamp(), other.first_timestamp()) {
            (Some(last), Some(first)) => last < first,
            _ => true,
        };
        if in_order {
            self.timestamps.extend_from_slice(&other.timestamps);
            for (column, extra) in self.columns.iter_mut().zip(&other.columns) {
                column.extend_from_slice(extra);
            }
            return;
        }
        for row in 0..other.len() {
            if let Some((timestamp, cells)) = other.row(row) {
                self.merge_row(timestamp, &cells);
            }
        }
    }

    fn merge_row(&mut self, timestamp: f64, cells: &[Option<f64>]) {
        let start = self.timestamps.partition_point(|t| *t < timestamp);
        let end = self.timestamps.partition_point(|t| *t <= timestamp);
        let fits = |row: usize| {
            self.columns
                .iter()
                .zip(cells)
                .all(|(column, cell)| cell.is_none() || column[row].is_none())
        };
        if let Some(row) = (start..end).find(|row| fits(*row)) {
            for (column, cell) in self.columns.iter_mut().zip(cells) {
                if cell.is_some() {
                    column[row] = *cell;
                }
            }
            return;
        }
        self.timestamps.insert(end, timestamp);
        for (column, cell) in self.columns.iter_mut().zip(cells) {
            column.insert(end, *cell);
        }
    }

    /// Remove every row, keeping the columns
    pub fn clear(&mut self) {
        self.timestamps.clear();
        for column in self.columns.iter_mut() {
            column.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels() -> Vec<Channel> {
        vec![Channel::new("ipm2"), Channel::new("ebeam")]
    }

    fn sample_frame() -> JoinedFrame {
        JoinedFrame::from_rows(
            channels(),
            vec![
                (2.0, vec![Some(3.0), Some(30.0)]),
                (0.0, vec![Some(1.0), Some(10.0)]),
                (1.0, vec![Some(2.0), None]),
                (1.5, vec![None, None]),
            ],
        )
    }

    #[test]
    fn test_from_rows_sorts_and_drops_empty() {
        let frame = sample_frame();
        assert_eq!(frame.timestamps(), &[0.0, 1.0, 2.0]);
        assert_eq!(
            frame.column(&Channel::new("ebeam")).unwrap(),
            &[Some(10.0), None, Some(30.0)]
        );
    }

    #[test]
    fn test_present_and_pairs() {
        let frame = sample_frame();
        let (ts, values) = frame.present(&Channel::new("ebeam"));
        assert_eq!(ts, vec![0.0, 2.0]);
        assert_eq!(values, vec![10.0, 30.0]);

        let pairs = frame.pairs(&Channel::new("ebeam"), &Channel::new("ipm2"));
        assert_eq!(pairs, vec![(0.0, 10.0, 1.0), (2.0, 30.0, 3.0)]);
    }

    #[test]
    fn test_select_drops_rows_without_data() {
        let frame = sample_frame();
        let ebeam = frame.select(&[Channel::new("ebeam")]);
        assert_eq!(ebeam.len(), 2);
        assert_eq!(ebeam.channels(), &[Channel::new("ebeam")]);
    }

    #[test]
    fn test_tail_and_keep_last() {
        let mut frame = sample_frame();
        assert_eq!(frame.tail(2).timestamps(), &[1.0, 2.0]);
        assert_eq!(frame.tail(10).len(), 3);
        frame.keep_last(1);
        assert_eq!(frame.timestamps(), &[2.0]);
        assert_eq!(frame.row(0).unwrap().1, vec![Some(3.0), Some(30.0)]);
    }

    #[test]
    fn test_append_late_rows_resorts() {
        let mut frame = sample_frame();
        let late = JoinedFrame::from_rows(channels(), vec![(0.5, vec![Some(1.5), None])]);
        frame.append(&late);
        assert_eq!(frame.timestamps(), &[0.0, 0.5, 1.0, 2.0]);

        let next = JoinedFrame::from_rows(channels(), vec![(3.0, vec![None, Some(40.0)])]);
        frame.append(&next);
        assert_eq!(frame.last_timestamp(), Some(3.0));
        assert_eq!(frame.len(), 5);
    }

    #[test]
    fn test_append_completes_split_events() {
        let mut frame = JoinedFrame::from_rows(
            channels(),
            vec![
                (0.0, vec![Some(1.0), Some(10.0)]),
                (1.0, vec![Some(2.0), None]),
                (2.0, vec![Some(3.0), None]),
            ],
        );
        let late = JoinedFrame::from_rows(
            channels(),
            vec![
                (1.0, vec![None, Some(20.0)]),
                (2.0, vec![None, Some(30.0)]),
                (2.0, vec![None, Some(31.0)]),
            ],
        );
        frame.append(&late);
        assert_eq!(frame.timestamps(), &[0.0, 1.0, 2.0, 2.0]);
        assert_eq!(frame.row(1).unwrap().1, vec![Some(2.0), Some(20.0)]);
        assert_eq!(frame.row(2).unwrap().1, vec![Some(3.0), Some(30.0)]);
        // The row is already full for ebeam, so the second sample gets its own row
        assert_eq!(frame.row(3).unwrap().1, vec![None, Some(31.0)]);
    }

    #[test]
    fn test_append_keeps_overlapping_rows_apart() {
        let mut frame =
            JoinedFrame::from_rows(channels(), vec![(1.0, vec![Some(2.0), None])]);
        let again = JoinedFrame::from_rows(channels(), vec![(1.0, vec![Some(4.0), None])]);
        frame.append(&again);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.column(&Channel::new("ipm2")).unwrap(), &[Some(2.0), Some(4.0)]);
    }
}

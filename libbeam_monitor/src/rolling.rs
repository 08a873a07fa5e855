//! Trailing-window statistics over aligned series.
//!
//! Windows are defined over row count, not wall-clock time: a window of 120 always
//! covers the last 120 rows, whatever the event rate was while they arrived. Absent
//! cells occupy a row of the window but do not count as observations.
//!
//! Median and standard deviation are computed on partial windows during warm-up (as
//! long as `min_periods` observations are available). Correlation is only computed
//! on full windows, and the first `window_size - 1` correlation rows are dropped
//! from the history entirely.
use super::constants::{CORRELATION_COLUMN, LOWER_BAND_COLUMN, UPPER_BAND_COLUMN};

/// A record that can be stored in a WindowedBuffer
pub trait Record: Clone + Send + Sync + 'static {
    fn timestamp(&self) -> f64;
}

/// Rolling median of a channel with its one-sigma band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandRecord {
    pub timestamp: f64,
    pub median: f64,
    pub lowerbound: f64,
    pub higherbound: f64,
}

impl BandRecord {
    /// Column names of a band buffer plotting `value_column`
    pub fn schema(value_column: &str) -> [String; 3] {
        [
            value_column.to_string(),
            LOWER_BAND_COLUMN.to_string(),
            UPPER_BAND_COLUMN.to_string(),
        ]
    }
}

impl Record for BandRecord {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationRecord {
    pub timestamp: f64,
    pub correlation: f64,
}

impl CorrelationRecord {
    pub fn schema() -> [String; 1] {
        [CORRELATION_COLUMN.to_string()]
    }
}

impl Record for CorrelationRecord {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

/// A raw scatter point of two channels at one event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
}

impl Record for PointRecord {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

fn observation(cell: &Option<f64>) -> Option<f64> {
    cell.filter(|v| v.is_finite())
}

fn window_start(row: usize, window_size: usize) -> usize {
    (row + 1).saturating_sub(window_size)
}

/// Sorted multiset of the observations currently inside the window
#[derive(Debug, Default)]
struct SortedWindow {
    values: Vec<f64>,
}

impl SortedWindow {
    fn insert(&mut self, value: f64) {
        let idx = self.values.partition_point(|v| *v < value);
        self.values.insert(idx, value);
    }

    fn remove(&mut self, value: f64) {
        let idx = self.values.partition_point(|v| *v < value);
        if self.values.get(idx) == Some(&value) {
            self.values.remove(idx);
        }
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn median(&self) -> f64 {
        let n = self.values.len();
        if n == 0 {
            return f64::NAN;
        }
        if n % 2 == 1 {
            self.values[n / 2]
        } else {
            0.5 * (self.values[n / 2 - 1] + self.values[n / 2])
        }
    }
}

/// Rolling median over the last `window_size` rows.
///
/// A row yields NaN when its window holds fewer than `min_periods` observations.
pub fn rolling_median(series: &[Option<f64>], window_size: usize, min_periods: usize) -> Vec<f64> {
    if window_size == 0 {
        return vec![f64::NAN; series.len()];
    }
    let min_periods = min_periods.max(1);
    let mut window = SortedWindow::default();
    let mut out = Vec::with_capacity(series.len());
    for (row, cell) in series.iter().enumerate() {
        if let Some(value) = observation(cell) {
            window.insert(value);
        }
        if row >= window_size {
            if let Some(old) = observation(&series[row - window_size]) {
                window.remove(old);
            }
        }
        if window.len() >= min_periods {
            out.push(window.median());
        } else {
            out.push(f64::NAN);
        }
    }
    out
}

/// Rolling sample standard deviation (n - 1 divisor) over the last `window_size` rows.
///
/// A window with a single observation has no spread estimate and yields NaN.
pub fn rolling_std(series: &[Option<f64>], window_size: usize, min_periods: usize) -> Vec<f64> {
    if window_size == 0 {
        return vec![f64::NAN; series.len()];
    }
    let min_periods = min_periods.max(1);
    let mut observations: Vec<f64> = Vec::with_capacity(window_size);
    (0..series.len())
        .map(|row| {
            observations.clear();
            observations.extend(
                series[window_start(row, window_size)..=row]
                    .iter()
                    .filter_map(observation),
            );
            if observations.len() < min_periods.max(2) {
                return f64::NAN;
            }
            let n = observations.len() as f64;
            let mean = observations.iter().sum::<f64>() / n;
            let sum_sq = observations.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
            (sum_sq / (n - 1.0)).sqrt()
        })
        .collect()
}

/// Elementwise `median - std` and `median + std`; NaN in either input gives NaN
pub fn bands(median: &[f64], std: &[f64]) -> (Vec<f64>, Vec<f64>) {
    median
        .iter()
        .zip(std)
        .map(|(m, s)| (m - s, m + s))
        .unzip()
}

fn pearson(pairs: &[(f64, f64)]) -> f64 {
    let n = pairs.len() as f64;
    if pairs.is_empty() {
        return f64::NAN;
    }
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (a, b) in pairs {
        let (da, db) = (a - mean_a, b - mean_b);
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return f64::NAN;
    }
    (cov / (var_a * var_b).sqrt()).clamp(-1.0, 1.0)
}

/// Rolling Pearson correlation of two series over the last `window_size` rows.
///
/// A row is NaN unless every row of its window holds an observation of both series.
/// Zero variance in either series gives NaN. Series of different length are
/// correlated over their common prefix.
pub fn rolling_correlation(a: &[Option<f64>], b: &[Option<f64>], window_size: usize) -> Vec<f64> {
    let len = a.len().min(b.len());
    if window_size == 0 {
        return vec![f64::NAN; len];
    }
    let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(window_size);
    (0..len)
        .map(|row| {
            if row + 1 < window_size {
                return f64::NAN;
            }
            pairs.clear();
            let start = window_start(row, window_size);
            pairs.extend(
                a[start..=row]
                    .iter()
                    .zip(&b[start..=row])
                    .filter_map(|(x, y)| Some((observation(x)?, observation(y)?))),
            );
            if pairs.len() < window_size {
                return f64::NAN;
            }
            pearson(&pairs)
        })
        .collect()
}

/// Correlation time history with the first `window_size - 1` rows removed
pub fn correlation_history(
    timestamps: &[f64],
    a: &[Option<f64>],
    b: &[Option<f64>],
    window_size: usize,
) -> Vec<CorrelationRecord> {
    let correlation = rolling_correlation(a, b, window_size);
    timestamps
        .iter()
        .zip(correlation)
        .skip(window_size.saturating_sub(1))
        .map(|(timestamp, correlation)| CorrelationRecord {
            timestamp: *timestamp,
            correlation,
        })
        .collect()
}

/// RollingStatsEngine applies the rolling statistics with a session's window settings.
///
/// The `*_records` methods take the trailing rows of the previous tick as context,
/// compute over context + new rows, and emit records only for the new rows. This
/// lets a window straddle tick boundaries without re-emitting old records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingStatsEngine {
    window_size: usize,
    min_periods: usize,
}

impl RollingStatsEngine {
    pub fn new(window_size: usize, min_periods: usize) -> Self {
        Self {
            window_size,
            min_periods,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn min_periods(&self) -> usize {
        self.min_periods
    }

    /// Number of trailing rows a caller must keep to continue windows across ticks
    pub fn context_len(&self) -> usize {
        self.window_size.saturating_sub(1)
    }

    pub fn rolling_median(&self, series: &[Option<f64>]) -> Vec<f64> {
        rolling_median(series, self.window_size, self.min_periods)
    }

    pub fn rolling_std(&self, series: &[Option<f64>]) -> Vec<f64> {
        rolling_std(series, self.window_size, self.min_periods)
    }

    pub fn rolling_correlation(&self, a: &[Option<f64>], b: &[Option<f64>]) -> Vec<f64> {
        rolling_correlation(a, b, self.window_size)
    }

    /// Median/band records for the new rows `values` (timestamps `timestamps`)
    pub fn band_records(
        &self,
        context: &[Option<f64>],
        timestamps: &[f64],
        values: &[Option<f64>],
    ) -> Vec<BandRecord> {
        let series: Vec<Option<f64>> = context.iter().chain(values).copied().collect();
        let median = self.rolling_median(&series);
        let std = self.rolling_std(&series);
        let (lower, upper) = bands(&median, &std);
        let offset = context.len();
        timestamps
            .iter()
            .enumerate()
            .map(|(i, timestamp)| BandRecord {
                timestamp: *timestamp,
                median: median[offset + i],
                lowerbound: lower[offset + i],
                higherbound: upper[offset + i],
            })
            .collect()
    }

    /// Correlation records for the new rows.
    ///
    /// Rows whose position in the overall series is below `window_size - 1` are
    /// dropped, so the first records only appear once a full window exists.
    pub fn correlation_records(
        &self,
        context: &[(Option<f64>, Option<f64>)],
        timestamps: &[f64],
        a: &[Option<f64>],
        b: &[Option<f64>],
    ) -> Vec<CorrelationRecord> {
        let (mut series_a, mut series_b): (Vec<Option<f64>>, Vec<Option<f64>>) =
            context.iter().copied().unzip();
        series_a.extend_from_slice(a);
        series_b.extend_from_slice(b);
        let correlation = self.rolling_correlation(&series_a, &series_b);
        let offset = context.len();
        let skip = self.context_len();
        timestamps
            .iter()
            .enumerate()
            .filter(|(i, _)| offset + i >= skip)
            .filter_map(|(i, timestamp)| {
                correlation.get(offset + i).map(|c| CorrelationRecord {
                    timestamp: *timestamp,
                    correlation: *c,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|v| Some(*v)).collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_median_warm_up() {
        let median = rolling_median(&some(&[1.0, 2.0, 3.0, 4.0, 5.0]), 120, 1);
        assert_eq!(median, vec![1.0, 1.5, 2.0, 2.5, 3.0]);
    }

    #[test]
    fn test_median_slides() {
        let median = rolling_median(&some(&[5.0, 1.0, 9.0, 2.0, 2.0]), 3, 1);
        assert_eq!(median, vec![5.0, 3.0, 5.0, 2.0, 2.0]);
    }

    #[test]
    fn test_min_periods_withholds() {
        let series = vec![Some(1.0), None, Some(3.0), Some(5.0)];
        let median = rolling_median(&series, 4, 2);
        assert!(median[0].is_nan());
        assert!(median[1].is_nan());
        assert_eq!(median[2], 2.0);
        assert_eq!(median[3], 3.0);
    }

    #[test]
    fn test_absent_cells_are_not_zero() {
        let series = vec![Some(10.0), None, None, Some(20.0)];
        let median = rolling_median(&series, 10, 1);
        assert_eq!(median, vec![10.0, 10.0, 10.0, 15.0]);
    }

    #[test]
    fn test_std_matches_sample_std() {
        let std = rolling_std(&some(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 120, 1);
        assert!(std[0].is_nan());
        assert!(close(std[1], 2.0_f64.sqrt()));
        assert!(close(std[7], (32.0_f64 / 7.0).sqrt()));

        let windowed = rolling_std(&some(&[1.0, 1.0, 1.0, 8.0]), 3, 1);
        assert_eq!(windowed[2], 0.0);
        assert!(windowed[3] > 0.0);
    }

    #[test]
    fn test_band_ordering() {
        let series = some(&[3.0, 7.0, 1.0, 4.0, 4.0, 9.0, 2.0, 6.0, 5.0, 5.0]);
        let median = rolling_median(&series, 4, 1);
        let std = rolling_std(&series, 4, 1);
        let (lower, upper) = bands(&median, &std);
        assert!(lower[0].is_nan() && upper[0].is_nan());
        for i in 1..series.len() {
            assert!(lower[i] <= median[i] && median[i] <= upper[i]);
        }
    }

    #[test]
    fn test_correlation_needs_full_window() {
        let a: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let b: Vec<f64> = a.iter().map(|v| 2.0 * v + 1.0).collect();
        let corr = rolling_correlation(&some(&a), &some(&b), 4);
        assert!(corr[..3].iter().all(|c| c.is_nan()));
        assert!(corr[3..].iter().all(|c| close(*c, 1.0)));

        let mut gappy = some(&b);
        gappy[5] = None;
        let corr = rolling_correlation(&some(&a), &gappy, 4);
        assert!(corr[5..9].iter().all(|c| c.is_nan()));
        assert!(close(corr[9], 1.0));
    }

    #[test]
    fn test_zero_variance_correlation_is_nan() {
        let a = some(&[1.0, 2.0, 3.0]);
        let flat = some(&[4.0, 4.0, 4.0]);
        assert!(rolling_correlation(&a, &flat, 3)[2].is_nan());
    }

    #[test]
    fn test_correlation_history_drops_warm_up_rows() {
        let timestamps: Vec<f64> = (0..130).map(|i| i as f64).collect();
        let a: Vec<Option<f64>> = timestamps.iter().map(|t| Some(t.sin())).collect();
        let b: Vec<Option<f64>> = timestamps.iter().map(|t| Some(t.cos() + t)).collect();
        let history = correlation_history(&timestamps, &a, &b, 120);
        assert_eq!(history.len(), 11);
        assert_eq!(history[0].timestamp, 119.0);

        assert!(correlation_history(&timestamps[..50], &a[..50], &b[..50], 120).is_empty());
    }

    #[test]
    fn test_band_records_continue_across_ticks() {
        let engine = RollingStatsEngine::new(3, 1);
        let values = some(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let timestamps = [0.0, 1.0, 2.0, 3.0, 4.0];
        let whole = engine.band_records(&[], &timestamps, &values);

        let first = engine.band_records(&[], &timestamps[..3], &values[..3]);
        let context = &values[3 - engine.context_len()..3];
        let second = engine.band_records(context, &timestamps[3..], &values[3..]);
        assert_eq!(first.len() + second.len(), whole.len());
        assert_eq!(second, whole[3..].to_vec());
        assert_eq!(second[0].median, 3.0);
    }

    #[test]
    fn test_correlation_records_continue_across_ticks() {
        let engine = RollingStatsEngine::new(4, 1);
        let timestamps: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let a: Vec<Option<f64>> = timestamps.iter().map(|t| Some(t * t)).collect();
        let b: Vec<Option<f64>> = timestamps.iter().map(|t| Some(t.sqrt())).collect();
        let whole = correlation_history(&timestamps, &a, &b, 4);

        let first = engine.correlation_records(&[], &timestamps[..2], &a[..2], &b[..2]);
        assert!(first.is_empty());
        let context: Vec<(Option<f64>, Option<f64>)> =
            a[..2].iter().copied().zip(b[..2].iter().copied()).collect();
        let second = engine.correlation_records(&context, &timestamps[2..], &a[2..], &b[2..]);
        assert_eq!(second, whole);
    }
}

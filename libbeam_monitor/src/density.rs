use ndarray::Array2;

use super::constants::{DENSITY_HIGH_QUANTILE, DENSITY_LOW_QUANTILE};

/// Quantile of the values with linear interpolation between closest ranks.
///
/// Non-finite values are ignored; returns None if nothing is left.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Evenly spaced bin edges; a degenerate range is widened by half a unit each side
fn edges(low: f64, high: f64, bins: usize) -> Vec<f64> {
    let (low, high) = if high > low {
        (low, high)
    } else {
        (low - 0.5, high + 0.5)
    };
    let step = (high - low) / bins as f64;
    (0..=bins).map(|i| low + step * i as f64).collect()
}

fn bin_of(edges: &[f64], value: f64) -> Option<usize> {
    let (first, last) = (*edges.first()?, *edges.last()?);
    if !(first..=last).contains(&value) {
        return None;
    }
    let bins = edges.len() - 1;
    // The last edge is inclusive
    let idx = edges.partition_point(|e| *e <= value).saturating_sub(1);
    Some(idx.min(bins - 1))
}

/// DensityGrid is a 2-D event count histogram of one channel against another.
///
/// It backs the hex-tile and contour views: axis bounds are taken from the 1st and
/// 99th percentiles of each channel so a handful of outliers does not flatten the
/// plot. Events outside the bounds are counted separately.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    pub x_edges: Vec<f64>,
    pub y_edges: Vec<f64>,
    /// Indexed `[x_bin, y_bin]`
    pub counts: Array2<u64>,
    pub outside: u64,
}

impl DensityGrid {
    /// Bin paired points into `bins x bins` cells.
    ///
    /// Returns None when there are no finite pairs or `bins` is zero.
    pub fn from_points(xs: &[f64], ys: &[f64], bins: usize) -> Option<Self> {
        if bins == 0 {
            return None;
        }
        let pairs: Vec<(f64, f64)> = xs
            .iter()
            .zip(ys)
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|(x, y)| (*x, *y))
            .collect();
        if pairs.is_empty() {
            return None;
        }
        let (px, py): (Vec<f64>, Vec<f64>) = pairs.iter().copied().unzip();
        let x_edges = edges(
            quantile(&px, DENSITY_LOW_QUANTILE)?,
            quantile(&px, DENSITY_HIGH_QUANTILE)?,
            bins,
        );
        let y_edges = edges(
            quantile(&py, DENSITY_LOW_QUANTILE)?,
            quantile(&py, DENSITY_HIGH_QUANTILE)?,
            bins,
        );

        let mut counts = Array2::<u64>::zeros((bins, bins));
        let mut outside = 0;
        for (x, y) in pairs {
            match (bin_of(&x_edges, x), bin_of(&y_edges, y)) {
                (Some(ix), Some(iy)) => counts[[ix, iy]] += 1,
                _ => outside += 1,
            }
        }
        Some(Self {
            x_edges,
            y_edges,
            counts,
            outside,
        })
    }

    pub fn bins(&self) -> usize {
        self.counts.nrows()
    }

    /// Number of events inside the grid
    pub fn total(&self) -> u64 {
        self.counts.sum()
    }

    pub fn max_count(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 0.5), Some(3.0));
        assert!((quantile(&values, 0.99).unwrap() - 4.96).abs() < 1e-9);
        assert_eq!(quantile(&[f64::NAN], 0.5), None);
    }

    #[test]
    fn test_grid_counts_every_event() {
        let xs: Vec<f64> = (0..1000).map(|i| (i % 100) as f64).collect();
        let ys: Vec<f64> = (0..1000).map(|i| (i / 10) as f64).collect();
        let grid = DensityGrid::from_points(&xs, &ys, 30).unwrap();
        assert_eq!(grid.bins(), 30);
        assert_eq!(grid.x_edges.len(), 31);
        assert_eq!(grid.total() + grid.outside, 1000);
        assert!(grid.outside > 0);
    }

    #[test]
    fn test_constant_channel_still_bins() {
        let xs = [2.0; 10];
        let ys: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let grid = DensityGrid::from_points(&xs, &ys, 4).unwrap();
        assert_eq!(grid.x_edges[0], 1.5);
        assert_eq!(grid.counts.row(2).sum() + grid.outside, 10);
    }

    #[test]
    fn test_empty_input() {
        assert!(DensityGrid::from_points(&[], &[], 30).is_none());
        assert!(DensityGrid::from_points(&[1.0], &[f64::NAN], 30).is_none());
        assert!(DensityGrid::from_points(&[1.0], &[1.0], 0).is_none());
    }
}

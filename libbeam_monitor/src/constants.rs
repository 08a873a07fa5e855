// Defaults for the dashboard pipeline. The rolling window of 120 rows matches the
// ~1 Hz-per-event smoothing used on the beamline monitors; it is a per-session
// setting, not a property of any channel.
pub const DEFAULT_WINDOW_SIZE: usize = 120;
pub const DEFAULT_MIN_PERIODS: usize = 1;
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;
pub const DEFAULT_SCATTER_LIMIT: usize = 50;
pub const DEFAULT_DENSITY_BINS: usize = 30;
pub const DEFAULT_DENSITY_HISTORY: usize = 100_000;
pub const DEFAULT_TICK_PERIOD_MS: u64 = 1000;
pub const DEFAULT_LOG_CAPACITY: usize = 100_000;

// Percentile bounds used for the density grid axes
pub const DENSITY_LOW_QUANTILE: f64 = 0.01;
pub const DENSITY_HIGH_QUANTILE: f64 = 0.99;

// Smallest buffer that can still hold both ends of the history after decimation
pub const MIN_BUFFER_CAPACITY: usize = 2;

pub const INDEX_COLUMN: &str = "index";
pub const LOWER_BAND_COLUMN: &str = "lowerbound";
pub const UPPER_BAND_COLUMN: &str = "higherbound";
pub const CORRELATION_COLUMN: &str = "correlation";

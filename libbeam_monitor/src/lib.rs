//! # beam_monitor
//!
//! beam_monitor is the online beam diagnostics backend, written in Rust. It takes scalar
//! channels published by the beamline (intensity monitors, electron beam energy, timing
//! tool edges, ...) each with its own timestamps, aligns them into events, and keeps the
//! rolling statistics and plot buffers that a live dashboard draws from.
//!
//! ## Pipeline
//!
//! Samples enter through the [`registry::SampleSink`] implemented by
//! [`registry::ChannelRegistry`], which appends them to one bounded
//! [`channel_log::ChannelLog`] per channel. The registry is shared by every dashboard
//! session. On each tick a [`session::DashboardSession`]:
//!
//! 1. aligns the samples that arrived since its cursors into a [`frame::JoinedFrame`]
//!    (an outer join on timestamp, absent cells stay absent),
//! 2. extends the rolling median, one-sigma band and correlation of the active channel
//!    with a [`rolling::RollingStatsEngine`], carrying the trailing rows of the previous
//!    tick so windows continue across ticks,
//! 3. appends the new records to capacity-bounded
//!    [`windowed_buffer::WindowedBuffer`]s which decimate on overflow,
//! 4. rebuilds the scatter and [`density::DensityGrid`] views and notifies the
//!    [`session::RenderSink`] with a [`session::DashboardSnapshot`].
//!
//! A [`poller::RateLimitedPoller`] drives the ticks at a fixed period on its own thread.
//! Slow ticks are allowed to finish and the missed ticks are skipped; failing ticks are
//! logged and the poller keeps going.
//!
//! ## Rolling windows
//!
//! Windows are counted in rows, not seconds. A median or band is reported as soon as
//! `min_periods` observations are in the window; the standard deviation uses the n - 1
//! divisor, so a window with a single observation has a NaN band. The correlation is
//! only reported for full windows of complete pairs and its first `window_size - 1`
//! rows never enter the history.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! channels:
//! - ipm2
//! - ipm3
//! - ebeam
//! active_channel: ipm2
//! reference_channel: ebeam
//! correlation_channel: null
//! window_size: 120
//! min_periods: 1
//! buffer_capacity: 1000
//! scatter_limit: 50
//! density_bins: 30
//! density_history: 100000
//! tick_period_ms: 1000
//! log_capacity: 100000
//! csv_path: beam_snapshot.csv
//! autosave_ticks: null
//! ```
//!
//! - `active_channel` is plotted against time and against `reference_channel`
//! - `correlation_channel`, if set, enables the rolling correlation history
//! - `buffer_capacity` bounds the time history and correlation buffers (at least 2)
//! - `scatter_limit` is the number of most recent events shown in the scatter plot
//! - `density_history` is the number of aligned events kept for the density grid and
//!   CSV snapshots
//! - `autosave_ticks`, if set, writes a snapshot to `csv_path` every that many ticks
//!
//! ## Output
//!
//! Snapshots are CSV files with the header `index,<channel...>`. The index column is the
//! event timestamp and cells of channels without a sample at that event are empty.
//! Snapshots are written to a temporary file and renamed into place, so a reader never
//! sees a partial file. The same format can be read back with
//! [`export::read_frame_csv`]; [`session::DashboardSession::load_background`] uses it
//! to show a saved run as the density background behind the live data.
pub mod channel;
pub mod channel_log;
pub mod config;
pub mod constants;
pub mod density;
pub mod error;
pub mod event_aligner;
pub mod export;
pub mod frame;
pub mod poller;
pub mod registry;
pub mod rolling;
pub mod session;
pub mod windowed_buffer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::channel::Channel;
use super::config::Config;
use super::density::DensityGrid;
use super::error::{ConfigError, ExportError, SessionError};
use super::event_aligner::{Cursors, EventAligner};
use super::export::{read_frame_csv, write_frame_csv};
use super::frame::JoinedFrame;
use super::poller::{Pipeline, TickOutcome};
use super::registry::ChannelRegistry;
use super::rolling::{BandRecord, CorrelationRecord, PointRecord, RollingStatsEngine};
use super::windowed_buffer::{BufferSnapshot, Schema, WindowedBuffer};

/// Everything a rendering surface needs to redraw a dashboard
#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    pub tick: u64,
    pub active_channel: Channel,
    pub reference_channel: Channel,
    /// Rolling median and one-sigma band of the active channel
    pub time_history: BufferSnapshot<BandRecord>,
    /// Rolling correlation of the active channel with the correlation channel
    pub correlation: Option<BufferSnapshot<CorrelationRecord>>,
    /// The most recent events, reference channel (x) against active channel (y)
    pub scatter: BufferSnapshot<PointRecord>,
    /// Event density of the reference channel against the active channel
    pub density: Option<Arc<DensityGrid>>,
    /// Density of a saved snapshot over the same two channels, drawn behind the live one
    pub background: Option<Arc<DensityGrid>>,
    /// Aligned events currently held by the session
    pub events: usize,
}

/// Receives a snapshot after every tick that produced new data.
pub trait RenderSink: Send {
    fn notify(&mut self, snapshot: &DashboardSnapshot);
}

impl<F> RenderSink for F
where
    F: FnMut(&DashboardSnapshot) + Send,
{
    fn notify(&mut self, snapshot: &DashboardSnapshot) {
        self(snapshot)
    }
}

/// A sink that discards every snapshot
#[derive(Debug, Default)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn notify(&mut self, _snapshot: &DashboardSnapshot) {}
}

/// DashboardSession is the pipeline state of one dashboard connection.
///
/// Channel logs are shared by every session through the registry; cursors, rolling
/// context and buffers belong to the session alone, so two browsers looking at the
/// same channels never interfere. Each tick aligns the new samples, extends the
/// rolling statistics, appends to the buffers and notifies the rendering sink.
pub struct DashboardSession {
    registry: Arc<ChannelRegistry>,
    aligner: EventAligner,
    stats: RollingStatsEngine,
    cursors: Cursors,
    active: Channel,
    reference: Channel,
    correlation_channel: Option<Channel>,
    band_context: Vec<Option<f64>>,
    correlation_context: Vec<(Option<f64>, Option<f64>)>,
    history: JoinedFrame,
    history_limit: usize,
    time_history: WindowedBuffer<BandRecord>,
    correlation: Option<WindowedBuffer<CorrelationRecord>>,
    scatter: BufferSnapshot<PointRecord>,
    scatter_limit: usize,
    density: Option<Arc<DensityGrid>>,
    density_bins: usize,
    background_frame: Option<JoinedFrame>,
    background: Option<Arc<DensityGrid>>,
    autosave: Option<(PathBuf, u64)>,
    ticks: u64,
    sink: Box<dyn RenderSink>,
}

fn scatter_schema(reference: &Channel, active: &Channel) -> Schema {
    Schema::new([reference.name(), active.name()])
}

impl DashboardSession {
    /// Create a session reading from `registry`.
    ///
    /// The config is validated and every configured channel must exist in the
    /// registry.
    pub fn new(
        config: &Config,
        registry: Arc<ChannelRegistry>,
        sink: Box<dyn RenderSink>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let channels = config.channel_list();
        if let Some(missing) = channels.iter().find(|c| !registry.contains(c)) {
            return Err(SessionError::UnknownChannel(missing.to_string()));
        }
        let active = Channel::new(&config.active_channel);
        let reference = Channel::new(&config.reference_channel);
        let correlation_channel = config.correlation_channel.as_deref().map(Channel::new);

        let time_history = WindowedBuffer::new(
            Schema::new(BandRecord::schema(active.name())),
            config.buffer_capacity,
        );
        let correlation = correlation_channel.as_ref().map(|_| {
            WindowedBuffer::new(
                Schema::new(CorrelationRecord::schema()),
                config.buffer_capacity,
            )
        });
        let scatter = BufferSnapshot::new(scatter_schema(&reference, &active), Vec::new());
        let autosave = config
            .autosave_ticks
            .filter(|every| *every > 0)
            .map(|every| (config.csv_path.clone(), every));

        Ok(Self {
            registry,
            aligner: EventAligner::new(channels.clone()),
            stats: RollingStatsEngine::new(config.window_size, config.min_periods),
            cursors: Cursors::new(),
            active,
            reference,
            correlation_channel,
            band_context: Vec::new(),
            correlation_context: Vec::new(),
            history: JoinedFrame::new(channels),
            history_limit: config.density_history,
            time_history,
            correlation,
            scatter,
            scatter_limit: config.scatter_limit,
            density: None,
            density_bins: config.density_bins,
            background_frame: None,
            background: None,
            autosave,
            ticks: 0,
            sink,
        })
    }

    pub fn active_channel(&self) -> &Channel {
        &self.active
    }

    pub fn cursors(&self) -> &Cursors {
        &self.cursors
    }

    /// Aligned events kept by this session
    pub fn history(&self) -> &JoinedFrame {
        &self.history
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn dropped_samples(&self) -> u64 {
        self.aligner.dropped_total()
    }

    /// Run one pass of the pipeline over the samples received since the last tick
    pub fn tick(&mut self) -> Result<TickOutcome, SessionError> {
        let (frame, cursors) = self.aligner.align(self.registry.as_ref(), &self.cursors);
        self.cursors = cursors;
        if frame.is_empty() {
            return Ok(TickOutcome::Idle);
        }
        self.ticks += 1;

        self.extend_time_history(&frame);
        self.extend_correlation(&frame);
        self.history.append(&frame);
        self.history.keep_last(self.history_limit);
        self.refresh_views();

        self.sink.notify(&self.snapshot());

        if let Some((path, every)) = &self.autosave {
            if self.ticks % every == 0 {
                write_frame_csv(&self.history, path)?;
                log::info!("Saved session snapshot to {}", path.display());
            }
        }
        Ok(TickOutcome::Updated { rows: frame.len() })
    }

    /// Switch the plotted channel.
    ///
    /// All derived buffers are cleared so the next tick starts the new channel from
    /// an empty plot; the scatter and density views are rebuilt immediately from the
    /// events already held and the sink is notified.
    pub fn select_channel(&mut self, name: &str) -> Result<(), SessionError> {
        let channel = self
            .aligner
            .channels()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .ok_or_else(|| SessionError::UnknownChannel(name.to_string()))?;
        if channel == self.active {
            return Ok(());
        }
        log::info!("Switching active channel from {} to {}", self.active, channel);
        self.active = channel;
        if self.correlation_channel.as_ref() == Some(&self.active) {
            log::warn!(
                "Active channel {} is also the correlation channel; correlation is paused",
                self.active
            );
        }
        self.clear_derived();
        self.refresh_views();
        self.rebuild_background();
        self.sink.notify(&self.snapshot());
        Ok(())
    }

    /// Load a CSV snapshot (as written by [`DashboardSession::save_csv`]) as the
    /// density background. The background follows later channel switches.
    pub fn load_background(&mut self, path: &Path) -> Result<(), SessionError> {
        let frame = read_frame_csv(path)?;
        log::info!(
            "Loaded {} background events from {}",
            frame.len(),
            path.display()
        );
        self.background_frame = Some(frame);
        self.rebuild_background();
        self.sink.notify(&self.snapshot());
        Ok(())
    }

    /// Change how many recent events the scatter view shows
    pub fn set_scatter_limit(&mut self, limit: usize) -> Result<(), SessionError> {
        if limit == 0 {
            return Err(ConfigError::InvalidCapacity {
                name: "scatter",
                value: limit,
                min: 1,
            }
            .into());
        }
        self.scatter_limit = limit;
        self.refresh_views();
        self.sink.notify(&self.snapshot());
        Ok(())
    }

    /// Forget everything shown so far and only plot samples that arrive from now on
    pub fn clear(&mut self) {
        self.cursors = Cursors::from(self.registry.end_cursors());
        self.history.clear();
        self.clear_derived();
        self.refresh_views();
        log::info!("Cleared session; plotting new samples only");
    }

    /// Write the aligned events of this session to a CSV file
    pub fn save_csv(&self, path: &Path) -> Result<(), ExportError> {
        write_frame_csv(&self.history, path)?;
        log::info!(
            "Saved {} events to {}",
            self.history.len(),
            path.display()
        );
        Ok(())
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            tick: self.ticks,
            active_channel: self.active.clone(),
            reference_channel: self.reference.clone(),
            time_history: self.time_history.read(),
            correlation: self.correlation.as_ref().map(WindowedBuffer::read),
            scatter: self.scatter.clone(),
            density: self.density.clone(),
            background: self.background.clone(),
            events: self.history.len(),
        }
    }

    fn clear_derived(&mut self) {
        self.time_history
            .reset_schema(Schema::new(BandRecord::schema(self.active.name())));
        if let Some(correlation) = self.correlation.as_mut() {
            correlation.clear();
        }
        self.band_context.clear();
        self.correlation_context.clear();
    }

    fn extend_time_history(&mut self, frame: &JoinedFrame) {
        let (timestamps, values) = frame.present(&self.active);
        if timestamps.is_empty() {
            return;
        }
        let values: Vec<Option<f64>> = values.into_iter().map(Some).collect();
        let records = self
            .stats
            .band_records(&self.band_context, &timestamps, &values);
        self.time_history.append(records);

        self.band_context.extend(values);
        let excess = self
            .band_context
            .len()
            .saturating_sub(self.stats.context_len());
        self.band_context.drain(..excess);
    }

    fn extend_correlation(&mut self, frame: &JoinedFrame) {
        let (Some(other), Some(buffer)) = (&self.correlation_channel, self.correlation.as_mut())
        else {
            return;
        };
        if *other == self.active {
            return;
        }
        let pair = frame.select(&[self.active.clone(), other.clone()]);
        if pair.is_empty() {
            return;
        }
        let (Some(a), Some(b)) = (pair.column(&self.active), pair.column(other)) else {
            return;
        };
        let records =
            self.stats
                .correlation_records(&self.correlation_context, pair.timestamps(), a, b);
        buffer.append(records);

        self.correlation_context
            .extend(a.iter().copied().zip(b.iter().copied()));
        let excess = self
            .correlation_context
            .len()
            .saturating_sub(self.stats.context_len());
        self.correlation_context.drain(..excess);
    }

    fn refresh_views(&mut self) {
        let pairs = self.history.pairs(&self.reference, &self.active);
        let start = pairs.len().saturating_sub(self.scatter_limit);
        let points = pairs[start..]
            .iter()
            .map(|(timestamp, x, y)| PointRecord {
                timestamp: *timestamp,
                x: *x,
                y: *y,
            })
            .collect();
        self.scatter = BufferSnapshot::new(scatter_schema(&self.reference, &self.active), points);

        let (xs, ys): (Vec<f64>, Vec<f64>) = pairs.iter().map(|(_, x, y)| (*x, *y)).unzip();
        self.density = DensityGrid::from_points(&xs, &ys, self.density_bins).map(Arc::new);
    }
}

impl DashboardSession {
    fn rebuild_background(&mut self) {
        let Some(frame) = &self.background_frame else {
            return;
        };
        let pairs = frame.pairs(&self.reference, &self.active);
        if pairs.is_empty() {
            log::warn!(
                "Background has no events with both {} and {}",
                self.reference,
                self.active
            );
        }
        let (xs, ys): (Vec<f64>, Vec<f64>) = pairs.iter().map(|(_, x, y)| (*x, *y)).unzip();
        self.background = DensityGrid::from_points(&xs, &ys, self.density_bins).map(Arc::new);
    }
}

impl Pipeline for DashboardSession {
    type Error = SessionError;

    fn tick(&mut self) -> Result<TickOutcome, SessionError> {
        DashboardSession::tick(self)
    }

    fn select_channel(&mut self, channel: &str) -> Result<(), SessionError> {
        DashboardSession::select_channel(self, channel)
    }
}

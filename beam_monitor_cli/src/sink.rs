use libbeam_monitor::session::{DashboardSnapshot, RenderSink};

/// Logs a one line summary of every dashboard snapshot
#[derive(Debug, Default)]
pub struct TerminalSink;

pub fn summarize(snapshot: &DashboardSnapshot) -> String {
    let mut line = format!(
        "Tick {}: {} events, {}",
        snapshot.tick, snapshot.events, snapshot.active_channel
    );
    match snapshot.time_history.records().last() {
        Some(band) => line.push_str(&format!(
            " median {:.4} [{:.4}, {:.4}]",
            band.median, band.lowerbound, band.higherbound
        )),
        None => line.push_str(" has no data yet"),
    }
    if let Some(last) = snapshot
        .correlation
        .as_ref()
        .and_then(|c| c.records().last())
    {
        line.push_str(&format!(", correlation {:.3}", last.correlation));
    }
    if let Some(grid) = &snapshot.density {
        line.push_str(&format!(
            ", {} vs {} peak density {}",
            snapshot.active_channel,
            snapshot.reference_channel,
            grid.max_count()
        ));
    }
    if let Some(background) = &snapshot.background {
        line.push_str(&format!(", background peak {}", background.max_count()));
    }
    line
}

impl RenderSink for TerminalSink {
    fn notify(&mut self, snapshot: &DashboardSnapshot) {
        log::info!("{}", summarize(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libbeam_monitor::channel::Channel;
    use libbeam_monitor::rolling::{BandRecord, PointRecord};
    use libbeam_monitor::windowed_buffer::{BufferSnapshot, Schema};

    #[test]
    fn test_summary_line() {
        let snapshot = DashboardSnapshot {
            tick: 3,
            active_channel: Channel::new("ipm2"),
            reference_channel: Channel::new("ebeam"),
            time_history: BufferSnapshot::new(
                Schema::new(BandRecord::schema("ipm2")),
                vec![BandRecord {
                    timestamp: 1.0,
                    median: 0.5,
                    lowerbound: 0.25,
                    higherbound: 0.75,
                }],
            ),
            correlation: None,
            scatter: BufferSnapshot::<PointRecord>::new(Schema::new(["ebeam", "ipm2"]), vec![]),
            density: None,
            background: None,
            events: 10,
        };
        assert_eq!(
            summarize(&snapshot),
            "Tick 3: 10 events, ipm2 median 0.5000 [0.2500, 0.7500]"
        );
    }
}

mod replay;
mod sink;

use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use simplelog::{CombinedLogger, LevelFilter, TermLogger, WriteLogger};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use libbeam_monitor::config::Config;
use libbeam_monitor::poller::RateLimitedPoller;
use libbeam_monitor::registry::ChannelRegistry;
use libbeam_monitor::session::DashboardSession;

use replay::{feed, read_replay};
use sink::TerminalSink;

const LOG_FILE: &str = "beam_monitor.log";

fn main() {
    // Create a cli
    let matches = Command::new("beam_monitor_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .arg(
            Arg::new("replay")
                .short('r')
                .long("replay")
                .help("CSV file of channel,timestamp,value samples to replay"),
        )
        .arg(
            Arg::new("speed")
                .long("speed")
                .value_parser(clap::value_parser!(f64))
                .default_value("0")
                .help("Replay speed relative to the recorded timestamps (0 replays as fast as possible)"),
        )
        .arg(
            Arg::new("background")
                .short('b')
                .long("background")
                .help("CSV snapshot to show as the density background"),
        )
        .arg(
            Arg::new("select")
                .short('s')
                .long("select")
                .help("Switch the active channel half way through the replay"),
        )
        .get_matches();

    // Initialize feedback
    let log_file = File::create(LOG_FILE).expect("Could not create the log file!");
    let logger = CombinedLogger::new(vec![
        TermLogger::new(
            LevelFilter::Info,
            simplelog::Config::default(),
            simplelog::TerminalMode::Mixed,
            simplelog::ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, simplelog::Config::default(), log_file),
    ]);

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");
    log::set_max_level(LevelFilter::Info);

    // Parse the cli
    let Some(config_path) = matches.get_one::<String>("path").map(PathBuf::from) else {
        log::error!("A configuration path is required");
        return;
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match Config::default().write_config_file(&config_path) {
            Ok(()) => log::info!("Done."),
            Err(e) => log::error!("{e}"),
        }
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Channels: {}", config.channels.join(", "));
    log::info!(
        "Active: {} Reference: {} Correlation: {}",
        config.active_channel,
        config.reference_channel,
        config.correlation_channel.as_deref().unwrap_or("none")
    );
    log::info!(
        "Window: {} rows (min periods {}) Buffer capacity: {}",
        config.window_size,
        config.min_periods,
        config.buffer_capacity
    );
    log::info!("Tick period: {} ms", config.tick_period_ms);
    log::info!("CSV Path: {}", config.csv_path.to_string_lossy());

    let Some(replay_path) = matches.get_one::<String>("replay").map(PathBuf::from) else {
        log::error!("No replay file given; use --replay to provide recorded samples");
        return;
    };
    let speed = matches.get_one::<f64>("speed").copied().unwrap_or_default();
    let select = matches.get_one::<String>("select").cloned();
    let background = matches.get_one::<String>("background").map(PathBuf::from);

    log::info!("Reading samples from {}...", replay_path.to_string_lossy());
    let samples = match read_replay(&replay_path) {
        Ok(s) => s,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Loaded {} samples.", samples.len());

    // Build the pipeline
    let registry = Arc::new(ChannelRegistry::from_config(&config));
    let mut session =
        match DashboardSession::new(&config, registry.clone(), Box::new(TerminalSink)) {
            Ok(s) => s,
            Err(e) => {
                log::error!("{e}");
                return;
            }
        };
    if let Some(path) = background {
        if let Err(e) = session.load_background(&path) {
            log::error!("{e}");
        }
    }
    let mut poller = RateLimitedPoller::new(session, config.tick_period());
    if let Err(e) = poller.start() {
        log::error!("{e}");
        return;
    }

    // Setup the progress bar
    let total = samples.len() as u64;
    let pb = pb_manager.add(ProgressBar::new(total));
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} samples") {
        pb.set_style(style);
    }
    let feeder_pb = pb.clone();
    let feeder_registry = registry.clone();
    // Spawn the replay!
    let handle = std::thread::spawn(move || {
        feed(&samples, feeder_registry.as_ref(), speed, &feeder_pb)
    });

    let mut pending_select = select;
    loop {
        std::thread::sleep(Duration::from_millis(100));
        if pb.position() * 2 >= total {
            if let Some(channel) = pending_select.take() {
                match poller.select_channel(&channel) {
                    Ok(()) => log::info!("Switched to channel {channel}"),
                    Err(e) => log::error!("{e}"),
                }
            }
        }
        if handle.is_finished() {
            if handle.join().is_err() {
                log::error!("Failed to join replay task!");
            }
            break;
        }
    }
    pb.finish();

    // Pick up whatever arrived after the last scheduled tick
    if let Err(e) = poller.stop() {
        log::error!("{e}");
    }
    poller.tick_now();

    let stats = poller.stats();
    log::info!(
        "Ran {} ticks ({} with new data, {} failed, {} overran)",
        stats.ticks,
        stats.updates,
        stats.failures,
        stats.overruns
    );
    poller.with_pipeline(|session| {
        log::info!(
            "Aligned {} events, dropped {} non-numeric samples",
            session.history().len(),
            session.dropped_samples()
        );
        match session.save_csv(&config.csv_path) {
            Ok(()) => log::info!("Successfully saved snapshot!"),
            Err(e) => log::error!("Saving the snapshot failed with error: {e}"),
        }
    });

    log::info!("Done.");
}

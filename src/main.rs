// src/main.rs
mod analysis;
mod calibration;
mod codec;
mod config;
mod drivers;
mod engine;
mod recorder;
mod types;
mod visualizer;
use std::io::BufRead;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use crate::analysis::TouchAnalyzer;
use crate::calibration::{CalibrationEngine, ProfileStore};
use crate::codec::FrameCodec;
use crate::config::Config;
use crate::drivers::{
    ChannelSampler, FileStore, FlagInput, SerialSampler, SimulatedSampler, SystemClock,
    TerminalStrip, UdpTransport,
};
use crate::engine::{
    log_metrics, run_local_analysis, LogConsumer, MetricsConsumer, ReceivingNode, SensingNode,
};
use crate::recorder::FrameRecorder;
use crate::visualizer::LedRing;

#[derive(Parser, Debug)]
#[command(name = "touchlink", about = "Touch-strip sensing, streaming and visualization")]
struct Cli {
    /// JSON config file; defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample the touch channels and stream them to a display node
    Sense {
        /// Display node address
        #[arg(long)]
        peer: SocketAddr,
        #[arg(long, default_value = "0.0.0.0:0")]
        bind: String,
        /// Serial port of the touch controller; simulated channels when omitted
        #[arg(long)]
        serial: Option<String>,
    },
    /// Receive frames, subtract the session baseline and show them
    Display {
        #[arg(long, default_value = "0.0.0.0:4210")]
        bind: String,
        /// Write every frame to this CSV file
        #[arg(long)]
        record: Option<PathBuf>,
        /// Render the LED ring in the terminal
        #[arg(long)]
        leds: bool,
        /// Print grip metrics using the stored calibration profile
        #[arg(long)]
        metrics: bool,
    },
    /// Report grip metrics from a locally attached sampler
    Analyze {
        #[arg(long)]
        serial: Option<String>,
    },
    /// Run the two-phase calibration and store the profile
    Calibrate {
        #[arg(long)]
        serial: Option<String>,
    },
}

fn open_sampler(serial: Option<&str>, config: &Config) -> Result<Box<dyn ChannelSampler>> {
    Ok(match serial {
        Some(port) => {
            info!("Reading touch channels from {port}");
            let sampler = SerialSampler::open(port, config.serial_baud, config.channel_count)
                .with_context(|| format!("opening serial port {port}"))?;
            Box::new(sampler)
        }
        None => {
            info!("No serial port given, using simulated touch channels");
            Box::new(SimulatedSampler::new(config.channel_count))
        }
    })
}

fn profile_store(config: &Config) -> ProfileStore<FileStore> {
    let (dir, key) = config.calibration_location();
    ProfileStore::new(FileStore::new(dir), &key, config.channel_count)
}

// Enter on stdin plays the role of the stop button.
fn stop_on_enter() -> FlagInput {
    let stop = FlagInput::new();
    let pressed = stop.clone();
    thread::spawn(move || {
        let mut line = String::new();
        // A closed stdin (daemon use) never stops the loop.
        if let Ok(n) = std::io::stdin().lock().read_line(&mut line) {
            if n > 0 {
                pressed.press();
            }
        }
    });
    info!("Press Enter to stop.");
    stop
}

fn sense(config: &Config, peer: SocketAddr, bind: &str, serial: Option<&str>) -> Result<()> {
    let sampler = open_sampler(serial, config)?;
    let transport = UdpTransport::bind(bind).context("binding sensing socket")?;
    let mut node = SensingNode::new(
        sampler,
        transport,
        peer,
        stop_on_enter(),
        SystemClock::new(),
        FrameCodec::new(config.channel_count),
        config.loop_timing(),
    )?;
    node.run()?;
    Ok(())
}

fn display(
    config: &Config,
    bind: &str,
    record: Option<PathBuf>,
    leds: bool,
    metrics: bool,
) -> Result<()> {
    let transport = UdpTransport::bind(bind).context("binding display socket")?;
    info!("Listening on {}", transport.local_addr()?);
    let mut node = ReceivingNode::new(
        transport,
        SystemClock::new(),
        FrameCodec::new(config.channel_count),
        config.baseline_frames,
        config.loop_timing().fault_cooldown,
    )
    .with_consumer(LogConsumer);
    if metrics {
        let analyzer = TouchAnalyzer::new(
            profile_store(config).load_or_default(),
            config.active_threshold,
        );
        node = node.with_consumer(MetricsConsumer::new(analyzer));
    }
    if leds {
        let layout = config.ring_layout();
        let ring = LedRing::new(
            TerminalStrip::stdout(layout.led_count),
            layout,
            config.led_max_value,
            config.channel_count,
        )?;
        node = node.with_consumer(ring);
    }
    if let Some(path) = record {
        let recorder = FrameRecorder::create(&path, config.channel_count)
            .with_context(|| format!("creating {}", path.display()))?;
        node = node.with_consumer(recorder);
    }
    node.run()?;
    Ok(())
}

fn analyze(config: &Config, serial: Option<&str>) -> Result<()> {
    let mut sampler = open_sampler(serial, config)?;
    let analyzer = TouchAnalyzer::new(
        profile_store(config).load_or_default(),
        config.active_threshold,
    );
    let reports = run_local_analysis(
        &mut sampler,
        &analyzer,
        &mut stop_on_enter(),
        &mut SystemClock::new(),
        config.loop_timing().refresh_interval,
        log_metrics,
    )?;
    info!("Analysis stopped after {reports} reports");
    Ok(())
}

fn calibrate(config: &Config, serial: Option<&str>) -> Result<()> {
    let mut sampler = open_sampler(serial, config)?;
    let mut engine = CalibrationEngine::new(profile_store(config), config.calibration_timing());
    engine
        .calibrate(&mut sampler, &mut SystemClock::new())
        .context("calibration failed")?;
    info!(
        "Profile written to {}",
        config.calibration_path.display()
    );
    Ok(())
}

// 入口函数
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading config")?;
    match cli.command {
        Command::Sense { peer, bind, serial } => sense(&config, peer, &bind, serial.as_deref()),
        Command::Display {
            bind,
            record,
            leds,
            metrics,
        } => display(&config, &bind, record, leds, metrics),
        Command::Analyze { serial } => analyze(&config, serial.as_deref()),
        Command::Calibrate { serial } => calibrate(&config, serial.as_deref()),
    }
}

// src/main.rs
mod config;
mod console;
mod drivers;
mod engine;
mod recorder;
mod types;
mod waveform;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use log::info;

use crate::config::{AppConfig, DaqConfig, DriverConfig, DEFAULT_CONFIG_PATH};
use crate::drivers::{
    BurstSummary, LinkSource, Negotiator, SampleSource, SimulatedSource, SystemPorts,
};
use crate::engine::DriverEngine;
use crate::recorder::BurstRecorder;

const USAGE: &str = "usage: wavedrive [drive|acquire] [config.json]";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let mut args = std::env::args().skip(1);
    let mode = args.next().unwrap_or_else(|| "drive".to_string());
    let config_path = args
        .next()
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = AppConfig::load(&config_path)?;
    match mode.as_str() {
        "drive" => run_driver(&config.driver),
        "acquire" => run_acquisition(&config.daq),
        "-h" | "--help" => {
            println!("{USAGE}");
            Ok(())
        }
        other => bail!("unknown mode `{other}`\n{USAGE}"),
    }
}

/// Actuator driver: encode the test plan, find the controller, then hand
/// the link to the engine thread and read operator commands.
fn run_driver(config: &DriverConfig) -> Result<()> {
    let sheets = config.load_sheets()?;
    let table = waveform::encode(&sheets, &config.scaling()).context("test plan rejected")?;
    if table.main_sheet().is_none() {
        bail!("no test-plan sheets configured");
    }
    let negotiator = Negotiator::new(
        SystemPorts::new(config.read_timeout()),
        config.negotiation_profile(),
    );
    let link = negotiator
        .negotiate_system(config.manual_hint().as_deref())
        .context("actuator driver not found")?;
    info!("actuator driver on {} at {} baud", link.port_name(), link.baud_rate());

    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (msg_tx, msg_rx) = mpsc::channel();
    let engine = DriverEngine::new(link, table.clone(), config.engine_timing());
    let worker = engine::spawn_thread(engine, msg_tx, cmd_rx);
    let reporter = console::spawn_reporter(msg_rx);

    let outcome = console::run_console(std::io::stdin().lock(), &table, &cmd_tx);
    drop(cmd_tx);
    worker
        .join()
        .map_err(|_| anyhow!("driver engine thread panicked"))?;
    reporter.join().ok();
    outcome
}

/// Accelerometer: one burst, conditioned, summarized and optionally saved.
fn run_acquisition(config: &DaqConfig) -> Result<()> {
    let expected = config.sample_count();
    let started = Instant::now();
    let burst = if config.simulate {
        info!("simulating {expected} samples over {} s", config.duration_s);
        SimulatedSource::new(config.calibration.profiles(), config.simulated_noise)
            .acquire(expected, config.duration_s)?
    } else {
        let negotiator = Negotiator::new(
            SystemPorts::new(config.read_timeout()),
            config.negotiation_profile(),
        );
        let mut link = negotiator
            .negotiate_system(config.manual_hint().as_deref())
            .context("accelerometer not found")?;
        info!("acquiring {expected} samples over {} s", config.duration_s);
        let burst = LinkSource::new(&mut link).acquire(expected, config.duration_s);
        link.disconnect();
        burst?
    };
    info!(
        "acquisition finished in {:.4} s",
        started.elapsed().as_secs_f64()
    );

    let samples = config.conditioner().condition(burst)?;
    if let Some(summary) = BurstSummary::from_samples(&samples) {
        let [x, y, z] = summary.mean;
        info!("average X: {x:.2} Y: {y:.2} Z: {z:.2} m/s^2");
        info!("magnitude: {:.2} m/s^2", summary.magnitude);
    }
    if config.export_enabled {
        BurstRecorder::new(&config.export_dir, config.export_prefix.as_str())
            .export(&samples)
            .context("failed to export acceleration data")?;
    }
    Ok(())
}

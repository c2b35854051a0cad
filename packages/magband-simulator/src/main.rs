//! main.rs — Magband IMU simulator entry point
//!
//! Runs the wrist kinematics and sensor measurement chain at the configured
//! sample rate and streams binary telemetry frames to the hub over UDP.
//! Scenario presets reproduce the conditions the fusion pipeline must
//! survive: rest tremor, calibration rotation sweeps, finger presses,
//! dropped samples, magnetic interference, and the 26/50 Hz rate mismatch.

mod imu_physics;
mod scenarios;
mod udp_tx;
mod wrist_sim;

use std::time::Duration;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::interval;
use tracing::{info, warn};

use imu_physics::SensorConfig;
use magband_fusion::DipoleConfig;
use scenarios::ScenarioConfig;
use udp_tx::FrameTransmitter;
use wrist_sim::{MotionConfig, WristSim};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "magband-sim", about = "Magband wrist-IMU hardware simulator")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// UDP hub address
    #[arg(long, default_value = "127.0.0.1:5560")]
    hub_addr: String,
    /// Enable UDP multicast (mirrors a multi-band fleet on one AP)
    #[arg(long)]
    multicast: bool,
    /// Simulation speed multiplier (1.0 = real-time)
    #[arg(long, default_value = "1.0")]
    speed: f64,
    /// Scenario preset: rest, press, calibration, interference, dropout,
    /// rate-switch
    #[arg(long, default_value = "rest")]
    scenario: String,
    /// Print ground-truth JSON lines to stdout
    #[arg(long)]
    emit_truth: bool,
    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "magband_simulator=info".into()),
        )
        .init();

    let args = Args::parse();

    let config_str = std::fs::read_to_string(&args.config)
        .unwrap_or_else(|_| include_str!("../config.toml").to_string());
    let cfg: FullConfig = toml::from_str(&config_str).expect("Invalid config.toml");

    let scenario = match scenarios::preset(&args.scenario) {
        Some(s) => s,
        None => {
            warn!("Unknown scenario preset '{}', using rest", args.scenario);
            ScenarioConfig::default()
        }
    };

    info!(
        "⌚ Magband simulator starting — {} Hz base rate, scenario '{}', hub {}",
        cfg.session.sample_rate_hz, args.scenario, args.hub_addr
    );

    let mc_addr = args.multicast.then_some("239.255.0.2:5560");
    let transmitter =
        FrameTransmitter::new(&args.hub_addr, mc_addr).expect("Failed to bind UDP socket");

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut sim = WristSim::new(&cfg.motion);
    let dipoles = DipoleConfig::default();
    let mut battery = cfg.sensors.battery_start_pct;
    let mut t_device_ms: u32 = 0;
    let mut sample_counter: u32 = 0;

    // Tick at the base rate; the RateSwitch scenario stretches device
    // timestamps instead of re-arming the timer.
    let base_rate = cfg.session.sample_rate_hz;
    let epoch = Duration::from_secs_f64(1.0 / (base_rate * args.speed));
    let mut ticker = interval(epoch);

    loop {
        ticker.tick().await;

        let rate = scenario.sample_rate_hz(base_rate, sim.state.t_elapsed);
        let dt = 1.0 / rate;
        sim.tick(dt, &scenario);
        t_device_ms = t_device_ms.wrapping_add((dt * 1000.0).round() as u32);
        sample_counter += 1;

        // Battery drains ~1% per simulated 90 s.
        if sample_counter % (90 * base_rate as u32) == 0 {
            battery = battery.saturating_sub(1);
        }

        let fingertips = sim.state.fingertips(&sim.hand);
        let (raw, truth) = imu_physics::generate_sample(
            &sim.state,
            &fingertips,
            &dipoles,
            &cfg.sensors,
            &scenario,
            t_device_ms,
            battery,
            &mut rng,
        );

        if scenario.is_sample_dropped(sample_counter) {
            continue;
        }

        transmitter.send_sample(&raw);

        if args.emit_truth {
            match serde_json::to_string(&truth) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("truth serialize failed: {e}"),
            }
        }

        if sample_counter % (10 * base_rate as u32) == 0 {
            info!(
                "⏱ t={:.0}s | samples={} | roll={:+.1}° pitch={:+.1}° | flexion[{}]={:.2}",
                sim.state.t_elapsed,
                sample_counter,
                truth.roll_deg,
                truth.pitch_deg,
                scenario.press_finger,
                sim.state.flexion[scenario.press_finger.min(4)],
            );
        }
    }
}

// ── Config structs ────────────────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct FullConfig {
    session: SessionConfig,
    motion: MotionConfig,
    sensors: SensorConfig,
}

#[derive(Debug, serde::Deserialize)]
struct SessionConfig {
    sample_rate_hz: f64,
}

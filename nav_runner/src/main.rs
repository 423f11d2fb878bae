mod camera;
mod vehicle;

use std::env;
use std::time::Duration;

use anyhow::{bail, Context};
use nav_link::{start_server, LinkBus, ServerConfig};
use smart_nav::core_modules::hardware::{ScriptedRanger, SimulatedMotorController, SyntheticCamera};
use smart_nav::{FrameSource, NavConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::camera::DirectoryCamera;
use crate::vehicle::Vehicle;

const USAGE: &str = "Usage: nav_runner [--config <file.yaml>] [--frames <dir>] [--cycles <n>] [--bind <addr>] [--auto]";

#[derive(Debug, Default)]
struct Args {
    config: Option<String>,
    frames: Option<String>,
    cycles: Option<u64>,
    bind: Option<String>,
    auto: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut it = env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |name: &str| it.next().with_context(|| format!("{name} needs a value\n{USAGE}"));
        match arg.as_str() {
            "--config" => args.config = Some(value("--config")?),
            "--frames" => args.frames = Some(value("--frames")?),
            "--cycles" => {
                let raw = value("--cycles")?;
                args.cycles = Some(raw.parse().with_context(|| format!("--cycles: not a number: {raw}"))?);
            }
            "--bind" => args.bind = Some(value("--bind")?),
            "--auto" => args.auto = true,
            other => bail!("unknown argument {other}\n{USAGE}"),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Argument Parsing & Configuration ---
    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => NavConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => NavConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // --- 2. Collaborators ---
    let camera: Box<dyn FrameSource> = match &args.frames {
        Some(dir) => {
            let camera = DirectoryCamera::open(dir)?;
            info!(dir = %dir, frames = camera.frame_count(), "replaying frames");
            Box::new(camera)
        }
        None => {
            info!("using synthetic lane camera");
            Box::new(SyntheticCamera::new(640, 480).with_drift(60.0))
        }
    };
    let motors = SimulatedMotorController::new(config.vehicle.min_motor_speed, config.vehicle.max_motor_speed);
    let (bus, mut inbox) = LinkBus::new(64);

    let server = match &args.bind {
        Some(addr) => match start_server(bus.clone(), ServerConfig { bind_addr: addr.clone() }).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "link server not started");
                None
            }
        },
        None => None,
    };

    // --- 3. Vehicle Loop ---
    let period = Duration::from_secs_f64(1.0 / f64::from(config.vehicle.loop_hz.max(1)));
    let mut vehicle = Vehicle::new(config, camera, Box::new(ScriptedRanger::clear()), motors, bus);
    if args.auto {
        vehicle.handle_command(nav_link::InboundCommand::SetAutoMode { enabled: true });
    }

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(hz = 1.0 / period.as_secs_f64(), "vehicle loop started");

    let mut ticks = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            _ = interval.tick() => {
                for command in inbox.drain() {
                    vehicle.handle_command(command);
                }
                vehicle.tick();
                ticks += 1;
                if args.cycles.is_some_and(|max| ticks >= max) {
                    break;
                }
            }
        }
    }

    // --- 4. Shutdown ---
    vehicle.halt();
    if let Some(handle) = server {
        handle.abort();
    }
    info!(cycles = vehicle.loop_count(), "vehicle stopped");
    Ok(())
}

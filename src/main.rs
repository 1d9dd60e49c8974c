//! mapview-sync - stand-alone map view sync daemon
//!
//! ## Subcommands
//!
//! - `serve`: run the sync server against the built-in simulated game
//! - `view`: run the viewer side, log telemetry and received saves
//! - `init-config`: write a default configuration file
//!
//! ## Protocol Architecture
//!
//! - **TCP (server port)**: save file pushes, server to viewer
//! - **UDP (client port)**: telemetry to the viewer, flight-plan edits back

use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, select, tick, Receiver};
use mapview_sync::comms::Target;
use mapview_sync::sim::SimulatedGame;
use mapview_sync::{Error, Result, Settings, SyncClient, SyncServer, TickOutcome};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "mapview-sync")]
#[command(version, about = "Synchronize a stand-alone map view with a running game")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "mapview.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sync server against a simulated game
    Serve {
        /// Name of the simulated vessel
        #[arg(long, default_value = "Kerbal X")]
        vessel: String,

        /// Orbit altitude of the simulated vessel (meters)
        #[arg(long, default_value = "80000")]
        altitude: f64,

        /// Serve this file as the save instead of a generated one
        #[arg(long)]
        save_file: Option<PathBuf>,

        /// Time warp index (0 = 1x)
        #[arg(long, default_value = "0")]
        warp: usize,
    },

    /// Run the viewer side and log what arrives
    View {
        /// Ask the server to target this body
        #[arg(long)]
        target: Option<String>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    if let Command::InitConfig { force } = args.command {
        return init_config(&args.config, force);
    }

    let (settings, from_file) = load_settings(&args.config)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.logging.level.as_str()),
    )
    .init();

    log::info!("mapview-sync v{} starting...", env!("CARGO_PKG_VERSION"));
    if from_file {
        log::info!("Using config: {}", args.config.display());
    } else {
        log::warn!("{} not found, using defaults", args.config.display());
    }

    let shutdown = shutdown_channel()?;

    match args.command {
        Command::Serve {
            vessel,
            altitude,
            save_file,
            warp,
        } => {
            let mut game = SimulatedGame::new(&vessel, altitude);
            if let Some(path) = save_file {
                game = game.with_save_file(path);
            }
            game.set_warp_index(warp);
            serve(&settings, game, &shutdown)
        }
        Command::View { target } => view(&settings, target.map(Target::body), &shutdown),
        Command::InitConfig { .. } => Ok(()),
    }
}

fn load_settings(path: &Path) -> Result<(Settings, bool)> {
    if path.exists() {
        Ok((Settings::load(path)?, true))
    } else {
        Ok((Settings::default(), false))
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    Settings::default().to_file(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Ctrl-C delivers one message on the returned channel.
fn shutdown_channel() -> Result<Receiver<()>> {
    let (tx, rx) = bounded(1);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        let _ = tx.try_send(());
    })
    .map_err(|e| Error::Internal(format!("Error setting Ctrl-C handler: {}", e)))?;
    Ok(rx)
}

fn serve(settings: &Settings, mut game: SimulatedGame, shutdown: &Receiver<()>) -> Result<()> {
    let mut server = SyncServer::start(settings)?;
    let ticker = tick(settings.timing.tick_period());
    let mut last_tick = Instant::now();
    let mut sent = 0u64;

    log::info!("Serving at {:.1} Hz. Press Ctrl-C to stop.", settings.timing.tick_hz);

    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(ticker) -> _ => {
                let now = Instant::now();
                game.advance(now - last_tick);
                last_tick = now;

                match server.tick(&mut game) {
                    TickOutcome::Sent => {
                        sent += 1;
                        if sent % 200 == 0 {
                            log::debug!("{} telemetry packets sent", sent);
                        }
                    }
                    TickOutcome::SessionEnded => break,
                    TickOutcome::Idle | TickOutcome::Dropped => {}
                }
            }
        }
    }

    server.stop()
}

fn view(settings: &Settings, target: Option<Target>, shutdown: &Receiver<()>) -> Result<()> {
    let mut client = SyncClient::start(settings)?;
    let ticker = tick(settings.timing.tick_period());
    let mut last_report = Instant::now();

    log::info!("Viewing. Press Ctrl-C to stop.");

    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(ticker) -> _ => {
                if client.save_worker().save_received().try_take() {
                    log::info!("Save updated: {}", client.save_worker().save_path().display());
                }

                let update = client.poll();
                if let Some(target) = &update.plan.target {
                    log::info!("Server target: {} ({:?})", target.name, target.kind);
                }
                if let Some(maneuvers) = &update.plan.maneuver_list {
                    log::info!(
                        "Server maneuvers: {} nodes, {:.1} m/s total",
                        maneuvers.len(),
                        maneuvers.total_delta_v()
                    );
                }

                if last_report.elapsed() >= Duration::from_secs(5) {
                    last_report = Instant::now();
                    report(&update, &client);
                }

                if target.is_some() && client.server_peer().is_some() {
                    client.send_plan(None, target.clone());
                }
            }
        }
    }

    client.stop()
}

fn report(update: &mapview_sync::telemetry::ViewUpdate, client: &SyncClient) {
    if let Some(time) = &update.time {
        log::info!(
            "UT {:.1} (warp {}x)",
            time.universal_time,
            time.warp_rate
        );
    }
    if let Some(vessel) = &update.vessel {
        log::info!(
            "{} around {}: sma {:.0} m, height {:.0} m, throttle {:.2}",
            vessel.name,
            vessel.orbit.reference_body,
            vessel.orbit.semi_major_axis,
            vessel.height,
            vessel.controls.throttle
        );
    }
    let stats = client.save_worker().stats();
    log::info!(
        "Save channel {:?}: {} saves, {} connects, {} faults",
        client.save_worker().state(),
        stats.saves_received,
        stats.connections,
        stats.transient_faults + stats.protocol_faults
    );
}

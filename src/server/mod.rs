//! Game-side half of the sync link.
//!
//! [`SyncServer`] is driven by the host's update loop through
//! [`SyncServer::tick`]. It owns three workers:
//!
//! | Worker | Transport | Direction |
//! |--------|-----------|-----------|
//! | [`SavePublisher`] | TCP | save blobs to the viewer |
//! | `TelemetrySender<Packet>` | UDP | one telemetry packet per tick |
//! | `InboundWorker<ClientPacket>` | UDP | target and maneuver edits from the viewer |

pub mod host;
pub mod save_publisher;

pub use host::{HostWorld, SaveSyncTrigger};
pub use save_publisher::SavePublisher;

use crate::comms::codec::{ClientPacket, Packet};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::telemetry::{InboundWorker, TelemetrySender};
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not in a flight-capable scene, nothing sent
    Idle,
    /// Telemetry packet sent
    Sent,
    /// Telemetry packet could not be sent
    Dropped,
    /// The game session ended and the server shut down
    SessionEnded,
}

/// Per-tick orchestration of the sync link
pub struct SyncServer {
    publisher: SavePublisher,
    receiver: InboundWorker<ClientPacket>,
    sender: TelemetrySender<Packet>,
    trigger: SaveSyncTrigger,
    save_sync_delay: Duration,
    snapshot_due: Option<Instant>,
    last_universal_time: f64,
    stopped: bool,
}

impl SyncServer {
    /// Bind the save listener and the telemetry socket.
    ///
    /// Returns [`Error::Disabled`] without binding anything when sync is
    /// turned off.
    pub fn start(settings: &Settings) -> Result<Self> {
        if !settings.enabled {
            return Err(Error::Disabled);
        }

        let server_addr = settings.server.resolve()?;
        let client_addr = settings.client.resolve()?;

        let publisher = SavePublisher::bind(server_addr, settings.timing.keepalive())?;

        let socket = UdpSocket::bind(SocketAddr::new(server_addr.ip(), 0))?;
        let receiver = InboundWorker::start(
            socket.try_clone()?,
            None,
            settings.timing.udp_fault_backoff(),
        )?;
        let sender = TelemetrySender::to_addr(socket, client_addr)?;

        log::info!(
            "Sync server started (saves on {}, telemetry {} -> {})",
            publisher.local_addr(),
            receiver.local_addr(),
            client_addr
        );

        Ok(Self {
            publisher,
            receiver,
            sender,
            trigger: SaveSyncTrigger::new(),
            save_sync_delay: settings.timing.save_sync_delay(),
            snapshot_due: None,
            last_universal_time: 0.0,
            stopped: false,
        })
    }

    /// Handle for host event callbacks that invalidate the viewer's save
    pub fn trigger(&self) -> SaveSyncTrigger {
        self.trigger.clone()
    }

    pub fn publisher(&self) -> &SavePublisher {
        &self.publisher
    }

    /// Address the telemetry socket sends from and receives on
    pub fn telemetry_addr(&self) -> SocketAddr {
        self.receiver.local_addr()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Run one host tick.
    pub fn tick<H: HostWorld + ?Sized>(&mut self, host: &mut H) -> TickOutcome {
        if self.stopped {
            return TickOutcome::SessionEnded;
        }
        if !host.session_active() {
            log::info!("Game session ended, stopping sync server");
            if let Err(e) = self.stop() {
                log::error!("Sync server stopped with error: {}", e);
            }
            return TickOutcome::SessionEnded;
        }

        self.sync_save(host);

        // no time or flight data in the editor, astronaut complex etc.
        if !host.in_flight_scene() {
            return TickOutcome::Idle;
        }

        let time = host.time();
        if time.universal_time < self.last_universal_time {
            self.trigger.request("Time went backwards (quickload?)");
        }
        self.last_universal_time = time.universal_time;

        self.apply_client_updates(host);

        let mut packet = Packet::time_only(time);
        if let Some(vessel) = host.active_vessel() {
            packet.vessel = Some(vessel);
            packet.maneuver_list = host.maneuver_list();
            packet.target = host.target();
        }

        if self.sender.publish(&packet) {
            TickOutcome::Sent
        } else {
            TickOutcome::Dropped
        }
    }

    /// Schedule a snapshot when requested, take it once the delay passed.
    ///
    /// Right after a scene switch the save can be missing vessels, hence
    /// the delay. Requests arriving while one is scheduled do not move it.
    fn sync_save<H: HostWorld + ?Sized>(&mut self, host: &mut H) {
        if self.trigger.take() && self.snapshot_due.is_none() {
            self.snapshot_due = Instant::now().checked_add(self.save_sync_delay);
            if self.snapshot_due.is_none() {
                log::warn!(
                    "Save sync delay of {:?} never elapses, request dropped",
                    self.save_sync_delay
                );
            }
        }

        let Some(due) = self.snapshot_due else {
            return;
        };
        if Instant::now() < due {
            return;
        }
        self.snapshot_due = None;

        if !host.has_game() {
            log::debug!("No game loaded, skipping save sync");
            return;
        }
        match host.snapshot_game() {
            Ok(save) => self.publisher.set_save(save),
            Err(e) => log::error!("Failed to snapshot current game: {}", e),
        }
    }

    fn apply_client_updates<H: HostWorld + ?Sized>(&mut self, host: &mut H) {
        let plan = self.receiver.mailbox().take();

        if let Some(target) = plan.target {
            log::debug!("Applying target from viewer: {:?}", target);
            host.apply_target(target);
        }

        if let Some(maneuvers) = plan.maneuver_list {
            if host.has_active_vessel() {
                log::debug!("Applying {} maneuver nodes from viewer", maneuvers.len());
                host.apply_maneuvers(maneuvers);
            } else {
                log::debug!("Dropping maneuver update, no active vessel");
            }
        }
    }

    /// Stop every worker. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.publisher.stop();
        let result = self.receiver.stop();
        log::info!("Sync server stopped");
        result
    }
}

impl Drop for SyncServer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

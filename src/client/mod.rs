//! Viewer-side half of the sync link.
//!
//! [`SyncClient`] combines the reconnecting [`SaveSyncWorker`] with the
//! telemetry receiver. The viewer drains telemetry with
//! [`SyncClient::poll`] and proposes flight-plan edits with
//! [`SyncClient::send_plan`], which go back to whichever address the last
//! valid telemetry packet came from.

pub mod save_worker;

pub use save_worker::{ConnectionState, SaveSignals, SaveSyncWorker, WorkerStats};

use crate::comms::codec::{ClientPacket, Packet};
use crate::comms::types::{ManeuverList, Target};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::telemetry::{InboundWorker, PeerRegistry, TelemetrySender, ViewUpdate};
use parking_lot::Mutex;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

pub struct SyncClient {
    save_worker: SaveSyncWorker,
    receiver: InboundWorker<Packet>,
    sender: TelemetrySender<ClientPacket>,
}

impl SyncClient {
    /// Bind the telemetry port and start the save worker.
    pub fn start(settings: &Settings) -> Result<Self> {
        if !settings.enabled {
            return Err(Error::Disabled);
        }

        let bind_addr = settings.client.resolve()?;
        let socket = UdpSocket::bind(bind_addr)?;
        let server_peer: PeerRegistry = Arc::new(Mutex::new(None));

        let receiver = InboundWorker::start(
            socket.try_clone()?,
            Some(Arc::clone(&server_peer)),
            settings.timing.udp_fault_backoff(),
        )?;
        let sender = TelemetrySender::new(socket, server_peer)?;

        let mut save_worker = SaveSyncWorker::new(settings);
        save_worker.start()?;

        log::info!("Sync client started (telemetry on {})", receiver.local_addr());

        Ok(Self {
            save_worker,
            receiver,
            sender,
        })
    }

    /// Drain everything received since the last poll.
    pub fn poll(&self) -> ViewUpdate {
        self.receiver.mailbox().take()
    }

    /// Send flight-plan edits to the server. Returns false if no server has
    /// been heard from yet or the send failed.
    pub fn send_plan(&self, maneuver_list: Option<ManeuverList>, target: Option<Target>) -> bool {
        self.sender.publish(&ClientPacket::new(maneuver_list, target))
    }

    pub fn save_worker(&self) -> &SaveSyncWorker {
        &self.save_worker
    }

    /// Telemetry source address of the server, once known
    pub fn server_peer(&self) -> Option<SocketAddr> {
        self.sender.peer()
    }

    pub fn telemetry_addr(&self) -> SocketAddr {
        self.receiver.local_addr()
    }

    /// Stop both workers.
    pub fn stop(&mut self) -> Result<()> {
        self.save_worker.stop();
        let result = self.receiver.stop();
        log::info!("Sync client stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_settings_refuse_to_start() {
        let settings = Settings {
            enabled: false,
            ..Settings::default()
        };
        assert!(matches!(SyncClient::start(&settings), Err(Error::Disabled)));
    }
}

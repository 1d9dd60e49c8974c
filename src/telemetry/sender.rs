//! Best-effort datagram producer.

use crate::comms::codec::Envelope;
use crate::error::Result;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// The single peer a sender talks to. `None` until one is known.
pub type PeerRegistry = Arc<Mutex<Option<SocketAddr>>>;

/// Sends one envelope per call to the registered peer
///
/// Failures are logged and counted, never returned: a dropped snapshot is
/// replaced by the next one.
pub struct TelemetrySender<E> {
    socket: UdpSocket,
    peer: PeerRegistry,
    sent: AtomicU64,
    failed: AtomicU64,
    _envelope: PhantomData<fn(&E)>,
}

impl<E: Envelope> TelemetrySender<E> {
    /// Send through `socket` to whatever address `peer` currently holds.
    ///
    /// The socket is switched to non-blocking mode. Clones share that mode,
    /// so an [`InboundWorker`](super::InboundWorker) reading from a clone
    /// polls instead of blocking.
    pub fn new(socket: UdpSocket, peer: PeerRegistry) -> Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            peer,
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            _envelope: PhantomData,
        })
    }

    /// Send to a fixed destination.
    pub fn to_addr(socket: UdpSocket, addr: SocketAddr) -> Result<Self> {
        Self::new(socket, Arc::new(Mutex::new(Some(addr))))
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        *self.peer.lock()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Encode and send without blocking. Returns `true` if the datagram left
    /// the socket; a full send buffer drops it.
    pub fn publish(&self, envelope: &E) -> bool {
        let Some(target) = self.peer() else {
            log::trace!("No telemetry peer yet, dropping datagram");
            return false;
        };

        let bytes = envelope.encode();
        match self.socket.send_to(&bytes, target) {
            Ok(_) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                log::trace!("Sent {} bytes to {}", bytes.len(), target);
                true
            }
            Err(e) => {
                let failed = self.failed.fetch_add(1, Ordering::Relaxed) + 1;
                // a dead peer fails every tick
                if failed == 1 || failed % 100 == 0 {
                    log::warn!("Failed to send telemetry to {} ({} failures): {}", target, failed, e);
                }
                false
            }
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

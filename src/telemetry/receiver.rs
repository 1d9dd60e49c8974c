//! UDP receive loop on a dedicated thread.
//!
//! # Loop
//!
//! ```text
//! recv_from (100ms timeout) ──timeout──► check running flag
//!      │
//!      ├─ would block (non-blocking socket) ──► sleep 5ms, check running flag
//!      │
//!      ├─ socket error ──► log, sleep fault backoff
//!      │
//!      └─ datagram ──► decode ──error──► log protocol fault, drop datagram
//!                        │
//!                        └──► register sender as peer (optional) ──► publish into mailbox
//! ```
//!
//! Fatal faults end the thread and are returned from [`InboundWorker::stop`].

use super::mailbox::Inbound;
use super::sender::PeerRegistry;
use crate::error::{Error, Fault, Result};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Largest datagram accepted
const MAX_DATAGRAM_SIZE: usize = 65536;

/// Receive timeout used to poll the running flag
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Idle sleep when the socket is shared with a non-blocking sender
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Counters shared with the receive thread
#[derive(Debug, Default)]
pub struct ReceiverStats {
    datagrams: AtomicU64,
    decode_faults: AtomicU64,
    socket_faults: AtomicU64,
}

impl ReceiverStats {
    /// Datagrams read off the socket, valid or not
    pub fn datagrams(&self) -> u64 {
        self.datagrams.load(Ordering::Relaxed)
    }

    pub fn decode_faults(&self) -> u64 {
        self.decode_faults.load(Ordering::Relaxed)
    }

    pub fn socket_faults(&self) -> u64 {
        self.socket_faults.load(Ordering::Relaxed)
    }
}

/// Owns the receive thread for one envelope type
pub struct InboundWorker<E: Inbound> {
    mailbox: Arc<E::Mailbox>,
    stats: Arc<ReceiverStats>,
    running: Arc<AtomicBool>,
    local_addr: SocketAddr,
    handle: Option<JoinHandle<Result<()>>>,
}

impl<E: Inbound> InboundWorker<E> {
    /// Start receiving on `socket`.
    ///
    /// When `peer` is given, the source address of every valid datagram is
    /// recorded there so replies can follow it.
    pub fn start(
        socket: UdpSocket,
        peer: Option<PeerRegistry>,
        fault_backoff: Duration,
    ) -> Result<Self> {
        socket.set_read_timeout(Some(POLL_TIMEOUT))?;
        let local_addr = socket.local_addr()?;

        let mailbox = Arc::new(E::Mailbox::default());
        let stats = Arc::new(ReceiverStats::default());
        let running = Arc::new(AtomicBool::new(true));

        let receiver = Receiver::<E> {
            socket,
            mailbox: Arc::clone(&mailbox),
            stats: Arc::clone(&stats),
            running: Arc::clone(&running),
            peer,
            fault_backoff,
        };

        let handle = thread::Builder::new()
            .name("udp-receiver".to_string())
            .spawn(move || {
                let result = receiver.run();
                if let Err(e) = &result {
                    log::error!("UDP receiver terminated: {}", e);
                }
                result
            })
            .map_err(|source| Error::Spawn {
                name: "udp-receiver",
                source,
            })?;

        log::info!("UDP receiver listening on {}", local_addr);

        Ok(Self {
            mailbox,
            stats,
            running,
            local_addr,
            handle: Some(handle),
        })
    }

    pub fn mailbox(&self) -> &Arc<E::Mailbox> {
        &self.mailbox
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread and wait for it (at most one poll timeout).
    pub fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Internal("UDP receiver thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl<E: Inbound> Drop for InboundWorker<E> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

struct Receiver<E: Inbound> {
    socket: UdpSocket,
    mailbox: Arc<E::Mailbox>,
    stats: Arc<ReceiverStats>,
    running: Arc<AtomicBool>,
    peer: Option<PeerRegistry>,
    fault_backoff: Duration,
}

impl<E: Inbound> Receiver<E> {
    fn run(self) -> Result<()> {
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        while self.running.load(Ordering::Relaxed) {
            let (len, src) = match self.socket.recv_from(&mut buffer) {
                Ok(result) => result,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(IDLE_POLL);
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => continue,
                Err(e) => {
                    self.on_fault(Error::Io(e), &self.stats.socket_faults)?;
                    thread::sleep(self.fault_backoff);
                    continue;
                }
            };

            self.stats.datagrams.fetch_add(1, Ordering::Relaxed);

            match E::decode(&buffer[..len]) {
                Ok(envelope) => {
                    self.register(src);
                    envelope.publish(&self.mailbox);
                }
                Err(e) => {
                    log::debug!("Dropping {} byte datagram from {}", len, src);
                    self.on_fault(e, &self.stats.decode_faults)?;
                }
            }
        }

        log::info!("UDP receiver on {} stopped", self.socket.local_addr()?);
        Ok(())
    }

    /// Log and count recoverable faults, return fatal ones.
    fn on_fault(&self, err: Error, counter: &AtomicU64) -> Result<()> {
        match err.fault() {
            Fault::Transient => {
                counter.fetch_add(1, Ordering::Relaxed);
                log::warn!("UDP receive fault: {}", err);
                Ok(())
            }
            Fault::Protocol => {
                counter.fetch_add(1, Ordering::Relaxed);
                log::warn!("UDP protocol violation: {}", err);
                Ok(())
            }
            Fault::Fatal => Err(err),
        }
    }

    fn register(&self, src: SocketAddr) {
        let Some(peer) = &self.peer else {
            return;
        };
        let mut current = peer.lock();
        if *current != Some(src) {
            log::info!("Telemetry peer is now {}", src);
            *current = Some(src);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::codec::{ClientPacket, Envelope};
    use crate::comms::types::Target;
    use parking_lot::Mutex;
    use std::time::Instant;

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_garbage_does_not_stop_the_worker() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer: PeerRegistry = Arc::new(Mutex::new(None));
        let mut worker = InboundWorker::<ClientPacket>::start(
            socket,
            Some(Arc::clone(&peer)),
            Duration::from_millis(10),
        )
        .unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(&[0xff, 0xff, 0xff], worker.local_addr())
            .unwrap();
        assert!(wait_for(|| worker.stats().decode_faults() == 1));
        assert_eq!(*peer.lock(), None);

        let packet = ClientPacket::new(None, Some(Target::body("Ike")));
        sender.send_to(&packet.encode(), worker.local_addr()).unwrap();
        assert!(wait_for(|| worker.mailbox().take_target().is_some()));
        assert_eq!(*peer.lock(), Some(sender.local_addr().unwrap()));

        assert!(worker.is_running());
        worker.stop().unwrap();
        assert!(!worker.is_running());
    }

    #[test]
    fn test_stop_returns_within_poll_timeout() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut worker =
            InboundWorker::<ClientPacket>::start(socket, None, Duration::from_millis(10)).unwrap();

        let start = Instant::now();
        worker.stop().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_receives_on_socket_shared_with_sender() {
        use crate::telemetry::TelemetrySender;

        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer: PeerRegistry = Arc::new(Mutex::new(None));
        let mut worker = InboundWorker::<ClientPacket>::start(
            socket.try_clone().unwrap(),
            Some(Arc::clone(&peer)),
            Duration::from_millis(10),
        )
        .unwrap();
        let reply = TelemetrySender::<ClientPacket>::new(socket, Arc::clone(&peer)).unwrap();

        let remote = UdpSocket::bind("127.0.0.1:0").unwrap();
        remote
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let packet = ClientPacket::new(None, Some(Target::body("Minmus")));
        remote.send_to(&packet.encode(), worker.local_addr()).unwrap();
        assert!(wait_for(|| worker.mailbox().take_target().is_some()));

        assert!(reply.publish(&packet));
        let mut buf = [0u8; 1500];
        let (len, from) = remote.recv_from(&mut buf).unwrap();
        assert_eq!(from, worker.local_addr());
        assert_eq!(ClientPacket::decode(&buf[..len]).unwrap(), packet);

        assert_eq!(worker.stats().socket_faults(), 0);
        let start = Instant::now();
        worker.stop().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

//! Streams the latest save to the connected viewer over TCP.
//!
//! A dedicated thread owns the listener. The host replaces the current save
//! with [`SavePublisher::set_save`] and never waits on the network.
//!
//! # Stream
//!
//! ```text
//! connect ──► SaveUpdate + frame (if a save exists)
//!    │
//!    ├─ save replaced ───► SaveUpdate + frame
//!    ├─ idle keepalive ──► ConnectionTest
//!    └─ write error ─────► drop client, wait for the next one
//! ```
//!
//! One viewer at a time: a new connection replaces the previous one.

use crate::comms::save::Save;
use crate::comms::tcp_message::TcpMessage;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::io::{ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Accept poll interval
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A viewer that stops reading for this long is dropped
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Most recent save, versioned so the publisher thread can tell it changed
#[derive(Default)]
struct SaveSlot {
    version: u64,
    save: Option<Arc<Save>>,
}

/// TCP side of the save channel
pub struct SavePublisher {
    current: Arc<Mutex<SaveSlot>>,
    client_connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    local_addr: SocketAddr,
    publisher_thread: Option<JoinHandle<()>>,
}

impl SavePublisher {
    /// Bind the listener and spawn the publisher thread.
    pub fn bind(addr: SocketAddr, keepalive: Duration) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let current = Arc::new(Mutex::new(SaveSlot::default()));
        let client_connected = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        let publisher = Publisher {
            listener,
            current: Arc::clone(&current),
            client_connected: Arc::clone(&client_connected),
            shutdown: Arc::clone(&shutdown),
            keepalive,
        };

        let publisher_thread = thread::Builder::new()
            .name("save-publisher".to_string())
            .spawn(move || publisher.run())
            .map_err(|source| Error::Spawn {
                name: "save-publisher",
                source,
            })?;

        log::info!("Save publisher listening on {}", local_addr);

        Ok(Self {
            current,
            client_connected,
            shutdown,
            local_addr,
            publisher_thread: Some(publisher_thread),
        })
    }

    /// Replace the save streamed to the viewer.
    pub fn set_save(&self, save: Save) {
        let mut slot = self.current.lock();
        slot.version += 1;
        log::info!("Save updated ({} bytes, version {})", save.len(), slot.version);
        slot.save = Some(Arc::new(save));
    }

    /// Number of saves handed over so far
    pub fn version(&self) -> u64 {
        self.current.lock().version
    }

    pub fn has_client(&self) -> bool {
        self.client_connected.load(Ordering::Relaxed)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the publisher thread and close the listener.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.publisher_thread.take() {
            log::info!("Save publisher shutdown requested");
            let _ = thread.join();
        }
    }
}

impl Drop for SavePublisher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Subscriber {
    stream: TcpStream,
    addr: SocketAddr,
    sent_version: u64,
    last_write: Instant,
}

impl Subscriber {
    fn send_save(&mut self, version: u64, save: &Save) -> Result<()> {
        TcpMessage::SaveUpdate.write_to(&mut self.stream)?;
        save.write_framed(&mut self.stream)?;
        self.stream.flush()?;
        self.sent_version = version;
        self.last_write = Instant::now();
        log::info!("Sent save version {} ({} bytes) to {}", version, save.len(), self.addr);
        Ok(())
    }

    fn send_keepalive(&mut self) -> Result<()> {
        TcpMessage::ConnectionTest.write_to(&mut self.stream)?;
        self.last_write = Instant::now();
        log::trace!("Keepalive to {}", self.addr);
        Ok(())
    }

    fn close(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

struct Publisher {
    listener: TcpListener,
    current: Arc<Mutex<SaveSlot>>,
    client_connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    keepalive: Duration,
}

impl Publisher {
    fn run(self) {
        let mut subscriber: Option<Subscriber> = None;

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => match Self::prepare(&stream) {
                    Ok(()) => {
                        if let Some(old) = subscriber.take() {
                            log::info!("Viewer {} replaced by {}", old.addr, addr);
                            old.close();
                        } else {
                            log::info!("Viewer connected: {}", addr);
                        }
                        subscriber = Some(Subscriber {
                            stream,
                            addr,
                            sent_version: 0,
                            last_write: Instant::now(),
                        });
                    }
                    Err(e) => log::warn!("Failed to configure connection from {}: {}", addr, e),
                },
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => log::error!("Error accepting viewer connection: {}", e),
            }

            if let Some(mut sub) = subscriber.take() {
                match self.service(&mut sub) {
                    Ok(()) => subscriber = Some(sub),
                    Err(e) => {
                        log::warn!("Viewer {} dropped: {}", sub.addr, e);
                        sub.close();
                    }
                }
            }
            self.client_connected
                .store(subscriber.is_some(), Ordering::Relaxed);

            thread::sleep(POLL_INTERVAL);
        }

        if let Some(sub) = subscriber {
            sub.close();
        }
        self.client_connected.store(false, Ordering::Relaxed);
        log::info!("Save publisher stopped");
    }

    fn prepare(stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))
    }

    /// Push a newer save if there is one, otherwise keep the link warm.
    fn service(&self, sub: &mut Subscriber) -> Result<()> {
        let pending = {
            let slot = self.current.lock();
            match &slot.save {
                Some(save) if slot.version != sub.sent_version => {
                    Some((slot.version, Arc::clone(save)))
                }
                _ => None,
            }
        };

        match pending {
            Some((version, save)) => sub.send_save(version, &save),
            None if sub.last_write.elapsed() >= self.keepalive => sub.send_keepalive(),
            None => Ok(()),
        }
    }
}

//! Reconnecting TCP worker that keeps the local save file current.
//!
//! # State machine
//!
//! ```text
//!              start()
//!                 │
//!                 ▼
//!  ┌──────► Connecting ──connect ok──► Connected
//!  │            │                          │
//!  │      connect failed          I/O or protocol fault
//!  │            │                          │
//!  │            ▼                          ▼
//!  └─backoff── Disconnected ◄──────────────┘
//! ```
//!
//! The loop runs on its own thread until [`SaveSyncWorker::stop`]. Transient
//! and protocol faults are logged and retried after the backoff. Fatal faults
//! end the thread and surface through [`SaveSyncWorker::join`].
//!
//! # Stopping
//!
//! Every `start` creates a fresh run state. `stop` disables it and shuts
//! down the live connection under the same lock the worker uses to register
//! it, so a blocked read returns at once and a stopped run can never be
//! revived by a later `start`.

use crate::comms::save::{Save, SaveLock};
use crate::comms::tcp_message::TcpMessage;
use crate::config::{EndpointConfig, Settings};
use crate::error::{Error, Fault, Result};
use crate::sync::{AutoResetSignal, StickySignal};
use parking_lot::Mutex;
use std::io::{BufReader, Read};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Granularity of the backoff sleep
const STOP_POLL: Duration = Duration::from_millis(10);

/// Connection state of the save channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Counters since the worker was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub connect_attempts: u64,
    /// Connections that were established
    pub connections: u64,
    pub saves_received: u64,
    pub transient_faults: u64,
    pub protocol_faults: u64,
}

#[derive(Debug, Default)]
struct Counters {
    connect_attempts: AtomicU64,
    connections: AtomicU64,
    saves_received: AtomicU64,
    transient_faults: AtomicU64,
    protocol_faults: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            saves_received: self.saves_received.load(Ordering::Relaxed),
            transient_faults: self.transient_faults.load(Ordering::Relaxed),
            protocol_faults: self.protocol_faults.load(Ordering::Relaxed),
        }
    }
}

/// The two wait conditions raised when a save lands on disk
#[derive(Debug, Default)]
pub struct SaveSignals {
    /// Raised on every received save, consumed by the first observer
    pub save_received: AutoResetSignal,
    /// Raised on the first received save, cleared only by `stop`
    pub first_save_received: StickySignal,
}

impl SaveSignals {
    fn reset(&self) {
        self.save_received.reset();
        self.first_save_received.reset();
    }
}

/// Lifetime of one `start` call
#[derive(Debug)]
struct RunState {
    enabled: AtomicBool,
    state: AtomicU8,
    connection: Mutex<Option<TcpStream>>,
}

impl RunState {
    fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            connection: Mutex::new(None),
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Register the live connection so `disable` can shut it down.
    /// Returns false if the run was stopped meanwhile.
    fn attach(&self, stream: &TcpStream) -> Result<bool> {
        let mut connection = self.connection.lock();
        if !self.is_enabled() {
            return Ok(false);
        }
        *connection = Some(stream.try_clone()?);
        Ok(true)
    }

    fn detach(&self) {
        if let Some(stream) = self.connection.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Run `f` only if still enabled, atomically with respect to `disable`.
    fn if_enabled(&self, f: impl FnOnce()) -> bool {
        let _connection = self.connection.lock();
        if self.is_enabled() {
            f();
            true
        } else {
            false
        }
    }

    fn disable(&self) {
        let mut connection = self.connection.lock();
        self.enabled.store(false, Ordering::Release);
        if let Some(stream) = connection.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Settings the worker thread needs
#[derive(Debug, Clone)]
struct WorkerConfig {
    save_path: PathBuf,
    max_save_bytes: usize,
    reconnect_backoff: Duration,
    connect_timeout: Duration,
    read_timeout: Duration,
}

/// Client side of the save channel
pub struct SaveSyncWorker {
    server: EndpointConfig,
    config: WorkerConfig,
    save_lock: SaveLock,
    signals: Arc<SaveSignals>,
    counters: Arc<Counters>,
    run: Option<Arc<RunState>>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl SaveSyncWorker {
    pub fn new(settings: &Settings) -> Self {
        Self {
            server: settings.server.clone(),
            config: WorkerConfig {
                save_path: settings.save.path.clone(),
                max_save_bytes: settings.save.max_bytes,
                reconnect_backoff: settings.timing.reconnect_backoff(),
                connect_timeout: settings.timing.connect_timeout(),
                read_timeout: settings.timing.read_timeout(),
            },
            save_lock: SaveLock::new(),
            signals: Arc::new(SaveSignals::default()),
            counters: Arc::new(Counters::default()),
            run: None,
            handle: None,
        }
    }

    /// Share an existing lock with other readers and writers of the save.
    pub fn with_save_lock(mut self, save_lock: SaveLock) -> Self {
        self.save_lock = save_lock;
        self
    }

    /// Stop any previous run, resolve the server and spawn the worker.
    ///
    /// Returns once the thread is spawned. Never waits on the network
    /// beyond name resolution.
    pub fn start(&mut self) -> Result<()> {
        self.stop();

        let addr = self.server.resolve()?;
        let run = Arc::new(RunState::new());

        let session = Session {
            addr,
            config: self.config.clone(),
            save_lock: self.save_lock.clone(),
            signals: Arc::clone(&self.signals),
            counters: Arc::clone(&self.counters),
            run: Arc::clone(&run),
        };

        let handle = thread::Builder::new()
            .name("save-sync".to_string())
            .spawn(move || {
                let result = session.run();
                if let Err(e) = &result {
                    log::error!("Save sync worker terminated: {}", e);
                }
                result
            })
            .map_err(|source| Error::Spawn {
                name: "save-sync",
                source,
            })?;

        log::info!("Save sync worker started for {}", addr);
        self.run = Some(run);
        // a previous thread, if any, winds down on its own
        self.handle = Some(handle);
        Ok(())
    }

    /// Disable the loop, close the live connection and reset both signals.
    ///
    /// Does not wait for the thread; see [`SaveSyncWorker::join`].
    pub fn stop(&mut self) {
        if let Some(run) = self.run.take() {
            run.disable();
            log::info!("Save sync worker stop requested");
        }
        self.signals.reset();
    }

    /// Wait for the most recent worker thread to exit and return its result.
    pub fn join(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Internal("save sync thread panicked".to_string()))?,
            None => Ok(()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.run
            .as_ref()
            .map_or(ConnectionState::Disconnected, |run| run.state())
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot()
    }

    /// True while the most recently spawned thread has not exited.
    pub fn is_worker_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn signals(&self) -> Arc<SaveSignals> {
        Arc::clone(&self.signals)
    }

    pub fn save_received(&self) -> &AutoResetSignal {
        &self.signals.save_received
    }

    pub fn first_save_received(&self) -> &StickySignal {
        &self.signals.first_save_received
    }

    /// Lock guarding the save file. Hold it while reading the file.
    pub fn save_lock(&self) -> SaveLock {
        self.save_lock.clone()
    }

    pub fn save_path(&self) -> &std::path::Path {
        &self.config.save_path
    }
}

impl Drop for SaveSyncWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the worker thread owns
struct Session {
    addr: SocketAddr,
    config: WorkerConfig,
    save_lock: SaveLock,
    signals: Arc<SaveSignals>,
    counters: Arc<Counters>,
    run: Arc<RunState>,
}

impl Session {
    fn run(self) -> Result<()> {
        while self.run.is_enabled() {
            self.run.set_state(ConnectionState::Connecting);
            Counters::bump(&self.counters.connect_attempts);

            let result = self.connect_and_receive();
            self.run.detach();
            self.run.set_state(ConnectionState::Disconnected);

            match result {
                Ok(()) => {}
                Err(_) if !self.run.is_enabled() => {
                    log::debug!("Save connection closed by stop");
                }
                Err(e) => self.on_fault(e)?,
            }

            self.backoff();
        }

        log::info!("Save sync worker stopped");
        Ok(())
    }

    /// One connection, read until it fails or the run is stopped.
    fn connect_and_receive(&self) -> Result<()> {
        let stream = TcpStream::connect_timeout(&self.addr, self.config.connect_timeout)?;
        stream.set_read_timeout(Some(self.config.read_timeout))?;
        stream.set_nodelay(true)?;

        if !self.run.attach(&stream)? {
            return Ok(());
        }
        self.run.set_state(ConnectionState::Connected);
        Counters::bump(&self.counters.connections);
        log::info!("Connected to save server {}", self.addr);

        let mut reader = BufReader::new(stream);
        while self.run.is_enabled() {
            let mut byte = [0u8; 1];
            reader.read_exact(&mut byte)?;

            match TcpMessage::try_from(byte[0])? {
                TcpMessage::ConnectionTest => {
                    log::trace!("Connection test from {}", self.addr);
                }
                TcpMessage::SaveUpdate => self.receive_save(&mut reader)?,
            }
        }
        Ok(())
    }

    fn receive_save<R: Read>(&self, reader: &mut R) -> Result<()> {
        let len = Save::read_and_save(
            reader,
            &self.config.save_path,
            &self.save_lock,
            self.config.max_save_bytes,
        )?;
        Counters::bump(&self.counters.saves_received);
        log::info!(
            "Received save ({} bytes) into {}",
            len,
            self.config.save_path.display()
        );

        self.run.if_enabled(|| {
            self.signals.first_save_received.set();
            self.signals.save_received.set();
        });
        Ok(())
    }

    fn on_fault(&self, err: Error) -> Result<()> {
        match err.fault() {
            Fault::Transient => {
                Counters::bump(&self.counters.transient_faults);
                if matches!(err, Error::SaveWrite { .. }) {
                    log::error!("Save lost: {}", err);
                } else {
                    log::warn!("Save channel to {} lost: {}", self.addr, err);
                }
                Ok(())
            }
            Fault::Protocol => {
                Counters::bump(&self.counters.protocol_faults);
                log::warn!("Protocol violation from {}: {}", self.addr, err);
                Ok(())
            }
            Fault::Fatal => Err(err),
        }
    }

    /// Sleep the reconnect backoff, returning early once stopped.
    fn backoff(&self) {
        // an unrepresentable deadline means waiting until stopped
        let deadline = Instant::now().checked_add(self.config.reconnect_backoff);
        while self.run.is_enabled() {
            let step = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    STOP_POLL.min(deadline - now)
                }
                None => STOP_POLL,
            };
            thread::sleep(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ] {
            assert_eq!(ConnectionState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_new_worker_is_idle() {
        let worker = SaveSyncWorker::new(&Settings::default());
        assert_eq!(worker.state(), ConnectionState::Disconnected);
        assert!(!worker.is_worker_alive());
        assert!(!worker.first_save_received().is_set());
        assert_eq!(worker.stats(), WorkerStats::default());
    }

    #[test]
    fn test_disabled_run_refuses_connection() {
        let run = RunState::new();
        run.disable();
        assert!(!run.if_enabled(|| unreachable!()));

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        assert!(!run.attach(&stream).unwrap());
    }

    #[test]
    fn test_stop_resets_signals() {
        let mut worker = SaveSyncWorker::new(&Settings::default());
        worker.signals().first_save_received.set();
        worker.signals().save_received.set();
        worker.stop();
        assert!(!worker.first_save_received().is_set());
        assert!(!worker.save_received().is_set());
    }

    #[test]
    fn test_shared_save_lock() {
        let lock = SaveLock::new();
        let worker = SaveSyncWorker::new(&Settings::default()).with_save_lock(lock.clone());
        let _guard = lock.lock();
        assert!(worker.save_lock().try_lock().is_none());
    }

    #[test]
    fn test_unbounded_backoff_ends_on_disable() {
        let run = Arc::new(RunState::new());
        let session = Session {
            addr: "127.0.0.1:1".parse().unwrap(),
            config: WorkerConfig {
                save_path: PathBuf::from("persistent.sfs"),
                max_save_bytes: 1024,
                reconnect_backoff: Duration::MAX,
                connect_timeout: Duration::from_millis(100),
                read_timeout: Duration::from_millis(100),
            },
            save_lock: SaveLock::new(),
            signals: Arc::new(SaveSignals::default()),
            counters: Arc::new(Counters::default()),
            run: Arc::clone(&run),
        };

        let sleeper = thread::spawn(move || session.backoff());
        thread::sleep(Duration::from_millis(50));
        assert!(!sleeper.is_finished());

        run.disable();
        sleeper.join().unwrap();
    }
}

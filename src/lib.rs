//! mapview-sync - Network synchronization for a stand-alone map view
//!
//! Keeps a viewer process in step with a running game:
//!
//! - **UDP** carries one protobuf telemetry [`Packet`] per game tick from
//!   server to viewer, and [`ClientPacket`] flight-plan edits back. Lossy,
//!   deduplicated on receipt, handed over through single-slot mailboxes.
//! - **TCP** carries the whole save file, pushed by the server whenever it
//!   changes and persisted by a reconnecting worker on the viewer side.
//!
//! The game embeds [`SyncServer`] and calls [`SyncServer::tick`] from its
//! update loop. The viewer runs a [`SyncClient`].

pub mod client;
pub mod comms;
pub mod config;
pub mod error;
pub mod server;
pub mod sim;
pub mod sync;
pub mod telemetry;

// Re-export commonly used types
pub use client::{ConnectionState, SaveSyncWorker, SyncClient};
pub use comms::{ClientPacket, Envelope, Packet, Save, SaveLock, TcpMessage};
pub use config::Settings;
pub use error::{Error, Fault, Result};
pub use server::{HostWorld, SaveSyncTrigger, SyncServer, TickOutcome};

//! Lossy, high-frequency UDP telemetry.
//!
//! ```text
//! server tick ──TelemetrySender<Packet>──────► InboundWorker<Packet> ──► TelemetryMailbox ──► viewer
//! server tick ◄──InboundWorker<ClientPacket>◄── TelemetrySender<ClientPacket> ◄── viewer edits
//!      │
//!      └── FlightPlanMailbox drained once per tick
//! ```
//!
//! Every datagram is one envelope. Nothing is retried or queued: a lost
//! datagram is superseded by the next tick's snapshot.

pub mod mailbox;
pub mod receiver;
pub mod sender;

pub use mailbox::{FlightPlan, FlightPlanMailbox, Inbound, TelemetryMailbox, ViewUpdate};
pub use receiver::{InboundWorker, ReceiverStats};
pub use sender::{PeerRegistry, TelemetrySender};

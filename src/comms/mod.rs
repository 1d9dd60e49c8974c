//! Wire-level building blocks: envelopes, snapshot types, save framing and
//! the save channel discriminator.

pub mod codec;
pub mod save;
pub mod tcp_message;
pub mod types;
pub mod wire;

pub use codec::{ClientPacket, Envelope, Packet};
pub use save::{Save, SaveGuard, SaveLock};
pub use tcp_message::TcpMessage;
pub use types::{
    ActionGroups, ControlState, ManeuverList, ManeuverNode, Orbit, Target, TargetKind, Time,
    Vector3, Vessel,
};

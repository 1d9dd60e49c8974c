//! Packet codec: typed envelopes to bytes and back.
//!
//! # Wire Format
//!
//! Each UDP datagram carries exactly one protobuf-encoded envelope, with no
//! length prefix and no discriminator. The direction decides the shape:
//!
//! ```text
//! server ──► client   Packet        { time?, vessel?, maneuver_list?, target? }
//! client ──► server   ClientPacket  { maneuver_list?, target? }
//! ```
//!
//! Every field is optional. An absent field means "nothing to report for that
//! sub-system this tick", which is different from a present default value.
//!
//! Decoding is total: malformed bytes or invariant violations produce an
//! [`crate::Error`] classified as a protocol fault, never a panic.

use super::types::{ManeuverList, Target, Time, Vessel};
use super::wire::{ClientPacketMsg, PacketMsg};
use crate::error::Result;
use prost::Message as ProstMessage;

/// A top-level message that can be put on the wire.
pub trait Envelope: Sized {
    /// Serialize to protobuf bytes
    fn encode(&self) -> Vec<u8>;

    /// Parse and validate protobuf bytes
    fn decode(bytes: &[u8]) -> Result<Self>;
}

/// Encode any envelope.
pub fn encode<E: Envelope>(envelope: &E) -> Vec<u8> {
    envelope.encode()
}

/// Decode any envelope.
pub fn decode<E: Envelope>(bytes: &[u8]) -> Result<E> {
    E::decode(bytes)
}

/// Server → client envelope, built once per server tick
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Packet {
    pub time: Option<Time>,
    pub vessel: Option<Vessel>,
    pub maneuver_list: Option<ManeuverList>,
    pub target: Option<Target>,
}

/// Client → server envelope carrying the viewer's flight-plan edits
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClientPacket {
    pub maneuver_list: Option<ManeuverList>,
    pub target: Option<Target>,
}

impl Packet {
    /// A packet reporting only the time (no active vessel).
    pub fn time_only(time: Time) -> Self {
        Self {
            time: Some(time),
            ..Self::default()
        }
    }
}

impl ClientPacket {
    pub fn new(maneuver_list: Option<ManeuverList>, target: Option<Target>) -> Self {
        Self {
            maneuver_list,
            target,
        }
    }
}

impl Envelope for Packet {
    fn encode(&self) -> Vec<u8> {
        PacketMsg {
            time: self.time.as_ref().map(Into::into),
            vessel: self.vessel.as_ref().map(Into::into),
            maneuver_list: self.maneuver_list.as_ref().map(Into::into),
            target: self.target.as_ref().map(Into::into),
        }
        .encode_to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let msg = PacketMsg::decode(bytes)?;
        Ok(Self {
            time: msg.time.map(Time::from),
            vessel: msg.vessel.map(Vessel::try_from).transpose()?,
            maneuver_list: msg.maneuver_list.map(ManeuverList::try_from).transpose()?,
            target: msg.target.map(Target::try_from).transpose()?,
        })
    }
}

impl Envelope for ClientPacket {
    fn encode(&self) -> Vec<u8> {
        ClientPacketMsg {
            maneuver_list: self.maneuver_list.as_ref().map(Into::into),
            target: self.target.as_ref().map(Into::into),
        }
        .encode_to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let msg = ClientPacketMsg::decode(bytes)?;
        Ok(Self {
            maneuver_list: msg.maneuver_list.map(ManeuverList::try_from).transpose()?,
            target: msg.target.map(Target::try_from).transpose()?,
        })
    }
}

//! Protobuf message definitions.
//!
//! These structs are the on-the-wire shape of every envelope. Field numbers
//! are the compatibility contract between server and client builds: never
//! renumber, only append. Decoders skip unknown field numbers, so a newer
//! sender can talk to an older receiver.
//!
//! Sub-messages are `optional`, which is what keeps "absent" distinct from
//! "present but empty" (e.g. a maneuver list with zero nodes).
//!
//! Domain code never touches these directly; see [`super::types`] for the
//! validated snapshot types and their conversions.

/// Server → client envelope
#[derive(Clone, PartialEq, prost::Message)]
pub struct PacketMsg {
    #[prost(message, optional, tag = "1")]
    pub time: Option<TimeMsg>,
    #[prost(message, optional, tag = "2")]
    pub vessel: Option<VesselMsg>,
    #[prost(message, optional, tag = "3")]
    pub maneuver_list: Option<ManeuverListMsg>,
    #[prost(message, optional, tag = "4")]
    pub target: Option<TargetMsg>,
}

/// Client → server envelope
#[derive(Clone, PartialEq, prost::Message)]
pub struct ClientPacketMsg {
    #[prost(message, optional, tag = "1")]
    pub maneuver_list: Option<ManeuverListMsg>,
    #[prost(message, optional, tag = "2")]
    pub target: Option<TargetMsg>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TimeMsg {
    #[prost(double, tag = "1")]
    pub universal_time: f64,
    #[prost(int32, tag = "2")]
    pub warp_rate_index: i32,
    #[prost(float, tag = "3")]
    pub warp_rate: f32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct VesselMsg {
    /// 16-byte UUID
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(message, optional, tag = "3")]
    pub orbit: Option<OrbitMsg>,
    #[prost(float, tag = "4")]
    pub height: f32,
    #[prost(bool, tag = "5")]
    pub sas: bool,
    #[prost(bool, tag = "6")]
    pub rcs: bool,
    #[prost(bool, tag = "7")]
    pub light: bool,
    #[prost(bool, tag = "8")]
    pub brakes: bool,
    #[prost(bool, tag = "9")]
    pub gear: bool,
    #[prost(bool, tag = "10")]
    pub abort: bool,
    #[prost(float, tag = "11")]
    pub throttle: f32,
    #[prost(float, tag = "12")]
    pub pitch: f32,
    #[prost(float, tag = "13")]
    pub yaw: f32,
    #[prost(float, tag = "14")]
    pub roll: f32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OrbitMsg {
    #[prost(string, tag = "1")]
    pub reference_body: String,
    #[prost(double, tag = "2")]
    pub inclination: f64,
    #[prost(double, tag = "3")]
    pub eccentricity: f64,
    #[prost(double, tag = "4")]
    pub semi_major_axis: f64,
    #[prost(double, tag = "5")]
    pub longitude_of_ascending_node: f64,
    #[prost(double, tag = "6")]
    pub argument_of_periapsis: f64,
    #[prost(double, tag = "7")]
    pub mean_anomaly_at_epoch: f64,
    #[prost(double, tag = "8")]
    pub epoch: f64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ManeuverListMsg {
    #[prost(message, repeated, tag = "1")]
    pub nodes: Vec<ManeuverNodeMsg>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ManeuverNodeMsg {
    #[prost(double, tag = "1")]
    pub ut: f64,
    #[prost(message, optional, tag = "2")]
    pub delta_v: Option<Vector3Msg>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Vector3Msg {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TargetMsg {
    #[prost(enumeration = "TargetKindMsg", tag = "1")]
    pub kind: i32,
    #[prost(string, tag = "2")]
    pub id: String,
    #[prost(string, tag = "3")]
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum TargetKindMsg {
    Unspecified = 0,
    Body = 1,
    Vessel = 2,
    DockingPort = 3,
}

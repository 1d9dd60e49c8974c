//! Domain snapshot types carried inside envelopes.
//!
//! Every value here is a point-in-time snapshot: built fresh from host state
//! each tick (server) or decoded fresh from each datagram (receiver), never
//! mutated afterwards.
//!
//! Equality is structural throughout. The receive-side change detection
//! compares the incoming value against the last accepted one, so two
//! snapshots describing the same thing must compare equal even though they
//! were decoded from different datagrams.

use super::wire::{
    ManeuverListMsg, ManeuverNodeMsg, OrbitMsg, TargetKindMsg, TargetMsg, TimeMsg, Vector3Msg,
    VesselMsg,
};
use crate::error::{Error, Result};
use uuid::Uuid;

/// Universal simulation time plus the active time-warp setting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Time {
    /// Universal time in seconds
    pub universal_time: f64,
    /// Index into the host's warp-rate table
    pub warp_rate_index: i32,
    /// Effective multiplier at that index
    pub warp_rate: f32,
}

impl Time {
    pub fn new(universal_time: f64, warp_rate_index: i32, warp_rate: f32) -> Self {
        Self {
            universal_time,
            warp_rate_index,
            warp_rate,
        }
    }
}

/// Conic orbital elements
#[derive(Debug, Clone, PartialEq)]
pub struct Orbit {
    /// Name of the body being orbited
    pub reference_body: String,
    /// Degrees
    pub inclination: f64,
    pub eccentricity: f64,
    /// Meters
    pub semi_major_axis: f64,
    /// Degrees
    pub longitude_of_ascending_node: f64,
    /// Degrees
    pub argument_of_periapsis: f64,
    /// Radians
    pub mean_anomaly_at_epoch: f64,
    /// Universal time the elements refer to
    pub epoch: f64,
}

/// The six action-group toggles shown on the map view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionGroups {
    pub sas: bool,
    pub rcs: bool,
    pub lights: bool,
    pub brakes: bool,
    pub gear: bool,
    pub abort: bool,
}

/// Pilot input state
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlState {
    /// Main throttle, 0..=1
    pub throttle: f32,
    /// -1..=1
    pub pitch: f32,
    /// -1..=1
    pub yaw: f32,
    /// -1..=1
    pub roll: f32,
}

impl ControlState {
    /// Clamp every axis into its legal range (NaN becomes 0).
    pub fn clamped(self) -> Self {
        Self {
            throttle: clamp_or_zero(self.throttle, 0.0, 1.0),
            pitch: clamp_or_zero(self.pitch, -1.0, 1.0),
            yaw: clamp_or_zero(self.yaw, -1.0, 1.0),
            roll: clamp_or_zero(self.roll, -1.0, 1.0),
        }
    }
}

/// Telemetry snapshot of the active vessel
#[derive(Debug, Clone, PartialEq)]
pub struct Vessel {
    /// Stable unique id
    pub id: Uuid,
    pub name: String,
    pub orbit: Orbit,
    /// Lesser of height above terrain and altitude, never negative
    pub height: f32,
    pub action_groups: ActionGroups,
    pub controls: ControlState,
}

impl Vessel {
    /// Height reported for a vessel: the lesser of height above terrain and
    /// altitude, floored at zero.
    pub fn height_above(terrain: f32, altitude: f32) -> f32 {
        let h = terrain.min(altitude);
        if h.is_nan() { 0.0 } else { h.max(0.0) }
    }
}

/// A 3-component vector
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// A single planned burn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManeuverNode {
    /// Universal time of the burn
    pub ut: f64,
    /// Delta-v in the node's (prograde, normal, radial) frame, m/s
    pub delta_v: Vector3,
}

impl ManeuverNode {
    pub fn new(ut: f64, delta_v: Vector3) -> Self {
        Self { ut, delta_v }
    }
}

/// Maneuver nodes in execution order
///
/// Order is significant: two lists are equal only if they hold equal nodes in
/// the same order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManeuverList {
    pub nodes: Vec<ManeuverNode>,
}

impl ManeuverList {
    pub fn new(nodes: Vec<ManeuverNode>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ManeuverNode> {
        self.nodes.iter()
    }

    /// Sum of all planned burns, m/s
    pub fn total_delta_v(&self) -> f64 {
        self.nodes.iter().map(|n| n.delta_v.magnitude()).sum()
    }
}

impl From<Vec<ManeuverNode>> for ManeuverList {
    fn from(nodes: Vec<ManeuverNode>) -> Self {
        Self { nodes }
    }
}

/// What a target refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Body,
    Vessel,
    DockingPort,
}

/// The vessel's current target
///
/// Identity is `(kind, id)`. `name` is for display only and does not take
/// part in equality, so a renamed vessel is still the same target.
#[derive(Debug, Clone)]
pub struct Target {
    pub kind: TargetKind,
    /// Body name, vessel UUID, or `<vessel uuid>/<part id>` for docking ports
    pub id: String,
    pub name: String,
}

impl Target {
    pub fn new(kind: TargetKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
        }
    }

    /// A celestial body is identified by its name.
    pub fn body(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(TargetKind::Body, name.clone(), name)
    }

    pub fn vessel(id: Uuid, name: impl Into<String>) -> Self {
        Self::new(TargetKind::Vessel, id.to_string(), name)
    }

    pub fn docking_port(vessel: Uuid, part_id: u32, name: impl Into<String>) -> Self {
        Self::new(TargetKind::DockingPort, format!("{}/{}", vessel, part_id), name)
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

impl Eq for Target {}

fn clamp_or_zero(v: f32, lo: f32, hi: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(lo, hi) }
}

fn check_range(field: &'static str, v: f32, lo: f32, hi: f32) -> Result<f32> {
    if v.is_finite() && (lo..=hi).contains(&v) {
        Ok(v)
    } else {
        Err(Error::invalid(field, format!("{} outside [{}, {}]", v, lo, hi)))
    }
}

// ============================================================================
// Wire conversions
// ============================================================================

impl From<&Time> for TimeMsg {
    fn from(t: &Time) -> Self {
        Self {
            universal_time: t.universal_time,
            warp_rate_index: t.warp_rate_index,
            warp_rate: t.warp_rate,
        }
    }
}

impl From<TimeMsg> for Time {
    fn from(m: TimeMsg) -> Self {
        Self::new(m.universal_time, m.warp_rate_index, m.warp_rate)
    }
}

impl From<&Orbit> for OrbitMsg {
    fn from(o: &Orbit) -> Self {
        Self {
            reference_body: o.reference_body.clone(),
            inclination: o.inclination,
            eccentricity: o.eccentricity,
            semi_major_axis: o.semi_major_axis,
            longitude_of_ascending_node: o.longitude_of_ascending_node,
            argument_of_periapsis: o.argument_of_periapsis,
            mean_anomaly_at_epoch: o.mean_anomaly_at_epoch,
            epoch: o.epoch,
        }
    }
}

impl From<OrbitMsg> for Orbit {
    fn from(m: OrbitMsg) -> Self {
        Self {
            reference_body: m.reference_body,
            inclination: m.inclination,
            eccentricity: m.eccentricity,
            semi_major_axis: m.semi_major_axis,
            longitude_of_ascending_node: m.longitude_of_ascending_node,
            argument_of_periapsis: m.argument_of_periapsis,
            mean_anomaly_at_epoch: m.mean_anomaly_at_epoch,
            epoch: m.epoch,
        }
    }
}

impl From<&Vessel> for VesselMsg {
    fn from(v: &Vessel) -> Self {
        Self {
            id: v.id.as_bytes().to_vec(),
            name: v.name.clone(),
            orbit: Some(OrbitMsg::from(&v.orbit)),
            height: v.height,
            sas: v.action_groups.sas,
            rcs: v.action_groups.rcs,
            light: v.action_groups.lights,
            brakes: v.action_groups.brakes,
            gear: v.action_groups.gear,
            abort: v.action_groups.abort,
            throttle: v.controls.throttle,
            pitch: v.controls.pitch,
            yaw: v.controls.yaw,
            roll: v.controls.roll,
        }
    }
}

impl TryFrom<VesselMsg> for Vessel {
    type Error = Error;

    fn try_from(m: VesselMsg) -> Result<Self> {
        let id = Uuid::from_slice(&m.id)
            .map_err(|_| Error::invalid("vessel.id", format!("{} bytes, expected 16", m.id.len())))?;
        let orbit = m
            .orbit
            .map(Orbit::from)
            .ok_or_else(|| Error::invalid("vessel.orbit", "missing"))?;
        if !m.height.is_finite() || m.height < 0.0 {
            return Err(Error::invalid("vessel.height", format!("{} is not >= 0", m.height)));
        }

        Ok(Self {
            id,
            name: m.name,
            orbit,
            height: m.height,
            action_groups: ActionGroups {
                sas: m.sas,
                rcs: m.rcs,
                lights: m.light,
                brakes: m.brakes,
                gear: m.gear,
                abort: m.abort,
            },
            controls: ControlState {
                throttle: check_range("vessel.throttle", m.throttle, 0.0, 1.0)?,
                pitch: check_range("vessel.pitch", m.pitch, -1.0, 1.0)?,
                yaw: check_range("vessel.yaw", m.yaw, -1.0, 1.0)?,
                roll: check_range("vessel.roll", m.roll, -1.0, 1.0)?,
            },
        })
    }
}

impl From<&ManeuverList> for ManeuverListMsg {
    fn from(list: &ManeuverList) -> Self {
        Self {
            nodes: list
                .nodes
                .iter()
                .map(|n| ManeuverNodeMsg {
                    ut: n.ut,
                    delta_v: Some(Vector3Msg {
                        x: n.delta_v.x,
                        y: n.delta_v.y,
                        z: n.delta_v.z,
                    }),
                })
                .collect(),
        }
    }
}

impl TryFrom<ManeuverListMsg> for ManeuverList {
    type Error = Error;

    fn try_from(m: ManeuverListMsg) -> Result<Self> {
        let nodes = m
            .nodes
            .into_iter()
            .map(|n| {
                let dv = n
                    .delta_v
                    .ok_or_else(|| Error::invalid("maneuver.delta_v", "missing"))?;
                Ok(ManeuverNode::new(n.ut, Vector3::new(dv.x, dv.y, dv.z)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { nodes })
    }
}

impl From<TargetKind> for TargetKindMsg {
    fn from(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Body => TargetKindMsg::Body,
            TargetKind::Vessel => TargetKindMsg::Vessel,
            TargetKind::DockingPort => TargetKindMsg::DockingPort,
        }
    }
}

impl From<&Target> for TargetMsg {
    fn from(t: &Target) -> Self {
        Self {
            kind: TargetKindMsg::from(t.kind) as i32,
            id: t.id.clone(),
            name: t.name.clone(),
        }
    }
}

impl TryFrom<TargetMsg> for Target {
    type Error = Error;

    fn try_from(m: TargetMsg) -> Result<Self> {
        let kind = match TargetKindMsg::try_from(m.kind) {
            Ok(TargetKindMsg::Body) => TargetKind::Body,
            Ok(TargetKindMsg::Vessel) => TargetKind::Vessel,
            Ok(TargetKindMsg::DockingPort) => TargetKind::DockingPort,
            Ok(TargetKindMsg::Unspecified) | Err(_) => {
                return Err(Error::invalid("target.kind", format!("unsupported value {}", m.kind)));
            }
        };
        Ok(Self {
            kind,
            id: m.id,
            name: m.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(ut: f64, prograde: f64) -> ManeuverNode {
        ManeuverNode::new(ut, Vector3::new(prograde, 0.0, 0.0))
    }

    #[test]
    fn test_target_equality_ignores_name() {
        let id = Uuid::from_u128(0x42);
        let a = Target::vessel(id, "Kerbal X");
        let b = Target::vessel(id, "Kerbal X (renamed)");
        assert_eq!(a, b);
    }

    #[test]
    fn test_target_equality_needs_same_kind() {
        let body = Target::new(TargetKind::Body, "Mun", "Mun");
        let vessel = Target::new(TargetKind::Vessel, "Mun", "Mun");
        assert_ne!(body, vessel);
    }

    #[test]
    fn test_maneuver_list_order_matters() {
        let a = ManeuverList::new(vec![node(100.0, 10.0), node(200.0, 20.0)]);
        let b = ManeuverList::new(vec![node(200.0, 20.0), node(100.0, 10.0)]);
        let c = ManeuverList::new(vec![node(100.0, 10.0), node(200.0, 20.0)]);
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_height_above() {
        assert_eq!(Vessel::height_above(120.0, 80.0), 80.0);
        assert_eq!(Vessel::height_above(-3.0, 50.0), 0.0);
        assert_eq!(Vessel::height_above(f32::NAN, f32::NAN), 0.0);
    }

    #[test]
    fn test_controls_clamped() {
        let c = ControlState {
            throttle: 1.5,
            pitch: -2.0,
            yaw: f32::NAN,
            roll: 0.25,
        }
        .clamped();
        assert_eq!(c.throttle, 1.0);
        assert_eq!(c.pitch, -1.0);
        assert_eq!(c.yaw, 0.0);
        assert_eq!(c.roll, 0.25);
    }

    #[test]
    fn test_total_delta_v() {
        let list = ManeuverList::new(vec![
            ManeuverNode::new(10.0, Vector3::new(3.0, 4.0, 0.0)),
            node(20.0, 5.0),
        ]);
        assert!((list.total_delta_v() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_target_kind_unspecified_rejected() {
        let msg = TargetMsg {
            kind: TargetKindMsg::Unspecified as i32,
            id: "Mun".into(),
            name: "Mun".into(),
        };
        assert!(Target::try_from(msg).is_err());

        let msg = TargetMsg {
            kind: 99,
            id: "Mun".into(),
            name: "Mun".into(),
        };
        assert!(Target::try_from(msg).is_err());
    }

    #[test]
    fn test_maneuver_node_without_delta_v_rejected() {
        let msg = ManeuverListMsg {
            nodes: vec![ManeuverNodeMsg {
                ut: 5.0,
                delta_v: None,
            }],
        };
        assert!(ManeuverList::try_from(msg).is_err());
    }

    #[test]
    fn test_docking_port_id() {
        let target = Target::docking_port(Uuid::from_u128(1), 77, "Clamp-O-Tron");
        assert_eq!(target.kind, TargetKind::DockingPort);
        assert!(target.id.ends_with("/77"));
    }
}

//! In-process stand-in for a running game.
//!
//! Drives the `serve` subcommand and the integration tests without a real
//! simulation: one vessel on a circular orbit of Kerbin, a clock that honors
//! time warp, and a save built from that state (or read from a file).
//!
//! ```text
//! advance(dt) ──► ut += dt * warp ──► mean anomaly += n * dt
//!                                     throttle follows a slow sine
//! ```

use crate::comms::save::Save;
use crate::comms::types::{
    ActionGroups, ControlState, ManeuverList, Orbit, Target, Time, Vessel,
};
use crate::error::Result;
use crate::server::HostWorld;
use std::f64::consts::TAU;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Gravitational parameter of Kerbin (m³/s²)
const KERBIN_MU: f64 = 3.5316e12;

/// Warp multipliers indexed by warp rate index
const WARP_RATES: [f32; 8] = [1.0, 5.0, 10.0, 50.0, 100.0, 1_000.0, 10_000.0, 100_000.0];

struct SimVessel {
    id: Uuid,
    name: String,
    orbit: Orbit,
    maneuvers: ManeuverList,
    target: Option<Target>,
}

/// A scripted game world
pub struct SimulatedGame {
    universal_time: f64,
    warp_index: usize,
    vessel: Option<SimVessel>,
    in_flight: bool,
    session_active: bool,
    save_file: Option<PathBuf>,
}

impl SimulatedGame {
    /// A game in flight with one vessel in a circular orbit at `altitude` meters.
    pub fn new(vessel_name: &str, altitude: f64) -> Self {
        Self {
            universal_time: 0.0,
            warp_index: 0,
            vessel: Some(SimVessel {
                id: Uuid::new_v4(),
                name: vessel_name.to_string(),
                orbit: Orbit {
                    reference_body: "Kerbin".to_string(),
                    inclination: 0.0,
                    eccentricity: 0.0,
                    semi_major_axis: 600_000.0 + altitude,
                    longitude_of_ascending_node: 0.0,
                    argument_of_periapsis: 0.0,
                    mean_anomaly_at_epoch: 0.0,
                    epoch: 0.0,
                },
                maneuvers: ManeuverList::default(),
                target: None,
            }),
            in_flight: true,
            session_active: true,
            save_file: None,
        }
    }

    /// Serve the bytes of `path` as the save instead of a generated one.
    pub fn with_save_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_file = Some(path.into());
        self
    }

    /// Advance the clock by `dt` of wall time, scaled by the warp rate.
    pub fn advance(&mut self, dt: Duration) {
        let step = dt.as_secs_f64() * f64::from(WARP_RATES[self.warp_index]);
        self.universal_time += step;

        if let Some(vessel) = &mut self.vessel {
            let a = vessel.orbit.semi_major_axis;
            let mean_motion = (KERBIN_MU / (a * a * a)).sqrt();
            vessel.orbit.mean_anomaly_at_epoch =
                (vessel.orbit.mean_anomaly_at_epoch + mean_motion * step).rem_euclid(TAU);
            vessel.orbit.epoch = self.universal_time;
        }
    }

    pub fn set_warp_index(&mut self, index: usize) {
        self.warp_index = index.min(WARP_RATES.len() - 1);
    }

    /// Jump back in time, as a quickload does.
    pub fn revert(&mut self, universal_time: f64) {
        self.universal_time = universal_time;
    }

    pub fn set_in_flight(&mut self, in_flight: bool) {
        self.in_flight = in_flight;
    }

    pub fn end_session(&mut self) {
        self.session_active = false;
    }

    /// Remove the active vessel (e.g. it was recovered).
    pub fn remove_vessel(&mut self) {
        self.vessel = None;
    }

    pub fn maneuvers(&self) -> Option<&ManeuverList> {
        self.vessel.as_ref().map(|v| &v.maneuvers)
    }

    pub fn current_target(&self) -> Option<&Target> {
        self.vessel.as_ref().and_then(|v| v.target.as_ref())
    }

    fn render_save(&self) -> Save {
        let mut text = format!("GAME\n{{\n\tUT = {:.3}\n", self.universal_time);
        if let Some(vessel) = &self.vessel {
            text.push_str(&format!(
                "\tVESSEL\n\t{{\n\t\tpid = {}\n\t\tname = {}\n\t\tsma = {:.1}\n\t\tnodes = {}\n\t}}\n",
                vessel.id.simple(),
                vessel.name,
                vessel.orbit.semi_major_axis,
                vessel.maneuvers.len()
            ));
        }
        text.push_str("}\n");
        Save::new(text.into_bytes())
    }
}

impl HostWorld for SimulatedGame {
    fn session_active(&self) -> bool {
        self.session_active
    }

    fn in_flight_scene(&self) -> bool {
        self.in_flight
    }

    fn has_game(&self) -> bool {
        true
    }

    fn time(&self) -> Time {
        Time::new(
            self.universal_time,
            self.warp_index as i32,
            WARP_RATES[self.warp_index],
        )
    }

    fn active_vessel(&self) -> Option<Vessel> {
        let vessel = self.vessel.as_ref()?;
        let altitude = (vessel.orbit.semi_major_axis - 600_000.0) as f32;
        let throttle = (0.5 + 0.5 * (self.universal_time / 30.0).sin()) as f32;

        Some(Vessel {
            id: vessel.id,
            name: vessel.name.clone(),
            orbit: vessel.orbit.clone(),
            height: Vessel::height_above(altitude, altitude),
            action_groups: ActionGroups {
                sas: true,
                ..ActionGroups::default()
            },
            controls: ControlState {
                throttle,
                ..ControlState::default()
            }
            .clamped(),
        })
    }

    fn has_active_vessel(&self) -> bool {
        self.vessel.is_some()
    }

    fn maneuver_list(&self) -> Option<ManeuverList> {
        self.vessel.as_ref().map(|v| v.maneuvers.clone())
    }

    fn target(&self) -> Option<Target> {
        self.vessel.as_ref().and_then(|v| v.target.clone())
    }

    fn snapshot_game(&mut self) -> Result<Save> {
        match &self.save_file {
            Some(path) => Save::from_file(path),
            None => Ok(self.render_save()),
        }
    }

    fn apply_maneuvers(&mut self, maneuvers: ManeuverList) {
        if let Some(vessel) = &mut self.vessel {
            log::info!("{} now has {} maneuver nodes", vessel.name, maneuvers.len());
            vessel.maneuvers = maneuvers;
        }
    }

    fn apply_target(&mut self, target: Target) {
        if let Some(vessel) = &mut self.vessel {
            log::info!("{} now targets {}", vessel.name, target.name);
            vessel.target = Some(target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::types::{ManeuverNode, Vector3};

    #[test]
    fn test_advance_scales_with_warp() {
        let mut game = SimulatedGame::new("Kerbal X", 80_000.0);
        game.advance(Duration::from_secs(1));
        game.set_warp_index(2);
        game.advance(Duration::from_secs(1));
        assert!((game.time().universal_time - 11.0).abs() < 1e-9);
        assert_eq!(game.time().warp_rate, 10.0);
    }

    #[test]
    fn test_vessel_moves_along_orbit() {
        let mut game = SimulatedGame::new("Kerbal X", 80_000.0);
        let before = game.active_vessel().unwrap().orbit.mean_anomaly_at_epoch;
        game.advance(Duration::from_secs(60));
        let after = game.active_vessel().unwrap().orbit.mean_anomaly_at_epoch;
        assert!(after > before);
        assert!(after < TAU);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut game = SimulatedGame::new("Kerbal X", 80_000.0);
        game.apply_maneuvers(ManeuverList::new(vec![ManeuverNode::new(
            100.0,
            Vector3::new(1.0, 0.0, 0.0),
        )]));
        let save = game.snapshot_game().unwrap();
        let text = String::from_utf8(save.into_bytes()).unwrap();
        assert!(text.contains("name = Kerbal X"));
        assert!(text.contains("nodes = 1"));
    }

    #[test]
    fn test_snapshot_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("persistent.sfs");
        std::fs::write(&path, b"GAME {}").unwrap();

        let mut game = SimulatedGame::new("Kerbal X", 80_000.0).with_save_file(&path);
        assert_eq!(game.snapshot_game().unwrap().as_bytes(), b"GAME {}");
    }

    #[test]
    fn test_no_vessel_ignores_updates() {
        let mut game = SimulatedGame::new("Kerbal X", 80_000.0);
        game.remove_vessel();
        game.apply_target(Target::body("Mun"));
        assert!(game.active_vessel().is_none());
        assert!(game.current_target().is_none());
        assert!(game.maneuver_list().is_none());
    }
}

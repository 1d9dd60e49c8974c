//! The boundary between the sync server and the simulation that embeds it.

use crate::comms::save::Save;
use crate::comms::types::{ManeuverList, Target, Time, Vessel};
use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// What the server needs from the running game
///
/// Called from the host's own update thread once per tick.
pub trait HostWorld {
    /// False once the player leaves the game (main menu, credits). The
    /// server then shuts itself down.
    fn session_active(&self) -> bool {
        true
    }

    /// True in scenes that have a planetarium (flight, map, tracking station).
    fn in_flight_scene(&self) -> bool;

    /// Whether a game is loaded that can be snapshotted.
    fn has_game(&self) -> bool;

    fn time(&self) -> Time;

    /// Snapshot of the active vessel, if any
    fn active_vessel(&self) -> Option<Vessel>;

    fn has_active_vessel(&self) -> bool {
        self.active_vessel().is_some()
    }

    /// Maneuver nodes of the active vessel
    fn maneuver_list(&self) -> Option<ManeuverList>;

    /// Current target of the active vessel
    fn target(&self) -> Option<Target>;

    /// Serialize the whole current game.
    fn snapshot_game(&mut self) -> Result<Save>;

    /// Replace the active vessel's maneuver nodes.
    fn apply_maneuvers(&mut self, maneuvers: ManeuverList);

    fn apply_target(&mut self, target: Target);
}

/// Requests a fresh save snapshot from any thread
///
/// Hand clones to vessel created, destroyed and changed event handlers.
#[derive(Clone, Debug)]
pub struct SaveSyncTrigger {
    requested: Arc<AtomicBool>,
}

impl SaveSyncTrigger {
    /// A new trigger starts requested, so the first tick snapshots the game.
    pub fn new() -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn request(&self, reason: &str) {
        log::debug!("{}, pending save sync", reason);
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Clear and return the request flag.
    pub(crate) fn take(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }
}

impl Default for SaveSyncTrigger {
    fn default() -> Self {
        Self::new()
    }
}

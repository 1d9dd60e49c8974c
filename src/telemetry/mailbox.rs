//! Where decoded envelopes land until the host drains them.

use crate::comms::codec::{ClientPacket, Envelope, Packet};
use crate::comms::types::{ManeuverList, Target, Time, Vessel};
use crate::sync::{DedupSlot, PendingSlot};

/// An envelope type a receive worker can route into a mailbox.
pub trait Inbound: Envelope + Send + 'static {
    /// Slots this envelope publishes into
    type Mailbox: Default + Send + Sync + 'static;

    /// Apply the publish rules for one decoded datagram.
    fn publish(self, mailbox: &Self::Mailbox);
}

/// Flight-plan changes drained in one go
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlightPlan {
    pub target: Option<Target>,
    pub maneuver_list: Option<ManeuverList>,
}

impl FlightPlan {
    pub fn is_empty(&self) -> bool {
        self.target.is_none() && self.maneuver_list.is_none()
    }
}

/// Change-filtered target and maneuver slots
///
/// The two sub-fields are filtered independently: one datagram may carry a
/// changed target and an unchanged maneuver list.
#[derive(Debug, Default)]
pub struct FlightPlanMailbox {
    target: DedupSlot<Target>,
    maneuvers: DedupSlot<ManeuverList>,
}

impl FlightPlanMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer the optional sub-fields of one datagram. Absent fields are
    /// skipped. Returns whether each one produced a pending update.
    pub fn offer(
        &self,
        target: Option<Target>,
        maneuver_list: Option<ManeuverList>,
    ) -> (bool, bool) {
        let target_changed = target.is_some_and(|t| self.target.offer(t));
        let maneuvers_changed = maneuver_list.is_some_and(|m| self.maneuvers.offer(m));
        if target_changed || maneuvers_changed {
            log::debug!(
                "Flight plan update (target: {}, maneuvers: {})",
                target_changed,
                maneuvers_changed
            );
        }
        (target_changed, maneuvers_changed)
    }

    pub fn take_target(&self) -> Option<Target> {
        self.target.take()
    }

    pub fn take_maneuvers(&self) -> Option<ManeuverList> {
        self.maneuvers.take()
    }

    /// Drain both slots.
    pub fn take(&self) -> FlightPlan {
        FlightPlan {
            target: self.take_target(),
            maneuver_list: self.take_maneuvers(),
        }
    }

    /// Forget cached values and pending updates.
    pub fn reset(&self) {
        self.target.reset();
        self.maneuvers.reset();
    }
}

impl Inbound for ClientPacket {
    type Mailbox = FlightPlanMailbox;

    fn publish(self, mailbox: &FlightPlanMailbox) {
        mailbox.offer(self.target, self.maneuver_list);
    }
}

/// Everything the viewer needs from one drain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewUpdate {
    pub time: Option<Time>,
    pub vessel: Option<Vessel>,
    pub plan: FlightPlan,
}

impl ViewUpdate {
    pub fn is_empty(&self) -> bool {
        self.time.is_none() && self.vessel.is_none() && self.plan.is_empty()
    }
}

/// Client-side slots for server telemetry
///
/// Time and vessel change every tick, so they are plain last-write-wins
/// slots. Target and maneuvers go through the change filter.
#[derive(Debug, Default)]
pub struct TelemetryMailbox {
    time: PendingSlot<Time>,
    vessel: PendingSlot<Vessel>,
    plan: FlightPlanMailbox,
}

impl TelemetryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(&self) -> &FlightPlanMailbox {
        &self.plan
    }

    /// Drain every slot.
    pub fn take(&self) -> ViewUpdate {
        ViewUpdate {
            time: self.time.take(),
            vessel: self.vessel.take(),
            plan: self.plan.take(),
        }
    }
}

impl Inbound for Packet {
    type Mailbox = TelemetryMailbox;

    fn publish(self, mailbox: &TelemetryMailbox) {
        if let Some(time) = self.time {
            mailbox.time.put(time);
        }
        if let Some(vessel) = self.vessel {
            mailbox.vessel.put(vessel);
        }
        mailbox.plan.offer(self.target, self.maneuver_list);
    }
}

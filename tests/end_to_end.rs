//! Telemetry and full-link scenarios over loopback sockets.

use mapview_sync::comms::{
    ActionGroups, ClientPacket, ControlState, Envelope, ManeuverList, ManeuverNode, Orbit,
    Packet, Save, Target, TargetKind, Time, Vector3, Vessel,
};
use mapview_sync::config::EndpointConfig;
use mapview_sync::sim::SimulatedGame;
use mapview_sync::telemetry::{InboundWorker, TelemetrySender};
use mapview_sync::{HostWorld, Result, Settings, SyncClient, SyncServer, TickOutcome};
use std::fs;
use std::net::{TcpListener, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(5);

fn sample_vessel() -> Vessel {
    Vessel {
        id: Uuid::from_u128(42),
        name: "Kerbal X".to_string(),
        orbit: Orbit {
            reference_body: "Kerbin".to_string(),
            inclination: 0.5,
            eccentricity: 0.01,
            semi_major_axis: 680_000.0,
            longitude_of_ascending_node: 10.0,
            argument_of_periapsis: 20.0,
            mean_anomaly_at_epoch: 0.3,
            epoch: 1_000.0,
        },
        height: 80_000.0,
        action_groups: ActionGroups {
            sas: true,
            ..ActionGroups::default()
        },
        controls: ControlState {
            throttle: 0.25,
            ..ControlState::default()
        },
    }
}

fn burn(ut: f64) -> ManeuverList {
    ManeuverList::new(vec![ManeuverNode::new(ut, Vector3::new(100.0, 0.0, 0.0))])
}

/// Scripted host that records what the server applied
struct FakeHost {
    ut: f64,
    in_flight: bool,
    session: bool,
    vessel: Option<Vessel>,
    maneuvers: Option<ManeuverList>,
    target: Option<Target>,
    applied_targets: Vec<Target>,
    applied_maneuvers: Vec<ManeuverList>,
    snapshots: u32,
}

impl FakeHost {
    fn new() -> Self {
        Self {
            ut: 1_000.0,
            in_flight: true,
            session: true,
            vessel: Some(sample_vessel()),
            maneuvers: None,
            target: None,
            applied_targets: Vec::new(),
            applied_maneuvers: Vec::new(),
            snapshots: 0,
        }
    }
}

impl HostWorld for FakeHost {
    fn session_active(&self) -> bool {
        self.session
    }

    fn in_flight_scene(&self) -> bool {
        self.in_flight
    }

    fn has_game(&self) -> bool {
        true
    }

    fn time(&self) -> Time {
        Time::new(self.ut, 0, 1.0)
    }

    fn active_vessel(&self) -> Option<Vessel> {
        self.vessel.clone()
    }

    fn maneuver_list(&self) -> Option<ManeuverList> {
        self.maneuvers.clone()
    }

    fn target(&self) -> Option<Target> {
        self.target.clone()
    }

    fn snapshot_game(&mut self) -> Result<Save> {
        self.snapshots += 1;
        Ok(Save::new(format!("save {}", self.snapshots).into_bytes()))
    }

    fn apply_maneuvers(&mut self, maneuvers: ManeuverList) {
        self.applied_maneuvers.push(maneuvers);
    }

    fn apply_target(&mut self, target: Target) {
        self.applied_targets.push(target);
    }
}

fn tick_until(
    server: &mut SyncServer,
    host: &mut FakeHost,
    mut cond: impl FnMut(&FakeHost) -> bool,
) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        server.tick(host);
        if cond(host) {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Server plus a raw UDP socket standing in for the viewer
fn server_with_raw_client() -> (SyncServer, UdpSocket) {
    server_with_save_delay(0)
}

fn server_with_save_delay(save_sync_delay_ms: u64) -> (SyncServer, UdpSocket) {
    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.set_read_timeout(Some(WAIT)).unwrap();

    let mut settings = Settings::default();
    settings.server = EndpointConfig::new("127.0.0.1", 0);
    settings.client = EndpointConfig::new("127.0.0.1", client.local_addr().unwrap().port());
    settings.timing.save_sync_delay_ms = save_sync_delay_ms;

    (SyncServer::start(&settings).unwrap(), client)
}

#[test]
fn packet_without_plan_decodes_with_plan_absent() {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let worker = InboundWorker::<Packet>::start(socket, None, Duration::from_millis(10)).unwrap();
    let sender = TelemetrySender::to_addr(
        UdpSocket::bind("127.0.0.1:0").unwrap(),
        worker.local_addr(),
    )
    .unwrap();

    let t1 = Time::new(17_000.5, 2, 10.0);
    let v1 = sample_vessel();
    assert!(sender.publish(&Packet {
        time: Some(t1),
        vessel: Some(v1.clone()),
        maneuver_list: None,
        target: None,
    }));

    let deadline = Instant::now() + WAIT;
    let update = loop {
        let update = worker.mailbox().take();
        if !update.is_empty() || Instant::now() > deadline {
            break update;
        }
        thread::sleep(Duration::from_millis(5));
    };

    assert_eq!(update.time, Some(t1));
    assert_eq!(update.vessel, Some(v1));
    assert!(update.plan.target.is_none());
    assert!(update.plan.maneuver_list.is_none());
}

#[test]
fn first_tick_snapshots_and_sends_telemetry() {
    let (mut server, client) = server_with_raw_client();
    let mut host = FakeHost::new();
    host.target = Some(Target::body("Mun"));

    assert_eq!(server.tick(&mut host), TickOutcome::Sent);
    assert_eq!(host.snapshots, 1);
    assert_eq!(server.publisher().version(), 1);

    let mut buf = [0u8; 65536];
    let (len, from) = client.recv_from(&mut buf).unwrap();
    assert_eq!(from, server.telemetry_addr());

    let packet = Packet::decode(&buf[..len]).unwrap();
    assert_eq!(packet.time, Some(host.time()));
    assert_eq!(packet.vessel, host.vessel);
    assert!(packet.maneuver_list.is_none());
    assert_eq!(packet.target, Some(Target::body("Mun")));
}

#[test]
fn repeated_target_is_applied_once() {
    let (mut server, client) = server_with_raw_client();
    let mut host = FakeHost::new();
    let server_addr = server.telemetry_addr();

    let t1 = ClientPacket::new(None, Some(Target::body("Mun")));
    client.send_to(&t1.encode(), server_addr).unwrap();
    assert!(tick_until(&mut server, &mut host, |h| h.applied_targets.len() == 1));

    // the duplicate goes first, the maneuver marks that it was processed
    client.send_to(&t1.encode(), server_addr).unwrap();
    client
        .send_to(&ClientPacket::new(Some(burn(2_000.0)), None).encode(), server_addr)
        .unwrap();
    assert!(tick_until(&mut server, &mut host, |h| h.applied_maneuvers.len() == 1));
    assert_eq!(host.applied_targets.len(), 1);

    let t2 = Target::new(TargetKind::Vessel, Uuid::from_u128(7).to_string(), "Station");
    client
        .send_to(&ClientPacket::new(None, Some(t2.clone())).encode(), server_addr)
        .unwrap();
    assert!(tick_until(&mut server, &mut host, |h| h.applied_targets.len() == 2));
    assert_eq!(host.applied_targets[0], Target::body("Mun"));
    assert_eq!(host.applied_targets[1], t2);
    assert_eq!(host.applied_maneuvers, vec![burn(2_000.0)]);
}

#[test]
fn maneuvers_without_active_vessel_are_dropped() {
    let (mut server, client) = server_with_raw_client();
    let mut host = FakeHost::new();
    host.vessel = None;
    let server_addr = server.telemetry_addr();

    client
        .send_to(&ClientPacket::new(Some(burn(3_000.0)), None).encode(), server_addr)
        .unwrap();
    client
        .send_to(
            &ClientPacket::new(None, Some(Target::body("Duna"))).encode(),
            server_addr,
        )
        .unwrap();

    assert!(tick_until(&mut server, &mut host, |h| !h.applied_targets.is_empty()));
    assert!(host.applied_maneuvers.is_empty());
}

#[test]
fn huge_save_sync_delay_never_snapshots() {
    let (mut server, client) = server_with_save_delay(u64::MAX);
    let mut host = FakeHost::new();

    for _ in 0..3 {
        assert_eq!(server.tick(&mut host), TickOutcome::Sent);
    }
    server.trigger().request("vessel changed");
    assert_eq!(server.tick(&mut host), TickOutcome::Sent);

    assert_eq!(host.snapshots, 0);
    assert_eq!(server.publisher().version(), 0);

    let mut buf = [0u8; 65536];
    let (len, _) = client.recv_from(&mut buf).unwrap();
    assert!(Packet::decode(&buf[..len]).unwrap().time.is_some());
}

#[test]
fn time_going_backwards_requests_a_new_save() {
    let (mut server, _client) = server_with_raw_client();
    let mut host = FakeHost::new();

    server.tick(&mut host);
    host.ut += 10.0;
    server.tick(&mut host);
    assert_eq!(host.snapshots, 1);

    host.ut -= 500.0;
    server.tick(&mut host);
    server.tick(&mut host);
    assert_eq!(host.snapshots, 2);
    assert_eq!(server.publisher().version(), 2);
}

#[test]
fn trigger_from_another_thread_requests_a_save() {
    let (mut server, _client) = server_with_raw_client();
    let mut host = FakeHost::new();
    server.tick(&mut host);

    let trigger = server.trigger();
    thread::spawn(move || trigger.request("Vessel destroyed (Kerbal X)"))
        .join()
        .unwrap();

    server.tick(&mut host);
    assert_eq!(host.snapshots, 2);
}

#[test]
fn outside_flight_nothing_is_sent() {
    let (mut server, client) = server_with_raw_client();
    let mut host = FakeHost::new();
    host.in_flight = false;

    assert_eq!(server.tick(&mut host), TickOutcome::Idle);
    // the save still syncs outside flight
    assert_eq!(host.snapshots, 1);

    client
        .set_read_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    let mut buf = [0u8; 1500];
    assert!(client.recv_from(&mut buf).is_err());
}

#[test]
fn session_end_stops_the_server() {
    let (mut server, _client) = server_with_raw_client();
    let mut host = FakeHost::new();
    host.session = false;

    assert_eq!(server.tick(&mut host), TickOutcome::SessionEnded);
    assert!(server.is_stopped());
    assert_eq!(server.tick(&mut host), TickOutcome::SessionEnded);
    assert_eq!(host.snapshots, 0);
}

#[test]
fn viewer_follows_simulated_game() {
    let dir = TempDir::new().unwrap();
    let server_port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut settings = Settings::default();
    settings.server = EndpointConfig::new("127.0.0.1", server_port);
    settings.client = EndpointConfig::new("127.0.0.1", 0);
    settings.save.path = dir.path().join("persistent.sfs");
    settings.timing.reconnect_backoff_ms = 20;
    settings.timing.save_sync_delay_ms = save_sync_delay_ms;

    // the viewer comes up first and retries until the server listens
    let mut client = SyncClient::start(&settings).unwrap();
    settings.client.port = client.telemetry_addr().port();
    let mut server = SyncServer::start(&settings).unwrap();
    let mut game = SimulatedGame::new("Kerbal X", 80_000.0);

    let mut vessel = None;
    let mut seen_target = None;
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        game.advance(Duration::from_millis(50));
        server.tick(&mut game);

        let update = client.poll();
        if update.vessel.is_some() {
            vessel = update.vessel;
        }
        if update.plan.target.is_some() {
            seen_target = update.plan.target;
        }

        if vessel.is_some() && client.server_peer().is_some() && game.current_target().is_none() {
            client.send_plan(None, Some(Target::body("Mun")));
        }

        if seen_target.is_some() && client.save_worker().first_save_received().is_set() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(vessel.map(|v| v.name), Some("Kerbal X".to_string()));
    assert_eq!(game.current_target(), Some(&Target::body("Mun")));
    assert_eq!(seen_target, Some(Target::body("Mun")));

    assert!(client.save_worker().first_save_received().is_set());
    let saved = {
        let _guard = client.save_worker().save_lock().lock();
        fs::read_to_string(&settings.save.path).unwrap()
    };
    assert!(saved.contains("name = Kerbal X"));

    server.stop().unwrap();
    client.stop().unwrap();
}

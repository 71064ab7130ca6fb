#![allow(clippy::unwrap_used)]
// Integration tests for `Station` against a scripted mock command station.

use std::collections::HashMap;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout};

use excs_core::{CoreError, CvWrite, Direction, Station, StationConfig, TurnoutState};

const WAIT: Duration = Duration::from_secs(3);

const BANNER: &str = "iDCC-EX V-5.4.8 / ESP32 / STANDARD_MOTOR_SHIELD G-c389fe9";

// ── Mock station ────────────────────────────────────────────────────

type Script = HashMap<&'static str, Vec<&'static str>>;

/// Replies for a healthy station with two locos, one live route, two
/// turnouts and three tracks.
fn layout() -> Script {
    HashMap::from([
        ("s", vec![BANNER, "p1"]),
        ("JR", vec!["jR 3 7"]),
        ("JR 3", vec![r#"jR 3 "Big Boy" "Lights/*Horn""#]),
        ("JR 7", vec![r#"jR 7 "" """#]),
        ("J A", vec!["jA 1 2"]),
        ("J A 1", vec![r#"jA 1 R "Yard throat""#]),
        ("J A 2", vec!["jA 2 X"]),
        ("JT", vec!["jT 10 11"]),
        ("JT 10", vec![r#"jT 10 C "Main east""#]),
        ("JT 11", vec!["jT 11 X"]),
        ("=", vec!["= A MAIN", "= B PROG", "= C DC 3"]),
        ("c", vec![r#"c "CurrentMAIN" 120 C "Milli" "0" 5000 "MAX_MA" 4500"#]),
    ])
}

struct MockStation {
    config: StationConfig,
    commands: mpsc::UnboundedReceiver<String>,
    push: mpsc::UnboundedSender<String>,
}

impl MockStation {
    async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut config = StationConfig::new("127.0.0.1", port);
        config.connection_timeout = Duration::from_secs(1);
        config.response_timeout = Duration::from_secs(2);
        config.settle_time = Duration::from_millis(100);
        config.min_backoff = Duration::from_millis(50);
        config.max_backoff = Duration::from_millis(200);

        let (command_tx, commands) = mpsc::unbounded_channel();
        let (push, mut push_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let (read, mut writer) = stream.into_split();
            let mut lines = BufReader::new(read).lines();

            loop {
                tokio::select! {
                    line = lines.next_line() => {
                        let Ok(Some(line)) = line else { return };
                        let command = line.trim_start_matches('<').trim_end_matches('>').to_owned();
                        if command == "#" {
                            continue;
                        }
                        for reply in script.get(command.as_str()).into_iter().flatten() {
                            if writer.write_all(format!("<{reply}>\n").as_bytes()).await.is_err() {
                                return;
                            }
                        }
                        let _ = command_tx.send(command);
                    }
                    Some(frame) = push_rx.recv() => {
                        if writer.write_all(format!("<{frame}>\n").as_bytes()).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Self { config, commands, push }
    }

    async fn next_command(&mut self) -> String {
        timeout(WAIT, self.commands.recv()).await.unwrap().unwrap()
    }

    fn push(&self, frame: &str) {
        self.push.send(frame.to_owned()).unwrap();
    }
}

async fn set_up(script: Script) -> (Station, MockStation) {
    let mock = MockStation::start(script).await;
    let station = Station::new(mock.config.clone());
    station.setup().await.unwrap();
    (station, mock)
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(10)).await;
    }
}

// ── Setup ───────────────────────────────────────────────────────────

#[tokio::test]
async fn setup_identifies_station_and_loads_catalogs() {
    let (station, _mock) = set_up(layout()).await;

    let info = station.system_info().unwrap();
    assert_eq!(info.version.to_string(), "5.4.8");
    assert_eq!(info.processor, "ESP32");
    assert_eq!(info.motor_controller, "STANDARD_MOTOR_SHIELD");
    assert_eq!(info.build, "G-c389fe9");
    assert_eq!(station.initial_tracks_power(), Some(true));

    let roster = station.roster().snapshot();
    assert_eq!(roster.len(), 2);
    let big_boy = station.roster().get(3).unwrap();
    assert_eq!(big_boy.description, "Big Boy");
    assert_eq!(big_boy.functions[&0].label, "Lights");
    assert!(!big_boy.functions[&0].momentary);
    assert_eq!(big_boy.functions[&1].label, "Horn");
    assert!(big_boy.functions[&1].momentary);
    assert_eq!(station.roster().get(7).unwrap().description, "Locomotive 7");

    // Route 2 has no known type and is dropped.
    let routes = station.routes().snapshot();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].id(), 1);
    assert_eq!(routes[0].description, "Yard throat");

    // A turnout in an unknown state is kept.
    assert_eq!(station.turnouts().len(), 2);
    assert_eq!(station.turnouts().get(10).unwrap().state, TurnoutState::Closed);
    assert_eq!(station.turnouts().get(11).unwrap().state, TurnoutState::Unknown);

    let tracks = station.tracks().snapshot();
    let letters: Vec<char> = tracks.iter().map(|t| t.letter()).collect();
    assert_eq!(letters, vec!['A', 'B', 'C']);
    assert_eq!(station.tracks().get('C').unwrap().cab, 3);

    station.shutdown().await;
}

#[tokio::test]
async fn old_firmware_fails_the_version_gate() {
    let mut script = layout();
    script.insert("s", vec!["iDCC-EX V-4.2.0 / MEGA / STANDARD_MOTOR_SHIELD G-1"]);
    let mut mock = MockStation::start(script).await;
    let station = Station::new(mock.config.clone());

    let err = station.setup().await.unwrap_err();
    assert!(matches!(err, CoreError::Version { .. }), "{err:?}");
    assert!(err.is_permanent());
    assert!(err.to_string().contains("4.2.0"));

    // Catalogs are never requested.
    assert_eq!(mock.next_command().await, "s");
    station.emergency_stop().await.unwrap();
    assert_eq!(mock.next_command().await, "!");
    assert!(station.roster().is_empty());

    station.shutdown().await;
}

#[tokio::test]
async fn failed_refresh_leaves_catalog_empty() {
    let mut script = layout();
    script.insert("J A", vec!["jA 1 x"]);
    let mock = MockStation::start(script).await;
    let station = Station::new(mock.config.clone());

    let err = station.setup().await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidResponse { .. }), "{err:?}");
    assert_eq!(station.roster().len(), 2);
    assert!(station.routes().is_empty());

    station.shutdown().await;
}

#[tokio::test]
async fn validate_config_reports_system_info() {
    let mock = MockStation::start(layout()).await;
    let station = Station::new(mock.config.clone());

    let info = station.validate_config().await.unwrap();
    assert_eq!(info.processor, "ESP32");
    assert!(station.validate_version().is_ok());
    assert!(station.turnouts().is_empty());

    station.shutdown().await;
}

// ── Pushes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn turnout_pushes_update_state() {
    let (station, mock) = set_up(layout()).await;
    let mut stream = station.turnouts().stream();

    mock.push("H 10 1");
    let snapshot = timeout(WAIT, stream.changed()).await.unwrap().unwrap();
    let turnout = snapshot.iter().find(|t| t.id() == 10).unwrap();
    assert_eq!(turnout.state, TurnoutState::Thrown);

    // Unknown ids leave the catalog alone.
    mock.push("H 99 1");
    mock.push("H 10 0");
    eventually("turnout 10 closed", || {
        station.turnouts().get(10).unwrap().state == TurnoutState::Closed
    })
    .await;
    assert_eq!(station.turnouts().len(), 2);

    station.shutdown().await;
}

#[tokio::test]
async fn throttle_pushes_update_roster() {
    let (station, mock) = set_up(layout()).await;

    // Forward, step 21, F0 and F2 on.
    mock.push("l 3 0 150 5");
    eventually("loco 3 moving", || station.roster().get(3).unwrap().speed_percent > 0).await;

    let loco = station.roster().get(3).unwrap();
    assert_eq!(loco.speed_percent, 17);
    assert_eq!(loco.direction, Direction::Forward);
    assert!(!loco.emergency_stop);
    assert!(loco.functions[&0].on);
    assert!(!loco.functions[&1].on);

    // Reverse, emergency stop.
    mock.push("l 3 0 1 0");
    eventually("loco 3 stopped", || station.roster().get(3).unwrap().emergency_stop).await;
    let loco = station.roster().get(3).unwrap();
    assert_eq!(loco.direction, Direction::Reverse);
    assert_eq!(loco.speed_percent, 0);

    station.shutdown().await;
}

#[tokio::test]
async fn power_pushes_update_tracks() {
    let (station, mock) = set_up(layout()).await;
    assert!(station.tracks().snapshot().iter().all(|t| !t.powered));

    mock.push("pB1");
    eventually("track B powered", || station.tracks().get('B').unwrap().powered).await;
    assert!(!station.tracks().get('A').unwrap().powered);

    mock.push("p1");
    eventually("all tracks powered", || {
        station.tracks().snapshot().iter().all(|t| t.powered)
    })
    .await;

    mock.push("p0");
    eventually("all tracks off", || {
        station.tracks().snapshot().iter().all(|t| !t.powered)
    })
    .await;

    station.shutdown().await;
}

#[tokio::test]
async fn track_current_is_applied_by_mode() {
    let (station, _mock) = set_up(layout()).await;

    let track = station.track_current().await.unwrap().unwrap();
    assert_eq!(track.letter(), 'A');
    assert_eq!(track.current_ma, 120);
    assert_eq!(track.max_ma, 5000);
    assert_eq!(track.trip_ma, 4500);
    assert_eq!(station.tracks().get('A').unwrap().current_ma, 120);
    assert_eq!(station.tracks().get('B').unwrap().current_ma, 0);

    station.shutdown().await;
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn commands_are_written_to_the_wire() {
    let mut mock = MockStation::start(Script::new()).await;
    let station = Station::new(mock.config.clone());
    station.connect().await.unwrap();

    station.set_turnout(10, TurnoutState::Thrown).await.unwrap();
    assert_eq!(mock.next_command().await, "T 10 T");

    station.start_route(1).await.unwrap();
    assert_eq!(mock.next_command().await, "/ START 1");

    station.tracks_power(true).await.unwrap();
    assert_eq!(mock.next_command().await, "1");

    station.track_power('b', false).await.unwrap();
    assert_eq!(mock.next_command().await, "pB 0");

    station.set_loco_speed(3, 50, Direction::Forward).await.unwrap();
    assert_eq!(mock.next_command().await, "t 3 63 1");

    station.set_loco_speed(3, 100, Direction::Reverse).await.unwrap();
    assert_eq!(mock.next_command().await, "t 3 126 0");

    station.stop_loco(3).await.unwrap();
    assert_eq!(mock.next_command().await, "t 3 -1 1");

    station.set_loco_function(3, 2, true).await.unwrap();
    assert_eq!(mock.next_command().await, "F 3 2 1");

    station.request_loco_state(3).await.unwrap();
    assert_eq!(mock.next_command().await, "t 3");

    station.write_cv(CvWrite::new(3, 1, 3).unwrap()).await.unwrap();
    assert_eq!(mock.next_command().await, "w 3 1 3");

    station.emergency_stop().await.unwrap();
    assert_eq!(mock.next_command().await, "!");

    station.reboot().await.unwrap();
    assert_eq!(mock.next_command().await, "D RESET");

    station.shutdown().await;
}

#[tokio::test]
async fn invalid_arguments_are_rejected_before_sending() {
    let mut mock = MockStation::start(Script::new()).await;
    let station = Station::new(mock.config.clone());
    station.connect().await.unwrap();

    let failures = [
        station.set_turnout(10, TurnoutState::Unknown).await,
        station.set_loco_speed(3, 101, Direction::Forward).await,
        station.set_loco_speed(0, 10, Direction::Forward).await,
        station.set_loco_function(3, 69, true).await,
        station.track_power('Z', true).await,
    ];
    for result in failures {
        assert!(matches!(result, Err(CoreError::Validation { .. })), "{result:?}");
    }

    // Nothing reached the station before this.
    station.emergency_stop().await.unwrap();
    assert_eq!(mock.next_command().await, "!");

    station.shutdown().await;
}

#[tokio::test]
async fn operations_require_a_connection() {
    let mock = MockStation::start(Script::new()).await;
    let station = Station::new(mock.config.clone());

    assert!(matches!(station.fetch_system_info().await, Err(CoreError::NotConnected)));
    assert!(matches!(station.refresh_tracks().await, Err(CoreError::NotConnected)));
    let err = station.start_route(1).await.unwrap_err();
    assert!(err.is_not_ready(), "{err:?}");
    assert!(matches!(station.validate_version(), Err(CoreError::Version { .. })));
    assert!(station.system_info().is_none());
}

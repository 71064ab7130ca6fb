// ── Station facade ──
//
// Owns one connection, the catalog managers and the system info.
// Applies turnout, throttle and power pushes to the catalogs as they
// arrive, and offers typed wrappers for the commands the bridge sends.

use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace};

use excs_api::protocol::{self, RESP_TRACKS_OFF, RESP_TRACKS_ON};
use excs_api::{
    ConnectionState, HandlerResult, Signal, StationClient, StationEvent, Subscription,
};

use crate::catalog::{RosterManager, RoutesManager, TracksManager, TurnoutsManager};
use crate::config::StationConfig;
use crate::error::CoreError;
use crate::model::roster::{MAX_FUNCTION_ID, percent_to_step};
use crate::model::{
    Direction, RosterEntry, Route, SystemInfo, ThrottleUpdate, Track, Turnout, TurnoutState, TurnoutStateUpdate,
};
use crate::stream::Snapshot;

/// Valid locomotive (decoder) addresses.
pub const LOCO_ADDRESS_RANGE: RangeInclusive<u32> = 1..=10239;
pub const CV_NUMBER_RANGE: RangeInclusive<u32> = 1..=1024;
pub const CV_VALUE_RANGE: RangeInclusive<u32> = 0..=255;
/// Track outputs a station can have.
pub const TRACK_LETTERS: RangeInclusive<char> = 'A'..='H';

// ── CvWrite ──────────────────────────────────────────────────────────

/// A validated write of one configuration variable on the main track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CvWrite {
    address: u16,
    cv: u16,
    value: u8,
}

impl CvWrite {
    pub fn new(address: u32, cv: u32, value: u32) -> Result<Self, CoreError> {
        let check = |field: &str, value: u32, range: &RangeInclusive<u32>| {
            if range.contains(&value) {
                Ok(())
            } else {
                Err(CoreError::validation(
                    field,
                    format!("{value} is outside {}-{}", range.start(), range.end()),
                ))
            }
        };
        check("address", address, &LOCO_ADDRESS_RANGE)?;
        check("cv", cv, &CV_NUMBER_RANGE)?;
        check("value", value, &CV_VALUE_RANGE)?;

        let narrow = |field: &str, err| CoreError::validation(field, format!("{err}"));
        Ok(Self {
            address: u16::try_from(address).map_err(|e| narrow("address", e))?,
            cv: u16::try_from(cv).map_err(|e| narrow("cv", e))?,
            value: u8::try_from(value).map_err(|e| narrow("value", e))?,
        })
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn cv(&self) -> u16 {
        self.cv
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn command(&self) -> String {
        protocol::write_cv_cmd(self.address, self.cv, self.value)
    }
}

// ── Station ──────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<StationInner>`.
#[derive(Clone)]
pub struct Station {
    inner: Arc<StationInner>,
}

struct StationInner {
    config: StationConfig,
    client: StationClient,
    roster: RosterManager,
    routes: RoutesManager,
    turnouts: TurnoutsManager,
    tracks: TracksManager,
    system_info: watch::Sender<Option<Arc<SystemInfo>>>,
    initial_power: watch::Sender<Option<bool>>,
    initial_power_handler: Mutex<Option<Subscription>>,
    push: Subscription,
}

impl Drop for StationInner {
    fn drop(&mut self) {
        self.push.unsubscribe();
    }
}

impl Station {
    /// Create a station. Does NOT connect -- call [`setup()`](Self::setup)
    /// or [`connect()`](Self::connect).
    pub fn new(config: StationConfig) -> Self {
        let client = StationClient::new(config.connection_config());
        let (system_info, _) = watch::channel(None);
        let (initial_power, _) = watch::channel(None);

        let inner = Arc::new_cyclic(|weak: &Weak<StationInner>| {
            let weak = weak.clone();
            let push = client.subscribe(Signal::DataPushed, move |event| {
                let (Some(inner), StationEvent::DataPushed(line)) = (weak.upgrade(), event) else {
                    return Ok(());
                };
                inner.apply_push(line).map_err(Into::into)
            });

            StationInner {
                config,
                client,
                roster: RosterManager::new(),
                routes: RoutesManager::new(),
                turnouts: TurnoutsManager::new(),
                tracks: TracksManager::new(),
                system_info,
                initial_power,
                initial_power_handler: Mutex::new(None),
                push,
            }
        });

        Self { inner }
    }

    pub fn config(&self) -> &StationConfig {
        &self.inner.config
    }

    /// The underlying connection, for raw commands.
    pub fn client(&self) -> &StationClient {
        &self.inner.client
    }

    pub fn roster(&self) -> &RosterManager {
        &self.inner.roster
    }

    pub fn routes(&self) -> &RoutesManager {
        &self.inner.routes
    }

    pub fn turnouts(&self) -> &TurnoutsManager {
        &self.inner.turnouts
    }

    pub fn tracks(&self) -> &TracksManager {
        &self.inner.tracks
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    pub async fn connect(&self) -> Result<(), CoreError> {
        Ok(self.inner.client.connect().await?)
    }

    pub async fn disconnect(&self) {
        self.inner.client.disconnect().await;
    }

    pub async fn shutdown(&self) {
        debug!("Shutting down command station bridge");
        self.inner.client.shutdown().await;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.client.is_connected()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.client.connection_state()
    }

    /// Connect if needed, identify the station, check its firmware and
    /// load every catalog.
    pub async fn setup(&self) -> Result<(), CoreError> {
        self.ensure_connected().await?;
        debug!("Configuring command station bridge");

        self.fetch_system_info().await?;
        self.validate_version()?;

        let roster = self.refresh_roster().await?;
        let routes = self.refresh_routes().await?;
        let turnouts = self.refresh_turnouts().await?;
        let tracks = self.refresh_tracks().await?;

        info!(
            roster = roster.len(),
            routes = routes.len(),
            turnouts = turnouts.len(),
            tracks = tracks.len(),
            "Command station catalogs loaded"
        );
        Ok(())
    }

    /// Connect if needed, identify the station and check its firmware.
    pub async fn validate_config(&self) -> Result<Arc<SystemInfo>, CoreError> {
        self.ensure_connected().await?;
        debug!("Validating command station configuration");
        let info = self.fetch_system_info().await?;
        self.validate_version()?;
        Ok(info)
    }

    async fn ensure_connected(&self) -> Result<(), CoreError> {
        if self.is_connected() {
            return Ok(());
        }
        self.connect().await
    }

    // ── System info ──────────────────────────────────────────────────

    /// Send `s` and parse the banner.
    ///
    /// The station reports its global power state in the same burst, so
    /// the first `p1`/`p0` push after this call is recorded as the
    /// initial power state.
    pub async fn fetch_system_info(&self) -> Result<Arc<SystemInfo>, CoreError> {
        let inner = &self.inner;
        if !inner.client.is_connected() {
            return Err(CoreError::NotConnected);
        }

        self.capture_initial_power();
        debug!("Requesting command station system info");
        let response = inner
            .client
            .await_command_response(
                protocol::CMD_SYS_INFO,
                protocol::RESP_SYS_INFO_PREFIX,
                inner.config.response_timeout,
            )
            .await?;

        let info = Arc::new(SystemInfo::parse(&response)?);
        info!(
            version = %info.version,
            processor = %info.processor,
            motor_controller = %info.motor_controller,
            "Command station identified"
        );
        inner.system_info.send_replace(Some(Arc::clone(&info)));
        Ok(info)
    }

    fn capture_initial_power(&self) {
        let weak = Arc::downgrade(&self.inner);
        let subscription = self.inner.client.subscribe_with_token(Signal::DataPushed, move |event, token| {
            let StationEvent::DataPushed(line) = event else {
                return Ok(());
            };
            let on = match line.as_str() {
                RESP_TRACKS_ON => true,
                RESP_TRACKS_OFF => false,
                _ => return Ok(()),
            };
            token.unsubscribe();
            debug!(on, "Initial track power state");
            if let Some(inner) = weak.upgrade() {
                inner.initial_power.send_replace(Some(on));
            }
            Ok(())
        });

        let previous = self
            .inner
            .initial_power_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(subscription);
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
    }

    pub fn system_info(&self) -> Option<Arc<SystemInfo>> {
        self.inner.system_info.borrow().clone()
    }

    /// Global track power as reported right after identification.
    pub fn initial_tracks_power(&self) -> Option<bool> {
        *self.inner.initial_power.borrow()
    }

    /// Fails with [`CoreError::Version`] if no info was fetched yet or
    /// the firmware is too old.
    pub fn validate_version(&self) -> Result<(), CoreError> {
        match self.system_info() {
            Some(info) => info.validate(),
            None => Err(CoreError::Version {
                message: "Command station version has not been retrieved yet".into(),
            }),
        }
    }

    // ── Catalog refresh ──────────────────────────────────────────────

    pub async fn refresh_roster(&self) -> Result<Snapshot<RosterEntry>, CoreError> {
        let inner = &self.inner;
        inner.roster.refresh(&inner.client, inner.config.response_timeout).await
    }

    pub async fn refresh_routes(&self) -> Result<Snapshot<Route>, CoreError> {
        let inner = &self.inner;
        inner.routes.refresh(&inner.client, inner.config.response_timeout).await
    }

    pub async fn refresh_turnouts(&self) -> Result<Snapshot<Turnout>, CoreError> {
        let inner = &self.inner;
        inner.turnouts.refresh(&inner.client, inner.config.response_timeout).await
    }

    pub async fn refresh_tracks(&self) -> Result<Snapshot<Track>, CoreError> {
        let inner = &self.inner;
        inner
            .tracks
            .refresh(&inner.client, inner.config.response_timeout, inner.config.settle_time)
            .await
    }

    /// Read track current and apply it to the matching track.
    pub async fn track_current(&self) -> Result<Option<Arc<Track>>, CoreError> {
        let inner = &self.inner;
        inner
            .tracks
            .get_current(&inner.client, inner.config.response_timeout)
            .await
    }

    // ── Commands ─────────────────────────────────────────────────────
    // Fire-and-forget: the station confirms through pushes.

    async fn send(&self, command: &str) -> Result<(), CoreError> {
        Ok(self.inner.client.send_command(command).await?)
    }

    pub async fn tracks_power(&self, on: bool) -> Result<(), CoreError> {
        info!(on, "Switching track power");
        self.send(if on {
            protocol::CMD_TRACKS_ON
        } else {
            protocol::CMD_TRACKS_OFF
        })
        .await
    }

    pub async fn track_power(&self, letter: char, on: bool) -> Result<(), CoreError> {
        let letter = letter.to_ascii_uppercase();
        if !TRACK_LETTERS.contains(&letter) {
            return Err(CoreError::validation("track", format!("'{letter}' is not a track letter (A-H)")));
        }
        info!(%letter, on, "Switching track power");
        self.send(&protocol::track_power_cmd(letter, on)).await
    }

    pub async fn start_route(&self, route_id: u32) -> Result<(), CoreError> {
        info!(route_id, "Starting route");
        self.send(&protocol::start_route_cmd(route_id)).await
    }

    pub async fn set_turnout(&self, turnout_id: u32, state: TurnoutState) -> Result<(), CoreError> {
        let Some(letter) = state.command_char() else {
            return Err(CoreError::validation("turnout state", "only closed or thrown can be set"));
        };
        info!(turnout_id, %state, "Setting turnout");
        self.send(&protocol::set_turnout_cmd(turnout_id, letter)).await
    }

    /// `speed_percent` is 0-100 of full speed.
    pub async fn set_loco_speed(&self, cab: u32, speed_percent: u8, direction: Direction) -> Result<(), CoreError> {
        check_address(cab)?;
        if speed_percent > 100 {
            return Err(CoreError::validation("speed", format!("{speed_percent}% is above 100%")));
        }
        let step = percent_to_step(speed_percent);
        debug!(cab, speed_percent, step, %direction, "Setting locomotive speed");
        self.send(&protocol::loco_speed_cmd(cab, i16::from(step), direction.is_forward()))
            .await
    }

    /// Emergency-stop one locomotive, keeping its direction.
    pub async fn stop_loco(&self, cab: u32) -> Result<(), CoreError> {
        check_address(cab)?;
        let forward = self
            .inner
            .roster
            .get(cab)
            .is_none_or(|entry| entry.direction.is_forward());
        info!(cab, "Emergency-stopping locomotive");
        self.send(&protocol::loco_speed_cmd(cab, -1, forward)).await
    }

    pub async fn set_loco_function(&self, cab: u32, function: u8, on: bool) -> Result<(), CoreError> {
        check_address(cab)?;
        if function > MAX_FUNCTION_ID {
            return Err(CoreError::validation("function", format!("F{function} is above F{MAX_FUNCTION_ID}")));
        }
        debug!(cab, function, on, "Setting locomotive function");
        self.send(&protocol::loco_function_cmd(cab, function, on)).await
    }

    /// Ask for a throttle push describing `cab`.
    pub async fn request_loco_state(&self, cab: u32) -> Result<(), CoreError> {
        check_address(cab)?;
        self.send(&protocol::loco_state_cmd(cab)).await
    }

    pub async fn emergency_stop(&self) -> Result<(), CoreError> {
        info!("Emergency stop: all locomotives");
        self.send(protocol::CMD_EMERGENCY_STOP).await
    }

    pub async fn reboot(&self) -> Result<(), CoreError> {
        info!("Rebooting command station");
        self.send(protocol::CMD_REBOOT).await
    }

    pub async fn write_cv(&self, write: CvWrite) -> Result<(), CoreError> {
        debug!(address = write.address, cv = write.cv, value = write.value, "Writing CV");
        self.send(&write.command()).await
    }

    // ── Events ───────────────────────────────────────────────────────

    pub fn subscribe<F>(&self, signal: Signal, handler: F) -> Subscription
    where
        F: Fn(&StationEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.client.subscribe(signal, handler)
    }

    pub fn subscribe_with_token<F>(&self, signal: Signal, handler: F) -> Subscription
    where
        F: Fn(&StationEvent, &Subscription) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.client.subscribe_with_token(signal, handler)
    }

    pub fn events(&self) -> broadcast::Receiver<StationEvent> {
        self.inner.client.events()
    }
}

fn check_address(cab: u32) -> Result<(), CoreError> {
    if LOCO_ADDRESS_RANGE.contains(&cab) {
        Ok(())
    } else {
        Err(CoreError::validation(
            "address",
            format!(
                "{cab} is outside {}-{}",
                LOCO_ADDRESS_RANGE.start(),
                LOCO_ADDRESS_RANGE.end()
            ),
        ))
    }
}

// ── Push application ─────────────────────────────────────────────────

/// `p<letter><0|1>`, the per-track power push.
fn parse_track_power(line: &str) -> Option<(char, bool)> {
    let mut chars = line.chars();
    let (Some('p'), Some(letter), Some(state), None) = (chars.next(), chars.next(), chars.next(), chars.next())
    else {
        return None;
    };
    if !TRACK_LETTERS.contains(&letter) {
        return None;
    }
    match state {
        '1' => Some((letter, true)),
        '0' => Some((letter, false)),
        _ => None,
    }
}

impl StationInner {
    fn apply_push(&self, line: &str) -> Result<(), CoreError> {
        match line {
            RESP_TRACKS_ON => {
                self.tracks.set_powered(None, true);
                return Ok(());
            }
            RESP_TRACKS_OFF => {
                self.tracks.set_powered(None, false);
                return Ok(());
            }
            _ => {}
        }

        if let Some((letter, on)) = parse_track_power(line) {
            self.tracks.set_powered(Some(letter), on);
        } else if protocol::prefix_matches(line, protocol::RESP_TURNOUT_STATE_PREFIX) {
            let update = TurnoutStateUpdate::parse(line)?;
            if !self.turnouts.update(update.id, |t| t.state = update.state) {
                trace!(turnout_id = update.id, "State push for unknown turnout");
            }
        } else if protocol::prefix_matches(line, protocol::RESP_THROTTLE_PREFIX) {
            let update = ThrottleUpdate::parse(line)?;
            if !self.roster.update(update.cab, |entry| entry.apply_throttle(&update)) {
                trace!(cab = update.cab, "Throttle push for unknown locomotive");
            }
        }
        Ok(())
    }
}

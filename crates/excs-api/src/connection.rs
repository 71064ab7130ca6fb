//! Persistent connection to a command station.
//!
//! One TCP stream carries both correlated replies and unsolicited push
//! lines. A background read loop routes each line either to the
//! request waiting on a matching prefix or, failing that, to the
//! [`Dispatcher`] as [`StationEvent::DataPushed`]. A heartbeat task
//! probes the station and tears the stream down when it goes silent;
//! a supervisor task reconnects with exponential backoff after any
//! disconnect the caller did not ask for.
//!
//! # Example
//!
//! ```rust,ignore
//! use excs_api::{ConnectionConfig, StationClient, protocol};
//!
//! let client = StationClient::new(ConnectionConfig::new("192.168.1.50", 2560));
//! client.connect().await?;
//!
//! let info = client
//!     .await_response(protocol::CMD_SYS_INFO, protocol::RESP_SYS_INFO_PREFIX)
//!     .await?;
//! println!("{info}");
//!
//! client.shutdown().await;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Notify, OwnedMutexGuard, mpsc, oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::dispatcher::{Dispatcher, HandlerResult, Signal, StationEvent, Subscription};
use crate::error::Error;
use crate::frame::FrameCodec;
use crate::protocol::{self, CMD_KEEP_ALIVE};
use crate::reconnect::{Backoff, ReconnectConfig};

/// Default TCP port of the command station.
pub const DEFAULT_PORT: u16 = 2560;

// ── ConnectionConfig ─────────────────────────────────────────────────

/// Where the station lives and how patient to be with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Limit for opening the stream (and for a single write). Default: 10s.
    pub connection_timeout: Duration,
    /// Default wait for a correlated reply. Default: 20s.
    pub response_timeout: Duration,
    /// Keep-alive probe period. Default: 60s.
    pub heartbeat_interval: Duration,
    /// Silence after which the connection is declared dead. Default: 150s.
    pub heartbeat_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connection_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(20),
            heartbeat_interval: Duration::from_secs(60),
            heartbeat_timeout: Duration::from_secs(150),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// `host:port` as passed to the socket layer.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_PORT)
    }
}

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

// ── Internals ────────────────────────────────────────────────────────

type LineResult = Result<String, Error>;
type Writer = FramedWrite<OwnedWriteHalf, FrameCodec>;
type Reader = FramedRead<OwnedReadHalf, FrameCodec>;

/// Result slot of a pending request.
enum Waiter {
    /// Resolved by the first matching line.
    Single(oneshot::Sender<LineResult>),
    /// Receives every matching line until the request ends.
    Stream(mpsc::UnboundedSender<LineResult>),
}

impl Waiter {
    fn fail(self, err: Error) {
        match self {
            Self::Single(tx) => {
                let _ = tx.send(Err(err));
            }
            Self::Stream(tx) => {
                let _ = tx.send(Err(err));
            }
        }
    }
}

struct Session {
    generation: u64,
    cancel: CancellationToken,
}

struct Inner {
    config: ConnectionConfig,
    state: watch::Sender<ConnectionState>,
    dispatcher: Dispatcher,
    writer: tokio::sync::Mutex<Option<(u64, Writer)>>,
    session: Mutex<Option<Session>>,
    generation: AtomicU64,
    /// At most one waiter per expected prefix.
    pending: Mutex<HashMap<String, Waiter>>,
    /// FIFO queue per expected prefix; `tokio::sync::Mutex` is fair.
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    last_activity: Mutex<Instant>,
    backoff: Mutex<Backoff>,
    connect_lock: tokio::sync::Mutex<()>,
    auto_reconnect: AtomicBool,
    supervisor_started: AtomicBool,
    lost: Arc<Notify>,
    shutdown: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ── StationClient ────────────────────────────────────────────────────

/// Handle to a command station connection.
///
/// Cheaply cloneable via `Arc<Inner>`. Background tasks only hold weak
/// references, so they wind down once the last handle is dropped.
#[derive(Clone)]
pub struct StationClient {
    inner: Arc<Inner>,
}

impl StationClient {
    /// Create a client. Does NOT connect -- call [`connect()`](Self::connect).
    pub fn new(config: ConnectionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let backoff = Backoff::new(config.reconnect.clone());

        Self {
            inner: Arc::new(Inner {
                config,
                state,
                dispatcher: Dispatcher::new(),
                writer: tokio::sync::Mutex::new(None),
                session: Mutex::new(None),
                generation: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
                slots: Mutex::new(HashMap::new()),
                last_activity: Mutex::new(Instant::now()),
                backoff: Mutex::new(backoff),
                connect_lock: tokio::sync::Mutex::new(()),
                auto_reconnect: AtomicBool::new(false),
                supervisor_started: AtomicBool::new(false),
                lost: Arc::new(Notify::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the stream, start the read loop and liveness monitor, and
    /// announce [`StationEvent::Connected`]. No-op when already connected.
    ///
    /// Also (re-)enables automatic reconnection after unexpected drops.
    pub async fn connect(&self) -> Result<(), Error> {
        self.inner.auto_reconnect.store(true, Ordering::Release);
        self.ensure_supervisor();
        self.inner.open(false).await
    }

    /// Close the stream, fail outstanding requests and announce
    /// [`StationEvent::Disconnected`]. Idempotent.
    ///
    /// Suppresses automatic reconnection until the next `connect()`.
    pub async fn disconnect(&self) {
        self.inner.auto_reconnect.store(false, Ordering::Release);
        let _guard = self.inner.connect_lock.lock().await;

        if self.inner.teardown(None, "disconnected by client").await {
            info!("Disconnected from command station");
        } else {
            self.inner.state.send_if_modified(|state| {
                let changed = *state != ConnectionState::Disconnected;
                *state = ConnectionState::Disconnected;
                changed
            });
            debug!("Disconnect requested while not connected");
        }
    }

    /// Disconnect and stop the reconnect supervisor for good.
    pub async fn shutdown(&self) {
        self.disconnect().await;
        self.inner.shutdown.cancel();
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// When the last line (of any kind) arrived, or the stream opened.
    pub fn last_activity(&self) -> Instant {
        self.inner.last_activity()
    }

    /// Delay the next reconnect attempt would wait.
    pub fn current_backoff(&self) -> Duration {
        self.inner
            .backoff
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Write `command` without waiting for a reply.
    pub async fn send_command(&self, command: &str) -> Result<(), Error> {
        self.inner.send(command).await
    }

    /// Send `command` and wait for the first line starting with
    /// `expected_prefix`.
    ///
    /// Requests with the same prefix are served one at a time, oldest
    /// first. `timeout` covers the whole call, time spent queued behind
    /// an earlier request included.
    pub async fn await_command_response(
        &self,
        command: &str,
        expected_prefix: &str,
        timeout: Duration,
    ) -> Result<String, Error> {
        let inner = &self.inner;
        if !inner.is_connected() {
            return Err(Error::NotConnected);
        }

        let deadline = Instant::now() + timeout;
        let Ok(turn) = time::timeout_at(deadline, inner.take_turn(expected_prefix)).await else {
            return Err(timed_out(command, expected_prefix, timeout));
        };
        let (tx, rx) = oneshot::channel();
        let pending = inner.register(expected_prefix, Waiter::Single(tx))?;

        inner.send(command).await?;

        let result = match time::timeout_at(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::lost("request abandoned")),
            Err(_) => Err(timed_out(command, expected_prefix, timeout)),
        };

        drop(pending);
        drop(turn);
        result
    }

    /// [`await_command_response`](Self::await_command_response) with the
    /// configured response timeout.
    pub async fn await_response(&self, command: &str, expected_prefix: &str) -> Result<String, Error> {
        self.await_command_response(command, expected_prefix, self.inner.config.response_timeout)
            .await
    }

    /// Send `command` and gather every line starting with
    /// `expected_prefix`: the first within `timeout` (queueing included),
    /// then more until none arrives for `settle`.
    pub async fn collect_command_responses(
        &self,
        command: &str,
        expected_prefix: &str,
        timeout: Duration,
        settle: Duration,
    ) -> Result<Vec<String>, Error> {
        let inner = &self.inner;
        if !inner.is_connected() {
            return Err(Error::NotConnected);
        }

        let deadline = Instant::now() + timeout;
        let Ok(turn) = time::timeout_at(deadline, inner.take_turn(expected_prefix)).await else {
            return Err(timed_out(command, expected_prefix, timeout));
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pending = inner.register(expected_prefix, Waiter::Stream(tx))?;

        inner.send(command).await?;

        let first = match time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(line)) => line?,
            Ok(None) => return Err(Error::lost("request abandoned")),
            Err(_) => return Err(timed_out(command, expected_prefix, timeout)),
        };

        let mut lines = vec![first];
        while let Ok(Some(line)) = time::timeout(settle, rx.recv()).await {
            lines.push(line?);
        }

        drop(pending);
        drop(turn);
        Ok(lines)
    }

    /// Number of requests currently waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // ── Events ───────────────────────────────────────────────────────

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn subscribe<F>(&self, signal: Signal, handler: F) -> Subscription
    where
        F: Fn(&StationEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.dispatcher.subscribe(signal, handler)
    }

    pub fn subscribe_with_token<F>(&self, signal: Signal, handler: F) -> Subscription
    where
        F: Fn(&StationEvent, &Subscription) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.dispatcher.subscribe_with_token(signal, handler)
    }

    /// Broadcast receiver mirroring every dispatched event.
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<StationEvent> {
        self.inner.dispatcher.events()
    }

    fn ensure_supervisor(&self) {
        if self.inner.supervisor_started.swap(true, Ordering::AcqRel) {
            return;
        }
        tokio::spawn(supervise(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.lost),
            self.inner.shutdown.clone(),
        ));
    }
}

// ── Inner: connection management ─────────────────────────────────────

impl Inner {
    fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    fn last_activity(&self) -> Instant {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn next_backoff(&self) -> Duration {
        self.backoff
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_delay()
    }

    async fn open(self: &Arc<Self>, reconnecting: bool) -> Result<(), Error> {
        let _guard = self.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        // A disconnect() may have won the lock since the supervisor looked.
        if reconnecting && !self.auto_reconnect.load(Ordering::Acquire) {
            debug!("Reconnect abandoned after disconnect");
            return Err(Error::NotConnected);
        }
        if !reconnecting {
            self.state.send_replace(ConnectionState::Connecting);
        }

        let addr = self.config.addr();
        info!(%addr, "Connecting to command station");

        let stream = match time::timeout(self.config.connection_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(self.connect_failed(
                    reconnecting,
                    Error::Connect {
                        addr,
                        reason: e.to_string(),
                    },
                ));
            }
            Err(_) => {
                return Err(self.connect_failed(
                    reconnecting,
                    Error::ConnectTimeout {
                        addr,
                        timeout_secs: self.config.connection_timeout.as_secs(),
                    },
                ));
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Could not disable Nagle on station socket");
        }

        let (read_half, write_half) = stream.into_split();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let cancel = self.shutdown.child_token();

        *self.writer.lock().await = Some((generation, FramedWrite::new(write_half, FrameCodec::new())));
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(Session {
            generation,
            cancel: cancel.clone(),
        });
        self.touch();
        self.backoff
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();

        let weak = Arc::downgrade(self);
        tokio::spawn(read_loop(
            weak.clone(),
            FramedRead::new(read_half, FrameCodec::new()),
            cancel.clone(),
            generation,
        ));
        tokio::spawn(heartbeat_loop(weak, cancel, generation));

        self.state.send_replace(ConnectionState::Connected);
        info!(%addr, "Connected to command station");
        self.dispatcher.dispatch(&StationEvent::Connected);
        Ok(())
    }

    fn connect_failed(&self, reconnecting: bool, err: Error) -> Error {
        if !reconnecting {
            self.state.send_replace(ConnectionState::Disconnected);
        }
        warn!(error = %err, "Connection attempt failed");
        err
    }

    /// Tear down the current session, or only `generation` if given.
    /// Returns `false` when there was nothing to tear down.
    async fn teardown(&self, generation: Option<u64>, reason: &str) -> bool {
        let session = {
            let mut guard = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            let current = guard.as_ref().map(|s| s.generation);
            if current.is_none() || (generation.is_some() && generation != current) {
                return false;
            }
            guard.take()
        };
        let Some(session) = session else {
            return false;
        };

        session.cancel.cancel();
        self.state.send_replace(ConnectionState::Disconnected);

        let writer = self.writer.lock().await.take();
        if let Some((_, mut writer)) = writer {
            if let Err(e) = writer.close().await {
                debug!(error = %e, "Error closing station socket");
            }
        }

        let waiters: Vec<Waiter> = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, waiter)| waiter)
            .collect();
        if !waiters.is_empty() {
            debug!(count = waiters.len(), "Failing outstanding requests");
        }
        for waiter in waiters {
            waiter.fail(Error::lost(reason));
        }

        self.dispatcher.dispatch(&StationEvent::Disconnected {
            reason: reason.to_owned(),
        });
        true
    }

    /// Unexpected loss: tear down and wake the reconnect supervisor.
    async fn connection_lost(&self, generation: u64, reason: &str) {
        if self.teardown(Some(generation), reason).await {
            warn!(reason, "Connection to command station lost");
            if self.auto_reconnect.load(Ordering::Acquire) {
                self.lost.notify_one();
            }
        }
    }

    // ── Writing ──────────────────────────────────────────────────────

    async fn send(&self, command: &str) -> Result<(), Error> {
        if !self.is_connected() {
            warn!(command, "Cannot send command: not connected");
            return Err(Error::NotConnected);
        }

        let (generation, result) = {
            let mut guard = self.writer.lock().await;
            let Some((generation, writer)) = guard.as_mut() else {
                return Err(Error::NotConnected);
            };
            debug!(command, "Sending command");
            let result = match time::timeout(self.config.connection_timeout, writer.send(command)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(Error::Io(e)),
                Err(_) => Err(Error::lost("write timed out")),
            };
            (*generation, result)
        };

        if let Err(ref e) = result {
            self.connection_lost(generation, &format!("write failed: {e}")).await;
        }
        result
    }

    // ── Correlation ──────────────────────────────────────────────────

    async fn take_turn(&self, prefix: &str) -> Turn<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(prefix.to_owned()).or_default())
        };
        let guard = Arc::clone(&slot).lock_owned().await;
        Turn {
            inner: self,
            slot: Some(slot),
            guard: Some(guard),
        }
    }

    fn register(&self, prefix: &str, waiter: Waiter) -> Result<Pending<'_>, Error> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(prefix.to_owned(), waiter);
        let pending = Pending {
            inner: self,
            prefix: prefix.to_owned(),
        };

        // Teardown flips the state before draining, so either the drain
        // sees this waiter or this check sees the disconnect.
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        Ok(pending)
    }

    /// Hand `line` to the waiter with the longest matching prefix.
    /// Returns `false` if no live waiter took it.
    ///
    /// Replies carry no request id, so callers must not have nested
    /// prefixes such as `jA` and `jA 1` outstanding at the same time:
    /// the detail waiter would claim a list reply like `jA 1 2`.
    fn claim(&self, line: &str) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(prefix) = pending
            .keys()
            .filter(|prefix| protocol::prefix_matches(line, prefix))
            .max_by_key(|prefix| prefix.len())
            .cloned()
        else {
            return false;
        };

        match pending.remove(&prefix) {
            Some(Waiter::Single(tx)) => tx.send(Ok(line.to_owned())).is_ok(),
            Some(Waiter::Stream(tx)) => {
                let delivered = tx.send(Ok(line.to_owned())).is_ok();
                if delivered {
                    pending.insert(prefix, Waiter::Stream(tx));
                }
                delivered
            }
            None => false,
        }
    }

    fn handle_line(&self, line: String) {
        self.touch();
        trace!(line, "Received line");

        if self.claim(&line) {
            return;
        }
        self.dispatcher.dispatch(&StationEvent::DataPushed(line));
    }
}

/// Head-of-queue position for one expected prefix.
struct Turn<'a> {
    inner: &'a Inner,
    slot: Option<Arc<tokio::sync::Mutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.slot.take();
        let mut slots = self
            .inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
    }
}

/// Registration of a waiter; removed again on drop.
struct Pending<'a> {
    inner: &'a Inner,
    prefix: String,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.prefix);
    }
}

fn timed_out(command: &str, prefix: &str, timeout: Duration) -> Error {
    warn!(command, prefix, "Timed out waiting for response");
    Error::Timeout {
        prefix: prefix.to_owned(),
        timeout_ms: millis(timeout),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ── Background tasks ─────────────────────────────────────────────────

/// Read frames until the stream fails or the session is cancelled.
async fn read_loop(weak: Weak<Inner>, mut frames: Reader, cancel: CancellationToken, generation: u64) {
    let reason = loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            frame = frames.next() => frame,
        };
        let Some(inner) = weak.upgrade() else { return };

        match frame {
            Some(Ok(line)) => inner.handle_line(line),
            Some(Err(e)) => break format!("read error: {e}"),
            None => break "connection closed by command station".to_owned(),
        }
    };

    if let Some(inner) = weak.upgrade() {
        inner.connection_lost(generation, &reason).await;
    }
}

/// Probe every `heartbeat_interval`; declare the stream dead after
/// `heartbeat_timeout` without any received line.
async fn heartbeat_loop(weak: Weak<Inner>, cancel: CancellationToken, generation: u64) {
    let Some((interval, timeout)) = weak
        .upgrade()
        .map(|inner| (inner.config.heartbeat_interval, inner.config.heartbeat_timeout))
    else {
        return;
    };

    let mut probe = time::interval_at(Instant::now() + interval, interval);
    probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let Some(deadline) = weak.upgrade().map(|inner| inner.last_activity() + timeout) else {
            return;
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = time::sleep_until(deadline) => {
                let Some(inner) = weak.upgrade() else { return };
                if inner.last_activity() + timeout <= Instant::now() {
                    warn!(timeout_ms = millis(timeout), "No traffic from command station");
                    inner.connection_lost(generation, "heartbeat timeout").await;
                    return;
                }
            }
            _ = probe.tick() => {
                let Some(inner) = weak.upgrade() else { return };
                trace!("Sending keep-alive probe");
                if let Err(e) = inner.send(CMD_KEEP_ALIVE).await {
                    debug!(error = %e, "Keep-alive probe failed");
                }
            }
        }
    }
}

/// Reconnect after unexpected drops: wait, try, double the wait, repeat.
async fn supervise(weak: Weak<Inner>, lost: Arc<Notify>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = lost.notified() => {}
        }

        let mut attempt: u32 = 0;
        loop {
            let Some(inner) = weak.upgrade() else { return };
            if !inner.auto_reconnect.load(Ordering::Acquire) || inner.is_connected() {
                break;
            }

            attempt += 1;
            let delay = inner.next_backoff();
            inner.state.send_replace(ConnectionState::Reconnecting { attempt });
            info!(delay_ms = millis(delay), attempt, "Waiting before reconnect");
            drop(inner);

            tokio::select! {
                biased;
                () = shutdown.cancelled() => return,
                () = time::sleep(delay) => {}
            }

            let Some(inner) = weak.upgrade() else { return };
            if !inner.auto_reconnect.load(Ordering::Acquire) {
                break;
            }
            match inner.open(true).await {
                Ok(()) => {
                    info!(attempt, "Reconnected to command station");
                    break;
                }
                Err(Error::NotConnected) => break,
                Err(e) => warn!(error = %e, attempt, "Reconnect attempt failed"),
            }
        }

        if let Some(inner) = weak.upgrade() {
            if !inner.is_connected() {
                inner.state.send_replace(ConnectionState::Disconnected);
            }
        }
    }

    debug!("Reconnect supervisor exiting");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn reconnect_attempt_after_disconnect_is_abandoned() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = StationClient::new(ConnectionConfig::new("127.0.0.1", port));

        // disconnect() cleared the flag after the supervisor last checked it.
        client.inner.auto_reconnect.store(false, Ordering::Release);
        let result = client.inner.open(true).await;

        assert!(matches!(result, Err(Error::NotConnected)), "{result:?}");
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(
            time::timeout(Duration::from_millis(200), listener.accept())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn supervised_open_connects_while_reconnect_is_wanted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = StationClient::new(ConnectionConfig::new("127.0.0.1", port));

        client.inner.auto_reconnect.store(true, Ordering::Release);
        let (result, accepted) = tokio::join!(client.inner.open(true), listener.accept());

        result.unwrap();
        accepted.unwrap();
        assert!(client.is_connected());
        client.shutdown().await;
    }
}

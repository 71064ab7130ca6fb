// ── Catalog managers ──
//
// Each catalog is fetched with one list query followed by one detail
// query per id, and published as an immutable snapshot through a
// `watch` channel. Tracks use a multi-line reply and live in `tracks`.

mod tracks;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use excs_api::{StationClient, protocol};

use crate::error::CoreError;
use crate::model::{RosterEntry, Route, RouteType, Turnout};
use crate::stream::{EntityStream, Snapshot};

pub use tracks::TracksManager;

/// An entry type fetched via list + detail queries.
pub trait CatalogEntry: Clone + Send + Sync + 'static {
    /// Used in logs and error messages.
    const KIND: &'static str;
    const LIST_COMMAND: &'static str;
    const LIST_PREFIX: &'static str;

    fn detail_command(id: u32) -> String;
    fn detail_prefix(id: u32) -> String;
    fn parse_detail(response: &str) -> Result<Self, CoreError>;
    fn id(&self) -> u32;

    /// Whether a parsed entry belongs in the published catalog.
    fn is_listed(&self) -> bool {
        true
    }
}

/// Parse an id-list reply such as `jA 1 2 3`.
///
/// The bare prefix, or the prefix followed by a lone `.`, is an empty
/// list. Anything other than whitespace-separated ids is rejected.
pub fn parse_id_list(response: &str, prefix: &str, kind: &str) -> Result<Vec<u32>, CoreError> {
    let invalid = || CoreError::invalid(&format!("{kind} list"), response);

    let rest = response.strip_prefix(prefix).ok_or_else(invalid)?;
    if rest.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(invalid());
    }
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('.').unwrap_or(rest);

    rest.split_whitespace()
        .map(|id| id.parse::<u32>().map_err(|_| invalid()))
        .collect()
}

// ── CatalogManager ───────────────────────────────────────────────────

/// Holds the latest snapshot of one catalog.
pub struct CatalogManager<T: CatalogEntry> {
    entries: watch::Sender<Snapshot<T>>,
}

pub type RosterManager = CatalogManager<RosterEntry>;
pub type RoutesManager = CatalogManager<Route>;
pub type TurnoutsManager = CatalogManager<Turnout>;

impl<T: CatalogEntry> Default for CatalogManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CatalogEntry> CatalogManager<T> {
    pub fn new() -> Self {
        let (entries, _) = watch::channel(Arc::new(Vec::new()));
        Self { entries }
    }

    /// Re-fetch the whole catalog.
    ///
    /// The catalog is cleared first; on failure it stays empty and the
    /// error is returned unchanged.
    pub async fn refresh(&self, client: &StationClient, timeout: Duration) -> Result<Snapshot<T>, CoreError> {
        if !client.is_connected() {
            return Err(CoreError::NotConnected);
        }

        debug!(kind = T::KIND, "Requesting catalog from command station");
        self.entries.send_replace(Arc::new(Vec::new()));

        let entries = Self::fetch(client, timeout).await.inspect_err(|e| {
            warn!(kind = T::KIND, error = %e, "Catalog refresh failed");
        })?;

        let snapshot = Arc::new(entries);
        self.entries.send_replace(Arc::clone(&snapshot));
        debug!(kind = T::KIND, count = snapshot.len(), "Catalog refreshed");
        Ok(snapshot)
    }

    async fn fetch(client: &StationClient, timeout: Duration) -> Result<Vec<Arc<T>>, CoreError> {
        let response = client
            .await_command_response(T::LIST_COMMAND, T::LIST_PREFIX, timeout)
            .await?;
        let ids = parse_id_list(&response, T::LIST_PREFIX, T::KIND)?;
        if ids.is_empty() {
            debug!(kind = T::KIND, "Catalog is empty");
            return Ok(Vec::new());
        }

        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let response = client
                .await_command_response(&T::detail_command(id), &T::detail_prefix(id), timeout)
                .await?;
            let entry = T::parse_detail(&response)?;
            if entry.is_listed() {
                entries.push(Arc::new(entry));
            } else {
                debug!(kind = T::KIND, id, "Skipping unlisted entry");
            }
        }
        Ok(entries)
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        self.entries.borrow().clone()
    }

    pub fn get(&self, id: u32) -> Option<Arc<T>> {
        self.entries.borrow().iter().find(|entry| entry.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn stream(&self) -> EntityStream<T> {
        EntityStream::new(self.entries.subscribe())
    }

    /// Replace entry `id` with a modified copy. Returns `false` if absent.
    pub(crate) fn update(&self, id: u32, modify: impl FnOnce(&mut T)) -> bool {
        self.entries.send_if_modified(|snapshot| {
            let Some(pos) = snapshot.iter().position(|entry| entry.id() == id) else {
                return false;
            };
            let mut next: Vec<Arc<T>> = snapshot.iter().cloned().collect();
            let mut entry = T::clone(&next[pos]);
            modify(&mut entry);
            next[pos] = Arc::new(entry);
            *snapshot = Arc::new(next);
            true
        })
    }
}

// ── Entry types ──────────────────────────────────────────────────────

impl CatalogEntry for RosterEntry {
    const KIND: &'static str = "roster";
    const LIST_COMMAND: &'static str = protocol::CMD_LIST_ROSTER;
    const LIST_PREFIX: &'static str = protocol::RESP_ROSTER_LIST_PREFIX;

    fn detail_command(id: u32) -> String {
        protocol::roster_detail_cmd(id)
    }

    fn detail_prefix(id: u32) -> String {
        protocol::roster_detail_prefix(id)
    }

    fn parse_detail(response: &str) -> Result<Self, CoreError> {
        Self::from_detail_response(response)
    }

    fn id(&self) -> u32 {
        RosterEntry::id(self)
    }
}

impl CatalogEntry for Route {
    const KIND: &'static str = "route";
    const LIST_COMMAND: &'static str = protocol::CMD_LIST_ROUTES;
    const LIST_PREFIX: &'static str = protocol::RESP_ROUTE_LIST_PREFIX;

    fn detail_command(id: u32) -> String {
        protocol::route_detail_cmd(id)
    }

    fn detail_prefix(id: u32) -> String {
        protocol::route_detail_prefix(id)
    }

    fn parse_detail(response: &str) -> Result<Self, CoreError> {
        Self::from_detail_response(response)
    }

    fn id(&self) -> u32 {
        Route::id(self)
    }

    fn is_listed(&self) -> bool {
        self.route_type != RouteType::Unknown
    }
}

impl CatalogEntry for Turnout {
    const KIND: &'static str = "turnout";
    const LIST_COMMAND: &'static str = protocol::CMD_LIST_TURNOUTS;
    const LIST_PREFIX: &'static str = protocol::RESP_TURNOUT_LIST_PREFIX;

    fn detail_command(id: u32) -> String {
        protocol::turnout_detail_cmd(id)
    }

    fn detail_prefix(id: u32) -> String {
        protocol::turnout_detail_prefix(id)
    }

    fn parse_detail(response: &str) -> Result<Self, CoreError> {
        Self::from_detail_response(response)
    }

    fn id(&self) -> u32 {
        Turnout::id(self)
    }
}

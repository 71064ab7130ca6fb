use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use excs_api::{StationClient, protocol};

use crate::error::CoreError;
use crate::model::{Track, TrackCurrent};
use crate::stream::{EntityStream, Snapshot};

/// Track outputs and their power and current state.
pub struct TracksManager {
    tracks: watch::Sender<Snapshot<Track>>,
}

impl Default for TracksManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TracksManager {
    pub fn new() -> Self {
        let (tracks, _) = watch::channel(Arc::new(Vec::new()));
        Self { tracks }
    }

    /// Re-fetch the track list from the multi-line `=` reply.
    ///
    /// `settle` is how long to wait for another line before the reply
    /// is considered complete.
    pub async fn refresh(
        &self,
        client: &StationClient,
        timeout: Duration,
        settle: Duration,
    ) -> Result<Snapshot<Track>, CoreError> {
        if !client.is_connected() {
            return Err(CoreError::NotConnected);
        }

        debug!("Requesting track list from command station");
        self.tracks.send_replace(Arc::new(Vec::new()));

        let lines = client
            .collect_command_responses(
                protocol::CMD_LIST_TRACKS,
                protocol::RESP_TRACK_LIST_PREFIX,
                timeout,
                settle,
            )
            .await
            .inspect_err(|e| warn!(error = %e, "Track list request failed"))?;

        let mut tracks: Vec<Arc<Track>> = Vec::with_capacity(lines.len());
        for line in &lines {
            match Track::from_list_line(line) {
                Ok(track) if tracks.iter().any(|t| t.letter() == track.letter()) => {
                    debug!(letter = %track.letter(), "Duplicate track line ignored");
                }
                Ok(track) => tracks.push(Arc::new(track)),
                Err(e) => warn!(error = %e, "Skipping unparseable track line"),
            }
        }

        let snapshot = Arc::new(tracks);
        self.tracks.send_replace(Arc::clone(&snapshot));
        debug!(count = snapshot.len(), "Track list refreshed");
        Ok(snapshot)
    }

    /// Ask for a current reading and apply it to the matching track.
    ///
    /// Returns the updated track, or `None` if no track matches the
    /// reading's name.
    pub async fn get_current(&self, client: &StationClient, timeout: Duration) -> Result<Option<Arc<Track>>, CoreError> {
        let response = client
            .await_command_response(
                protocol::CMD_TRACK_CURRENT,
                protocol::RESP_TRACK_CURRENT_PREFIX,
                timeout,
            )
            .await?;
        let reading = TrackCurrent::parse(&response)?;
        debug!(name = %reading.name, current_ma = reading.current_ma, "Track current reading");

        let mut updated = None;
        self.tracks.send_if_modified(|snapshot| {
            let Some(pos) = snapshot.iter().position(|t| t.matches_name(&reading.name)) else {
                return false;
            };
            let mut next: Vec<Arc<Track>> = snapshot.iter().cloned().collect();
            let mut track = Track::clone(&next[pos]);
            track.apply_current(&reading);
            let track = Arc::new(track);
            next[pos] = Arc::clone(&track);
            *snapshot = Arc::new(next);
            updated = Some(track);
            true
        });

        if updated.is_none() {
            debug!(name = %reading.name, "Current reading matches no known track");
        }
        Ok(updated)
    }

    /// Set the powered flag of one track, or of every track for `None`.
    pub(crate) fn set_powered(&self, letter: Option<char>, powered: bool) -> bool {
        self.tracks.send_if_modified(|snapshot| {
            let targets = |t: &Track| letter.is_none_or(|l| t.letter() == l) && t.powered != powered;
            if !snapshot.iter().any(|t| targets(t.as_ref())) {
                return false;
            }
            let next = snapshot
                .iter()
                .map(|t| {
                    if targets(t.as_ref()) {
                        let mut track = Track::clone(t);
                        track.powered = powered;
                        Arc::new(track)
                    } else {
                        Arc::clone(t)
                    }
                })
                .collect();
            *snapshot = Arc::new(next);
            true
        })
    }

    pub fn snapshot(&self) -> Snapshot<Track> {
        self.tracks.borrow().clone()
    }

    pub fn get(&self, letter: char) -> Option<Arc<Track>> {
        self.tracks.borrow().iter().find(|t| t.letter() == letter).cloned()
    }

    pub fn stream(&self) -> EntityStream<Track> {
        EntityStream::new(self.tracks.subscribe())
    }
}

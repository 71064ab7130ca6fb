//! Catalog listing: roster, routes, turnouts, tracks.

use std::sync::Arc;

use tabled::Tabled;

use excs_core::{RosterEntry, Route, Station, Track, Turnout};

use crate::cli::{GlobalOpts, TracksArgs};
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct RosterRow {
    #[tabled(rename = "Cab")]
    id: u32,
    #[tabled(rename = "Name")]
    description: String,
    #[tabled(rename = "Functions")]
    functions: String,
}

impl From<&Arc<RosterEntry>> for RosterRow {
    fn from(e: &Arc<RosterEntry>) -> Self {
        let functions = e
            .functions
            .iter()
            .map(|(id, f)| {
                let marker = if f.momentary { "*" } else { "" };
                format!("F{id} {marker}{}", f.label)
            })
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            id: e.id(),
            description: e.description.clone(),
            functions,
        }
    }
}

#[derive(Tabled)]
struct RouteRow {
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Type")]
    route_type: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&Arc<Route>> for RouteRow {
    fn from(r: &Arc<Route>) -> Self {
        Self {
            id: r.id(),
            route_type: r.route_type.to_string(),
            description: r.description.clone(),
        }
    }
}

#[derive(Tabled)]
struct TurnoutRow {
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&Arc<Turnout>> for TurnoutRow {
    fn from(t: &Arc<Turnout>) -> Self {
        Self {
            id: t.id(),
            state: t.state.to_string(),
            description: t.description.clone(),
        }
    }
}

#[derive(Tabled)]
struct TrackRow {
    #[tabled(rename = "Track")]
    letter: char,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Cab")]
    cab: String,
    #[tabled(rename = "Current (mA)")]
    current: String,
    #[tabled(rename = "Trip (mA)")]
    trip: String,
}

impl From<&Arc<Track>> for TrackRow {
    fn from(t: &Arc<Track>) -> Self {
        let reading = |ma: u32| if t.max_ma == 0 { "-".to_owned() } else { ma.to_string() };
        Self {
            letter: t.letter(),
            mode: t.mode.clone(),
            cab: if t.cab == 0 { "-".into() } else { t.cab.to_string() },
            current: reading(t.current_ma),
            trip: reading(t.trip_ma),
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────────

/// Connect and run the version gate shared by every catalog command.
async fn ready(station: &Station) -> Result<(), CliError> {
    station.validate_config().await?;
    Ok(())
}

pub async fn roster(station: &Station, global: &GlobalOpts) -> Result<(), CliError> {
    ready(station).await?;
    let roster = station.refresh_roster().await?;
    let out = output::render_list(global.output, roster.as_slice(), |x| RosterRow::from(x), |e| e.id().to_string())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn routes(station: &Station, global: &GlobalOpts) -> Result<(), CliError> {
    ready(station).await?;
    let routes = station.refresh_routes().await?;
    let out = output::render_list(global.output, routes.as_slice(), |x| RouteRow::from(x), |r| r.id().to_string())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn turnouts(station: &Station, global: &GlobalOpts) -> Result<(), CliError> {
    ready(station).await?;
    let turnouts = station.refresh_turnouts().await?;
    let out = output::render_list(global.output, turnouts.as_slice(), |x| TurnoutRow::from(x), |t| t.id().to_string())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn tracks(station: &Station, args: TracksArgs, global: &GlobalOpts) -> Result<(), CliError> {
    ready(station).await?;
    station.refresh_tracks().await?;
    if args.current && station.track_current().await?.is_none() {
        output::notice("warning: current reading matched no track", global.quiet);
    }

    let tracks = station.tracks().snapshot();
    let out = output::render_list(global.output, tracks.as_slice(), |x| TrackRow::from(x), |t| t.letter().to_string())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

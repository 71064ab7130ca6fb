//! Command dispatch: bridges CLI args -> station operations -> output formatting.

pub mod catalog;
pub mod config_cmd;
pub mod control;
pub mod info;
pub mod watch;

use excs_core::Station;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a station-bound command to the appropriate handler.
pub async fn dispatch(cmd: &Command, station: &Station, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Info => info::handle(station, global).await,
        Command::Roster => catalog::roster(station, global).await,
        Command::Routes => catalog::routes(station, global).await,
        Command::Turnouts => catalog::turnouts(station, global).await,
        Command::Tracks(args) => catalog::tracks(station, *args, global).await,
        Command::Power { state } => control::power(station, *state, global).await,
        Command::TrackPower { letter, state } => control::track_power(station, *letter, *state, global).await,
        Command::Route(args) => control::route(station, args.command, global).await,
        Command::Turnout(args) => control::turnout(station, args.command, global).await,
        Command::Loco(args) => control::loco(station, args.command, global).await,
        Command::Cv(args) => control::cv(station, args.command, global).await,
        Command::Estop => control::estop(station, global).await,
        Command::Reboot => control::reboot(station, global).await,
        Command::Watch(args) => watch::handle(station, *args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions do not use a station".into(),
        )),
    }
}

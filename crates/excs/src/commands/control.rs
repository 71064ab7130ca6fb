//! Commands that change layout state.
//!
//! The station confirms through pushes rather than replies, so these
//! return as soon as the command is written.

use excs_core::{CvWrite, Direction, Station, TurnoutState};

use crate::cli::{CvCommand, GlobalOpts, LocoCommand, RouteCommand, Switch, TurnoutCommand, TurnoutPosition};
use crate::error::CliError;
use crate::output::{self, on_off};

async fn connect(station: &Station) -> Result<(), CliError> {
    station.validate_config().await?;
    Ok(())
}

pub async fn power(station: &Station, state: Switch, global: &GlobalOpts) -> Result<(), CliError> {
    connect(station).await?;
    station.tracks_power(state.is_on()).await?;
    output::notice(&format!("Track power {}", on_off(state.is_on())), global.quiet);
    Ok(())
}

pub async fn track_power(station: &Station, letter: char, state: Switch, global: &GlobalOpts) -> Result<(), CliError> {
    connect(station).await?;
    station.track_power(letter, state.is_on()).await?;
    output::notice(
        &format!("Track {} power {}", letter.to_ascii_uppercase(), on_off(state.is_on())),
        global.quiet,
    );
    Ok(())
}

pub async fn route(station: &Station, cmd: RouteCommand, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        RouteCommand::Start { id } => {
            connect(station).await?;
            let routes = station.refresh_routes().await?;
            if !routes.iter().any(|r| r.id() == id) {
                return Err(CliError::NotFound {
                    resource_type: "Route".into(),
                    identifier: id.to_string(),
                    list_command: "routes".into(),
                });
            }
            station.start_route(id).await?;
            output::notice(&format!("Route {id} started"), global.quiet);
            Ok(())
        }
    }
}

pub async fn turnout(station: &Station, cmd: TurnoutCommand, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        TurnoutCommand::Set { id, position } => {
            connect(station).await?;
            if station.refresh_turnouts().await?.iter().all(|t| t.id() != id) {
                return Err(CliError::NotFound {
                    resource_type: "Turnout".into(),
                    identifier: id.to_string(),
                    list_command: "turnouts".into(),
                });
            }
            let state = match position {
                TurnoutPosition::Closed => TurnoutState::Closed,
                TurnoutPosition::Thrown => TurnoutState::Thrown,
            };
            station.set_turnout(id, state).await?;
            output::notice(&format!("Turnout {id} set to {state}"), global.quiet);
            Ok(())
        }
    }
}

pub async fn loco(station: &Station, cmd: LocoCommand, global: &GlobalOpts) -> Result<(), CliError> {
    connect(station).await?;
    match cmd {
        LocoCommand::Speed { cab, percent, reverse } => {
            let direction = if reverse { Direction::Reverse } else { Direction::Forward };
            station.set_loco_speed(cab, percent, direction).await?;
            output::notice(&format!("Locomotive {cab}: {percent}% {direction}"), global.quiet);
        }
        LocoCommand::Function { cab, function, state } => {
            station.set_loco_function(cab, function, state.is_on()).await?;
            output::notice(&format!("Locomotive {cab}: F{function} {}", on_off(state.is_on())), global.quiet);
        }
        LocoCommand::Stop { cab } => {
            station.stop_loco(cab).await?;
            output::notice(&format!("Locomotive {cab} stopped"), global.quiet);
        }
        LocoCommand::State { cab } => {
            station.request_loco_state(cab).await?;
            output::notice(&format!("Requested state of locomotive {cab}; see `excs watch`"), global.quiet);
        }
    }
    Ok(())
}

pub async fn cv(station: &Station, cmd: CvCommand, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        CvCommand::Write { address, cv, value } => {
            let write = CvWrite::new(address, cv, value)?;
            connect(station).await?;
            station.write_cv(write).await?;
            output::notice(
                &format!("CV {} of locomotive {} set to {}", write.cv(), write.address(), write.value()),
                global.quiet,
            );
            Ok(())
        }
    }
}

pub async fn estop(station: &Station, global: &GlobalOpts) -> Result<(), CliError> {
    station.connect().await?;
    station.emergency_stop().await?;
    output::notice("Emergency stop sent", global.quiet);
    Ok(())
}

pub async fn reboot(station: &Station, global: &GlobalOpts) -> Result<(), CliError> {
    station.connect().await?;
    station.reboot().await?;
    output::notice("Reboot requested", global.quiet);
    Ok(())
}

// ── Turnouts ──

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use strum::Display;

use crate::error::CoreError;
use excs_api::protocol;

static DETAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^jT\s+(?P<id>\d+)\s+(?P<state>[CTX])(?:\s+"(?P<desc>[^"]*)")?\s*$"#)
        .expect("turnout detail pattern is valid")
});

static STATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^H\s+(?P<id>\d+)\s+(?P<state>[01])\s*$").expect("turnout state pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum TurnoutState {
    /// Straight through.
    Closed,
    /// Diverging.
    Thrown,
    Unknown,
}

impl TurnoutState {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'C' => Some(Self::Closed),
            'T' => Some(Self::Thrown),
            'X' => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Letter used by the `T` command; `None` for [`Unknown`](Self::Unknown).
    pub fn command_char(self) -> Option<char> {
        match self {
            Self::Closed => Some('C'),
            Self::Thrown => Some('T'),
            Self::Unknown => None,
        }
    }
}

impl FromStr for TurnoutState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "closed" | "c" => Ok(Self::Closed),
            "thrown" | "t" => Ok(Self::Thrown),
            _ => Err(CoreError::validation(
                "turnout state",
                format!("expected 'closed' or 'thrown', got '{s}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turnout {
    id: u32,
    pub description: String,
    pub state: TurnoutState,
}

impl Turnout {
    pub fn new(id: u32, state: TurnoutState, description: &str) -> Self {
        let description = if description.is_empty() {
            format!("Turnout {id}")
        } else {
            description.to_owned()
        };
        Self {
            id,
            description,
            state,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Prefix of state pushes for this turnout.
    pub fn recv_prefix(&self) -> String {
        protocol::turnout_state_prefix(self.id)
    }

    pub fn from_detail_response(response: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::invalid("turnout detail", response);
        let caps = DETAIL_RE.captures(response).ok_or_else(invalid)?;

        let id = caps["id"].parse().map_err(|_| invalid())?;
        let state = caps["state"]
            .chars()
            .next()
            .and_then(TurnoutState::from_char)
            .ok_or_else(invalid)?;
        let description = caps.name("desc").map_or("", |m| m.as_str());

        Ok(Self::new(id, state, description))
    }
}

/// Decoded `H <id> <0|1>` push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnoutStateUpdate {
    pub id: u32,
    pub state: TurnoutState,
}

impl TurnoutStateUpdate {
    pub fn parse(line: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::invalid("turnout state", line);
        let caps = STATE_RE.captures(line).ok_or_else(invalid)?;

        let id = caps["id"].parse().map_err(|_| invalid())?;
        let state = match &caps["state"] {
            "0" => TurnoutState::Closed,
            "1" => TurnoutState::Thrown,
            _ => return Err(invalid()),
        };
        Ok(Self { id, state })
    }
}

// ── Locomotive roster ──

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use strum::Display;

use crate::error::CoreError;
use excs_api::protocol;

/// Highest decoder function addressable with `F` (RCN-212).
pub const MAX_FUNCTION_ID: u8 = 68;

const MOMENTARY_MARKER: char = '*';
const DIRECTION_BIT: u8 = 0x80;
const SPEED_MASK: u8 = 0x7F;

/// DCC speed steps above stop.
pub const MAX_SPEED_STEP: u8 = 126;

static DETAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^jR\s+(?P<id>\d+)\s+"(?P<desc>[^"]*)"\s+"(?P<functions>[^"]*)"\s*$"#)
        .expect("roster detail pattern is valid")
});

static THROTTLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^l\s+(?P<cab>\d+)\s+(?P<reg>-?\d+)\s+(?P<speed>\d+)\s+(?P<functions>\d+)\s*$")
        .expect("throttle pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Display)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    pub fn is_forward(self) -> bool {
        self == Self::Forward
    }
}

/// One decoder function of a locomotive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocoFunction {
    pub label: String,
    /// Active only while held.
    pub momentary: bool,
    pub on: bool,
}

/// A locomotive known to the command station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    id: u32,
    pub description: String,
    pub direction: Direction,
    /// 0-100.
    pub speed_percent: u8,
    pub emergency_stop: bool,
    pub functions: BTreeMap<u8, LocoFunction>,
}

impl RosterEntry {
    /// `functions` is the slash-separated label list, e.g. `Lights/Horn/*Whistle`.
    pub fn new(id: u32, description: &str, functions: &str) -> Self {
        let description = if description.is_empty() {
            format!("Locomotive {id}")
        } else {
            description.to_owned()
        };

        Self {
            id,
            description,
            direction: Direction::Forward,
            speed_percent: 0,
            emergency_stop: false,
            functions: parse_functions(functions),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Prefix of throttle pushes for this locomotive.
    pub fn recv_prefix(&self) -> String {
        protocol::throttle_prefix(self.id)
    }

    pub fn from_detail_response(response: &str) -> Result<Self, CoreError> {
        let caps = DETAIL_RE
            .captures(response)
            .ok_or_else(|| CoreError::invalid("roster detail", response))?;
        let id = caps["id"]
            .parse()
            .map_err(|_| CoreError::invalid("roster detail", response))?;
        Ok(Self::new(id, &caps["desc"], &caps["functions"]))
    }

    pub fn apply_throttle(&mut self, update: &ThrottleUpdate) {
        self.direction = update.direction;
        self.emergency_stop = update.emergency_stop;
        self.speed_percent = update.speed_percent();
        for (id, function) in &mut self.functions {
            function.on = update.function_on(*id);
        }
    }
}

fn parse_functions(functions: &str) -> BTreeMap<u8, LocoFunction> {
    if functions.is_empty() {
        return BTreeMap::new();
    }

    (0..=MAX_FUNCTION_ID)
        .zip(functions.split('/'))
        .filter(|(_, label)| !label.is_empty())
        .map(|(id, label)| {
            let (momentary, label) = match label.strip_prefix(MOMENTARY_MARKER) {
                Some(rest) => (true, rest),
                None => (false, label),
            };
            let label = if label.is_empty() {
                format!("Function {id}")
            } else {
                label.to_owned()
            };
            (
                id,
                LocoFunction {
                    label,
                    momentary,
                    on: false,
                },
            )
        })
        .collect()
}

// ── Throttle pushes ─────────────────────────────────────────────────

/// Decoded `l <cab> <reg> <speedByte> <functionMap>` push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleUpdate {
    pub cab: u32,
    /// DCC speed step, 0 (stop) to [`MAX_SPEED_STEP`].
    pub speed_step: u8,
    pub emergency_stop: bool,
    pub direction: Direction,
    pub function_map: u128,
}

impl ThrottleUpdate {
    pub fn parse(line: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::invalid("throttle", line);
        let caps = THROTTLE_RE.captures(line).ok_or_else(invalid)?;

        let cab = caps["cab"].parse().map_err(|_| invalid())?;
        let speed_byte: u8 = caps["speed"].parse().map_err(|_| invalid())?;
        let function_map = caps["functions"].parse().map_err(|_| invalid())?;

        // Low seven bits: 0 stop, 1 emergency stop, n >= 2 is step n - 1.
        let raw = speed_byte & SPEED_MASK;
        Ok(Self {
            cab,
            speed_step: raw.saturating_sub(1),
            emergency_stop: raw == 1,
            direction: if speed_byte & DIRECTION_BIT == 0 {
                Direction::Reverse
            } else {
                Direction::Forward
            },
            function_map,
        })
    }

    pub fn speed_percent(&self) -> u8 {
        if self.emergency_stop {
            return 0;
        }
        step_to_percent(self.speed_step)
    }

    pub fn function_on(&self, id: u8) -> bool {
        id < 128 && (self.function_map >> id) & 1 == 1
    }
}

/// `round(step * 100 / 126)`.
pub fn step_to_percent(step: u8) -> u8 {
    let step = u16::from(step.min(MAX_SPEED_STEP));
    let percent = (step * 100 + u16::from(MAX_SPEED_STEP) / 2) / u16::from(MAX_SPEED_STEP);
    u8::try_from(percent).unwrap_or(100)
}

/// Inverse of [`step_to_percent`], rounded to the nearest step.
pub fn percent_to_step(percent: u8) -> u8 {
    let percent = u16::from(percent.min(100));
    let step = (percent * u16::from(MAX_SPEED_STEP) + 50) / 100;
    u8::try_from(step).unwrap_or(MAX_SPEED_STEP)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_detail_with_functions() {
        let entry = RosterEntry::from_detail_response(r#"jR 3 "Class 37" "Lights/Horn//*Whistle""#).unwrap();
        assert_eq!(entry.id(), 3);
        assert_eq!(entry.description, "Class 37");
        assert_eq!(entry.functions.len(), 3);
        assert_eq!(entry.functions[&0].label, "Lights");
        assert!(!entry.functions[&1].momentary);
        assert!(!entry.functions.contains_key(&2));
        assert_eq!(entry.functions[&3].label, "Whistle");
        assert!(entry.functions[&3].momentary);
        assert_eq!(entry.recv_prefix(), "l 3");
    }

    #[test]
    fn empty_description_gets_default() {
        let entry = RosterEntry::from_detail_response(r#"jR 42 "" """#).unwrap();
        assert_eq!(entry.description, "Locomotive 42");
        assert!(entry.functions.is_empty());
    }

    #[test]
    fn bare_momentary_marker_gets_default_label() {
        let entry = RosterEntry::new(1, "Shunter", "*/Bell");
        assert_eq!(entry.functions[&0].label, "Function 0");
        assert!(entry.functions[&0].momentary);
    }

    #[test]
    fn functions_beyond_limit_are_ignored() {
        let labels = vec!["F"; 80].join("/");
        let entry = RosterEntry::new(1, "", &labels);
        assert_eq!(entry.functions.len(), usize::from(MAX_FUNCTION_ID) + 1);
    }

    #[test]
    fn rejects_malformed_detail() {
        assert!(matches!(
            RosterEntry::from_detail_response("jR 3 Class37"),
            Err(CoreError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn throttle_push_updates_state() {
        let mut entry = RosterEntry::new(3, "Class 37", "Lights/Horn/Bell");
        // Forward, step 63, F0 and F2 on.
        let update = ThrottleUpdate::parse("l 3 0 192 5").unwrap();
        assert_eq!(update.speed_step, 63);
        entry.apply_throttle(&update);

        assert_eq!(entry.direction, Direction::Forward);
        assert_eq!(entry.speed_percent, 50);
        assert!(!entry.emergency_stop);
        assert!(entry.functions[&0].on);
        assert!(!entry.functions[&1].on);
        assert!(entry.functions[&2].on);
    }

    #[test]
    fn throttle_push_decodes_stop_states() {
        let stop = ThrottleUpdate::parse("l 3 0 0 0").unwrap();
        assert_eq!(stop.direction, Direction::Reverse);
        assert_eq!(stop.speed_percent(), 0);
        assert!(!stop.emergency_stop);

        let estop = ThrottleUpdate::parse("l 3 0 129 0").unwrap();
        assert!(estop.emergency_stop);
        assert_eq!(estop.speed_percent(), 0);

        let full = ThrottleUpdate::parse("l 3 0 255 0").unwrap();
        assert_eq!(full.speed_step, MAX_SPEED_STEP);
        assert_eq!(full.speed_percent(), 100);
    }

    #[test]
    fn rejects_lines_with_trailing_fields() {
        assert!(ThrottleUpdate::parse("l 3 0 192 5 7").is_err());
        assert!(RosterEntry::from_detail_response(r#"jR 3 "Class 37" "Lights" "extra""#).is_err());
    }

    #[test]
    fn percent_and_step_convert_both_ways() {
        assert_eq!(step_to_percent(0), 0);
        assert_eq!(step_to_percent(126), 100);
        assert_eq!(percent_to_step(0), 0);
        assert_eq!(percent_to_step(50), 63);
        assert_eq!(percent_to_step(100), 126);
        for percent in 0..=100 {
            assert_eq!(step_to_percent(percent_to_step(percent)), percent);
        }
    }
}

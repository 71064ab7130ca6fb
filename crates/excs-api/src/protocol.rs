//! Command and response vocabulary of the DCC-EX text protocol.
//!
//! Only the subset the bridge needs is covered. Commands are given
//! without the `<`/`>` wrapper; [`FrameCodec`](crate::frame::FrameCodec)
//! adds it on the way out.

// ── System ───────────────────────────────────────────────────────────

pub const CMD_SYS_INFO: &str = "s";
pub const RESP_SYS_INFO_PREFIX: &str = "iDCC-EX";
pub const CMD_KEEP_ALIVE: &str = "#";
pub const CMD_EMERGENCY_STOP: &str = "!";
pub const CMD_REBOOT: &str = "D RESET";

// ── Track power ──────────────────────────────────────────────────────

pub const CMD_TRACKS_ON: &str = "1";
pub const CMD_TRACKS_OFF: &str = "0";
pub const RESP_TRACKS_ON: &str = "p1";
pub const RESP_TRACKS_OFF: &str = "p0";

pub const CMD_LIST_TRACKS: &str = "=";
pub const RESP_TRACK_LIST_PREFIX: &str = "=";
pub const CMD_TRACK_CURRENT: &str = "c";
pub const RESP_TRACK_CURRENT_PREFIX: &str = "c";

// ── Roster ───────────────────────────────────────────────────────────

pub const CMD_LIST_ROSTER: &str = "JR";
pub const RESP_ROSTER_LIST_PREFIX: &str = "jR";
pub const RESP_THROTTLE_PREFIX: &str = "l";

// ── Routes ───────────────────────────────────────────────────────────

pub const CMD_LIST_ROUTES: &str = "J A";
pub const RESP_ROUTE_LIST_PREFIX: &str = "jA";

// ── Turnouts ─────────────────────────────────────────────────────────

pub const CMD_LIST_TURNOUTS: &str = "JT";
pub const RESP_TURNOUT_LIST_PREFIX: &str = "jT";
pub const RESP_TURNOUT_STATE_PREFIX: &str = "H";

// ── Command builders ─────────────────────────────────────────────────

pub fn roster_detail_cmd(cab_id: u32) -> String {
    format!("JR {cab_id}")
}

pub fn roster_detail_prefix(cab_id: u32) -> String {
    format!("jR {cab_id}")
}

pub fn loco_state_cmd(cab_id: u32) -> String {
    format!("t {cab_id}")
}

pub fn throttle_prefix(cab_id: u32) -> String {
    format!("{RESP_THROTTLE_PREFIX} {cab_id}")
}

/// `speed` is a DCC speed step 0..=126, or -1 for an emergency stop.
pub fn loco_speed_cmd(cab_id: u32, speed: i16, forward: bool) -> String {
    format!("t {cab_id} {speed} {}", u8::from(forward))
}

pub fn loco_function_cmd(cab_id: u32, function_id: u8, on: bool) -> String {
    format!("F {cab_id} {function_id} {}", u8::from(on))
}

pub fn route_detail_cmd(route_id: u32) -> String {
    format!("J A {route_id}")
}

pub fn route_detail_prefix(route_id: u32) -> String {
    format!("jA {route_id}")
}

pub fn start_route_cmd(route_id: u32) -> String {
    format!("/ START {route_id}")
}

pub fn turnout_detail_cmd(turnout_id: u32) -> String {
    format!("JT {turnout_id}")
}

pub fn turnout_detail_prefix(turnout_id: u32) -> String {
    format!("jT {turnout_id}")
}

pub fn turnout_state_prefix(turnout_id: u32) -> String {
    format!("{RESP_TURNOUT_STATE_PREFIX} {turnout_id}")
}

/// `state` is the single-letter turnout state (`C` or `T`).
pub fn set_turnout_cmd(turnout_id: u32, state: char) -> String {
    format!("T {turnout_id} {state}")
}

pub fn track_power_cmd(letter: char, on: bool) -> String {
    format!("p{letter} {}", u8::from(on))
}

pub fn track_power_response(letter: char, on: bool) -> String {
    format!("p{letter}{}", u8::from(on))
}

pub fn write_cv_cmd(address: u16, cv: u16, value: u8) -> String {
    format!("w {address} {cv} {value}")
}

// ── Prefix matching ──────────────────────────────────────────────────

/// Whether `line` answers a request waiting on `prefix`.
///
/// The line must start with the prefix, and the prefix must end on a
/// token boundary so that `jA 1` does not claim `jA 12 R`.
pub fn prefix_matches(line: &str, prefix: &str) -> bool {
    let Some(rest) = line.strip_prefix(prefix) else {
        return false;
    };
    let prefix_open = prefix
        .chars()
        .next_back()
        .is_some_and(char::is_alphanumeric);
    match rest.chars().next() {
        None => true,
        Some(next) => !(prefix_open && next.is_alphanumeric()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_requires_token_boundary() {
        assert!(prefix_matches("jA 12 R", "jA 12"));
        assert!(!prefix_matches("jA 12 R", "jA 1"));
        assert!(prefix_matches("jA", "jA"));
        assert!(prefix_matches("jA.", "jA"));
        assert!(prefix_matches("jA 1 2 3", "jA"));
        assert!(!prefix_matches("jAX", "jA"));
        assert!(prefix_matches("p1", "p1"));
        assert!(!prefix_matches("p1", "pA1"));
        assert!(prefix_matches("= A MAIN", "="));
    }

    #[test]
    fn prefix_ending_in_symbol_matches_anything_after() {
        assert!(prefix_matches("=A MAIN", "="));
        assert!(prefix_matches("# 50", "#"));
    }

    #[test]
    fn builders_render_expected_commands() {
        assert_eq!(route_detail_cmd(5), "J A 5");
        assert_eq!(start_route_cmd(5), "/ START 5");
        assert_eq!(set_turnout_cmd(12, 'T'), "T 12 T");
        assert_eq!(track_power_cmd('B', true), "pB 1");
        assert_eq!(track_power_response('B', false), "pB0");
        assert_eq!(loco_speed_cmd(3, 64, true), "t 3 64 1");
        assert_eq!(loco_function_cmd(3, 2, false), "F 3 2 0");
        assert_eq!(write_cv_cmd(3, 29, 6), "w 3 29 6");
    }
}

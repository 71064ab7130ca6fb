// ── Track outputs ──

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::CoreError;

static LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^=\s+(?P<letter>[A-H])\s+(?P<mode>[A-Za-z_]+)(?:\s+(?P<cab>\d+))?\s*$")
        .expect("track list pattern is valid")
});

// e.g. `c "CurrentMAIN" 450 C "mA" "x" 2000 "y" 2500`
static CURRENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"^c\s+"(?P<name>[^"]+)"\s+(?P<current>\d+)\s+[CV]\s+"[^"]+"\s+"#,
        r#""[^"]+"\s+(?P<max>\d+)\s+"[^"]+"\s+(?P<trip>\d+)"#,
    ))
    .expect("track current pattern is valid")
});

const CURRENT_NAME_PREFIX: &str = "Current";

/// One track output (A-H) of the command station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    letter: char,
    /// MAIN, PROG, DC, DCX, NONE, ...
    pub mode: String,
    /// Cab address for DC modes, 0 otherwise.
    pub cab: u32,
    pub current_ma: u32,
    pub max_ma: u32,
    pub trip_ma: u32,
    pub powered: bool,
}

impl Track {
    pub fn new(letter: char, mode: &str, cab: u32) -> Self {
        Self {
            letter,
            mode: mode.to_owned(),
            cab,
            current_ma: 0,
            max_ma: 0,
            trip_ma: 0,
            powered: false,
        }
    }

    pub fn letter(&self) -> char {
        self.letter
    }

    /// Parse one `= <letter> <mode> [cab]` line.
    pub fn from_list_line(line: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::invalid("track list", line);
        let caps = LIST_RE.captures(line).ok_or_else(invalid)?;

        let letter = caps["letter"].chars().next().ok_or_else(invalid)?;
        let cab = match caps.name("cab") {
            Some(cab) => cab.as_str().parse().map_err(|_| invalid())?,
            None => 0,
        };
        Ok(Self::new(letter, &caps["mode"], cab))
    }

    /// Whether a current reading named `name` belongs to this track.
    pub fn matches_name(&self, name: &str) -> bool {
        let mut letter = [0; 4];
        name.eq_ignore_ascii_case(self.letter.encode_utf8(&mut letter)) || name.eq_ignore_ascii_case(&self.mode)
    }

    pub fn apply_current(&mut self, reading: &TrackCurrent) {
        self.current_ma = reading.current_ma;
        self.max_ma = reading.max_ma;
        self.trip_ma = reading.trip_ma;
    }
}

/// Reply to the `c` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackCurrent {
    /// Track the reading belongs to, `Current` prefix removed.
    pub name: String,
    pub current_ma: u32,
    pub max_ma: u32,
    pub trip_ma: u32,
}

impl TrackCurrent {
    pub fn parse(response: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::invalid("track current", response);
        let caps = CURRENT_RE.captures(response).ok_or_else(invalid)?;
        let number = |group: &str| caps[group].parse::<u32>().map_err(|_| invalid());

        let raw_name = &caps["name"];
        Ok(Self {
            name: raw_name
                .strip_prefix(CURRENT_NAME_PREFIX)
                .unwrap_or(raw_name)
                .to_owned(),
            current_ma: number("current")?,
            max_ma: number("max")?,
            trip_ma: number("trip")?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_lines() {
        assert_eq!(Track::from_list_line("= A MAIN").unwrap(), Track::new('A', "MAIN", 0));
        let dc = Track::from_list_line("= C DC 3").unwrap();
        assert_eq!(dc.letter(), 'C');
        assert_eq!(dc.mode, "DC");
        assert_eq!(dc.cab, 3);
        assert!(Track::from_list_line("= a main").is_err());
        assert!(Track::from_list_line("= I MAIN").is_err());
        assert!(Track::from_list_line("= C DC 3 4").is_err());
        assert_eq!(Track::from_list_line("= D MAIN_INV").unwrap().mode, "MAIN_INV");
    }

    #[test]
    fn parses_current_reading() {
        let reading = TrackCurrent::parse(r#"c "CurrentMAIN" 450 C "mA" "x" 2000 "y" 2500"#).unwrap();
        assert_eq!(
            reading,
            TrackCurrent {
                name: "MAIN".into(),
                current_ma: 450,
                max_ma: 2000,
                trip_ma: 2500,
            }
        );
    }

    #[test]
    fn rejects_truncated_current_reading() {
        assert!(matches!(
            TrackCurrent::parse(r#"c "CurrentMAIN" 450"#),
            Err(CoreError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn reading_matches_by_letter_or_mode() {
        let track = Track::new('B', "PROG", 0);
        assert!(track.matches_name("PROG"));
        assert!(track.matches_name("prog"));
        assert!(track.matches_name("B"));
        assert!(!track.matches_name("MAIN"));
    }
}

// ── Command station identity ──

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::error::CoreError;

/// Oldest firmware the bridge talks to.
pub const MIN_SUPPORTED_VERSION: [u32; 3] = [5, 4, 0];

// e.g. `iDCC-EX V-5.4.8 / ESP32 / STANDARD_MOTOR_SHIELD G-c389fe9`
static SYS_INFO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^iDCC-EX\s+V-(?P<version>\d+\.\d+\.\d+)\s+/\s+(?P<processor>[^/]+?)\s+/\s+(?P<motor>\S+)(?:\s+(?P<build>\S+))?",
    )
    .expect("system info pattern is valid")
});

/// Firmware version, compared component by component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct Version(Vec<u32>);

impl Version {
    pub fn parts(&self) -> &[u32] {
        &self.0
    }

    pub fn minimum_supported() -> Self {
        Self::from(MIN_SUPPORTED_VERSION)
    }

    pub fn is_supported(&self) -> bool {
        *self >= Self::minimum_supported()
    }
}

impl<const N: usize> From<[u32; N]> for Version {
    fn from(parts: [u32; N]) -> Self {
        Self(parts.to_vec())
    }
}

impl FromStr for Version {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split('.')
            .map(str::parse)
            .collect::<Result<Vec<u32>, _>>()
            .map(Self)
            .map_err(|_| CoreError::invalid("version", s))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

/// Reply to the `s` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub version: Version,
    pub processor: String,
    pub motor_controller: String,
    /// `unknown` when the firmware does not report one.
    pub build: String,
    pub fetched_at: DateTime<Utc>,
}

impl SystemInfo {
    pub fn parse(response: &str) -> Result<Self, CoreError> {
        let caps = SYS_INFO_RE
            .captures(response)
            .ok_or_else(|| CoreError::invalid("system info", response))?;

        Ok(Self {
            version: caps["version"].parse()?,
            processor: caps["processor"].trim().to_owned(),
            motor_controller: caps["motor"].to_owned(),
            build: caps
                .name("build")
                .map_or_else(|| "unknown".to_owned(), |m| m.as_str().to_owned()),
            fetched_at: Utc::now(),
        })
    }

    /// Fails with [`CoreError::Version`] below [`MIN_SUPPORTED_VERSION`].
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.version.is_supported() {
            return Ok(());
        }
        Err(CoreError::Version {
            message: format!(
                "Unsupported command station version: {}. Min supported: {}",
                self.version,
                Version::minimum_supported()
            ),
        })
    }
}

// ── Domain model ──
//
// Typed catalog entries parsed from command station replies. Identity
// (numeric id or track letter) is fixed at construction; everything
// else is replaced when a refresh or push delivers newer data.

pub mod roster;
pub mod route;
pub mod system_info;
pub mod track;
pub mod turnout;

pub use roster::{Direction, LocoFunction, RosterEntry, ThrottleUpdate};
pub use route::{Route, RouteType};
pub use system_info::{MIN_SUPPORTED_VERSION, SystemInfo, Version};
pub use track::{Track, TrackCurrent};
pub use turnout::{Turnout, TurnoutState, TurnoutStateUpdate};

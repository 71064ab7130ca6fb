//! Domain layer between `excs-api` and the CLI.
//!
//! - **[`Station`]**: facade owning one connection. [`setup()`](Station::setup)
//!   identifies the station, checks its firmware and loads every catalog;
//!   turnout, throttle and power pushes are applied to the catalogs as
//!   they arrive.
//!
//! - **Catalog managers** ([`catalog`]): roster, routes, turnouts and
//!   tracks, each published as an immutable snapshot via
//!   `tokio::sync::watch`.
//!
//! - **[`EntityStream<T>`]**: subscription handle over one catalog with
//!   `current()` / `latest()` / `changed()`.
//!
//! - **Domain model** ([`model`]): typed entries parsed from station replies.

pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod station;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use catalog::{CatalogEntry, CatalogManager, RosterManager, RoutesManager, TracksManager, TurnoutsManager};
pub use config::StationConfig;
pub use error::CoreError;
pub use station::{CvWrite, Station};
pub use stream::{EntityStream, EntityWatchStream, Snapshot};

pub use model::{
    Direction, LocoFunction, MIN_SUPPORTED_VERSION, RosterEntry, Route, RouteType, SystemInfo, ThrottleUpdate,
    Track, TrackCurrent, Turnout, TurnoutState, TurnoutStateUpdate, Version,
};

// Wire-layer types consumers need alongside the facade.
pub use excs_api::{ConnectionState, DEFAULT_PORT, Signal, StationEvent, Subscription};

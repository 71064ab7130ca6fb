// excs-api: Async client for the DCC-EX command station text protocol

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod reconnect;

pub use connection::{ConnectionConfig, ConnectionState, DEFAULT_PORT, StationClient};
pub use dispatcher::{Dispatcher, HandlerError, HandlerResult, Signal, StationEvent, Subscription};
pub use error::Error;
pub use reconnect::ReconnectConfig;

pub mod arguments;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod logger;
pub mod webserver;
pub mod ws;

pub use errors::{ClientError, DispatchError, HubError, TransportError};
pub use ws::{Client, Hub, HubConf, HubOption};

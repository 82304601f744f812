/// Persistent Connection Hub
///
/// Accepts many concurrent duplex connections, gives each an identity and
/// routes inbound frames to a pluggable handler.
///
/// ## Architecture
/// - One event-loop task per hub owning the client registry
/// - Reader and writer task per client joined by a close rendezvous
/// - Bounded per-client outbound queues; broadcast sheds slow clients
/// - Acknowledgment-tracked sends with deadlines
/// - Per-client token-bucket breaker on inbound frames
///
/// ## Key Components
/// - `hub`: Registry owner, broadcast and command fan-out
/// - `client`: Connection lifecycle and close state
/// - `ack`: In-flight entries awaiting acknowledgment
/// - `breaker`: Inbound admission control
/// - `command`: Out-of-band registry queries
/// - `options`: Hub configuration and its builder
/// - `handler`: Application callbacks
/// - `transport`: Frame sink/stream over axum sockets
/// - `metrics`: Counters for monitoring
pub mod ack;
pub mod breaker;
pub mod client;
pub mod command;
pub mod handler;
pub mod hub;
pub mod metrics;
pub mod options;
pub mod transport;

pub use ack::{AckEntry, MessageId};
pub use client::{Client, ClientId, CloseCode, CloseFlags};
pub use command::{Command, CommandArg, CommandOp, CommandResult, CommandValue};
pub use handler::{EchoHandler, FnHandler, Handler, HandlerError, Protocol};
pub use hub::Hub;
pub use options::{default_options, HubConf, HubConfBuilder, HubOption, UpgradeRequest};

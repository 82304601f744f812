/// Action dispatch on top of the hub
///
/// - `codec`: message encoding (`JsonCodec` by default)
/// - `mux`: `ActionMux`, a hub `Handler` routing by action code
pub mod codec;
pub mod mux;

pub use codec::{Codec, JsonCodec};
pub use mux::{send, ActionCode, ActionMessage, ActionMux, ECHO};

/// Action multiplexer
///
/// Decodes every inbound frame as an `ActionMessage` and routes it to the
/// response function registered for its code. Code `ECHO` is registered by
/// default and writes the message back unchanged.
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::codec::{Codec, JsonCodec};
use crate::errors::DispatchError;
use crate::logger::{self, LogTag};
use crate::ws::{Client, Handler, HandlerError};

pub type ActionCode = i32;

pub const ECHO: ActionCode = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMessage {
    #[serde(rename = "Code")]
    pub code: ActionCode,
    /// Action-specific arguments, encoded with the same codec
    #[serde(rename = "Params", default)]
    pub params: String,
}

impl ActionMessage {
    pub fn new(code: ActionCode, params: impl Into<String>) -> Self {
        Self {
            code,
            params: params.into(),
        }
    }

    pub fn params<T: DeserializeOwned, C: Codec>(&self, codec: &C) -> Result<T, DispatchError> {
        codec.unmarshal(self.params.as_bytes())
    }
}

type ResponseFn =
    Arc<dyn Fn(Arc<Client>, ActionMessage) -> BoxFuture<'static, Result<(), DispatchError>> + Send + Sync>;

pub struct ActionMux<C: Codec = JsonCodec> {
    routes: RwLock<HashMap<ActionCode, ResponseFn>>,
    codec: Arc<C>,
}

impl ActionMux<JsonCodec> {
    pub fn new() -> Self {
        Self::with_codec(JsonCodec)
    }
}

impl Default for ActionMux<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> ActionMux<C> {
    pub fn with_codec(codec: C) -> Self {
        let mux = Self {
            routes: RwLock::new(HashMap::new()),
            codec: Arc::new(codec),
        };

        let codec = Arc::clone(&mux.codec);
        mux.handle_func(ECHO, move |client, message| {
            let codec = Arc::clone(&codec);
            async move { send(codec.as_ref(), &client, &message).await }
        });
        mux
    }

    /// Register (or replace) the response function for `code`
    pub fn handle_func<F, Fut>(&self, code: ActionCode, f: F)
    where
        F: Fn(Arc<Client>, ActionMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DispatchError>> + Send + 'static,
    {
        let route: ResponseFn = Arc::new(move |client, message| f(client, message).boxed());
        self.routes.write().insert(code, route);
    }

    pub fn codec(&self) -> &Arc<C> {
        &self.codec
    }

    /// Encode `value` and queue it for `client`
    pub async fn send<T: Serialize>(&self, client: &Client, value: &T) -> Result<(), DispatchError> {
        send(self.codec.as_ref(), client, value).await
    }

    pub fn codes(&self) -> Vec<ActionCode> {
        let mut codes: Vec<ActionCode> = self.routes.read().keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    async fn dispatch(&self, client: &Arc<Client>, frame: &[u8]) -> Result<(), DispatchError> {
        let message: ActionMessage = self.codec.unmarshal(frame)?;

        let route = self.routes.read().get(&message.code).cloned();
        let route = route.ok_or(DispatchError::UnregisteredAction(message.code))?;

        logger::debug(
            LogTag::Dispatch,
            &format!("client {} action {}", client.id(), message.code),
        );
        route(Arc::clone(client), message).await
    }
}

/// Encode `value` with `codec` and queue it for `client`
pub async fn send<C: Codec, T: Serialize>(
    codec: &C,
    client: &Client,
    value: &T,
) -> Result<(), DispatchError> {
    let data = codec.marshal(value)?;
    client.send(data).await?;
    Ok(())
}

#[async_trait]
impl<C: Codec> Handler for ActionMux<C> {
    async fn handle(&self, client: &Arc<Client>, frame: Vec<u8>) -> Result<(), HandlerError> {
        self.dispatch(client, &frame).await?;
        Ok(())
    }
}

impl<C: Codec> std::fmt::Debug for ActionMux<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionMux")
            .field("codes", &self.codes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::transport::memory::{self, Peer};
    use crate::ws::transport::WireMessage;
    use crate::ws::{CloseCode, Hub, HubConf, UpgradeRequest};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(3);

    #[derive(Deserialize)]
    struct Pair {
        #[serde(rename = "X")]
        x: i64,
        #[serde(rename = "Y")]
        y: i64,
    }

    async fn connect(mux: ActionMux) -> (Arc<Client>, Peer) {
        let hub = Hub::with_conf(HubConf::builder().handler(Arc::new(mux)).build());
        let (sink, stream, peer) = memory::pair();
        let client = hub
            .attach(&UpgradeRequest::default(), sink, stream)
            .await
            .unwrap();
        (client, peer)
    }

    fn reply(frame: Option<WireMessage>) -> ActionMessage {
        match frame {
            Some(WireMessage::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_message_field_names() {
        let message: ActionMessage = serde_json::from_str(r#"{"Code":3}"#).unwrap();
        assert_eq!(message, ActionMessage::new(3, ""));

        let encoded = serde_json::to_string(&ActionMessage::new(1, "3")).unwrap();
        assert_eq!(encoded, r#"{"Code":1,"Params":"3"}"#);
    }

    #[tokio::test]
    async fn test_echo_is_registered() {
        let mux = ActionMux::new();
        assert_eq!(mux.codes(), vec![ECHO]);

        let (_client, mut peer) = connect(mux).await;
        peer.send_text(r#"{"Code":0,"Params":"hi"}"#);
        assert_eq!(reply(peer.next_frame(WAIT).await), ActionMessage::new(ECHO, "hi"));
    }

    #[tokio::test]
    async fn test_custom_action() {
        let mux = ActionMux::new();
        let codec = Arc::clone(mux.codec());
        mux.handle_func(1, move |client, mut message| {
            let codec = Arc::clone(&codec);
            async move {
                let pair: Pair = message.params(codec.as_ref())?;
                message.params = (pair.x + pair.y).to_string();
                send(codec.as_ref(), &client, &message).await
            }
        });

        let (_client, mut peer) = connect(mux).await;
        peer.send_text(r#"{"Code":1,"Params":"{\"X\":1,\"Y\":2}"}"#);
        assert_eq!(reply(peer.next_frame(WAIT).await), ActionMessage::new(1, "3"));
    }

    #[tokio::test]
    async fn test_unregistered_action_closes() {
        let (_client, mut peer) = connect(ActionMux::new()).await;

        peer.send_text(r#"{"Code":9}"#);
        let frame = peer.close_frame(WAIT).await.unwrap();
        assert_eq!(frame.code, CloseCode::HandlerError.code());
        assert_eq!(frame.reason, "unregistered action code 9");
    }

    #[tokio::test]
    async fn test_malformed_frame_closes() {
        let (_client, mut peer) = connect(ActionMux::new()).await;

        peer.send_text("not json");
        let frame = peer.close_frame(WAIT).await.unwrap();
        assert_eq!(frame.code, CloseCode::HandlerError.code());
        assert!(frame.reason.starts_with("decode error"));
    }
}

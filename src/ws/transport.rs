/// Duplex frame transport
///
/// A client talks to its peer through a boxed `Sink` of outbound frames and a
/// boxed `Stream` of inbound frames. `split_websocket` adapts an upgraded axum
/// socket into that pair; tests use the in-memory pair from `memory`.
use axum::extract::ws::{CloseFrame as WsCloseFrame, Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;

use crate::errors::TransportError;

/// Close control frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

/// Transport-neutral frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<CloseFrame>),
}

impl WireMessage {
    /// Outbound payloads go out as text when they are valid UTF-8
    pub fn from_payload(payload: Vec<u8>) -> Self {
        match String::from_utf8(payload) {
            Ok(text) => WireMessage::Text(text),
            Err(e) => WireMessage::Binary(e.into_bytes()),
        }
    }

    /// Data frames carry a payload; control frames do not
    pub fn into_payload(self) -> Option<Vec<u8>> {
        match self {
            WireMessage::Text(text) => Some(text.into_bytes()),
            WireMessage::Binary(data) => Some(data),
            _ => None,
        }
    }
}

impl From<Message> for WireMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => WireMessage::Text(text),
            Message::Binary(data) => WireMessage::Binary(data),
            Message::Ping(data) => WireMessage::Ping(data),
            Message::Pong(data) => WireMessage::Pong(data),
            Message::Close(frame) => WireMessage::Close(frame.map(|f| CloseFrame {
                code: f.code,
                reason: f.reason.into_owned(),
            })),
        }
    }
}

impl From<WireMessage> for Message {
    fn from(message: WireMessage) -> Self {
        match message {
            WireMessage::Text(text) => Message::Text(text),
            WireMessage::Binary(data) => Message::Binary(data),
            WireMessage::Ping(data) => Message::Ping(data),
            WireMessage::Pong(data) => Message::Pong(data),
            WireMessage::Close(frame) => Message::Close(frame.map(|f| WsCloseFrame {
                code: f.code,
                reason: f.reason.into(),
            })),
        }
    }
}

pub type FrameSink = Pin<Box<dyn Sink<WireMessage, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<WireMessage, TransportError>> + Send>>;

/// Split an upgraded socket into the writer and reader halves
pub fn split_websocket(socket: WebSocket) -> (FrameSink, FrameStream) {
    let (sink, stream) = socket.split();

    let sink = sink
        .sink_map_err(TransportError::from)
        .with(|message: WireMessage| {
            futures::future::ready(Ok::<Message, TransportError>(message.into()))
        });
    let stream = stream.map(|item| item.map(WireMessage::from).map_err(TransportError::from));

    (Box::pin(sink), Box::pin(stream))
}

/// In-memory transport for driving clients without sockets
#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use futures::channel::mpsc;
    use std::time::Duration;

    /// The far end of an in-memory connection
    pub struct Peer {
        pub inbound: mpsc::UnboundedSender<Result<WireMessage, TransportError>>,
        pub outbound: mpsc::UnboundedReceiver<WireMessage>,
    }

    impl Peer {
        pub fn send_text(&self, text: &str) {
            let _ = self
                .inbound
                .unbounded_send(Ok(WireMessage::Text(text.to_string())));
        }

        /// Next frame written by the client, or None after `wait`
        pub async fn next_frame(&mut self, wait: Duration) -> Option<WireMessage> {
            tokio::time::timeout(wait, self.outbound.next())
                .await
                .ok()
                .flatten()
        }

        /// Wait for the close frame, skipping data frames
        pub async fn close_frame(&mut self, wait: Duration) -> Option<CloseFrame> {
            let deadline = tokio::time::Instant::now() + wait;
            loop {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                match self.next_frame(remaining).await? {
                    WireMessage::Close(frame) => return frame,
                    _ => continue,
                }
            }
        }
    }

    pub fn pair() -> (FrameSink, FrameStream, Peer) {
        let (out_tx, out_rx) = mpsc::unbounded::<WireMessage>();
        let (in_tx, in_rx) = mpsc::unbounded::<Result<WireMessage, TransportError>>();

        let sink = out_tx.sink_map_err(|_| TransportError::Closed);

        (
            Box::pin(sink),
            Box::pin(in_rx),
            Peer {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }
}

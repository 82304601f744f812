/// Inbound frame handlers
///
/// The reader task of every client hands each admitted frame to the hub's
/// `Handler`. A handler error closes the connection with the error text as
/// the close reason.
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use super::client::Client;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, client: &Arc<Client>, frame: Vec<u8>) -> Result<(), HandlerError>;
}

/// A handler bundled with registration hooks
///
/// `on_register` returns `true` to accept the client and `false` to refuse
/// it. This is the opposite of a `closed` flag: a hook written to answer
/// "should this client be closed?" must be negated.
#[async_trait]
pub trait Protocol: Send + Sync {
    fn on_register(&self, client: &Arc<Client>) -> bool;

    fn on_unregister(&self, client: &Arc<Client>);

    async fn handle(&self, client: &Arc<Client>, frame: Vec<u8>) -> Result<(), HandlerError>;
}

/// Writes every frame back to its sender
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn handle(&self, client: &Arc<Client>, frame: Vec<u8>) -> Result<(), HandlerError> {
        client.send(frame).await?;
        Ok(())
    }
}

/// Handler backed by an async closure
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Arc<Client>, Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, client: &Arc<Client>, frame: Vec<u8>) -> Result<(), HandlerError> {
        (self.0)(Arc::clone(client), frame).await
    }
}

/// Exposes the frame half of a `Protocol` as a `Handler`
pub(crate) struct ProtocolHandler(pub Arc<dyn Protocol>);

#[async_trait]
impl Handler for ProtocolHandler {
    async fn handle(&self, client: &Arc<Client>, frame: Vec<u8>) -> Result<(), HandlerError> {
        self.0.handle(client, frame).await
    }
}

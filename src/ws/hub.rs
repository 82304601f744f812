/// Connection hub
///
/// The registry of live clients is owned by a single event-loop task. Every
/// other task talks to it through channels: registration, unregistration,
/// broadcast, commands, and teardown. The loop never waits on a consumer:
/// broadcast uses `try_send` and sheds slow clients, command replies go
/// through a permit reserved at submission, and closes are spawned.
use axum::extract::ws::WebSocket;
use futures::SinkExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::client::{Client, ClientId, CloseCode, CloseFlags, AUTH_REQUIRED_REASON};
use super::command::{Command, CommandArg, CommandOp, CommandValue, QueuedCommand};
use super::metrics::HubMetrics;
use super::options::{HubConf, HubOption, UpgradeRequest};
use super::transport::{split_websocket, CloseFrame, FrameSink, FrameStream, WireMessage};
use crate::errors::HubError;
use crate::logger::{LogLevel, LogTag};

const REGISTER_CHANNEL_SIZE: usize = 64;
const BROADCAST_CHANNEL_SIZE: usize = 256;
const COMMAND_CHANNEL_SIZE: usize = 20;

struct RegisterRequest {
    client: Arc<Client>,
    registered: oneshot::Sender<()>,
}

pub struct Hub {
    conf: Arc<HubConf>,
    metrics: Arc<HubMetrics>,
    register_tx: mpsc::Sender<RegisterRequest>,
    unregister_tx: mpsc::UnboundedSender<Arc<Client>>,
    broadcast_tx: mpsc::Sender<Vec<u8>>,
    command_tx: mpsc::Sender<QueuedCommand>,
    teardown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Hub {
    /// Build the configuration from `options` and start the event loop
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(options: impl IntoIterator<Item = HubOption>) -> Arc<Self> {
        Self::with_conf(HubConf::build(options))
    }

    pub fn with_conf(conf: HubConf) -> Arc<Self> {
        let conf = Arc::new(conf);
        let metrics = HubMetrics::new();

        let (register_tx, register_rx) = mpsc::channel(REGISTER_CHANNEL_SIZE);
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_CHANNEL_SIZE);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (teardown, teardown_rx) = watch::channel(false);

        let event_loop = HubLoop {
            registry: HashMap::new(),
            conf: Arc::clone(&conf),
            metrics: Arc::clone(&metrics),
            register_rx,
            unregister_rx,
            broadcast_rx,
            command_rx,
            teardown: teardown_rx,
        };
        let task = tokio::spawn(event_loop.run());

        conf.log(LogTag::Hub, LogLevel::Info, "hub started");

        Arc::new(Self {
            conf,
            metrics,
            register_tx,
            unregister_tx,
            broadcast_tx,
            command_tx,
            teardown,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn conf(&self) -> &Arc<HubConf> {
        &self.conf
    }

    pub fn metrics(&self) -> &Arc<HubMetrics> {
        &self.metrics
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    /// Submit a command; the result arrives on the command's result channel
    ///
    /// Fails at once with `InvalidChannel` when that channel has no free
    /// slot, in which case the command never reaches the event loop.
    pub async fn send_command(&self, command: Command) -> Result<(), HubError> {
        let queued = command.reserve()?;
        self.command_tx
            .send(queued)
            .await
            .map_err(|_| HubError::HubClosed)
    }

    async fn query(&self, op: CommandOp, arg: CommandArg) -> Result<CommandValue, HubError> {
        let (tx, mut rx) = mpsc::channel(1);
        self.send_command(Command::new(op, arg, tx)).await?;
        rx.recv().await.unwrap_or(Err(HubError::HubClosed))
    }

    pub async fn online_count(&self) -> Result<usize, HubError> {
        match self.query(CommandOp::OnlineCount, CommandArg::None).await? {
            CommandValue::OnlineCount(count) => Ok(count),
            _ => Err(HubError::InvalidArgs),
        }
    }

    pub async fn get_client(&self, id: ClientId) -> Result<Option<Arc<Client>>, HubError> {
        match self.query(CommandOp::GetClient, CommandArg::Id(id)).await? {
            CommandValue::Client(client) => Ok(client),
            _ => Err(HubError::InvalidArgs),
        }
    }

    /// Queue a payload for every registered client
    pub async fn broadcast(&self, payload: Vec<u8>) -> Result<(), HubError> {
        self.broadcast_tx
            .send(payload)
            .await
            .map_err(|_| HubError::HubClosed)
    }

    // ========================================================================
    // CONNECTIONS
    // ========================================================================

    pub(crate) async fn register(&self, client: Arc<Client>) -> Result<(), HubError> {
        let (registered, done) = oneshot::channel();
        self.register_tx
            .send(RegisterRequest { client, registered })
            .await
            .map_err(|_| HubError::HubClosed)?;
        done.await.map_err(|_| HubError::HubClosed)
    }

    /// Never blocks; safe to call from the event loop itself
    pub(crate) fn request_unregister(&self, client: Arc<Client>) {
        // Loop gone means the registry is gone too
        let _ = self.unregister_tx.send(client);
    }

    /// Authenticate, register and start a client on an upgraded transport
    ///
    /// Returns `None` when the auth predicate refuses the request or the hub
    /// has shut down.
    pub async fn attach(
        self: &Arc<Self>,
        request: &UpgradeRequest,
        mut sink: FrameSink,
        stream: FrameStream,
    ) -> Option<Arc<Client>> {
        if !(self.conf.auth)(request) {
            self.metrics.connection_rejected();
            self.conf.log(
                LogTag::Hub,
                LogLevel::Warning,
                &format!("unauthenticated connection on {}", request.uri),
            );

            let frame = WireMessage::Close(Some(CloseFrame {
                code: CloseCode::AuthRequired.code(),
                reason: AUTH_REQUIRED_REASON.to_string(),
            }));
            let _ = timeout(self.conf.write_wait, sink.send(frame)).await;
            let _ = timeout(self.conf.write_wait, sink.close()).await;
            return None;
        }

        let id = (self.conf.assign_id)(request);
        let client = Client::new(id, Arc::clone(self), sink, stream);
        self.metrics.connection_accepted();

        if let Err(e) = self.register(Arc::clone(&client)).await {
            self.conf.log(
                LogTag::Hub,
                LogLevel::Warning,
                &format!("client {} not registered: {}", id, e),
            );
            client.set_flags(CloseFlags::READ_CLOSED | CloseFlags::WRITE_CLOSED);
            client.close().await;
            return None;
        }

        client.start();
        Some(client)
    }

    /// Attach an upgraded axum socket
    pub async fn accept(self: &Arc<Self>, socket: WebSocket, request: UpgradeRequest) {
        let (sink, stream) = split_websocket(socket);
        self.attach(&request, sink, stream).await;
    }

    /// Close every client and stop the event loop
    pub async fn shutdown(&self) {
        let _ = self.teardown.send(true);

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                self.conf.log(
                    LogTag::Hub,
                    LogLevel::Error,
                    &format!("hub loop ended abnormally: {}", e),
                );
            }
        }
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub").field("conf", &self.conf).finish()
    }
}

// ============================================================================
// EVENT LOOP
// ============================================================================

enum Event {
    Teardown,
    Unregister(Arc<Client>),
    Register(RegisterRequest),
    Command(QueuedCommand),
    Broadcast(Vec<u8>),
}

struct HubLoop {
    registry: HashMap<ClientId, Arc<Client>>,
    conf: Arc<HubConf>,
    metrics: Arc<HubMetrics>,
    register_rx: mpsc::Receiver<RegisterRequest>,
    unregister_rx: mpsc::UnboundedReceiver<Arc<Client>>,
    broadcast_rx: mpsc::Receiver<Vec<u8>>,
    command_rx: mpsc::Receiver<QueuedCommand>,
    teardown: watch::Receiver<bool>,
}

impl HubLoop {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                biased;
                // A dropped sender also means teardown
                _ = self.teardown.changed() => Event::Teardown,
                Some(client) = self.unregister_rx.recv() => Event::Unregister(client),
                Some(request) = self.register_rx.recv() => Event::Register(request),
                Some(command) = self.command_rx.recv() => Event::Command(command),
                Some(payload) = self.broadcast_rx.recv() => Event::Broadcast(payload),
                else => break,
            };

            match event {
                Event::Teardown => {
                    self.teardown().await;
                    break;
                }
                Event::Unregister(client) => self.handle_unregister(client),
                Event::Register(request) => self.handle_register(request),
                Event::Command(command) => self.handle_command(command),
                Event::Broadcast(payload) => self.handle_broadcast(payload),
            }
        }

        self.conf.log(LogTag::Hub, LogLevel::Info, "hub stopped");
    }

    fn handle_register(&mut self, request: RegisterRequest) {
        let RegisterRequest { client, registered } = request;
        let id = client.id();

        if let Some(old) = self.registry.insert(id, Arc::clone(&client)) {
            if !Arc::ptr_eq(&old, &client) {
                self.debug(|| format!("client {} replaced by a newer connection", id));
                tokio::spawn(async move { old.close().await });
            }
        }

        self.debug(|| format!("client {} registered", id));
        self.metrics.set_registered(self.registry.len());
        let _ = registered.send(());
    }

    fn handle_unregister(&mut self, client: Arc<Client>) {
        let id = client.id();
        let current = self
            .registry
            .get(&id)
            .map(|registered| Arc::ptr_eq(registered, &client))
            .unwrap_or(false);

        if current {
            self.registry.remove(&id);
            self.metrics.set_registered(self.registry.len());
            self.debug(|| format!("client {} unregistered", id));
        }

        tokio::spawn(async move { client.close().await });
    }

    fn handle_command(&mut self, command: QueuedCommand) {
        self.metrics.command();

        let result = match (&command.op, &command.arg) {
            (CommandOp::OnlineCount, _) => Ok(CommandValue::OnlineCount(self.registry.len())),
            (CommandOp::GetClient, CommandArg::Id(id)) => {
                Ok(CommandValue::Client(self.registry.get(id).cloned()))
            }
            (CommandOp::GetClient, _) => Err(HubError::InvalidArgs),
            (CommandOp::Other(code), _) => Err(HubError::UnknownCommand(*code)),
        };

        command.reply(result);
    }

    fn handle_broadcast(&mut self, payload: Vec<u8>) {
        let mut evicted = Vec::new();
        let mut delivered = 0u64;

        for (id, client) in &self.registry {
            if client.try_enqueue(payload.clone()) {
                delivered += 1;
            } else {
                evicted.push(*id);
            }
        }

        for id in &evicted {
            if let Some(client) = self.registry.remove(id) {
                self.debug(|| format!("client {} evicted by broadcast", id));
                tokio::spawn(async move { client.close().await });
            }
        }

        self.metrics.broadcast(delivered, evicted.len() as u64);
        self.metrics.set_registered(self.registry.len());
    }

    async fn teardown(&mut self) {
        let clients: Vec<Arc<Client>> = self.registry.drain().map(|(_, client)| client).collect();
        self.metrics.set_registered(0);
        self.conf.log(
            LogTag::Hub,
            LogLevel::Info,
            &format!("closing {} clients", clients.len()),
        );

        futures::future::join_all(clients.iter().map(|client| client.close())).await;
    }

    fn debug(&self, message: impl FnOnce() -> String) {
        if self.conf.logs(LogTag::Hub, LogLevel::Debug) {
            self.conf.log(LogTag::Hub, LogLevel::Debug, &message());
        }
    }
}

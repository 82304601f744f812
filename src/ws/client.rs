/// Connection lifecycle
///
/// A `Client` owns one accepted connection. After registration it runs two
/// tasks: a writer draining the bounded outbound queue into the transport
/// sink, and a reader feeding inbound frames through the breaker to the hub
/// handler. Either task ending requests unregistration; the hub then calls
/// `close()`, which waits until the writer has stopped and the unregister
/// request is out before the staged close frame is sent and the transport
/// released.
///
/// All close bookkeeping lives in one `watch` cell so any number of callers
/// can wait on a flag combination.
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::ops::BitOr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, timeout_at, Instant};

use super::ack::{AckEntry, MessageId, SendWindow};
use super::breaker::Breaker;
use super::command::Command;
use super::hub::Hub;
use super::metrics::ClientMetrics;
use super::transport::{CloseFrame, FrameSink, FrameStream, WireMessage};
use crate::errors::{ClientError, HubError};
use crate::logger::{LogLevel, LogTag};

pub type ClientId = u64;

pub const AUTH_REQUIRED_REASON: &str = "authenticate required!";

/// Close frame payload limit (125) minus the two code bytes
const MAX_CLOSE_REASON: usize = 123;

/// Application close codes sent in the close frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Upgrade refused by the auth predicate
    AuthRequired,
    /// Registration hook refused the client
    RegistrationRejected,
    /// Breaker tripped
    Busy,
    /// Handler returned an error
    HandlerError,
}

impl CloseCode {
    pub fn code(self) -> u16 {
        match self {
            CloseCode::AuthRequired => 4000,
            CloseCode::RegistrationRejected => 4001,
            CloseCode::Busy => 4002,
            CloseCode::HandlerError => 4003,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseFlags(u8);

impl CloseFlags {
    pub const READ_CLOSED: Self = Self(0x01);
    pub const WRITE_CLOSED: Self = Self(0x02);
    pub const UNREGISTERED: Self = Self(0x04);
    pub const CLOSE_FRAME_QUEUED: Self = Self(0x08);
    pub const CLOSING: Self = Self(0x10);
    pub const RELEASED: Self = Self(0x20);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for CloseFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CloseState {
    pub flags: CloseFlags,
    pub close_frame: Option<CloseFrame>,
}

pub struct Client {
    id: ClientId,
    hub: Arc<Hub>,
    queue: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    queue_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    sink: Mutex<Option<FrameSink>>,
    stream: Mutex<Option<FrameStream>>,
    breaker: Option<Breaker>,
    msg_id: AtomicU64,
    window: Mutex<SendWindow>,
    state: watch::Sender<CloseState>,
    metrics: Arc<ClientMetrics>,
}

impl Client {
    pub(crate) fn new(
        id: ClientId,
        hub: Arc<Hub>,
        sink: FrameSink,
        stream: FrameStream,
    ) -> Arc<Self> {
        let conf = hub.conf();
        let (queue, queue_rx) = mpsc::channel(conf.client_send_size);
        let breaker = Breaker::new(conf.breaker_capacity, conf.breaker_period);
        let (state, _) = watch::channel(CloseState::default());

        Arc::new(Self {
            id,
            hub,
            queue: Mutex::new(Some(queue)),
            queue_rx: Mutex::new(Some(queue_rx)),
            sink: Mutex::new(Some(sink)),
            stream: Mutex::new(Some(stream)),
            breaker,
            msg_id: AtomicU64::new(0),
            window: Mutex::new(SendWindow::default()),
            state,
            metrics: ClientMetrics::new(),
        })
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn metrics(&self) -> &Arc<ClientMetrics> {
        &self.metrics
    }

    pub fn flags(&self) -> CloseFlags {
        self.state.borrow().flags
    }

    /// Close frame staged for this connection, if any
    pub fn close_frame(&self) -> Option<CloseFrame> {
        self.state.borrow().close_frame.clone()
    }

    /// Payloads waiting in the outbound queue
    pub fn queued(&self) -> usize {
        self.queue
            .lock()
            .as_ref()
            .map(|q| q.max_capacity() - q.capacity())
            .unwrap_or(0)
    }

    // ========================================================================
    // OUTBOUND
    // ========================================================================

    /// Enqueue a payload, waiting for queue space
    pub async fn send(&self, payload: Vec<u8>) -> Result<(), ClientError> {
        let queue = self.queue.lock().clone();
        let queue = queue.ok_or(ClientError::QueueClosed)?;
        queue
            .send(payload)
            .await
            .map_err(|_| ClientError::QueueClosed)
    }

    /// Enqueue without waiting; false when the queue is full or closed
    pub(crate) fn try_enqueue(&self, payload: Vec<u8>) -> bool {
        let queue = self.queue.lock();
        match queue.as_ref() {
            Some(q) => q.try_send(payload).is_ok(),
            None => false,
        }
    }

    pub fn next_msg_id(&self) -> MessageId {
        self.msg_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record `entry` in the send window, then enqueue its payload before the
    /// entry deadline.
    ///
    /// Returns false when the payload could not be enqueued in time; the
    /// entry is then removed again and its waiter receives `false`.
    pub async fn send_with_ack(&self, entry: AckEntry) -> bool {
        let id = entry.id();
        let deadline = entry.deadline();
        let payload = entry.payload().to_vec();

        {
            let mut window = self.window.lock();
            window.prune(Instant::now());
            window.push(entry);
        }

        let queue = self.queue.lock().clone();
        let sent = match queue {
            Some(queue) => matches!(timeout_at(deadline, queue.send(payload)).await, Ok(Ok(()))),
            None => false,
        };

        if !sent {
            let entry = self.window.lock().take(id);
            if let Some(entry) = entry {
                entry.resolve(false);
            }
            self.metrics.ack_failed();
            self.log(LogLevel::Debug, LogTag::Ack, || {
                format!("client {} message {} was not enqueued", self.id, id)
            });
        }

        sent
    }

    /// Acknowledge the first in-flight entry with this id
    pub fn ack(&self, id: MessageId) -> bool {
        let acked = {
            let mut window = self.window.lock();
            window.prune(Instant::now());
            window.ack(id)
        };

        if acked {
            self.metrics.ack_resolved();
        }
        acked
    }

    /// In-flight entries, after dropping expired and abandoned ones
    pub fn window_len(&self) -> usize {
        let mut window = self.window.lock();
        window.prune(Instant::now());
        window.len()
    }

    pub async fn broadcast(&self, payload: Vec<u8>) -> Result<(), HubError> {
        self.hub.broadcast(payload).await
    }

    pub async fn send_command(&self, command: Command) -> Result<(), HubError> {
        self.hub.send_command(command).await
    }

    // ========================================================================
    // CLOSE STATE
    // ========================================================================

    /// Stage the frame sent on close; only the first one is kept
    pub fn stage_close(&self, code: CloseCode, reason: impl Into<String>) {
        let mut reason = reason.into();
        if reason.len() > MAX_CLOSE_REASON {
            let mut end = MAX_CLOSE_REASON;
            while !reason.is_char_boundary(end) {
                end -= 1;
            }
            reason.truncate(end);
        }
        self.state.send_if_modified(|state| {
            if state.flags.contains(CloseFlags::CLOSE_FRAME_QUEUED) {
                return false;
            }
            state.flags.insert(CloseFlags::CLOSE_FRAME_QUEUED);
            state.close_frame = Some(CloseFrame {
                code: code.code(),
                reason,
            });
            true
        });
    }

    /// Ask the hub to drop this client; only the first call sends the request
    pub fn unregister(self: &Arc<Self>) {
        let first = self.state.send_if_modified(|state| {
            if state.flags.contains(CloseFlags::UNREGISTERED) {
                return false;
            }
            state.flags.insert(CloseFlags::UNREGISTERED);
            true
        });

        if first {
            self.hub.request_unregister(Arc::clone(self));
        }
    }

    pub(crate) fn set_flags(&self, flags: CloseFlags) {
        self.state.send_modify(|state| state.flags.insert(flags));
    }

    async fn wait_flags(&self, flags: CloseFlags) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| s.flags.contains(flags)).await;
    }

    /// Resolves once the transport has been released
    pub async fn wait_closed(&self) {
        self.wait_flags(CloseFlags::RELEASED).await;
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Run the registration hook and spawn the reader and writer
    pub(crate) fn start(self: &Arc<Self>) {
        let conf = self.hub.conf();

        if self.flags().contains(CloseFlags::CLOSING) {
            self.set_flags(CloseFlags::READ_CLOSED | CloseFlags::WRITE_CLOSED);
            return;
        }

        let accepted = match &conf.on_register {
            Some(hook) => hook(self),
            None => true,
        };
        if !accepted {
            self.log(LogLevel::Info, LogTag::Client, || {
                format!("client {} refused by register hook", self.id)
            });
            self.hub.metrics().connection_rejected();
            self.stage_close(CloseCode::RegistrationRejected, "regfail");
            self.set_flags(CloseFlags::READ_CLOSED | CloseFlags::WRITE_CLOSED);
            self.unregister();
            return;
        }

        let queue = self.queue_rx.lock().take();
        let sink = self.sink.lock().take();
        let stream = self.stream.lock().take();

        match (queue, sink, stream) {
            (Some(queue), Some(sink), Some(stream)) => {
                tokio::spawn(Arc::clone(self).write_loop(queue, sink));
                tokio::spawn(Arc::clone(self).read_loop(stream));
            }
            (queue, sink, stream) => {
                // Already started; put back whatever was still here
                *self.queue_rx.lock() = queue;
                *self.sink.lock() = sink;
                *self.stream.lock() = stream;
            }
        }
    }

    /// Join point of the connection
    ///
    /// The first caller unregisters, closes the outbound queue, waits for
    /// the writer to stop, then sends the staged close frame and releases
    /// the transport. Every other caller waits for the release.
    pub async fn close(self: &Arc<Self>) {
        let claimed = self.state.send_if_modified(|state| {
            if state.flags.contains(CloseFlags::CLOSING) {
                return false;
            }
            state.flags.insert(CloseFlags::CLOSING);
            true
        });
        if !claimed {
            self.wait_closed().await;
            return;
        }

        let conf = self.hub.conf();
        if let Some(hook) = &conf.on_unregister {
            hook(self);
        }

        self.unregister();
        let queue = self.queue.lock().take();
        drop(queue);

        self.wait_flags(CloseFlags::WRITE_CLOSED | CloseFlags::UNREGISTERED)
            .await;

        let sink = self.sink.lock().take();
        let frame = self.close_frame();
        if let Some(mut sink) = sink {
            if let Some(frame) = frame {
                let _ = timeout(conf.write_wait, sink.send(WireMessage::Close(Some(frame)))).await;
            }
            let _ = timeout(conf.write_wait, sink.close()).await;
        }

        let queue_rx = self.queue_rx.lock().take();
        drop(queue_rx);
        let stream = self.stream.lock().take();
        drop(stream);

        self.set_flags(CloseFlags::RELEASED);
        self.log(LogLevel::Debug, LogTag::Client, || {
            format!("client {} released", self.id)
        });
    }

    async fn write_loop(self: Arc<Self>, mut queue: mpsc::Receiver<Vec<u8>>, mut sink: FrameSink) {
        let write_wait = self.hub.conf().write_wait;

        while let Some(payload) = queue.recv().await {
            match timeout(write_wait, sink.send(WireMessage::from_payload(payload))).await {
                Ok(Ok(())) => self.metrics.frame_sent(),
                Ok(Err(e)) => {
                    self.log(LogLevel::Debug, LogTag::Client, || {
                        format!("client {} write failed: {}", self.id, e)
                    });
                    break;
                }
                Err(_) => {
                    self.log(LogLevel::Debug, LogTag::Client, || {
                        format!("client {} write deadline exceeded", self.id)
                    });
                    break;
                }
            }
        }

        // Pending senders fail from here on
        drop(queue);
        *self.sink.lock() = Some(sink);
        self.set_flags(CloseFlags::WRITE_CLOSED);
        self.unregister();
    }

    async fn read_loop(self: Arc<Self>, mut stream: FrameStream) {
        let conf = Arc::clone(self.hub.conf());

        loop {
            let next = tokio::select! {
                biased;
                _ = self.wait_flags(CloseFlags::RELEASED) => break,
                next = timeout(conf.read_wait, stream.next()) => next,
            };

            let message = match next {
                Ok(Some(Ok(message))) => message,
                Ok(Some(Err(e))) => {
                    self.log(LogLevel::Debug, LogTag::Client, || {
                        format!("client {} read failed: {}", self.id, e)
                    });
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    self.log(LogLevel::Debug, LogTag::Client, || {
                        format!("client {} read deadline exceeded", self.id)
                    });
                    break;
                }
            };

            let frame = match message {
                WireMessage::Close(_) => break,
                WireMessage::Ping(_) | WireMessage::Pong(_) => continue,
                data => match data.into_payload() {
                    Some(frame) => frame,
                    None => continue,
                },
            };

            if frame.len() > conf.max_message_size {
                self.log(LogLevel::Debug, LogTag::Client, || {
                    format!(
                        "client {} sent {} bytes (limit {})",
                        self.id,
                        frame.len(),
                        conf.max_message_size
                    )
                });
                break;
            }
            self.metrics.frame_received();

            if let Some(breaker) = &self.breaker {
                if !breaker.allow() {
                    self.metrics.rate_limited();
                    self.log(LogLevel::Info, LogTag::Breaker, || {
                        format!("client {} tripped the breaker", self.id)
                    });
                    self.stage_close(CloseCode::Busy, "busy");
                    break;
                }
            }

            if let Err(e) = conf.handler.handle(&self, frame).await {
                self.log(LogLevel::Debug, LogTag::Client, || {
                    format!("client {} handler error: {}", self.id, e)
                });
                self.stage_close(CloseCode::HandlerError, e.to_string());
                break;
            }
        }

        drop(stream);
        self.set_flags(CloseFlags::READ_CLOSED);
        self.unregister();
    }

    fn log(&self, level: LogLevel, tag: LogTag, message: impl FnOnce() -> String) {
        let conf = self.hub.conf();
        if conf.logs(tag, level) {
            conf.log(tag, level, &message());
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("flags", &self.flags())
            .field("breaker", &self.breaker)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::handler::{HandlerError, Protocol};
    use crate::ws::options::{HubConf, UpgradeRequest};
    use crate::ws::transport::memory::{self, Peer};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(3);

    async fn connect(hub: &Arc<Hub>) -> (Arc<Client>, Peer) {
        let (sink, stream, peer) = memory::pair();
        let client = hub
            .attach(&UpgradeRequest::default(), sink, stream)
            .await
            .unwrap();
        (client, peer)
    }

    #[tokio::test]
    async fn test_send_with_ack_then_ack() {
        let hub = Hub::with_conf(HubConf::builder().fixed_id(7).build());
        let (client, mut peer) = connect(&hub).await;
        assert_eq!(client.id(), 7);

        let id = client.next_msg_id();
        let (entry, result) = AckEntry::new(id, b"ping".to_vec(), WAIT);
        assert!(client.send_with_ack(entry).await);
        assert_eq!(client.window_len(), 1);

        assert_eq!(
            peer.next_frame(WAIT).await,
            Some(WireMessage::Text("ping".to_string()))
        );

        assert!(client.ack(id));
        assert_eq!(result.await, Ok(true));
        assert_eq!(client.window_len(), 0);
        assert!(!client.ack(id));

        let registered = hub.get_client(7).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&registered, &client));
    }

    #[tokio::test]
    async fn test_send_with_ack_times_out_on_full_queue() {
        let hub = Hub::with_conf(HubConf::builder().client_send_size(1).build());
        let (sink, stream, _peer) = memory::pair();
        // Registered but never started, so nothing drains the queue
        let client = Client::new(1, Arc::clone(&hub), sink, stream);
        assert!(client.try_enqueue(b"first".to_vec()));

        let (entry, result) = AckEntry::new(
            client.next_msg_id(),
            b"second".to_vec(),
            Duration::from_millis(50),
        );
        assert!(!client.send_with_ack(entry).await);
        assert_eq!(result.await, Ok(false));
        assert_eq!(client.window_len(), 0);
    }

    #[tokio::test]
    async fn test_close_rendezvous_and_double_close() {
        let hub = Hub::with_conf(HubConf::default());
        let (client, mut peer) = connect(&hub).await;

        tokio::time::timeout(WAIT, async { tokio::join!(client.close(), client.close()) })
            .await
            .unwrap();

        let flags = client.flags();
        assert!(flags.contains(CloseFlags::WRITE_CLOSED | CloseFlags::UNREGISTERED));
        assert!(flags.contains(CloseFlags::RELEASED));

        // A third call returns at once
        tokio::time::timeout(WAIT, client.close()).await.unwrap();

        assert!(matches!(client.send(b"late".to_vec()).await, Err(ClientError::QueueClosed)));
        assert_eq!(peer.next_frame(WAIT).await, None);
        assert_eq!(hub.online_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_echo() {
        let hub = Hub::with_conf(HubConf::default());
        let (_client, mut peer) = connect(&hub).await;

        peer.send_text("hello");
        assert_eq!(
            peer.next_frame(WAIT).await,
            Some(WireMessage::Text("hello".to_string()))
        );
    }

    #[tokio::test]
    async fn test_breaker_closes_busy() {
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        let hub = Hub::with_conf(
            HubConf::builder()
                .breaker(1, Duration::from_secs(2))
                .handler_fn(move |_client, _frame| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok::<(), HandlerError>(())
                    }
                })
                .build(),
        );
        let (client, mut peer) = connect(&hub).await;

        peer.send_text("one");
        peer.send_text("two");

        let frame = peer.close_frame(WAIT).await.unwrap();
        assert_eq!(frame.code, CloseCode::Busy.code());
        assert_eq!(frame.reason, "busy");
        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert!(client.flags().contains(CloseFlags::READ_CLOSED));
        assert_eq!(client.metrics().snapshot().rate_limited, 1);
    }

    #[tokio::test]
    async fn test_zero_capacity_breaker_admits_every_frame() {
        let hub = Hub::with_conf(HubConf::builder().breaker(0, Duration::from_secs(2)).build());
        let (client, mut peer) = connect(&hub).await;

        for n in 0..5 {
            peer.send_text(&format!("frame-{}", n));
        }
        for n in 0..5 {
            assert_eq!(
                peer.next_frame(WAIT).await,
                Some(WireMessage::Text(format!("frame-{}", n)))
            );
        }
        assert_eq!(client.metrics().snapshot().rate_limited, 0);
        assert!(!client.flags().contains(CloseFlags::READ_CLOSED));
    }

    #[tokio::test]
    async fn test_handler_error_closes_with_reason() {
        let hub = Hub::with_conf(
            HubConf::builder()
                .handler_fn(|_client, _frame| async move { Err::<(), HandlerError>("bad frame".into()) })
                .build(),
        );
        let (_client, mut peer) = connect(&hub).await;

        peer.send_text("anything");
        let frame = peer.close_frame(WAIT).await.unwrap();
        assert_eq!(frame.code, CloseCode::HandlerError.code());
        assert_eq!(frame.reason, "bad frame");
    }

    #[tokio::test]
    async fn test_register_hook_veto() {
        let unregistered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&unregistered);
        let hub = Hub::with_conf(
            HubConf::builder()
                .on_register(|_| false)
                .on_unregister(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .build(),
        );
        let (client, mut peer) = connect(&hub).await;

        let frame = peer.close_frame(WAIT).await.unwrap();
        assert_eq!(frame.code, CloseCode::RegistrationRejected.code());
        assert_eq!(frame.reason, "regfail");

        tokio::time::timeout(WAIT, client.wait_closed()).await.unwrap();
        assert_eq!(unregistered.load(Ordering::SeqCst), 1);
        assert_eq!(hub.online_count().await.unwrap(), 0);
        assert_eq!(hub.metrics().snapshot().rejected_connections, 1);
    }

    #[tokio::test]
    async fn test_read_deadline_releases_client() {
        let hub = Hub::with_conf(
            HubConf::builder()
                .deadlines(Duration::from_millis(100), Duration::from_secs(1))
                .build(),
        );
        let (client, _peer) = connect(&hub).await;

        // Silent peer: nothing arrives before the read deadline
        tokio::time::timeout(WAIT, client.wait_closed()).await.unwrap();
        assert!(client.flags().contains(CloseFlags::READ_CLOSED | CloseFlags::UNREGISTERED));
        assert_eq!(hub.online_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_oversize_frame_ends_reader() {
        let hub = Hub::with_conf(HubConf::builder().buffer_size(4, 1024).build());
        let (client, mut peer) = connect(&hub).await;

        peer.send_text("tiny");
        assert_eq!(
            peer.next_frame(WAIT).await,
            Some(WireMessage::Text("tiny".to_string()))
        );

        peer.send_text("too long");
        tokio::time::timeout(WAIT, client.wait_closed()).await.unwrap();
        assert!(client.flags().contains(CloseFlags::READ_CLOSED));
        assert_eq!(client.metrics().snapshot().frames_received, 1);
        assert_eq!(hub.online_count().await.unwrap(), 0);

        // The oversized frame never reached the handler
        while let Some(frame) = peer.next_frame(Duration::from_millis(100)).await {
            assert_ne!(frame, WireMessage::Text("too long".to_string()));
        }
    }

    #[tokio::test]
    async fn test_send_waits_for_queue_space() {
        let hub = Hub::with_conf(HubConf::builder().client_send_size(1).build());
        let (sink, stream, _peer) = memory::pair();
        let client = Client::new(1, Arc::clone(&hub), sink, stream);
        // Drain by hand instead of starting the writer
        let mut queue = client.queue_rx.lock().take().unwrap();

        client.send(b"first".to_vec()).await.unwrap();

        let producer = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.send(b"second".to_vec()).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!producer.is_finished());

        assert_eq!(queue.recv().await, Some(b"first".to_vec()));
        tokio::time::timeout(WAIT, producer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(queue.recv().await, Some(b"second".to_vec()));
    }

    #[derive(Default)]
    struct Counting {
        registered: AtomicUsize,
        unregistered: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Protocol for Counting {
        fn on_register(&self, _client: &Arc<Client>) -> bool {
            self.registered.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn on_unregister(&self, _client: &Arc<Client>) {
            self.unregistered.fetch_add(1, Ordering::SeqCst);
        }

        async fn handle(&self, client: &Arc<Client>, frame: Vec<u8>) -> Result<(), HandlerError> {
            let mut reply = b"seen:".to_vec();
            reply.extend(frame);
            client.send(reply).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_protocol_hooks_and_handler() {
        let protocol = Arc::new(Counting::default());
        let hub = Hub::with_conf(HubConf::builder().protocol(protocol.clone()).build());
        let (client, mut peer) = connect(&hub).await;
        assert_eq!(protocol.registered.load(Ordering::SeqCst), 1);

        peer.send_text("x");
        assert_eq!(
            peer.next_frame(WAIT).await,
            Some(WireMessage::Text("seen:x".to_string()))
        );

        client.close().await;
        assert_eq!(protocol.unregistered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_staged_close_frame_wins() {
        let hub = Hub::with_conf(HubConf::default());
        let (sink, stream, _peer) = memory::pair();
        let client = Client::new(1, hub, sink, stream);

        client.stage_close(CloseCode::Busy, "busy");
        client.stage_close(CloseCode::HandlerError, "later");
        assert_eq!(
            client.close_frame(),
            Some(CloseFrame {
                code: 4002,
                reason: "busy".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_writer_failure_releases_client() {
        let hub = Hub::with_conf(HubConf::default());
        let (client, peer) = connect(&hub).await;
        drop(peer.outbound);

        client.send(b"lost".to_vec()).await.unwrap();
        tokio::time::timeout(WAIT, client.wait_closed()).await.unwrap();
        assert!(client.flags().contains(CloseFlags::WRITE_CLOSED));
        assert_eq!(hub.online_count().await.unwrap(), 0);
    }

    #[test]
    fn test_close_flags() {
        let flags = CloseFlags::READ_CLOSED | CloseFlags::UNREGISTERED;
        assert!(flags.contains(CloseFlags::READ_CLOSED));
        assert!(!flags.contains(CloseFlags::WRITE_CLOSED | CloseFlags::UNREGISTERED));
        assert_eq!(flags.bits(), 0x05);
        assert_eq!(CloseFlags::empty().bits(), 0);
    }
}

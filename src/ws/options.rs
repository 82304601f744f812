/// Hub configuration
///
/// A `HubConf` is produced by applying `HubOption` values in order: the
/// built-in `default_options()` first, then the caller's options. Every
/// option sets its own fields and nothing else, so a later option for the
/// same field wins. The configuration is read-only once the hub starts.
use axum::http::{HeaderMap, Uri};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::client::{Client, ClientId};
use super::handler::{EchoHandler, FnHandler, Handler, HandlerError, Protocol, ProtocolHandler};
use crate::config::HubSettings;
use crate::logger::{self, LogLevel, LogTag, SharedLogger};

/// The parts of the upgrade request that policies may inspect
#[derive(Debug, Clone, Default)]
pub struct UpgradeRequest {
    pub headers: HeaderMap,
    pub uri: Uri,
}

impl UpgradeRequest {
    pub fn new(headers: HeaderMap, uri: Uri) -> Self {
        Self { headers, uri }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub type AuthFn = Arc<dyn Fn(&UpgradeRequest) -> bool + Send + Sync>;
pub type IdentityFn = Arc<dyn Fn(&UpgradeRequest) -> ClientId + Send + Sync>;
/// Returns `true` to accept the client and `false` to refuse it with a
/// `regfail` close.
///
/// Note the polarity: a `closed`-style hook that returns `true` to veto must
/// be negated when installed here.
pub type RegisterHook = Arc<dyn Fn(&Arc<Client>) -> bool + Send + Sync>;
pub type UnregisterHook = Arc<dyn Fn(&Arc<Client>) + Send + Sync>;

#[derive(Clone)]
pub enum HubOption {
    /// Largest inbound message (`read`) and transport write buffer (`write`)
    BufferSize { read: usize, write: usize },
    SkipAuth,
    /// Require an `X-Auth: pass` header
    HeaderAuth,
    CustomAuth(AuthFn),
    FixedId(ClientId),
    AutoIncrementId,
    CustomId(IdentityFn),
    ClientSendSize(usize),
    Echo,
    Handler(Arc<dyn Handler>),
    /// Handler plus both registration hooks
    Protocol(Arc<dyn Protocol>),
    /// Token bucket for inbound frames.
    ///
    /// Capacity 0 (or a zero period) disables the breaker entirely, so every
    /// frame is admitted. A zero-burst limiter that refuses every frame is not
    /// expressible here; refuse clients through the register hook instead.
    Breaker { capacity: u32, period: Duration },
    OnRegister(RegisterHook),
    OnUnregister(UnregisterHook),
    Logger(SharedLogger),
    Deadlines { read: Duration, write: Duration },
}

impl HubOption {
    fn apply(self, conf: &mut HubConf) {
        match self {
            HubOption::BufferSize { read, write } => {
                conf.max_message_size = read;
                conf.write_buffer_size = write;
            }
            HubOption::SkipAuth => conf.auth = Arc::new(|_: &UpgradeRequest| true),
            HubOption::HeaderAuth => conf.auth = Arc::new(header_auth),
            HubOption::CustomAuth(auth) => conf.auth = auth,
            HubOption::FixedId(id) => conf.assign_id = Arc::new(move |_: &UpgradeRequest| id),
            HubOption::AutoIncrementId => {
                let assigned = Arc::new(AtomicU64::new(0));
                conf.assign_id = Arc::new(move |_: &UpgradeRequest| {
                    assigned.fetch_add(1, Ordering::SeqCst) + 1
                });
            }
            HubOption::CustomId(assign) => conf.assign_id = assign,
            HubOption::ClientSendSize(size) => conf.client_send_size = size,
            HubOption::Echo => conf.handler = Arc::new(EchoHandler),
            HubOption::Handler(handler) => conf.handler = handler,
            HubOption::Protocol(protocol) => {
                let on_register = Arc::clone(&protocol);
                let on_unregister = Arc::clone(&protocol);
                conf.on_register = Some(Arc::new(move |client: &Arc<Client>| {
                    on_register.on_register(client)
                }));
                conf.on_unregister = Some(Arc::new(move |client: &Arc<Client>| {
                    on_unregister.on_unregister(client)
                }));
                conf.handler = Arc::new(ProtocolHandler(protocol));
            }
            HubOption::Breaker { capacity, period } => {
                conf.breaker_capacity = capacity;
                conf.breaker_period = period;
            }
            HubOption::OnRegister(hook) => conf.on_register = Some(hook),
            HubOption::OnUnregister(hook) => conf.on_unregister = Some(hook),
            HubOption::Logger(logger) => conf.logger = logger,
            HubOption::Deadlines { read, write } => {
                conf.read_wait = read;
                conf.write_wait = write;
            }
        }
    }
}

impl std::fmt::Debug for HubOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubOption::BufferSize { read, write } => {
                write!(f, "BufferSize {{ read: {}, write: {} }}", read, write)
            }
            HubOption::SkipAuth => write!(f, "SkipAuth"),
            HubOption::HeaderAuth => write!(f, "HeaderAuth"),
            HubOption::CustomAuth(_) => write!(f, "CustomAuth(..)"),
            HubOption::FixedId(id) => write!(f, "FixedId({})", id),
            HubOption::AutoIncrementId => write!(f, "AutoIncrementId"),
            HubOption::CustomId(_) => write!(f, "CustomId(..)"),
            HubOption::ClientSendSize(size) => write!(f, "ClientSendSize({})", size),
            HubOption::Echo => write!(f, "Echo"),
            HubOption::Handler(_) => write!(f, "Handler(..)"),
            HubOption::Protocol(_) => write!(f, "Protocol(..)"),
            HubOption::Breaker { capacity, period } => {
                write!(f, "Breaker {{ capacity: {}, period: {:?} }}", capacity, period)
            }
            HubOption::OnRegister(_) => write!(f, "OnRegister(..)"),
            HubOption::OnUnregister(_) => write!(f, "OnUnregister(..)"),
            HubOption::Logger(_) => write!(f, "Logger(..)"),
            HubOption::Deadlines { read, write } => {
                write!(f, "Deadlines {{ read: {:?}, write: {:?} }}", read, write)
            }
        }
    }
}

fn header_auth(request: &UpgradeRequest) -> bool {
    request
        .header("x-auth")
        .map(|v| v.trim().eq_ignore_ascii_case("pass"))
        .unwrap_or(false)
}

/// Built-in defaults, applied before any caller option
pub fn default_options() -> Vec<HubOption> {
    vec![
        HubOption::BufferSize {
            read: 1024,
            write: 1024,
        },
        HubOption::SkipAuth,
        HubOption::AutoIncrementId,
        HubOption::ClientSendSize(20),
        HubOption::Echo,
        HubOption::Breaker {
            capacity: 3,
            period: Duration::from_secs(2),
        },
        HubOption::Logger(logger::console()),
        HubOption::Deadlines {
            read: Duration::from_secs(1200),
            write: Duration::from_secs(10),
        },
    ]
}

pub struct HubConf {
    pub max_message_size: usize,
    pub write_buffer_size: usize,
    pub auth: AuthFn,
    pub assign_id: IdentityFn,
    pub client_send_size: usize,
    pub handler: Arc<dyn Handler>,
    pub breaker_capacity: u32,
    pub breaker_period: Duration,
    pub on_register: Option<RegisterHook>,
    pub on_unregister: Option<UnregisterHook>,
    pub logger: SharedLogger,
    pub read_wait: Duration,
    pub write_wait: Duration,
}

impl HubConf {
    /// Defaults, then `options` in order
    pub fn build(options: impl IntoIterator<Item = HubOption>) -> Self {
        // Every field is overwritten by default_options()
        let mut conf = Self {
            max_message_size: 0,
            write_buffer_size: 0,
            auth: Arc::new(|_: &UpgradeRequest| false),
            assign_id: Arc::new(|_: &UpgradeRequest| 0),
            client_send_size: 1,
            handler: Arc::new(EchoHandler),
            breaker_capacity: 0,
            breaker_period: Duration::ZERO,
            on_register: None,
            on_unregister: None,
            logger: logger::console(),
            read_wait: Duration::ZERO,
            write_wait: Duration::ZERO,
        };

        for option in default_options().into_iter().chain(options) {
            option.apply(&mut conf);
        }

        // A bounded queue needs at least one slot
        conf.client_send_size = conf.client_send_size.max(1);
        conf
    }

    pub fn builder() -> HubConfBuilder {
        HubConfBuilder::default()
    }

    pub(crate) fn log(&self, tag: LogTag, level: LogLevel, message: &str) {
        self.logger.log(tag, level, message);
    }

    /// Lets callers skip formatting debug lines nobody will see
    pub(crate) fn logs(&self, tag: LogTag, level: LogLevel) -> bool {
        self.logger.enabled(tag, level)
    }
}

impl Default for HubConf {
    fn default() -> Self {
        Self::build(Vec::new())
    }
}

impl std::fmt::Debug for HubConf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConf")
            .field("max_message_size", &self.max_message_size)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("client_send_size", &self.client_send_size)
            .field("breaker_capacity", &self.breaker_capacity)
            .field("breaker_period", &self.breaker_period)
            .field("on_register", &self.on_register.is_some())
            .field("on_unregister", &self.on_unregister.is_some())
            .field("read_wait", &self.read_wait)
            .field("write_wait", &self.write_wait)
            .finish()
    }
}

/// Chained form of a caller option list
#[derive(Debug, Default)]
pub struct HubConfBuilder {
    options: Vec<HubOption>,
}

impl HubConfBuilder {
    pub fn option(mut self, option: HubOption) -> Self {
        self.options.push(option);
        self
    }

    /// Every field of a config-file block
    pub fn settings(mut self, settings: &HubSettings) -> Self {
        self.options.extend(settings.to_options());
        self
    }

    pub fn buffer_size(self, read: usize, write: usize) -> Self {
        self.option(HubOption::BufferSize { read, write })
    }

    pub fn skip_auth(self) -> Self {
        self.option(HubOption::SkipAuth)
    }

    pub fn header_auth(self) -> Self {
        self.option(HubOption::HeaderAuth)
    }

    pub fn auth<F>(self, auth: F) -> Self
    where
        F: Fn(&UpgradeRequest) -> bool + Send + Sync + 'static,
    {
        self.option(HubOption::CustomAuth(Arc::new(auth)))
    }

    pub fn fixed_id(self, id: ClientId) -> Self {
        self.option(HubOption::FixedId(id))
    }

    pub fn auto_increment_id(self) -> Self {
        self.option(HubOption::AutoIncrementId)
    }

    pub fn identity<F>(self, assign: F) -> Self
    where
        F: Fn(&UpgradeRequest) -> ClientId + Send + Sync + 'static,
    {
        self.option(HubOption::CustomId(Arc::new(assign)))
    }

    pub fn client_send_size(self, size: usize) -> Self {
        self.option(HubOption::ClientSendSize(size))
    }

    pub fn echo(self) -> Self {
        self.option(HubOption::Echo)
    }

    pub fn handler(self, handler: Arc<dyn Handler>) -> Self {
        self.option(HubOption::Handler(handler))
    }

    pub fn handler_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Arc<Client>, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.option(HubOption::Handler(Arc::new(FnHandler(f))))
    }

    pub fn protocol(self, protocol: Arc<dyn Protocol>) -> Self {
        self.option(HubOption::Protocol(protocol))
    }

    pub fn breaker(self, capacity: u32, period: Duration) -> Self {
        self.option(HubOption::Breaker { capacity, period })
    }

    pub fn on_register<F>(self, hook: F) -> Self
    where
        F: Fn(&Arc<Client>) -> bool + Send + Sync + 'static,
    {
        self.option(HubOption::OnRegister(Arc::new(hook)))
    }

    pub fn on_unregister<F>(self, hook: F) -> Self
    where
        F: Fn(&Arc<Client>) + Send + Sync + 'static,
    {
        self.option(HubOption::OnUnregister(Arc::new(hook)))
    }

    pub fn logger(self, logger: SharedLogger) -> Self {
        self.option(HubOption::Logger(logger))
    }

    pub fn deadlines(self, read: Duration, write: Duration) -> Self {
        self.option(HubOption::Deadlines { read, write })
    }

    pub fn into_options(self) -> Vec<HubOption> {
        self.options
    }

    pub fn build(self) -> HubConf {
        HubConf::build(self.options)
    }
}

/// Log tags identify which subsystem produced a line.
///
/// Each tag maps to a `--debug-<key>` command-line flag.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Hub,
    Client,
    Ack,
    Breaker,
    Dispatch,
    Webserver,
}

impl LogTag {
    /// All tags, used when scanning arguments for debug flags
    pub const ALL: [LogTag; 7] = [
        LogTag::System,
        LogTag::Hub,
        LogTag::Client,
        LogTag::Ack,
        LogTag::Breaker,
        LogTag::Dispatch,
        LogTag::Webserver,
    ];

    /// Key used in `--debug-<key>` / `--verbose-<key>` flags
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::System => "system",
            LogTag::Hub => "hub",
            LogTag::Client => "client",
            LogTag::Ack => "ack",
            LogTag::Breaker => "breaker",
            LogTag::Dispatch => "dispatch",
            LogTag::Webserver => "webserver",
        }
        .to_string()
    }

    /// Uppercase label without colors (file output, tests)
    pub fn to_plain_string(&self) -> String {
        self.to_debug_key().to_uppercase()
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}

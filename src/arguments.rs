/// Centralized argument handling
///
/// Command-line arguments are captured once into a global and queried with
/// small helpers, so the logger and the binary read the same view.
///
/// Features:
/// - Centralized CMD_ARGS storage with thread-safe access
/// - Flag and value lookup helpers
/// - Bind and config overrides for the binary
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::env;

/// Global command-line arguments storage
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Sets the global command-line arguments
/// Used by tests to override the default env::args() collection
pub fn set_cmd_args(args: Vec<String>) {
    *CMD_ARGS.lock() = args;
}

/// Gets a copy of the current command-line arguments
pub fn get_cmd_args() -> Vec<String> {
    CMD_ARGS.lock().clone()
}

/// Checks if a specific argument is present in the command line
pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

/// Gets the value of a command-line argument that follows a flag
/// Returns None if the flag is not found or has no value
pub fn get_arg_value(flag: &str) -> Option<String> {
    let args = get_cmd_args();
    for (i, arg) in args.iter().enumerate() {
        if arg == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

/// Help requested
pub fn is_help_requested() -> bool {
    has_arg("--help") || has_arg("-h")
}

/// Config file path override (`--config <path>`)
pub fn config_path() -> Option<String> {
    get_arg_value("--config")
}

/// Bind host override (`--host <addr>`)
pub fn host_override() -> Option<String> {
    get_arg_value("--host")
}

/// Bind port override (`--port <n>`)
pub fn port_override() -> Option<u16> {
    get_arg_value("--port").and_then(|v| v.parse().ok())
}

/// Write the effective configuration to the config path and exit
pub fn is_write_config_requested() -> bool {
    has_arg("--write-config")
}

pub fn print_help() {
    println!("wshub - persistent WebSocket connection hub");
    println!();
    println!("USAGE:");
    println!("    wshub [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --config <path>       TOML configuration file (default: {})", crate::config::CONFIG_FILE_PATH);
    println!("    --host <addr>         Bind address override");
    println!("    --port <port>         Bind port override");
    println!("    --write-config        Save the effective configuration to the config path and exit");
    println!("    --log-level <level>   error | warning | info | debug | verbose");
    println!("    --quiet               Only log errors");
    println!("    --verbose             Log everything");
    println!("    --debug-<tag>         Debug logs for one subsystem (hub, client, ack, breaker, dispatch, webserver, system)");
    println!("    --debug-all           Debug logs for every subsystem");
    println!("    -h, --help            Print this help");
}

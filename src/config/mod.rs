/// Configuration system
///
/// - `macros`: `config_struct!` for structs with embedded defaults
/// - `schemas`: server, hub and logging configuration blocks
/// - `utils`: TOML loading/saving and the global instance
pub mod macros;
pub mod schemas;
pub mod utils;

pub use schemas::{AuthMode, Config, HubSettings, LoggingConfig, ServerConfig};
pub use utils::{load_config_from_path, with_config, CONFIG, CONFIG_FILE_PATH};

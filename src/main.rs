use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;

use wshub::{
    arguments,
    config::{self, Config, CONFIG_FILE_PATH},
    dispatch::{self, ActionMux},
    logger::{self, LogTag},
    webserver,
    ws::{Hub, HubConf},
};

/// Action code of the addition example
const ACTION_SUM: dispatch::ActionCode = 1;

#[derive(Deserialize)]
struct SumParams {
    #[serde(rename = "X")]
    x: i64,
    #[serde(rename = "Y")]
    y: i64,
}

/// Main entry point for wshub
///
/// Loads the config file, starts the hub with an action multiplexer and
/// serves WebSocket clients until Ctrl+C.
#[tokio::main]
async fn main() {
    logger::init();

    if arguments::is_help_requested() {
        arguments::print_help();
        std::process::exit(0);
    }

    let result = run().await;
    if let Err(e) = &result {
        logger::error(LogTag::System, &format!("{:#}", e));
    }
    logger::flush();

    if result.is_err() {
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    logger::info(LogTag::System, "wshub starting up...");

    let path = arguments::config_path().unwrap_or_else(|| CONFIG_FILE_PATH.to_string());
    config::load_config_from_path(&path)
        .with_context(|| format!("failed to load configuration from {}", path))?;

    let mut effective = config::with_config(|cfg| cfg.clone());
    if let Some(host) = arguments::host_override() {
        effective.server.host = host;
    }
    if let Some(port) = arguments::port_override() {
        effective.server.port = port;
    }

    if arguments::is_write_config_requested() {
        effective
            .save(&path)
            .with_context(|| format!("failed to write configuration to {}", path))?;
        logger::info(LogTag::System, &format!("Configuration written to {}", path));
        return Ok(());
    }

    if let Some(file) = effective.logging.file_config() {
        let target = file.path.display().to_string();
        logger::init_file_logging(file)
            .with_context(|| format!("failed to open log file {}", target))?;
        logger::debug(LogTag::System, &format!("Logging to {}", target));
    }

    let Config { server, hub: settings, .. } = effective;

    let hub = Hub::with_conf(
        HubConf::builder()
            .settings(&settings)
            .handler(Arc::new(build_mux()))
            .build(),
    );

    ctrlc::set_handler(|| {
        logger::info(LogTag::System, "Received Ctrl+C, shutting down...");
        webserver::shutdown();
    })
    .context("failed to install Ctrl+C handler")?;

    let served = webserver::start_server(Arc::clone(&hub), &server).await;

    hub.shutdown().await;
    served.map_err(anyhow::Error::msg)?;

    logger::info(LogTag::System, "wshub stopped");
    Ok(())
}

/// Echo plus the `{"Code":1,"Params":"{\"X\":1,\"Y\":2}"}` addition example
fn build_mux() -> ActionMux {
    let mux = ActionMux::new();
    let codec = Arc::clone(mux.codec());

    mux.handle_func(ACTION_SUM, move |client, mut message| {
        let codec = Arc::clone(&codec);
        async move {
            let params: SumParams = message.params(codec.as_ref())?;
            message.params = (params.x + params.y).to_string();
            dispatch::send(codec.as_ref(), &client, &message).await
        }
    });

    mux
}

/// Axum webserver implementation
///
/// Server lifecycle: bind, serve until the shutdown notify fires, then give
/// in-flight connections `shutdown_timeout` to finish before aborting.
use axum::Router;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Notify};
use tokio::time::timeout;

use crate::{
    config::ServerConfig,
    logger::{self, LogTag},
    webserver::routes,
    ws::Hub,
};

/// Global shutdown notifier
static SHUTDOWN_NOTIFY: Lazy<Arc<Notify>> = Lazy::new(|| Arc::new(Notify::new()));

/// Start the webserver
///
/// This function blocks until the server is shut down
pub async fn start_server(hub: Arc<Hub>, config: &ServerConfig) -> Result<(), String> {
    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .map_err(|e| format!("Invalid bind address: {}", e))?;

    let listener = TcpListener::bind(&addr).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::AddrInUse => {
            format!(
                "Failed to bind to {}: Address already in use\n\
                 \n\
                 Another wshub instance (or another service) owns this port.\n\
                 Pick another one with --port or in the config file.",
                addr
            )
        }
        std::io::ErrorKind::PermissionDenied => {
            format!(
                "Failed to bind to {}: Permission denied\n\
                 \n\
                 Port {} requires elevated privileges on this system.\n\
                 Consider using a port above 1024 or running with appropriate permissions.",
                addr, config.port
            )
        }
        _ => format!("Failed to bind to {}: {}", addr, e),
    })?;

    logger::info(
        LogTag::Webserver,
        &format!("Listening on ws://{}{}", addr, config.path),
    );

    let app = routes::create_router(hub, &config.path);
    serve(
        listener,
        app,
        Arc::clone(&SHUTDOWN_NOTIFY),
        config.shutdown_timeout(),
    )
    .await
}

/// Trigger webserver shutdown
pub fn shutdown() {
    logger::debug(LogTag::Webserver, "Triggering webserver shutdown...");
    SHUTDOWN_NOTIFY.notify_one();
}

pub(crate) async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: Arc<Notify>,
    shutdown_timeout: Duration,
) -> Result<(), String> {
    let (stopping_tx, stopping_rx) = oneshot::channel::<()>();

    let shutdown_signal = async move {
        shutdown.notified().await;
        logger::debug(
            LogTag::Webserver,
            "Received shutdown signal, stopping webserver...",
        );
        let _ = stopping_tx.send(());
    };

    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
    });

    // Either the server dies on its own or shutdown starts
    tokio::select! {
        joined = &mut server => return finish(joined),
        _ = stopping_rx => {}
    }

    match timeout(shutdown_timeout, &mut server).await {
        Ok(joined) => finish(joined),
        Err(_) => {
            logger::warning(
                LogTag::Webserver,
                &format!(
                    "Connections still open after {:?}, aborting server task",
                    shutdown_timeout
                ),
            );
            server.abort();
            Ok(())
        }
    }
}

fn finish(joined: Result<std::io::Result<()>, tokio::task::JoinError>) -> Result<(), String> {
    match joined {
        Ok(Ok(())) => {
            logger::debug(LogTag::Webserver, "Webserver stopped gracefully");
            Ok(())
        }
        Ok(Err(e)) => Err(format!("Server error: {}", e)),
        Err(e) => Err(format!("Server task failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::HubConf;
    use futures::{SinkExt, StreamExt};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
    use tokio_tungstenite::tungstenite::{client::IntoClientRequest, Message};

    const WAIT: Duration = Duration::from_secs(5);

    type ServerTask = tokio::task::JoinHandle<Result<(), String>>;

    async fn spawn_server(hub: Arc<Hub>) -> (SocketAddr, Arc<Notify>, ServerTask) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let app = routes::create_router(hub, "/ws");
        let task = tokio::spawn(serve(listener, app, Arc::clone(&notify), Duration::from_secs(1)));
        (addr, notify, task)
    }

    #[tokio::test]
    async fn test_echo_over_socket_and_shutdown() {
        let hub = Hub::with_conf(HubConf::default());
        let (addr, notify, task) = spawn_server(Arc::clone(&hub)).await;

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();
        socket.send(Message::Text("hello".to_string())).await.unwrap();

        let reply = timeout(WAIT, socket.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(reply, Message::Text("hello".to_string()));
        assert_eq!(hub.online_count().await.unwrap(), 1);

        notify.notify_one();
        hub.shutdown().await;
        assert!(timeout(WAIT, task).await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_unauthenticated_socket_is_closed() {
        let hub = Hub::with_conf(HubConf::builder().header_auth().build());
        let (addr, notify, _task) = spawn_server(Arc::clone(&hub)).await;

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();
        match timeout(WAIT, socket.next()).await.unwrap() {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(frame.code, WsCloseCode::from(4000));
                assert_eq!(frame.reason, "authenticate required!");
            }
            other => panic!("expected close frame, got {:?}", other),
        }

        let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
        request
            .headers_mut()
            .insert("X-Auth", "pass".parse().unwrap());
        let (mut socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();
        socket.send(Message::Text("ok".to_string())).await.unwrap();
        let reply = timeout(WAIT, socket.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(reply, Message::Text("ok".to_string()));

        notify.notify_one();
    }

    #[tokio::test]
    async fn test_health_route() {
        let hub = Hub::with_conf(HubConf::default());
        let (addr, notify, _task) = spawn_server(hub).await;

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        timeout(WAIT, stream.read_to_string(&mut response))
            .await
            .unwrap()
            .unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"status\":\"ok\""));
        notify.notify_one();
    }
}

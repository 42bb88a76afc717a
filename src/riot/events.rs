//! Push notifications from the Riot Client websocket.
//!
//! The payloads are never inspected: any inbound frame only means that
//! presence data changed and is worth fetching again.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};

use super::error::RiotError;
use super::lockfile::Credential;
use crate::trigger::{Trigger, TriggerSender};

/// WAMP subscribe frame for chat presence updates
const SUBSCRIBE_FRAME: &str = r#"[5, "OnJsonApiEvent_chat_v4_presences"]"#;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Connection {
    generation: u64,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns at most one websocket to the local client at a time.
///
/// Connections are opened on demand by the resolve cycle and never retried
/// on their own; when one drops, the next cycle opens a new one.
pub struct ChangeNotifier {
    enabled: bool,
    connect_timeout: Duration,
    tx: TriggerSender,
    connection: Option<Connection>,
    generation: u64,
}

impl ChangeNotifier {
    pub fn new(enabled: bool, connect_timeout: Duration, tx: TriggerSender) -> Self {
        Self {
            enabled,
            connect_timeout,
            tx,
            connection: None,
            generation: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|conn| !conn.task.is_finished())
    }

    pub async fn ensure_connected(&mut self, credential: &Credential) -> Result<(), RiotError> {
        if !self.enabled || self.is_connected() {
            return Ok(());
        }
        self.connection = None;

        let socket = tokio::time::timeout(self.connect_timeout, connect(credential))
            .await
            .map_err(|_| {
                RiotError::ConnectionUnavailable("websocket connect timed out".to_string())
            })??;

        self.attach(socket);
        tracing::info!("Subscribed to Riot Client presence events");
        Ok(())
    }

    /// Start reading `socket` and return its generation
    fn attach(&mut self, socket: Socket) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_connection(
            socket,
            generation,
            self.tx.clone(),
            shutdown_rx,
        ));

        self.connection = Some(Connection {
            generation,
            shutdown: shutdown_tx,
            task,
        });
        generation
    }

    /// Forget the connection if it is the one that just closed
    pub fn handle_closed(&mut self, generation: u64) {
        if self
            .connection
            .as_ref()
            .is_some_and(|conn| conn.generation == generation)
        {
            tracing::debug!("Dropping closed websocket handle {}", generation);
            self.connection = None;
        }
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            tracing::debug!("Closing websocket {}", conn.generation);
            let _ = conn.shutdown.send(());
        }
    }

    /// Like [`disconnect`](Self::disconnect), but waits up to `grace` for the
    /// close frame to be sent.
    pub async fn close(&mut self, grace: Duration) {
        let Some(conn) = self.connection.take() else {
            return;
        };

        tracing::debug!("Closing websocket {}", conn.generation);
        let _ = conn.shutdown.send(());
        if tokio::time::timeout(grace, conn.task).await.is_err() {
            tracing::warn!("Websocket {} did not close in time", conn.generation);
        }
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn connect(credential: &Credential) -> Result<Socket, RiotError> {
    let mut request = credential.socket_url().into_client_request()?;
    let auth = HeaderValue::from_str(&credential.basic_auth())
        .map_err(|e| RiotError::MalformedCredential(e.to_string()))?;
    request.headers_mut().insert(AUTHORIZATION, auth);

    // Self-signed certificate on loopback
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| RiotError::ConnectionUnavailable(e.to_string()))?;

    let (mut socket, _response) = tokio_tungstenite::connect_async_tls_with_config(
        request,
        None,
        false,
        Some(Connector::NativeTls(tls)),
    )
    .await?;

    subscribe(&mut socket).await?;
    Ok(socket)
}

async fn subscribe(socket: &mut Socket) -> Result<(), RiotError> {
    socket
        .send(Message::Text(SUBSCRIBE_FRAME.to_string()))
        .await?;
    Ok(())
}

async fn run_connection(
    mut socket: Socket,
    generation: u64,
    tx: TriggerSender,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = socket.close(None).await;
                return;
            }
            next = socket.next() => {
                match next {
                    Some(Ok(Message::Text(_))) | Some(Ok(Message::Binary(_))) => {
                        if tx.send(Trigger::ChangeNotification).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("Websocket read error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    tracing::info!("Riot Client websocket closed");
    let _ = tx.send(Trigger::NotifierClosed(generation));
}

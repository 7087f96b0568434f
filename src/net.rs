use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::accept_async;
use tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SimError, SimResult};
use crate::state::SharedRaceState;
use crate::vehicle::DriverInput;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Input(DriverInput),
    Ping,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome { session_id: String, seat: Option<usize> },
    Pong,
}

impl ClientMessage {
    pub fn from_json(txt: &str) -> Option<Self> {
        serde_json::from_str(txt).ok()
    }
}

fn encode(message: &ServerMessage) -> Option<String> {
    serde_json::to_string(message).ok()
}

pub async fn start_websocket_server(addr: String, state: Arc<Mutex<SharedRaceState>>) -> SimResult<()> {
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| SimError::Bind { addr: addr.clone(), source })?;

    info!(%addr, "websocket listening");

    loop {
        let (raw, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(%err, "accept failed");
                continue;
            }
        };
        tokio::spawn(handle_client(raw, peer, Arc::clone(&state)));
    }
}

async fn handle_client(raw: TcpStream, peer: SocketAddr, state: Arc<Mutex<SharedRaceState>>) {
    let ws = match accept_async(raw).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!(%peer, %err, "websocket handshake failed");
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    // -------------------------------
    // 1) outgoing channel + send loop
    // -------------------------------
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // -------------------------------
    // 2) session + human seat
    // -------------------------------
    let session = Uuid::new_v4();
    let seat = {
        let mut game = state.lock().await;
        game.register_client(session, tx.clone());
        game.claim_seat(session)
    };
    info!(%peer, %session, ?seat, "client connected");

    if let Some(welcome) = encode(&ServerMessage::Welcome { session_id: session.to_string(), seat }) {
        let _ = tx.send(welcome);
    }

    // -------------------------------
    // 3) receive loop
    // -------------------------------
    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(_) => break,
        };
        if msg.is_close() {
            break;
        }
        let Ok(text) = msg.to_text() else {
            continue;
        };

        match ClientMessage::from_json(text) {
            Some(ClientMessage::Ping) => {
                if let Some(pong) = encode(&ServerMessage::Pong) {
                    let _ = tx.send(pong);
                }
            }
            Some(ClientMessage::Input(input)) => {
                let mut game = state.lock().await;
                if !game.update_input(&session, input) {
                    debug!(%session, "input from spectator ignored");
                }
            }
            None => debug!(%session, "unrecognised message"),
        }
    }

    info!(%peer, %session, "client disconnected");
    state.lock().await.remove_client(&session);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_input_with_missing_fields() {
        let msg = ClientMessage::from_json(r#"{"type":"input","throttle":1.0,"steer":-0.5}"#);
        assert_eq!(msg, Some(ClientMessage::Input(DriverInput { throttle: 1.0, brake: 0.0, steer: -0.5 })));
    }

    #[test]
    fn parses_ping_and_rejects_garbage() {
        assert_eq!(ClientMessage::from_json(r#"{"type":"ping"}"#), Some(ClientMessage::Ping));
        assert_eq!(ClientMessage::from_json(r#"{"type":"fly"}"#), None);
        assert_eq!(ClientMessage::from_json("not json"), None);
    }

    #[test]
    fn server_messages_are_tagged() {
        let welcome = encode(&ServerMessage::Welcome { session_id: "abc".into(), seat: Some(0) });
        assert_eq!(welcome.as_deref(), Some(r#"{"type":"welcome","session_id":"abc","seat":0}"#));
        assert_eq!(encode(&ServerMessage::Pong).as_deref(), Some(r#"{"type":"pong"}"#));
    }
}

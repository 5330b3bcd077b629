// src/facade/ws.rs
//
// WebSocket transport for the thin façade: warp plus a
// tokio::sync::broadcast fan-out per connected client.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::sync::broadcast;
use warp::Filter;

use crate::event_bridge::CommandSender;
use crate::types::EngineEvent;

use super::wire::IncomingMessage;

/// Serves the façade's WebSocket endpoint at `/` until the process exits.
///
/// `command_tx` feeds parsed client commands into the engine thread;
/// `engine_events` is the broadcast receiver fed by the engine's
/// [`crate::event_bridge::EngineBridge`] — every connected client gets its
/// own subscription fanned out from here.
pub async fn serve(
    addr: impl Into<std::net::SocketAddr>,
    command_tx: CommandSender,
    mut engine_events: broadcast::Receiver<EngineEvent>,
) {
    let (client_tx, _) = broadcast::channel::<EngineEvent>(32);
    let client_tx = Arc::new(client_tx);

    let fan_out_tx = client_tx.clone();
    tokio::spawn(async move {
        loop {
            match engine_events.recv().await {
                Ok(event) => {
                    let _ = fan_out_tx.send(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("façade event fan-out lagged, dropped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let route = warp::path::end().and(warp::ws()).map(move |ws: warp::ws::Ws| {
        let command_tx = command_tx.clone();
        let client_tx = client_tx.clone();
        ws.on_upgrade(move |socket| handle_connection(socket, command_tx, client_tx))
    });

    warp::serve(route.with(warp::cors().allow_any_origin()))
        .run(addr.into())
        .await;
}

async fn handle_connection(
    socket: warp::ws::WebSocket,
    command_tx: CommandSender,
    client_tx: Arc<broadcast::Sender<EngineEvent>>,
) {
    let (mut client_ws_tx, mut client_ws_rx) = socket.split();
    let mut events = client_tx.subscribe();

    let forward = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let json = serde_json::to_string(&event).expect("EngineEvent always serializes");
            if client_ws_tx.send(warp::ws::Message::text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = client_ws_rx.next().await {
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_str() else { continue };
        match serde_json::from_str::<IncomingMessage>(text) {
            Ok(incoming) => {
                let _ = command_tx.send(incoming.into());
            }
            Err(e) => debug!("dropping unparseable façade message: {e}"),
        }
    }

    forward.abort();
}

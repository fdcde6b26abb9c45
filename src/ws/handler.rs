//! WebSocket upgrade handler - the connection gateway
//!
//! One connection per player, bound to exactly one match for its lifetime.
//! Inbound frames are decoded once and forwarded as commands; outbound
//! broadcasts are filtered per recipient by the writer task.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::r#match::MatchHandle;
use crate::game::{MatchCommand, Outbound, PlayerCommand};
use crate::http::middleware::resolve_identity;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Match to bind this connection to
    pub id: Uuid,
    /// Access token; absent or invalid means an ephemeral guest
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let Some(handle) = state.match_registry.get(&query.id) else {
        warn!(match_id = %query.id, "WebSocket upgrade for unknown match");
        return Response::builder()
            .status(400)
            .body("invalid code".into())
            .unwrap_or_default();
    };

    let identity = resolve_identity(query.token.as_deref(), &state.config.access_token_secret);
    info!(
        player_id = %identity.player_id,
        guest = identity.is_guest,
        match_id = %query.id,
        "WebSocket upgrade"
    );

    ws.on_upgrade(move |socket| handle_socket(socket, identity.player_id, handle, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, player_id: Uuid, handle: MatchHandle, state: AppState) {
    info!(player_id = %player_id, match_id = %handle.id, "New WebSocket connection");

    // Equipped cosmetic, if this identity has a record
    let cosmetic_link = match state.stats_store.fetch(player_id).await {
        Ok(record) => record.and_then(|r| r.cosmetic_link),
        Err(e) => {
            warn!(player_id = %player_id, error = %e, "Failed to fetch player record");
            None
        }
    };

    let (mut ws_sink, ws_stream) = socket.split();

    // Subscribe before any command so no broadcast is missed
    let outbound_rx = handle.outbound_tx.subscribe();

    // Tell the client what kind of match it joined
    let greeting = ServerMsg::SendGameType { kind: handle.kind };
    if let Err(e) = send_msg(&mut ws_sink, &greeting).await {
        error!(player_id = %player_id, error = %e, "Failed to send greeting");
        return;
    }

    run_session(player_id, cosmetic_link, ws_sink, ws_stream, handle, outbound_rx).await;

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    player_id: Uuid,
    cosmetic_link: Option<String>,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    handle: MatchHandle,
    mut outbound_rx: broadcast::Receiver<Outbound>,
) {
    let rate_limiter = PlayerRateLimiter::new();

    // Writer task: match broadcasts -> WebSocket, filtered per recipient
    let writer_player_id = player_id;
    let writer_handle = tokio::spawn(async move {
        loop {
            match outbound_rx.recv().await {
                Ok(outbound) => {
                    if !outbound.is_for(writer_player_id) {
                        continue;
                    }
                    if let Err(e) = send_msg(&mut ws_sink, &outbound.msg).await {
                        debug!(player_id = %writer_player_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Slow clients skip broadcasts rather than stalling the match
                    warn!(player_id = %writer_player_id, lagged_count = n, "Client lagged, skipping {} broadcasts", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(player_id = %writer_player_id, "Match broadcast channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> match coordinator
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        let command = translate(client_msg, cosmetic_link.clone());
                        if handle
                            .cmd_tx
                            .send(PlayerCommand::new(player_id, command))
                            .await
                            .is_err()
                        {
                            debug!(player_id = %player_id, "Match command channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!(player_id = %player_id, "Transport ping/pong");
            }
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Synthesize the leave for the match loop
    let _ = handle
        .cmd_tx
        .send(PlayerCommand::new(player_id, MatchCommand::Leave))
        .await;

    writer_handle.abort();
}

/// Translate a decoded wire message into a match command
fn translate(msg: ClientMsg, cosmetic_link: Option<String>) -> MatchCommand {
    match msg {
        ClientMsg::Ping => MatchCommand::Ping,
        ClientMsg::RegisterPlayer { name } => MatchCommand::Join {
            name,
            cosmetic_link,
        },
        ClientMsg::StartCountdown {} => MatchCommand::StartCountdown,
        ClientMsg::PlayerMove { key } => MatchCommand::TypeKey { key },
        ClientMsg::PlayerGuess { guess } => MatchCommand::Guess { guess },
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_carries_the_resolved_cosmetic() {
        let cmd = translate(
            ClientMsg::RegisterPlayer { name: "ada".to_string() },
            Some("link".to_string()),
        );
        assert!(matches!(
            cmd,
            MatchCommand::Join { name, cosmetic_link: Some(link) }
                if name == "ada" && link == "link"
        ));
    }

    #[test]
    fn moves_and_guesses_map_one_to_one() {
        assert!(matches!(
            translate(ClientMsg::PlayerMove { key: "a".to_string() }, None),
            MatchCommand::TypeKey { key } if key == "a"
        ));
        assert!(matches!(
            translate(ClientMsg::PlayerGuess { guess: "Ada".to_string() }, None),
            MatchCommand::Guess { guess } if guess == "Ada"
        ));
        assert!(matches!(translate(ClientMsg::Ping, None), MatchCommand::Ping));
        assert!(matches!(
            translate(ClientMsg::StartCountdown {}, None),
            MatchCommand::StartCountdown
        ));
    }
}

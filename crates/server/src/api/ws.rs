use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use server_api::auth::verify_token;
use shared::{domain::UserId, error::ApiError};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::http_error;
use crate::app_state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct WsQuery {
    token: Option<String>,
}

/// The token is checked before the upgrade headers so a missing or bad token
/// is always answered with a JSON 401.
pub(crate) async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let verified = match q.token.as_deref() {
        Some(token) => verify_token(&state.api.auth, token),
        None => Err(ApiError::unauthorized("token required")),
    };
    let caller = match verified {
        Ok(caller) => caller,
        Err(err) => return http_error(err).into_response(),
    };
    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| ws_connection(state, socket, caller.user_id))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket, user_id: UserId) {
    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.events.subscribe();
    debug!(user_id = user_id.0, "notification feed opened");

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(user_id = user_id.0, skipped, "notification feed lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if !event.concerns(user_id) {
                continue;
            }
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
    debug!(user_id = user_id.0, "notification feed closed");
}

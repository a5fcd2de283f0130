//! WebSocket handler for Axum
//!
//! Authenticates the upgrade request, then runs one inbound and one outbound
//! pump for the socket. Whichever pump stops first ends the connection;
//! cleanup (hub removal, queue close) happens on every exit path.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{Sink, Stream, StreamExt};
use pharmchat_shared::ClientIdentity;
use serde::Deserialize;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::ApiResult;
use crate::state::AppState;

use super::{
    connection::{Client, PumpSettings},
    inbound::{read_pump, ChatContext, InboundExit},
    outbound::{write_pump, OutboundExit},
};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    #[serde(default)]
    token: String,
}

/// Which pump ended the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionExit {
    Inbound(InboundExit),
    Outbound(OutboundExit),
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
///
/// Browsers cannot set headers on the upgrade request, so the bearer token
/// travels as the `token` query parameter. A rejected token gets a plain
/// HTTP error and no socket is opened.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> ApiResult<Response> {
    let identity = match state.auth.resolve(&params.token).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket auth failed");
            return Err(e.into());
        }
    };

    tracing::info!(
        tenant_id = %identity.tenant_id(),
        sender_type = %identity.sender_kind(),
        sender_id = %identity.sender_id(),
        "WebSocket connection upgrade requested"
    );

    let settings = state.pump_settings;
    let chat = state.chat.clone();

    Ok(ws
        .max_message_size(settings.max_message_bytes)
        .max_frame_size(settings.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, identity, chat, settings)))
}

async fn handle_socket(socket: WebSocket, identity: ClientIdentity, chat: ChatContext, settings: PumpSettings) {
    let (sink, stream) = socket.split();
    serve_connection(sink, stream, identity, chat, settings).await;
}

/// Run a registered connection until either pump stops
pub async fn serve_connection<W, S, E>(
    sink: W,
    stream: S,
    identity: ClientIdentity,
    chat: ChatContext,
    settings: PumpSettings,
) -> ConnectionExit
where
    W: Sink<Message> + Send + Unpin + 'static,
    W::Error: Display + Send,
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (tx, rx) = mpsc::channel(settings.outbound_capacity);
    let client = Arc::new(Client::new(identity, tx));
    let session_id = client.session_id;
    chat.hub.register(Arc::clone(&client)).await;

    let mut writer = tokio::spawn(write_pump(sink, rx, session_id, settings));
    let reader = read_pump(stream, &client, &chat, &settings);
    tokio::pin!(reader);

    let exit = tokio::select! {
        inbound = &mut reader => ConnectionExit::Inbound(inbound),
        outbound = &mut writer => ConnectionExit::Outbound(outbound.unwrap_or_else(|e| {
            tracing::error!(session_id = %session_id, error = ?e, "Outbound pump panicked");
            OutboundExit::WriteFailed
        })),
    };

    chat.hub.unregister(&client).await;
    client.close_outbound();

    if let ConnectionExit::Inbound(_) = exit {
        // Writer flushes what is queued, sends the close frame and stops
        if let Err(e) = writer.await {
            tracing::error!(session_id = %session_id, error = ?e, "Outbound pump panicked");
        }
    }

    tracing::info!(
        session_id = %session_id,
        tenant_id = %client.tenant_id(),
        exit = ?exit,
        "WebSocket connection closed"
    );

    exit
}

//! Inbound pump: reads client frames and dispatches their side effects
//!
//! Protocol and application errors are answered with an `error` frame to the
//! sender only and the loop keeps going. Only transport failures, an explicit
//! close, an oversized frame or a missed liveness deadline end the loop.

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use pharmchat_shared::{ConversationRoute, NewChatMessage, StoreError};
use std::fmt::Display;
use std::sync::Arc;
use tokio::time::{self, Instant};
use uuid::Uuid;

use super::connection::{Client, PumpSettings};
use super::events::{ClientFrame, SendMessageData, ServerEvent, TypingData, TypingEvent};
use super::hub::Hub;
use crate::store::MessageService;

/// What every connection's dispatcher needs
#[derive(Clone)]
pub struct ChatContext {
    pub hub: Arc<Hub>,
    pub messages: Arc<dyn MessageService>,
}

impl ChatContext {
    pub fn new(hub: Arc<Hub>, messages: Arc<dyn MessageService>) -> Self {
        Self { hub, messages }
    }
}

/// Why an inbound pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundExit {
    /// Peer sent a close frame
    PeerClosed,
    /// Stream ended without a close frame
    StreamEnded,
    ReadError,
    /// No liveness response within the pong wait
    LivenessTimeout,
    FrameTooLarge,
}

/// Read frames until the connection ends
pub async fn read_pump<S, E>(
    mut stream: S,
    client: &Client,
    ctx: &ChatContext,
    settings: &PumpSettings,
) -> InboundExit
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut deadline = Instant::now() + settings.pong_wait;

    loop {
        let message = match time::timeout_at(deadline, stream.next()).await {
            Err(_) => {
                tracing::info!(session_id = %client.session_id, "WebSocket liveness timeout");
                return InboundExit::LivenessTimeout;
            }
            Ok(None) => return InboundExit::StreamEnded,
            Ok(Some(Err(e))) => {
                tracing::debug!(session_id = %client.session_id, error = %e, "WebSocket read failed");
                return InboundExit::ReadError;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                if text.len() > settings.max_message_bytes {
                    tracing::warn!(
                        session_id = %client.session_id,
                        size = text.len(),
                        limit = settings.max_message_bytes,
                        "WebSocket frame exceeds size limit"
                    );
                    return InboundExit::FrameTooLarge;
                }
                dispatch(client, ctx, &text).await;
            }
            Message::Binary(data) => {
                if data.len() > settings.max_message_bytes {
                    tracing::warn!(
                        session_id = %client.session_id,
                        size = data.len(),
                        limit = settings.max_message_bytes,
                        "WebSocket binary frame exceeds size limit"
                    );
                    return InboundExit::FrameTooLarge;
                }
                tracing::debug!(session_id = %client.session_id, "Ignoring binary frame");
            }
            Message::Pong(_) => {
                deadline = Instant::now() + settings.pong_wait;
            }
            // Transport pings are answered by the socket layer
            Message::Ping(_) => {}
            Message::Close(_) => {
                tracing::info!(session_id = %client.session_id, "WebSocket close frame received");
                return InboundExit::PeerClosed;
            }
        }
    }
}

/// Decode one text frame and apply its effect
pub async fn dispatch(client: &Client, ctx: &ChatContext, text: &str) {
    let frame = match ClientFrame::decode(text) {
        Ok(Some(frame)) => frame,
        Ok(None) => {
            tracing::debug!(session_id = %client.session_id, "Ignoring frame of unknown type");
            return;
        }
        Err(e) => {
            tracing::warn!(
                session_id = %client.session_id,
                error = ?e,
                "Failed to parse client frame"
            );
            reply(client, ServerEvent::error(e.to_string()));
            return;
        }
    };

    match frame {
        ClientFrame::Ping => reply(client, ServerEvent::Pong),
        ClientFrame::SendMessage(data) => handle_send_message(client, ctx, data).await,
        ClientFrame::Typing(data) => handle_typing(client, ctx, data).await,
    }
}

async fn handle_send_message(client: &Client, ctx: &ChatContext, data: SendMessageData) {
    let Some(conversation_id) = data.conversation_id else {
        reply(client, ServerEvent::error("conversation_id is required"));
        return;
    };
    let body = data.body.trim();
    if body.is_empty() {
        reply(client, ServerEvent::error("body is required"));
        return;
    }

    let route = match resolve_route(client, ctx, conversation_id).await {
        Ok(route) => route,
        Err(RouteError::NotAdmitted) => {
            reply(client, ServerEvent::error("conversation not found"));
            return;
        }
        Err(RouteError::Store(e)) => {
            tracing::error!(error = %e, conversation_id = %conversation_id, "Failed to resolve conversation");
            reply(client, ServerEvent::error("failed to send message"));
            return;
        }
    };

    let message = NewChatMessage {
        conversation_id,
        sender_type: client.identity.sender_kind(),
        sender_id: client.identity.sender_id(),
        body: body.to_string(),
        attachment_url: non_blank(data.attachment_url),
        attachment_name: non_blank(data.attachment_name),
        attachment_type: non_blank(data.attachment_type),
    };

    let saved = match ctx.messages.send_message(message).await {
        Ok(saved) => saved,
        Err(e) => {
            tracing::error!(
                error = %e,
                session_id = %client.session_id,
                conversation_id = %conversation_id,
                "Failed to persist chat message"
            );
            reply(client, ServerEvent::error("failed to send message"));
            return;
        }
    };

    tracing::debug!(
        message_id = %saved.id,
        conversation_id = %conversation_id,
        sender_type = %saved.sender_type,
        "Chat message persisted"
    );

    ctx.hub
        .broadcast_to_conversation(route.tenant_id, route.customer_id, &ServerEvent::NewMessage(saved))
        .await;
}

async fn handle_typing(client: &Client, ctx: &ChatContext, data: TypingData) {
    let route = match resolve_route(client, ctx, data.conversation_id).await {
        Ok(route) => route,
        Err(RouteError::NotAdmitted) => {
            reply(client, ServerEvent::error("conversation not found"));
            return;
        }
        Err(RouteError::Store(e)) => {
            tracing::error!(error = %e, conversation_id = %data.conversation_id, "Failed to resolve conversation");
            return;
        }
    };

    let event = ServerEvent::Typing(TypingEvent {
        conversation_id: data.conversation_id,
        is_typing: data.is_typing,
        sender_type: client.identity.sender_kind(),
        sender_id: client.identity.sender_id(),
    });

    ctx.hub
        .broadcast_to_conversation(route.tenant_id, route.customer_id, &event)
        .await;
}

enum RouteError {
    /// Unknown conversation, or the sender is not a participant
    NotAdmitted,
    Store(StoreError),
}

async fn resolve_route(
    client: &Client,
    ctx: &ChatContext,
    conversation_id: Uuid,
) -> Result<ConversationRoute, RouteError> {
    let route = ctx
        .messages
        .get_conversation(conversation_id)
        .await
        .map_err(|e| match e {
            StoreError::NotFound(_) => RouteError::NotAdmitted,
            other => RouteError::Store(other),
        })?;

    if !route.admits(&client.identity) {
        tracing::warn!(
            session_id = %client.session_id,
            conversation_id = %conversation_id,
            sender_type = %client.identity.sender_kind(),
            "Sender is not a participant of conversation"
        );
        return Err(RouteError::NotAdmitted);
    }

    Ok(route)
}

/// Send an event to this connection only
fn reply(client: &Client, event: ServerEvent) {
    if let Err(e) = client.send_event(&event) {
        tracing::debug!(
            session_id = %client.session_id,
            event_type = event.kind(),
            error = %e,
            "Failed to queue reply"
        );
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryMessageStore;
    use pharmchat_shared::{ClientIdentity, SenderKind};
    use serde_json::Value;
    use std::convert::Infallible;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Fixture {
        ctx: ChatContext,
        store: Arc<MemoryMessageStore>,
        tenant_id: Uuid,
        customer_id: Uuid,
        conversation_id: Uuid,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryMessageStore::new());
        let tenant_id = Uuid::new_v4();
        let customer_id = Uuid::new_v4();
        let conversation_id = store.add_conversation(tenant_id, Some(customer_id));
        Fixture {
            ctx: ChatContext::new(Arc::new(Hub::new()), store.clone()),
            store,
            tenant_id,
            customer_id,
            conversation_id,
        }
    }

    async fn connect(ctx: &ChatContext, identity: ClientIdentity) -> (Arc<Client>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        let client = Arc::new(Client::new(identity, tx));
        ctx.hub.register(Arc::clone(&client)).await;
        (client, rx)
    }

    fn staff(tenant_id: Uuid) -> ClientIdentity {
        ClientIdentity::Staff {
            tenant_id,
            staff_id: Uuid::new_v4(),
            role: "pharmacist".to_string(),
        }
    }

    fn next_json(rx: &mut mpsc::Receiver<String>) -> Value {
        let frame = rx.try_recv().expect("expected a queued frame");
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_ping_replies_to_sender_only() {
        let f = fixture();
        let (sender, mut rx_sender) = connect(&f.ctx, staff(f.tenant_id)).await;
        let (_peer, mut rx_peer) = connect(&f.ctx, staff(f.tenant_id)).await;

        dispatch(&sender, &f.ctx, r#"{"type":"ping"}"#).await;

        assert_eq!(rx_sender.try_recv().unwrap(), r#"{"type":"pong"}"#);
        assert!(rx_sender.try_recv().is_err());
        assert!(rx_peer.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_customer_message_fans_out_to_tenant_staff() {
        let f = fixture();
        let customer = ClientIdentity::Customer {
            tenant_id: f.tenant_id,
            customer_id: f.customer_id,
        };
        let (sender, mut rx_sender) = connect(&f.ctx, customer).await;
        let (_staff, mut rx_staff) = connect(&f.ctx, staff(f.tenant_id)).await;
        let (_other, mut rx_other) = connect(&f.ctx, staff(Uuid::new_v4())).await;

        let frame = format!(
            r#"{{"type":"send_message","data":{{"conversation_id":"{}","body":"hello"}}}}"#,
            f.conversation_id
        );
        dispatch(&sender, &f.ctx, &frame).await;

        let staff_frame = next_json(&mut rx_staff);
        assert_eq!(staff_frame["type"], "new_message");
        assert_eq!(staff_frame["data"]["body"], "hello");
        assert_eq!(staff_frame["data"]["sender_type"], "customer");
        assert_eq!(staff_frame["data"]["sender_id"], f.customer_id.to_string());

        // The customer's own connection sees the persisted message too
        assert_eq!(next_json(&mut rx_sender)["type"], "new_message");
        assert!(rx_other.try_recv().is_err());

        let stored = f.store.messages();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sender_type, SenderKind::Customer);
    }

    #[tokio::test]
    async fn test_send_message_validation_errors() {
        let f = fixture();
        let (sender, mut rx) = connect(&f.ctx, staff(f.tenant_id)).await;

        dispatch(&sender, &f.ctx, r#"{"type":"send_message","data":{"body":"hi"}}"#).await;
        assert_eq!(next_json(&mut rx)["data"]["message"], "conversation_id is required");

        let blank = format!(
            r#"{{"type":"send_message","data":{{"conversation_id":"{}","body":"   "}}}}"#,
            f.conversation_id
        );
        dispatch(&sender, &f.ctx, &blank).await;
        assert_eq!(next_json(&mut rx)["data"]["message"], "body is required");
        assert!(f.store.messages().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_reported_to_sender_only() {
        let f = fixture();
        f.store.fail_writes(true);
        let (sender, mut rx_sender) = connect(&f.ctx, staff(f.tenant_id)).await;
        let (_peer, mut rx_peer) = connect(&f.ctx, staff(f.tenant_id)).await;

        let frame = format!(
            r#"{{"type":"send_message","data":{{"conversation_id":"{}","body":"refill ready"}}}}"#,
            f.conversation_id
        );
        dispatch(&sender, &f.ctx, &frame).await;

        let reply = next_json(&mut rx_sender);
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["data"]["message"], "failed to send message");
        assert!(rx_peer.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lookup_failure_on_send_reported_to_sender_only() {
        let f = fixture();
        f.store.fail_reads(true);
        let (sender, mut rx_sender) = connect(&f.ctx, staff(f.tenant_id)).await;
        let (_peer, mut rx_peer) = connect(&f.ctx, staff(f.tenant_id)).await;

        let frame = format!(
            r#"{{"type":"send_message","data":{{"conversation_id":"{}","body":"hello"}}}}"#,
            f.conversation_id
        );
        dispatch(&sender, &f.ctx, &frame).await;

        let reply = next_json(&mut rx_sender);
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["data"]["message"], "failed to send message");
        assert!(rx_sender.try_recv().is_err());
        assert!(rx_peer.try_recv().is_err());
        assert!(f.store.messages().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_on_typing_is_silent() {
        let f = fixture();
        f.store.fail_reads(true);
        let (sender, mut rx_sender) = connect(&f.ctx, staff(f.tenant_id)).await;
        let customer = ClientIdentity::Customer {
            tenant_id: f.tenant_id,
            customer_id: f.customer_id,
        };
        let (_customer, mut rx_customer) = connect(&f.ctx, customer).await;

        let frame = format!(
            r#"{{"type":"typing","data":{{"conversation_id":"{}","is_typing":true}}}}"#,
            f.conversation_id
        );
        dispatch(&sender, &f.ctx, &frame).await;

        assert!(rx_sender.try_recv().is_err());
        assert!(rx_customer.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_oversized_binary_frame_ends_pump() {
        let f = fixture();
        let (client, _rx) = connect(&f.ctx, staff(f.tenant_id)).await;
        let settings = PumpSettings::new(Duration::from_secs(1), Duration::from_secs(10), 16, 4);

        let frames = vec![
            Ok::<_, Infallible>(Message::Binary(vec![0u8; 8])),
            Ok(Message::Binary(vec![0u8; 17])),
        ];
        let exit = read_pump(futures::stream::iter(frames), &client, &f.ctx, &settings).await;
        assert_eq!(exit, InboundExit::FrameTooLarge);
    }

    #[tokio::test]
    async fn test_foreign_conversation_is_not_found() {
        let f = fixture();
        let (intruder, mut rx) = connect(&f.ctx, staff(Uuid::new_v4())).await;

        let frame = format!(
            r#"{{"type":"send_message","data":{{"conversation_id":"{}","body":"hi"}}}}"#,
            f.conversation_id
        );
        dispatch(&intruder, &f.ctx, &frame).await;

        assert_eq!(next_json(&mut rx)["data"]["message"], "conversation not found");
        assert!(f.store.messages().is_empty());
    }

    #[tokio::test]
    async fn test_typing_broadcast_carries_sender() {
        let f = fixture();
        let staff_identity = staff(f.tenant_id);
        let staff_id = staff_identity.sender_id();
        let (sender, _rx_sender) = connect(&f.ctx, staff_identity).await;
        let customer = ClientIdentity::Customer {
            tenant_id: f.tenant_id,
            customer_id: f.customer_id,
        };
        let (_customer, mut rx_customer) = connect(&f.ctx, customer).await;

        let frame = format!(
            r#"{{"type":"typing","data":{{"conversation_id":"{}","is_typing":true}}}}"#,
            f.conversation_id
        );
        dispatch(&sender, &f.ctx, &frame).await;

        let typing = next_json(&mut rx_customer);
        assert_eq!(typing["type"], "typing");
        assert_eq!(typing["data"]["is_typing"], true);
        assert_eq!(typing["data"]["sender_type"], "staff");
        assert_eq!(typing["data"]["sender_id"], staff_id.to_string());
        assert!(f.store.messages().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frame_then_valid_frame() {
        let f = fixture();
        let (client, mut rx) = connect(&f.ctx, staff(f.tenant_id)).await;

        let frames = vec![
            Ok::<_, Infallible>(Message::Text("{oops".to_string())),
            Ok(Message::Text(r#"{"type":"mystery"}"#.to_string())),
            Ok(Message::Text(r#"{"type":"ping"}"#.to_string())),
        ];
        let exit = read_pump(
            futures::stream::iter(frames),
            &client,
            &f.ctx,
            &PumpSettings::default(),
        )
        .await;

        assert_eq!(exit, InboundExit::StreamEnded);
        assert_eq!(next_json(&mut rx)["type"], "error");
        assert_eq!(next_json(&mut rx)["type"], "pong");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_oversized_frame_ends_pump() {
        let f = fixture();
        let (client, _rx) = connect(&f.ctx, staff(f.tenant_id)).await;
        let settings = PumpSettings::new(Duration::from_secs(1), Duration::from_secs(10), 16, 4);

        let frames = vec![Ok::<_, Infallible>(Message::Text("x".repeat(17)))];
        let exit = read_pump(futures::stream::iter(frames), &client, &f.ctx, &settings).await;
        assert_eq!(exit, InboundExit::FrameTooLarge);
    }

    #[tokio::test]
    async fn test_close_frame_ends_pump() {
        let f = fixture();
        let (client, _rx) = connect(&f.ctx, staff(f.tenant_id)).await;

        let frames = vec![
            Ok::<_, Infallible>(Message::Close(None)),
            Ok(Message::Text(r#"{"type":"ping"}"#.to_string())),
        ];
        let exit = read_pump(
            futures::stream::iter(frames),
            &client,
            &f.ctx,
            &PumpSettings::default(),
        )
        .await;
        assert_eq!(exit, InboundExit::PeerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_times_out_and_pong_extends_deadline() {
        let f = fixture();
        let (client, _rx) = connect(&f.ctx, staff(f.tenant_id)).await;
        let settings = PumpSettings::new(Duration::from_secs(1), Duration::from_secs(10), 1024, 4);

        let (tx, stream) = futures::channel::mpsc::unbounded::<Result<Message, Infallible>>();
        let started = Instant::now();
        let ctx = f.ctx.clone();
        let pump = tokio::spawn(async move { read_pump(stream, &client, &ctx, &settings).await });

        time::sleep(Duration::from_secs(8)).await;
        tx.unbounded_send(Ok(Message::Pong(Vec::new()))).unwrap();

        assert_eq!(pump.await.unwrap(), InboundExit::LivenessTimeout);
        assert!(started.elapsed() >= Duration::from_secs(18));
    }
}

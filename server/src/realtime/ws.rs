//! WebSocket endpoints.
//!
//! A session forwards hub events to the client and answers the few messages
//! a client may send. Authentication and lookups happen before the upgrade so
//! that a bad token or an unknown queue is an ordinary HTTP error.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::authenticate;
use crate::domain::{notifications, queues};
use crate::models::User;
use crate::realtime::{Channel, Event};
use crate::state::AppState;
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct SocketAuth {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    MarkRead { notification_id: Uuid },
    Ping,
}

enum SessionEnd {
    ClientClosed,
    HubClosed,
    Network(axum::Error),
}

/// `GET /ws/notifications?token=<access token>`
pub async fn notifications_socket(
    State(state): State<AppState>,
    Query(auth): Query<SocketAuth>,
    upgrade: Option<WebSocketUpgrade>,
) -> AppResult<Response> {
    let token = auth
        .token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::AuthError("Authentication credentials were not provided".into()))?;
    let user = authenticate(&state, &token).await?;
    let upgrade = upgrade.ok_or_else(not_an_upgrade)?;

    let events = state.hub.subscribe(Channel::User(user.id));
    Ok(upgrade.on_upgrade(move |socket| async move {
        Session {
            state,
            user: Some(user),
        }
        .run(socket, events, None)
        .await
    }))
}

/// `GET /ws/queues/{id}`: public; starts with a snapshot of the queue.
pub async fn queue_socket(
    State(state): State<AppState>,
    Path(queue_id): Path<Uuid>,
    upgrade: Option<WebSocketUpgrade>,
) -> AppResult<Response> {
    let queue = state
        .store
        .queues
        .get(queue_id)
        .await?
        .ok_or_else(|| AppError::not_found("Queue", queue_id))?;
    let upgrade = upgrade.ok_or_else(not_an_upgrade)?;

    let events = state.hub.subscribe(Channel::Queue(queue.id));
    let snapshot = queues::update_event(&state, &queue).await?;
    Ok(upgrade.on_upgrade(move |socket| async move {
        Session { state, user: None }
            .run(socket, events, Some(snapshot))
            .await
    }))
}

fn not_an_upgrade() -> AppError {
    AppError::validation("Expected a WebSocket upgrade request")
}

struct Session {
    state: AppState,
    /// Set on notification sockets; enables `mark_read`.
    user: Option<User>,
}

impl Session {
    async fn run(
        self,
        socket: WebSocket,
        mut events: broadcast::Receiver<Event>,
        initial: Option<Event>,
    ) {
        let (mut sink, mut stream) = socket.split();
        let user_id = self.user.as_ref().map(|user| user.id);
        info!(?user_id, "WebSocket session opened");

        if let Some(event) = initial {
            if let Err(e) = send(&mut sink, &event).await {
                debug!(error = %e, "Could not send the initial snapshot");
                return;
            }
        }

        let end = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Err(e) = send(&mut sink, &event).await {
                            break SessionEnd::Network(e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(?user_id, skipped, "WebSocket client fell behind, events dropped");
                    }
                    Err(RecvError::Closed) => break SessionEnd::HubClosed,
                },
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = self.handle_text(&text).await {
                            if let Err(e) = send(&mut sink, &reply).await {
                                break SessionEnd::Network(e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break SessionEnd::ClientClosed,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break SessionEnd::Network(e),
                },
            }
        };

        match end {
            SessionEnd::ClientClosed => info!(?user_id, "WebSocket session closed by client"),
            SessionEnd::HubClosed => info!(?user_id, "WebSocket channel closed"),
            SessionEnd::Network(e) => debug!(?user_id, error = %e, "WebSocket session dropped"),
        }
    }

    async fn handle_text(&self, text: &str) -> Option<Event> {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognised WebSocket message");
                return None;
            }
        };
        match message {
            ClientMessage::Ping => Some(Event::Pong),
            ClientMessage::MarkRead { notification_id } => {
                let user = self.user.as_ref()?;
                if let Err(e) =
                    notifications::mark_read(&self.state, user, notification_id, Utc::now()).await
                {
                    debug!(%notification_id, error = %e, "mark_read over WebSocket failed");
                }
                None
            }
        }
    }
}

async fn send(sink: &mut SplitSink<WebSocket, Message>, event: &Event) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    sink.send(Message::Text(text)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages() {
        let id = Uuid::new_v4();
        let parsed: ClientMessage =
            serde_json::from_str(&format!(r#"{{"type":"mark_read","notification_id":"{id}"}}"#))
                .unwrap();
        assert_eq!(parsed, ClientMessage::MarkRead { notification_id: id });

        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(parsed, ClientMessage::Ping);

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#).is_err());
    }
}

//! Customer side of the support chat.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use tienda_core::{ConversationId, MessageId, MessageSender};

use crate::db::ChatRepository;
use crate::error::{AppError, Result};
use crate::models::{Conversation, Message};
use crate::services::TokenRequest;
use crate::state::AppState;

/// Longest message body accepted.
const MAX_MESSAGE_CHARS: usize = 2000;

/// Realtime event name for new messages.
const MESSAGE_EVENT: &str = "message";

#[derive(Debug, Deserialize)]
pub struct OpenRequest {
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(default, alias = "correo")]
    pub email: Option<String>,
    /// First message, stored with the conversation.
    #[serde(default, alias = "mensaje")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OpenResponse {
    pub conversation: Conversation,
    pub channel: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    #[serde(alias = "texto")]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub after: Option<MessageId>,
}

#[derive(Debug, Deserialize)]
pub struct TokenBody {
    pub conversation_id: ConversationId,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversaciones", post(open))
        .route(
            "/conversaciones/{id}/mensajes",
            get(messages).post(send),
        )
        .route("/token", post(token))
}

/// Trim a message and enforce the length limit.
pub(crate) fn clean_body(body: &str) -> Result<&str> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::BadRequest("message cannot be empty".to_string()));
    }
    if body.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::BadRequest(format!(
            "message is longer than {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(body)
}

/// Publish a stored message to the conversation channel.
///
/// The message is already saved, so a relay failure only means the other
/// side sees it on its next poll.
pub(crate) async fn relay(state: &AppState, message: &Message) {
    let Some(realtime) = state.realtime() else {
        return;
    };
    let channel = crate::models::chat::channel_name(message.conversation_id);
    if let Err(e) = realtime.publish(&channel, MESSAGE_EVENT, message).await {
        tracing::warn!(channel = %channel, error = %e, "Chat relay failed");
    }
}

/// Start a conversation, optionally with a first message.
pub async fn open(
    State(state): State<AppState>,
    Json(request): Json<OpenRequest>,
) -> Result<(StatusCode, Json<OpenResponse>)> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    let first = request.message.as_deref().map(clean_body).transpose()?;
    let email = request
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());

    let chat = ChatRepository::new(state.pool());
    let conversation = chat.create_conversation(name, email).await?;

    let mut messages = Vec::new();
    if let Some(body) = first {
        messages.push(
            chat.add_message(conversation.id, MessageSender::Customer, body)
                .await?,
        );
    }

    tracing::info!(conversation_id = %conversation.id, "Chat conversation opened");
    Ok((
        StatusCode::CREATED,
        Json(OpenResponse {
            channel: conversation.channel(),
            conversation,
            messages,
        }),
    ))
}

/// Messages of a conversation, for the first load and for polling.
pub async fn messages(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Message>>> {
    let chat = ChatRepository::new(state.pool());
    chat.get(id).await?;
    Ok(Json(chat.messages(id, query.after).await?))
}

/// A customer message.
pub async fn send(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    Json(body): Json<MessageBody>,
) -> Result<(StatusCode, Json<Message>)> {
    let text = clean_body(&body.body)?;
    let message = ChatRepository::new(state.pool())
        .add_message(id, MessageSender::Customer, text)
        .await?;
    relay(&state, &message).await;
    Ok((StatusCode::CREATED, Json(message)))
}

/// A token request for the customer's one conversation channel.
pub async fn token(
    State(state): State<AppState>,
    Json(body): Json<TokenBody>,
) -> Result<Json<TokenRequest>> {
    let realtime = state
        .realtime()
        .ok_or_else(|| AppError::Unavailable("live chat is not configured".to_string()))?;
    let conversation = ChatRepository::new(state.pool())
        .get(body.conversation_id)
        .await?;

    let client_id = format!("cliente-{}", conversation.id);
    Ok(Json(
        realtime.token_request(&client_id, &[conversation.channel()])?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_body() {
        assert_eq!(clean_body("  hola  ").expect("valid"), "hola");
        assert!(matches!(clean_body(" \n "), Err(AppError::BadRequest(_))));
        assert!(clean_body(&"ñ".repeat(MAX_MESSAGE_CHARS)).is_ok());
        assert!(clean_body(&"ñ".repeat(MAX_MESSAGE_CHARS + 1)).is_err());
    }

    #[test]
    fn test_open_request_aliases() {
        let request: OpenRequest =
            serde_json::from_str(r#"{"nombre": "Ana", "mensaje": "¿Tienen talla M?"}"#)
                .expect("request");
        assert_eq!(request.name, "Ana");
        assert!(request.email.is_none());
        assert_eq!(request.message.as_deref(), Some("¿Tienen talla M?"));
    }
}

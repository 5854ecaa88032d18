//! Agent inbox for the support chat.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use tienda_core::{ConversationId, ConversationStatus, MessageSender};

use crate::db::ChatRepository;
use crate::error::{AppError, Result};
use crate::models::{Conversation, Message};
use crate::routes::PageQuery;
use crate::routes::chat::{MessageBody, MessagesQuery, clean_body, relay};
use crate::services::TokenRequest;
use crate::state::AppState;

/// Channel pattern covering every conversation.
const ALL_CONVERSATIONS: &str = "chat:*";

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(alias = "estado")]
    pub status: Option<ConversationStatus>,
}

#[derive(Debug, Deserialize)]
pub struct AgentTokenBody {
    /// Shown to customers as the sender; defaults to `agente`.
    #[serde(default)]
    pub agent: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversaciones", get(inbox))
        .route(
            "/conversaciones/{id}/mensajes",
            get(messages).post(reply),
        )
        .route("/conversaciones/{id}/cerrar", post(close))
        .route("/token", post(token))
}

pub async fn inbox(
    State(state): State<AppState>,
    Query(query): Query<InboxQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Conversation>>> {
    let (limit, offset) = page.bounds();
    Ok(Json(
        ChatRepository::new(state.pool())
            .list(query.status, limit, offset)
            .await?,
    ))
}

pub async fn messages(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Message>>> {
    let chat = ChatRepository::new(state.pool());
    chat.get(id).await?;
    Ok(Json(chat.messages(id, query.after).await?))
}

pub async fn reply(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    Json(body): Json<MessageBody>,
) -> Result<(StatusCode, Json<Message>)> {
    let text = clean_body(&body.body)?;
    let message = ChatRepository::new(state.pool())
        .add_message(id, MessageSender::Agent, text)
        .await?;
    relay(&state, &message).await;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn close(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
) -> Result<Json<Conversation>> {
    let conversation = ChatRepository::new(state.pool()).close(id).await?;
    tracing::info!(conversation_id = %id, "Chat conversation closed");
    Ok(Json(conversation))
}

/// A token request covering every conversation channel.
pub async fn token(
    State(state): State<AppState>,
    Json(body): Json<AgentTokenBody>,
) -> Result<Json<TokenRequest>> {
    let realtime = state
        .realtime()
        .ok_or_else(|| AppError::Unavailable("live chat is not configured".to_string()))?;
    let agent = body
        .agent
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or("agente");
    Ok(Json(realtime.token_request(
        agent,
        &[ALL_CONVERSATIONS.to_string()],
    )?))
}

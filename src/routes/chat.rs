use std::{convert::Infallible, sync::Arc};

use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::get,
    Json, Router,
};
use chrono::Utc;
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    actions::{require_session, ActionError, GENERIC_ERROR},
    auth::CurrentUser,
    error::AppError,
    models::{
        chat::{ChatMessage, ChatTranscript},
        session::Session,
    },
    services::{
        backend::BackendApi,
        chat::{relay, AbortHandle, RelayEvent, RelayOptions, RelayStream},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(chat_page).post(chat_stream))
}

#[derive(Template)]
#[template(path = "chat.html")]
struct ChatTemplate {
    username: String,
}

async fn chat_page(current: CurrentUser) -> Result<impl IntoResponse, AppError> {
    let session = current.require_user()?;
    Ok(AskamaTemplateResponse::into_response(ChatTemplate {
        username: session.username.clone(),
    }))
}

#[derive(Deserialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
}

/// Aborts the relay when the client disconnects mid-answer.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct ChatTurn {
    relay: RelayStream,
    _abort: AbortOnDrop,
    backend: Arc<dyn BackendApi>,
    session: Session,
    messages: Vec<ChatMessage>,
    answer: String,
}

impl ChatTurn {
    async fn persist_transcript(&mut self) {
        let mut messages = std::mem::take(&mut self.messages);
        messages.push(ChatMessage::assistant(std::mem::take(&mut self.answer)));
        let transcript = ChatTranscript {
            id: Uuid::new_v4(),
            username: self.session.username.clone(),
            created_at: Utc::now(),
            messages,
        };
        match self.backend.save_chat(&self.session.token, &transcript).await {
            Ok(()) => debug!(id = %transcript.id, "chat transcript saved"),
            Err(err) => warn!(error = %err, "could not save chat transcript"),
        }
    }
}

fn sse_event(event: &RelayEvent) -> Event {
    let name = match event {
        RelayEvent::Text { .. } => "text",
        RelayEvent::Done => "done",
        RelayEvent::Error { .. } => "error",
    };
    Event::default()
        .event(name)
        .json_data(event)
        .unwrap_or_else(|err| {
            warn!(error = %err, "could not encode relay event");
            Event::default().event("error").data(GENERIC_ERROR)
        })
}

async fn chat_stream(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ActionError> {
    let session = require_session(current.session())?.clone();

    let upstream = match state.chat.stream(&request.messages).await {
        Ok(chunks) => chunks,
        Err(err) => stream::once(async move { Err(err) }).boxed(),
    };
    let options = RelayOptions {
        chunk_timeout: state.config.chat_chunk_timeout,
        ..Default::default()
    };
    let (relay, abort) = relay(upstream, options);

    let turn = ChatTurn {
        relay,
        _abort: AbortOnDrop(abort),
        backend: state.backend.clone(),
        session,
        messages: request.messages,
        answer: String::new(),
    };

    let events = stream::unfold(turn, |mut turn| async move {
        let event = turn.relay.recv().await?;
        match &event {
            RelayEvent::Text { text, .. } => turn.answer.push_str(text),
            RelayEvent::Done => turn.persist_transcript().await,
            RelayEvent::Error { .. } => {}
        }
        Some((Ok::<_, Infallible>(sse_event(&event)), turn))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

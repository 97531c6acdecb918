use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{http::header::SET_COOKIE, response::IntoResponse};
use axum_extra::extract::PrivateCookieJar;
use url::Url;

use crate::{
    auth,
    config::{AppConfig, MEMORY_BACKEND},
    models::session::Session,
    services::{backend::BackendApi, chat::ChatService},
    state::AppState,
};

pub fn config() -> AppConfig {
    AppConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        backend_url: MEMORY_BACKEND.into(),
        cookie_secret: "test-cookie-secret".into(),
        chat_url: Url::parse("http://127.0.0.1:9/api/chat").unwrap(),
        chat_model: "test".into(),
        chat_chunk_timeout: Duration::from_secs(1),
    }
}

pub fn state(backend: Arc<dyn BackendApi>) -> AppState {
    let config = config();
    let chat = ChatService::new(config.chat_url.clone(), config.chat_model.clone())
        .with_response_timeout(config.chat_chunk_timeout);
    AppState::new(config, backend, chat)
}

/// A `Cookie` header value carrying `session`, encrypted with the state's key.
pub fn session_cookie(state: &AppState, session: &Session) -> String {
    let jar = PrivateCookieJar::new(state.cookie_key.clone());
    let res = auth::apply_session_cookie(jar, session)
        .unwrap()
        .into_response();
    let set_cookie = res.headers()[SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

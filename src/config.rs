use std::{env, net::SocketAddr, time::Duration};

use url::Url;

use crate::error::AppError;

pub const MEMORY_BACKEND: &str = "memory:";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    /// Base URL of the REST backend, or `memory:` for the in-process one.
    pub backend_url: String,
    pub cookie_secret: String,
    pub chat_url: Url,
    pub chat_model: String,
    pub chat_chunk_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let listen_addr: SocketAddr = env::var("APP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let backend_url =
            env::var("BACKEND_URL").unwrap_or_else(|_| "http://127.0.0.1:8080/".to_string());
        if backend_url != MEMORY_BACKEND {
            Url::parse(&backend_url)
                .map_err(|err| AppError::Config(format!("invalid BACKEND_URL: {err}")))?;
        }

        let cookie_secret = env::var("COOKIE_SECRET")
            .unwrap_or_else(|_| "change-me-carpool-cookie-secret".to_string());

        let chat_url = env::var("CHAT_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:11434/api/chat".to_string());
        let chat_url = Url::parse(&chat_url)
            .map_err(|err| AppError::Config(format!("invalid CHAT_URL: {err}")))?;

        let chat_model = env::var("CHAT_MODEL").unwrap_or_else(|_| "llama3".to_string());

        let chat_chunk_timeout = env::var("CHAT_CHUNK_TIMEOUT_SECS")
            .ok()
            .map(|raw| {
                raw.parse::<u64>().map_err(|err| {
                    AppError::Config(format!("invalid CHAT_CHUNK_TIMEOUT_SECS: {err}"))
                })
            })
            .transpose()?
            .unwrap_or(30);

        Ok(Self {
            listen_addr,
            backend_url,
            cookie_secret,
            chat_url,
            chat_model,
            chat_chunk_timeout: Duration::from_secs(chat_chunk_timeout),
        })
    }

    pub fn uses_memory_backend(&self) -> bool {
        self.backend_url == MEMORY_BACKEND
    }
}

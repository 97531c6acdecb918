use std::sync::Arc;

use carpool::{
    config::AppConfig,
    error::AppError,
    models::driver::Driver,
    routes::create_router,
    services::{
        backend::{BackendApi, HttpBackend},
        chat::ChatService,
        memory::MemoryBackend,
    },
    state::AppState,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = AppConfig::from_env()?;

    let backend: Arc<dyn BackendApi> = if config.uses_memory_backend() {
        warn!("using the in-memory backend, every driver logs in with their own name as password");
        let backend = Driver::ALL
            .iter()
            .fold(MemoryBackend::new(), |backend, driver| {
                backend.with_user(driver.as_str(), driver.as_str())
            });
        Arc::new(backend)
    } else {
        Arc::new(HttpBackend::new(&config.backend_url)?)
    };
    let chat = ChatService::new(config.chat_url.clone(), config.chat_model.clone())
        .with_response_timeout(config.chat_chunk_timeout);

    let state = AppState::new(config.clone(), backend, chat);
    let app = create_router(state);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,carpool=debug".into());

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::{
    cookie::{Cookie, Key, SameSite},
    PrivateCookieJar,
};
use tracing::{info, warn};

use crate::{
    error::AppError,
    models::session::Session,
    services::backend::{BackendApi, ClientError},
};

pub const SESSION_COOKIE: &str = "carpool_session";

/// The session from the private cookie, if there is a valid one.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<Session>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = match PrivateCookieJar::<Key>::from_request_parts(parts, state).await {
            Ok(jar) => jar,
            Err(never) => match never {},
        };
        Ok(Self(read_session(&jar)))
    }
}

impl CurrentUser {
    pub fn require_user(&self) -> Result<&Session, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthorized)
    }

    pub fn session(&self) -> Option<&Session> {
        self.0.as_ref()
    }
}

fn read_session(jar: &PrivateCookieJar) -> Option<Session> {
    let cookie = jar.get(SESSION_COOKIE)?;
    match serde_json::from_str(cookie.value()) {
        Ok(session) => Some(session),
        Err(err) => {
            warn!(error = %err, "discarding unreadable session cookie");
            None
        }
    }
}

/// Exchanges credentials for a backend token.
///
/// Wrong credentials come back as [`AppError::Unauthorized`]; anything else
/// the backend does wrong stays a backend error.
pub async fn authenticate_user(
    backend: &dyn BackendApi,
    username: &str,
    password: &str,
) -> Result<Session, AppError> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(AppError::Unauthorized);
    }
    match backend.login(username, password).await {
        Ok(token) => {
            info!(%username, "logged in");
            Ok(Session {
                username: username.to_string(),
                token,
            })
        }
        Err(err @ ClientError::Status { .. })
            if matches!(err.status(), Some(401 | 403 | 405)) =>
        {
            warn!(%username, "login rejected");
            Err(AppError::Unauthorized)
        }
        Err(err) => Err(err.into()),
    }
}

pub fn apply_session_cookie(
    jar: PrivateCookieJar,
    session: &Session,
) -> Result<PrivateCookieJar, AppError> {
    let value = serde_json::to_string(session).map_err(|err| AppError::Other(err.into()))?;
    let cookie = Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    Ok(jar.add(cookie))
}

pub fn clear_session_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

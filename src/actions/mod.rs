//! Tagged form actions and their dispatch to the backend.
//!
//! Every mutating form posts `{"_tag": ..., ...}`. The per-domain modules
//! decode that envelope into a closed enum, validate it and make exactly one
//! backend call (plus a stats refresh for trips). Whatever happens, the caller
//! gets back either a success value or an [`ActionError`].

pub mod invoice;
pub mod maintenance;
pub mod trip;

use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Multipart, Request},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::{
    models::{invoice::Attachment, session::Session},
    services::backend::ClientError,
    validation::ValidationErrors,
};

pub const GENERIC_ERROR: &str = "Something went wrong, please try again";

/// The single failure shape every action endpoint answers with.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "_tag", rename_all = "kebab-case")]
pub enum ActionError {
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<String>,
    },
    #[error("{message}")]
    Unauthorized { message: String },
    #[error("{message}")]
    NotFound { message: String },
    #[error("{message}")]
    Simple { message: String },
}

impl ActionError {
    pub fn simple(message: impl Into<String>) -> Self {
        Self::Simple {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. }
            | Self::Unauthorized { message }
            | Self::NotFound { message }
            | Self::Simple { message } => message,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Simple { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<ValidationErrors> for ActionError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation {
            message: errors.message().to_string(),
            errors: errors.all().iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl From<ClientError> for ActionError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Status {
                status: 401 | 405,
                method,
                url,
                body,
            } => Self::Unauthorized {
                message: format!("Unauthorized: {method} {url}: {body}"),
            },
            ClientError::Status { status: 404, .. } => Self::NotFound {
                message: "The requested record does not exist".into(),
            },
            other => {
                warn!(error = %other, "backend call failed");
                Self::simple(GENERIC_ERROR)
            }
        }
    }
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

/// The session an action runs under, or the error for not having one.
pub fn require_session(session: Option<&Session>) -> Result<&Session, ActionError> {
    session.ok_or_else(|| ActionError::Unauthorized {
        message: "Unauthorized: please log in again".into(),
    })
}

/// Decodes a tagged envelope. Unknown tags and malformed payloads are errors.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ActionError> {
    let tag = value
        .get("_tag")
        .and_then(Value::as_str)
        .unwrap_or("<missing>")
        .to_string();
    serde_json::from_value(value).map_err(|err| {
        warn!(%tag, error = %err, "rejected action payload");
        ActionError::simple(format!("Unrecognized or malformed action '{tag}': {err}"))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationTag {
    Create,
    Update,
    Delete,
}

/// Success value of a create/update/delete action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mutation {
    pub id: String,
    #[serde(rename = "_tag")]
    pub tag: MutationTag,
}

/// Raw request body of an action endpoint: JSON, or multipart with a
/// `payload` JSON field and an optional `file`.
#[derive(Debug)]
pub struct ActionPayload {
    pub value: Value,
    pub attachment: Option<Attachment>,
}

#[async_trait]
impl<S> FromRequest<S> for ActionPayload
where
    S: Send + Sync,
{
    type Rejection = ActionError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let Json(value) = Json::<Value>::from_request(req, state)
                .await
                .map_err(|err| ActionError::simple(format!("Invalid request body: {err}")))?;
            return Ok(Self {
                value,
                attachment: None,
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|err| ActionError::simple(format!("Invalid upload: {err}")))?;
        let mut value = None;
        let mut attachment = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| ActionError::simple(format!("Invalid upload: {err}")))?
        {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("payload") => {
                    let text = field
                        .text()
                        .await
                        .map_err(|err| ActionError::simple(format!("Invalid upload: {err}")))?;
                    value = Some(serde_json::from_str(&text).map_err(|err| {
                        ActionError::simple(format!("Invalid action payload: {err}"))
                    })?);
                }
                Some("file") => {
                    let file_name = field.file_name().unwrap_or("upload").to_string();
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|err| ActionError::simple(format!("Invalid upload: {err}")))?;
                    if !bytes.is_empty() {
                        attachment = Some(Attachment {
                            file_name,
                            content_type,
                            bytes: bytes.to_vec(),
                        });
                    }
                }
                _ => {}
            }
        }

        let value = value.ok_or_else(|| ActionError::simple("Missing action payload"))?;
        Ok(Self { value, attachment })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> ClientError {
        ClientError::Status {
            status,
            method: "PUT".into(),
            url: "http://backend/trips/7".into(),
            body: "session expired".into(),
        }
    }

    #[test]
    fn unauthorized_statuses_are_distinguishable() {
        for code in [401, 405] {
            let err = ActionError::from(status(code));
            assert_eq!(
                err,
                ActionError::Unauthorized {
                    message: "Unauthorized: PUT http://backend/trips/7: session expired".into()
                }
            );
        }
    }

    #[test]
    fn other_statuses_fall_back_to_simple() {
        assert_eq!(ActionError::from(status(500)), ActionError::simple(GENERIC_ERROR));
        assert_eq!(ActionError::from(status(422)), ActionError::simple(GENERIC_ERROR));
        assert!(matches!(
            ActionError::from(status(404)),
            ActionError::NotFound { .. }
        ));
    }

    #[test]
    fn errors_serialize_with_tag() {
        let json = serde_json::to_value(ActionError::simple("boom")).unwrap();
        assert_eq!(json, serde_json::json!({ "_tag": "simple", "message": "boom" }));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = decode::<trip::TripAction>(serde_json::json!({ "_tag": "archive", "id": "1" }))
            .unwrap_err();
        assert!(matches!(err, ActionError::Simple { .. }));
        assert!(err.message().contains("archive"));
    }
}

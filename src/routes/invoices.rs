use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::{
    actions::{decode, invoice, require_session, ActionError, ActionPayload, Mutation},
    auth::CurrentUser,
    error::AppError,
    models::invoice::{Invoice, InvoiceKind},
    state::AppState,
};

use super::{driver_options, format_amount, format_date, DriverOption};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(invoices_list))
        .route("/action", post(invoice_action))
}

struct InvoiceRow {
    id: String,
    name: String,
    date: String,
    amount: String,
    kind: &'static str,
    driver: &'static str,
    counter_party: String,
    mileage: String,
    has_attachment: bool,
}

impl From<Invoice> for InvoiceRow {
    fn from(invoice: Invoice) -> Self {
        let f = invoice.fields;
        Self {
            id: invoice.id,
            date: format_date(f.date),
            amount: f.amount_text(),
            kind: f.kind.as_str(),
            driver: f.driver.display_name(),
            counter_party: f
                .counter_party
                .map(|d| d.display_name().to_string())
                .unwrap_or_default(),
            mileage: f.mileage.map(|m| format!("{m} km")).unwrap_or_default(),
            has_attachment: f.attachment.is_some(),
            name: f.name,
        }
    }
}

struct TotalRow {
    driver: &'static str,
    total: String,
}

#[derive(Template)]
#[template(path = "invoices/list.html")]
struct InvoicesListTemplate {
    username: String,
    invoices: Vec<InvoiceRow>,
    totals: Vec<TotalRow>,
    kinds: Vec<&'static str>,
    drivers: Vec<DriverOption>,
}

async fn invoices_list(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let session = current.require_user()?;
    let mut invoices = state.backend.list_invoices(&session.token).await?;
    let totals = state.backend.driver_totals(&session.token).await?;
    invoices.sort_by(|a, b| b.fields.date.cmp(&a.fields.date));
    Ok(AskamaTemplateResponse::into_response(InvoicesListTemplate {
        username: session.username.clone(),
        invoices: invoices.into_iter().map(InvoiceRow::from).collect(),
        totals: totals
            .iter()
            .map(|t| TotalRow {
                driver: t.driver.display_name(),
                total: format_amount(t.total),
            })
            .collect(),
        kinds: InvoiceKind::ALL.iter().map(InvoiceKind::as_str).collect(),
        drivers: driver_options(),
    }))
}

async fn invoice_action(
    State(state): State<AppState>,
    current: CurrentUser,
    payload: ActionPayload,
) -> Result<Json<Mutation>, ActionError> {
    let session = require_session(current.session())?;
    let action = decode(payload.value)?;
    invoice::dispatch(
        state.backend.as_ref(),
        session,
        action,
        payload.attachment.as_ref(),
    )
    .await
    .map(Json)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::{
        models::session::Session,
        routes::create_router,
        services::memory::{memory_token, MemoryBackend},
        test_support,
        validation::MISSING_COUNTER_PARTY,
    };

    const BOUNDARY: &str = "carpool-test-boundary";

    fn multipart_body(payload: &str, file: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"payload\"\r\n\r\n{payload}\r\n"
        )
        .into_bytes();
        if let Some((name, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/pdf\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn send(app: axum::Router, cookie: &str, body: Vec<u8>) -> (StatusCode, Value) {
        let res = app
            .oneshot(
                Request::post("/invoices/action")
                    .header(header::COOKIE, cookie)
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn session() -> Session {
        Session {
            username: "ben".into(),
            token: memory_token("ben"),
        }
    }

    #[tokio::test]
    async fn multipart_create_stores_attachment() {
        let backend = MemoryBackend::new().with_user("ben", "pw");
        let state = test_support::state(Arc::new(backend.clone()));
        let cookie = test_support::session_cookie(&state, &session());
        let payload = r#"{"_tag":"create","invoice":{"name":"Tanken","date":"2024-09-12","amount":61.4,"kind":"Fuel","driver":"ben","mileage":88120}}"#;
        let (status, body) = send(
            create_router(state),
            &cookie,
            multipart_body(payload, Some(("receipt.pdf", b"%PDF-1.4"))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["_tag"], "create");
        let id = body["id"].as_str().unwrap();
        let attachment = backend.attachment_for(id).unwrap();
        assert_eq!(attachment.file_name, "receipt.pdf");
        assert_eq!(attachment.bytes, b"%PDF-1.4");
    }

    #[tokio::test]
    async fn reimbursement_without_counter_party_is_rejected() {
        let backend = MemoryBackend::new().with_user("ben", "pw");
        let state = test_support::state(Arc::new(backend.clone()));
        let cookie = test_support::session_cookie(&state, &session());
        let payload = r#"{"_tag":"create","invoice":{"name":"Ausgleich","date":"2024-09-12","amount":20,"kind":"Reimbursement","driver":"ben"}}"#;
        let (status, body) = send(create_router(state), &cookie, multipart_body(payload, None)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], MISSING_COUNTER_PARTY);
        assert!(backend.invoices().is_empty());
    }

    #[tokio::test]
    async fn expired_backend_session_maps_to_unauthorized() {
        let backend = MemoryBackend::new().with_user("ben", "pw");
        backend.fail_with(401, "token expired");
        let state = test_support::state(Arc::new(backend));
        let cookie = test_support::session_cookie(&state, &session());
        let (status, body) = send(
            create_router(state),
            &cookie,
            multipart_body(r#"{"_tag":"delete","id":"invoice-1"}"#, None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["_tag"], "unauthorized");
        assert!(body["message"].as_str().unwrap().starts_with("Unauthorized: "));
    }
}

use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Form, Router,
};
use chrono::Local;
use serde::Deserialize;
use tracing::{info, warn};
use url::form_urlencoded;

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::driver::Driver,
    reimbursement::{Settlement, Snapshot, Suggestion},
    state::AppState,
    validation::validate_invoice,
};

use super::format_amount;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(reimbursements_page))
        .route("/confirm", post(confirm_reimbursement))
}

struct BalanceRow {
    driver: &'static str,
    total: String,
    balance: String,
    owes: bool,
}

struct SuggestionRow {
    from: &'static str,
    from_label: &'static str,
    to: &'static str,
    to_label: &'static str,
    amount: String,
    amount_value: String,
}

impl From<&Suggestion> for SuggestionRow {
    fn from(s: &Suggestion) -> Self {
        Self {
            from: s.from.as_str(),
            from_label: s.from.display_name(),
            to: s.to.as_str(),
            to_label: s.to.display_name(),
            amount: format_amount(s.amount),
            amount_value: format!("{:.2}", s.amount),
        }
    }
}

#[derive(Template)]
#[template(path = "reimbursements.html")]
struct ReimbursementsTemplate {
    username: String,
    show_error: bool,
    error_message: String,
    fair_share: String,
    balances: Vec<BalanceRow>,
    balanced: bool,
    suggestions: Vec<SuggestionRow>,
}

#[derive(Deserialize)]
struct PageQuery {
    error: Option<String>,
}

async fn reimbursements_page(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let session = current.require_user()?;
    let totals = state.backend.driver_totals(&session.token).await?;
    let snapshot = Snapshot::from_totals(&totals);

    let suggestions = match Settlement::from_snapshot(&snapshot) {
        Settlement::Balanced => Vec::new(),
        Settlement::Pending(pending) => pending.iter().map(SuggestionRow::from).collect(),
    };

    Ok(AskamaTemplateResponse::into_response(ReimbursementsTemplate {
        username: session.username.clone(),
        show_error: query.error.is_some(),
        error_message: query.error.unwrap_or_default(),
        fair_share: format_amount(snapshot.fair_share),
        balances: snapshot
            .drivers
            .iter()
            .map(|row| BalanceRow {
                driver: row.driver.display_name(),
                total: format_amount(row.total),
                balance: format_amount(row.balance),
                owes: row.balance < 0.0,
            })
            .collect(),
        balanced: suggestions.is_empty(),
        suggestions,
    }))
}

#[derive(Deserialize)]
struct ConfirmForm {
    from: Driver,
    to: Driver,
    amount: f64,
}

/// Records a suggested transfer as a reimbursement invoice.
///
/// A rejected transfer goes back to the page with the message in `?error=`.
async fn confirm_reimbursement(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<ConfirmForm>,
) -> Result<Redirect, AppError> {
    let session = current.require_user()?;
    let suggestion = Suggestion {
        from: form.from,
        to: form.to,
        amount: form.amount,
    };
    let invoice = suggestion.to_invoice(Local::now().date_naive()).normalized();
    if let Err(errors) = validate_invoice(&invoice) {
        warn!(from = %form.from, to = %form.to, amount = form.amount, "reimbursement rejected");
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("error", errors.message())
            .finish();
        return Ok(Redirect::to(&format!("/reimbursements?{query}")));
    }
    let id = state
        .backend
        .create_invoice(&session.token, &invoice, None)
        .await?;
    info!(%id, from = %form.from, to = %form.to, "reimbursement confirmed");
    Ok(Redirect::to("/reimbursements"))
}

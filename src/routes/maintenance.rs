use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate};

use crate::{
    actions::{decode, maintenance, require_session, ActionError, ActionPayload, Mutation},
    auth::CurrentUser,
    error::AppError,
    models::maintenance::Maintenance,
    state::AppState,
};

use super::format_optional_date;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(maintenance_list))
        .route("/action", post(maintenance_action))
}

struct MaintenanceRow {
    id: String,
    kind: String,
    due_date: String,
    due_mileage: String,
    completed: String,
    description: String,
    state: &'static str,
    overdue: bool,
}

impl MaintenanceRow {
    fn new(record: Maintenance, today: NaiveDate, mileage: Option<u32>) -> Self {
        let state = record.fields.due_state(today, mileage);
        let f = record.fields;
        let completed = match (f.completed_date, f.completed_mileage) {
            (None, None) => String::new(),
            (date, Some(km)) => format!("{} / {km} km", format_optional_date(date)),
            (date, None) => format_optional_date(date),
        };
        Self {
            id: record.id,
            kind: f.kind,
            due_date: format_optional_date(f.due_date),
            due_mileage: f.due_mileage.map(|m| format!("{m} km")).unwrap_or_default(),
            completed,
            description: f.description.unwrap_or_default(),
            state: state.label(),
            overdue: state.is_overdue(),
        }
    }
}

#[derive(Template)]
#[template(path = "maintenance/list.html")]
struct MaintenanceListTemplate {
    username: String,
    mileage: String,
    overdue_count: usize,
    records: Vec<MaintenanceRow>,
}

async fn maintenance_list(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let session = current.require_user()?;
    let records = state.backend.list_maintenance(&session.token).await?;
    let mileage = state.backend.car_mileage(&session.token).await?;
    let today = Local::now().date_naive();

    let mut rows: Vec<_> = records
        .into_iter()
        .map(|r| MaintenanceRow::new(r, today, mileage))
        .collect();
    rows.sort_by_key(|r| !r.overdue);

    Ok(AskamaTemplateResponse::into_response(MaintenanceListTemplate {
        username: session.username.clone(),
        mileage: mileage
            .map(|m| format!("{m} km"))
            .unwrap_or_else(|| "unknown".into()),
        overdue_count: rows.iter().filter(|r| r.overdue).count(),
        records: rows,
    }))
}

async fn maintenance_action(
    State(state): State<AppState>,
    current: CurrentUser,
    payload: ActionPayload,
) -> Result<Json<Mutation>, ActionError> {
    let session = require_session(current.session())?;
    let action = decode(payload.value)?;
    maintenance::dispatch(state.backend.as_ref(), session, action)
        .await
        .map(Json)
}

pub mod chat;
pub mod invoices;
pub mod maintenance;
pub mod public;
pub mod reimbursements;
pub mod trips;

use axum::Router;
use chrono::NaiveDate;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{models::driver::Driver, state::AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(public::router())
        .nest("/trips", trips::router())
        .nest("/invoices", invoices::router())
        .nest("/maintenance", maintenance::router())
        .nest("/reimbursements", reimbursements::router())
        .nest("/chat", chat::router())
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A `<select>`/checkbox entry for one driver.
#[derive(Clone)]
struct DriverOption {
    value: &'static str,
    label: &'static str,
}

fn driver_options() -> Vec<DriverOption> {
    Driver::ALL
        .iter()
        .map(|d| DriverOption {
            value: d.as_str(),
            label: d.display_name(),
        })
        .collect()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

fn format_optional_date(date: Option<NaiveDate>) -> String {
    date.map(format_date).unwrap_or_else(|| "–".into())
}

fn format_amount(amount: f64) -> String {
    format!("{amount:.2} €")
}

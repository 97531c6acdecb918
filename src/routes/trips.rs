use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::{
    actions::{
        decode, require_session,
        trip::{self, TripOutcome},
        ActionError, ActionPayload,
    },
    auth::CurrentUser,
    error::AppError,
    models::trip::Trip,
    state::AppState,
};

use super::{driver_options, format_date, DriverOption};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(trips_list))
        .route("/action", post(trip_action))
        .route("/:id", get(trip_detail))
}

#[derive(Clone)]
struct TripRow {
    id: String,
    name: String,
    period: String,
    distance: String,
    drivers: String,
}

impl From<Trip> for TripRow {
    fn from(trip: Trip) -> Self {
        Self {
            period: period(&trip),
            distance: trip.fields.distance_text(),
            drivers: trip.fields.drivers_text(),
            name: trip.fields.name,
            id: trip.id,
        }
    }
}

fn period(trip: &Trip) -> String {
    let start = format_date(trip.fields.start_date);
    if trip.fields.start_date == trip.fields.end_date {
        start
    } else {
        format!("{start} – {}", format_date(trip.fields.end_date))
    }
}

#[derive(Template)]
#[template(path = "trips/list.html")]
struct TripsListTemplate {
    username: String,
    total_distance: String,
    trips: Vec<TripRow>,
    drivers: Vec<DriverOption>,
}

async fn trips_list(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let session = current.require_user()?;
    let mut trips = state.backend.list_trips(&session.token).await?;
    let stats = state.backend.user_stats(&session.token).await?;
    trips.sort_by(|a, b| b.fields.start_date.cmp(&a.fields.start_date));
    Ok(AskamaTemplateResponse::into_response(TripsListTemplate {
        username: session.username.clone(),
        total_distance: format!("{:.1} km", stats.total_distance),
        trips: trips.into_iter().map(TripRow::from).collect(),
        drivers: driver_options(),
    }))
}

#[derive(Template)]
#[template(path = "trips/detail.html")]
struct TripDetailTemplate {
    trip: TripRow,
    comment: String,
    raw_json: String,
}

async fn trip_detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = current.require_user()?;
    let trip = state.backend.get_trip(&session.token, &trip_id).await?;
    let raw_json = serde_json::to_string_pretty(&trip).map_err(|err| AppError::Other(err.into()))?;
    let comment = trip
        .fields
        .comment
        .clone()
        .unwrap_or_else(|| "No comment".into());
    Ok(AskamaTemplateResponse::into_response(TripDetailTemplate {
        trip: TripRow::from(trip),
        comment,
        raw_json,
    }))
}

async fn trip_action(
    State(state): State<AppState>,
    current: CurrentUser,
    payload: ActionPayload,
) -> Result<Json<TripOutcome>, ActionError> {
    let session = require_session(current.session())?;
    let action = decode(payload.value)?;
    trip::dispatch(state.backend.as_ref(), session, action)
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
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{
        models::session::Session,
        routes::create_router,
        services::memory::{memory_token, MemoryBackend},
        test_support,
    };

    fn session() -> Session {
        Session {
            username: "anna".into(),
            token: memory_token("anna"),
        }
    }

    async fn post_action(app: axum::Router, cookie: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = Request::post("/trips/action").header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        let res = app
            .oneshot(req.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn create_action_answers_with_id_and_stats() {
        let backend = MemoryBackend::new().with_user("anna", "pw");
        let state = test_support::state(Arc::new(backend));
        let cookie = test_support::session_cookie(&state, &session());
        let (status, body) = post_action(
            create_router(state),
            Some(&cookie),
            json!({
                "_tag": "create",
                "trip": {
                    "name": "Harz",
                    "start_date": "2024-10-01",
                    "end_date": "2024-10-03",
                    "distance": 250,
                    "drivers": ["anna", "ben"]
                }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["_tag"], "create");
        assert!(body["id"].as_str().is_some());
        assert_eq!(body["stats"]["total_distance"], 250.0);
    }

    #[tokio::test]
    async fn validation_error_is_structured() {
        let backend = MemoryBackend::new().with_user("anna", "pw");
        let state = test_support::state(Arc::new(backend.clone()));
        let cookie = test_support::session_cookie(&state, &session());
        let (status, body) = post_action(
            create_router(state),
            Some(&cookie),
            json!({
                "_tag": "create",
                "trip": {
                    "name": "Harz",
                    "start_date": "2024-10-01",
                    "end_date": "2024-10-03",
                    "drivers": []
                }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["_tag"], "validation");
        assert_eq!(body["message"], crate::validation::NO_DRIVERS);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn missing_session_is_unauthorized() {
        let backend = MemoryBackend::new();
        let (status, body) = post_action(
            create_router(test_support::state(Arc::new(backend))),
            None,
            json!({ "_tag": "delete", "id": "trip-1" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["_tag"], "unauthorized");
    }

    #[tokio::test]
    async fn unknown_tag_is_an_error_not_a_noop() {
        let backend = MemoryBackend::new().with_user("anna", "pw");
        let state = test_support::state(Arc::new(backend.clone()));
        let cookie = test_support::session_cookie(&state, &session());
        let (status, body) = post_action(
            create_router(state),
            Some(&cookie),
            json!({ "_tag": "archive", "id": "trip-1" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["_tag"], "simple");
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn missing_trip_page_is_404_and_anonymous_list_redirects() {
        let backend = MemoryBackend::new().with_user("anna", "pw");
        let state = test_support::state(Arc::new(backend));
        let cookie = test_support::session_cookie(&state, &session());
        let app = create_router(state);

        let res = app
            .clone()
            .oneshot(
                Request::get("/trips/trip-404")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = app
            .oneshot(Request::get("/trips").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/login");
    }
}

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    models::{
        session::Session,
        trip::{NewTrip, Trip, UserStats},
    },
    services::backend::BackendApi,
    validation::validate_trip,
};

use super::{ActionError, Mutation, MutationTag};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "_tag", rename_all = "kebab-case")]
pub enum TripAction {
    Create { trip: NewTrip },
    Update { trip: Trip },
    Delete { id: String },
    CalculateDistance { from: String, to: String },
    FindCities { query: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TripOutcome {
    /// A mutation plus refreshed totals, so the page can update in place.
    Mutated {
        #[serde(flatten)]
        mutation: Mutation,
        /// Missing when the refresh failed after the mutation went through.
        stats: Option<UserStats>,
    },
    Distance {
        distance: f64,
    },
    Cities {
        cities: Vec<String>,
    },
}

pub async fn dispatch(
    backend: &dyn BackendApi,
    session: &Session,
    action: TripAction,
) -> Result<TripOutcome, ActionError> {
    let token = session.token.as_str();
    let mutation = match action {
        TripAction::Create { trip } => {
            let trip = trip.normalized();
            validate_trip(&trip)?;
            let id = backend.create_trip(token, &trip).await?;
            Mutation {
                id,
                tag: MutationTag::Create,
            }
        }
        TripAction::Update { trip } => {
            let trip = Trip {
                id: trip.id,
                fields: trip.fields.normalized(),
            };
            validate_trip(&trip.fields)?;
            let id = backend.update_trip(token, &trip).await?;
            Mutation {
                id,
                tag: MutationTag::Update,
            }
        }
        TripAction::Delete { id } => {
            let id = backend.delete_trip(token, &id).await?;
            Mutation {
                id,
                tag: MutationTag::Delete,
            }
        }
        TripAction::CalculateDistance { from, to } => {
            let distance = backend
                .calculate_distance(token, from.trim(), to.trim())
                .await?;
            return Ok(TripOutcome::Distance { distance });
        }
        TripAction::FindCities { query } => {
            let cities = backend.find_cities(token, query.trim()).await?;
            return Ok(TripOutcome::Cities { cities });
        }
    };

    info!(user = %session.username, id = %mutation.id, tag = ?mutation.tag, "trip saved");
    let stats = match backend.user_stats(token).await {
        Ok(stats) => Some(stats),
        Err(err) => {
            warn!(error = %err, id = %mutation.id, "stats refresh failed after trip mutation");
            None
        }
    };
    Ok(TripOutcome::Mutated { mutation, stats })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{
        actions::decode,
        models::driver::Driver,
        services::memory::{memory_token, MemoryBackend},
        validation::{NO_DRIVERS, START_AFTER_END},
    };

    fn session() -> Session {
        Session {
            username: "anna".into(),
            token: memory_token("anna"),
        }
    }

    fn backend() -> MemoryBackend {
        MemoryBackend::new().with_user("anna", "secret")
    }

    fn create(drivers: Vec<Driver>, start: u32, end: u32) -> TripAction {
        TripAction::Create {
            trip: NewTrip {
                name: "Lake".into(),
                start_date: NaiveDate::from_ymd_opt(2024, 8, start).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 8, end).unwrap(),
                distance: Some(80.0),
                drivers,
                comment: None,
            },
        }
    }

    #[tokio::test]
    async fn create_returns_id_and_fresh_stats() {
        let backend = backend();
        let out = dispatch(&backend, &session(), create(vec![Driver::Anna], 1, 2))
            .await
            .unwrap();
        match out {
            TripOutcome::Mutated { mutation, stats } => {
                assert_eq!(mutation.tag, MutationTag::Create);
                assert!(!mutation.id.is_empty());
                assert_eq!(stats.map(|s| s.total_distance), Some(80.0));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_trips_never_reach_the_backend() {
        let backend = backend();
        let err = dispatch(&backend, &session(), create(vec![], 1, 2))
            .await
            .unwrap_err();
        assert_eq!(err.message(), NO_DRIVERS);

        let err = dispatch(&backend, &session(), create(vec![Driver::Ben], 5, 2))
            .await
            .unwrap_err();
        assert_eq!(err.message(), START_AFTER_END);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn delete_removes_trip_from_listing() {
        let backend = backend();
        let session = session();
        let TripOutcome::Mutated { mutation, .. } =
            dispatch(&backend, &session, create(vec![Driver::Clara], 1, 1))
                .await
                .unwrap()
        else {
            panic!("expected mutation");
        };
        let out = dispatch(
            &backend,
            &session,
            TripAction::Delete {
                id: mutation.id.clone(),
            },
        )
        .await
        .unwrap();
        let TripOutcome::Mutated { mutation: deleted, stats } = out else {
            panic!("expected mutation");
        };
        assert_eq!(deleted.tag, MutationTag::Delete);
        assert_eq!(deleted.id, mutation.id);
        assert_eq!(stats.map(|s| s.total_distance), Some(0.0));
        assert!(backend.list_trips(&session.token).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unauthorized_backend_is_distinguishable() {
        let backend = backend();
        backend.fail_with(401, "token expired");
        let err = dispatch(&backend, &session(), create(vec![Driver::Anna], 1, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Unauthorized { .. }));
        assert!(err.message().contains("token expired"));
        assert!(err.message().contains("POST"));
    }

    #[tokio::test]
    async fn failed_stats_refresh_still_reports_the_create() {
        let backend = backend();
        backend.fail_path("users/me/stats", 500, "stats offline");
        let session = session();
        let out = dispatch(&backend, &session, create(vec![Driver::Anna], 1, 2))
            .await
            .unwrap();
        let TripOutcome::Mutated { mutation, stats } = out else {
            panic!("expected mutation");
        };
        assert_eq!(mutation.tag, MutationTag::Create);
        assert_eq!(stats, None);
        assert_eq!(backend.list_trips(&session.token).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn queries_do_not_mutate() {
        let backend = backend();
        let action: TripAction =
            decode(serde_json::json!({ "_tag": "find-cities", "query": "b" })).unwrap();
        let out = dispatch(&backend, &session(), action).await.unwrap();
        assert_eq!(
            out,
            TripOutcome::Cities {
                cities: vec!["Berlin".into(), "Bremen".into()]
            }
        );

        let action: TripAction = decode(
            serde_json::json!({ "_tag": "calculate-distance", "from": "Berlin", "to": "Berlin" }),
        )
        .unwrap();
        let out = dispatch(&backend, &session(), action).await.unwrap();
        assert_eq!(out, TripOutcome::Distance { distance: 0.0 });
        assert!(backend.list_trips(&session().token).await.unwrap().is_empty());
    }

    #[test]
    fn mutation_serializes_with_tag_and_stats() {
        let out = TripOutcome::Mutated {
            mutation: Mutation {
                id: "trip-1".into(),
                tag: MutationTag::Update,
            },
            stats: Some(UserStats {
                total_distance: 12.5,
            }),
        };
        assert_eq!(
            serde_json::to_value(out).unwrap(),
            serde_json::json!({
                "id": "trip-1",
                "_tag": "update",
                "stats": { "total_distance": 12.5 }
            })
        );
    }
}

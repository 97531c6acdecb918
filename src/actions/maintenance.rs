use serde::Deserialize;
use tracing::info;

use crate::{
    models::{
        maintenance::{Maintenance, NewMaintenance},
        session::Session,
    },
    services::backend::BackendApi,
    validation::validate_maintenance,
};

use super::{ActionError, Mutation, MutationTag};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "_tag", rename_all = "kebab-case")]
pub enum MaintenanceAction {
    Create { maintenance: NewMaintenance },
    Update { maintenance: Maintenance },
    Delete { id: String },
}

pub async fn dispatch(
    backend: &dyn BackendApi,
    session: &Session,
    action: MaintenanceAction,
) -> Result<Mutation, ActionError> {
    let token = session.token.as_str();
    let mutation = match action {
        MaintenanceAction::Create { maintenance } => {
            let record = maintenance.normalized();
            validate_maintenance(&record)?;
            Mutation {
                id: backend.create_maintenance(token, &record).await?,
                tag: MutationTag::Create,
            }
        }
        MaintenanceAction::Update { maintenance } => {
            let record = Maintenance {
                id: maintenance.id,
                fields: maintenance.fields.normalized(),
            };
            validate_maintenance(&record.fields)?;
            Mutation {
                id: backend.update_maintenance(token, &record).await?,
                tag: MutationTag::Update,
            }
        }
        MaintenanceAction::Delete { id } => Mutation {
            id: backend.delete_maintenance(token, &id).await?,
            tag: MutationTag::Delete,
        },
    };
    info!(user = %session.username, id = %mutation.id, tag = ?mutation.tag, "maintenance saved");
    Ok(mutation)
}

use serde::Deserialize;
use tracing::info;

use crate::{
    models::{
        invoice::{Attachment, Invoice, NewInvoice},
        session::Session,
    },
    services::backend::BackendApi,
    validation::validate_invoice,
};

use super::{ActionError, Mutation, MutationTag};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "_tag", rename_all = "kebab-case")]
pub enum InvoiceAction {
    Create { invoice: NewInvoice },
    Update { invoice: Invoice },
    Delete { id: String },
}

/// Runs one invoice action. `attachment` only applies to create and update.
pub async fn dispatch(
    backend: &dyn BackendApi,
    session: &Session,
    action: InvoiceAction,
    attachment: Option<&Attachment>,
) -> Result<Mutation, ActionError> {
    let token = session.token.as_str();
    let mutation = match action {
        InvoiceAction::Create { invoice } => {
            let invoice = invoice.normalized();
            validate_invoice(&invoice)?;
            Mutation {
                id: backend.create_invoice(token, &invoice, attachment).await?,
                tag: MutationTag::Create,
            }
        }
        InvoiceAction::Update { invoice } => {
            let invoice = Invoice {
                id: invoice.id,
                fields: invoice.fields.normalized(),
            };
            validate_invoice(&invoice.fields)?;
            Mutation {
                id: backend.update_invoice(token, &invoice, attachment).await?,
                tag: MutationTag::Update,
            }
        }
        InvoiceAction::Delete { id } => Mutation {
            id: backend.delete_invoice(token, &id).await?,
            tag: MutationTag::Delete,
        },
    };
    info!(user = %session.username, id = %mutation.id, tag = ?mutation.tag, "invoice saved");
    Ok(mutation)
}

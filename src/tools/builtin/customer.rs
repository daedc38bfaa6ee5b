//! Customer lookup and registration.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures::future::try_join_all;
use regex::Regex;

use crate::db::Database;
use crate::models::{AccountContext, ContactAttribute};
use crate::tools::tool::{Tool, ToolError, ToolOutcome, string_param};

/// Whether `value` has the `local@domain.tld` shape.
pub fn is_valid_email(value: &str) -> bool {
    static RE_EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    RE_EMAIL
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(value))
}

/// Reads one attribute of the ticket's contact.
pub struct FindCustomerTool {
    db: Arc<dyn Database>,
}

impl FindCustomerTool {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for FindCustomerTool {
    fn name(&self) -> &str {
        "find_customer"
    }

    fn description(&self) -> &str {
        "Look up a field of the customer in this conversation: name, email, number or any \
         custom field. Returns the value, or null when it is not known."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "field": {
                    "type": "string",
                    "description": "Field to read (name, email, number or a custom field name)"
                }
            },
            "required": ["field"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &AccountContext,
    ) -> Result<ToolOutcome, ToolError> {
        let Some(field) = string_param(&params, "field") else {
            tracing::warn!("Missing 'field' argument");
            return Ok(ToolOutcome::Invalid);
        };

        let details = match self.db.find_ticket(ctx.ticket_id, ctx.company_id).await {
            Ok(details) => details,
            Err(e) => {
                tracing::error!(
                    ticket_id = ctx.ticket_id,
                    error = %e,
                    "Failed to load ticket"
                );
                return Ok(ToolOutcome::Unavailable);
            }
        };

        let Some(contact) = details.and_then(|d| d.contact) else {
            tracing::debug!(ticket_id = ctx.ticket_id, "Contact not found");
            return Ok(ToolOutcome::NotFound);
        };

        let outcome = match field {
            "name" => ToolOutcome::non_empty(&contact.name),
            "email" => ToolOutcome::non_empty(&contact.email),
            "number" => ToolOutcome::non_empty(&contact.number),
            custom => contact
                .custom_field(custom)
                .map_or(ToolOutcome::NotFound, |f| ToolOutcome::non_empty(&f.value)),
        };

        tracing::debug!(
            field,
            found = matches!(outcome, ToolOutcome::Found(_)),
            "Lookup finished"
        );
        Ok(outcome)
    }
}

/// Writes one attribute of the caller's contact.
///
/// `name` and `email` go to the contact record. `number` is accepted and
/// ignored because address changes need a verified flow. Anything else is
/// merged into the custom fields.
pub struct RegisterCustomerTool {
    db: Arc<dyn Database>,
}

impl RegisterCustomerTool {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for RegisterCustomerTool {
    fn name(&self) -> &str {
        "register_customer"
    }

    fn description(&self) -> &str {
        "Save information about the customer in this conversation. Use field name, email \
         or any custom field name. Returns true when saved."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "field": {
                    "type": "string",
                    "description": "Field to write (name, email or a custom field name)"
                },
                "value": {
                    "type": "string",
                    "description": "Value to store"
                }
            },
            "required": ["field", "value"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &AccountContext,
    ) -> Result<ToolOutcome, ToolError> {
        let Some(contact_id) = ctx.contact_id else {
            tracing::warn!(ticket_id = ctx.ticket_id, "Missing contact id");
            return Ok(ToolOutcome::Invalid);
        };

        let mut contact = match self.db.find_contact(contact_id).await {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                tracing::debug!(contact_id, "Contact not found");
                return Ok(ToolOutcome::NotFound);
            }
            Err(e) => {
                tracing::error!(contact_id, error = %e, "Failed to load contact");
                return Ok(ToolOutcome::Unavailable);
            }
        };

        if contact.tenant_id != ctx.company_id {
            tracing::warn!(
                contact_id,
                company_id = ctx.company_id,
                "Contact belongs to another company"
            );
            return Ok(ToolOutcome::Invalid);
        }

        let (Some(field), Some(value)) =
            (string_param(&params, "field"), string_param(&params, "value"))
        else {
            tracing::warn!("Invalid field or value");
            return Ok(ToolOutcome::Invalid);
        };
        if field.is_empty() || value.is_empty() {
            tracing::warn!("Invalid field or value");
            return Ok(ToolOutcome::Invalid);
        }

        let written = match field {
            "number" => {
                tracing::debug!(contact_id, "Ignoring update to number");
                return Ok(ToolOutcome::Ignored);
            }
            "name" if value.trim().is_empty() => {
                tracing::warn!("Name cannot be blank");
                return Ok(ToolOutcome::Invalid);
            }
            "email" if !is_valid_email(value) => {
                tracing::warn!("Invalid email format");
                return Ok(ToolOutcome::Invalid);
            }
            "name" => {
                self.db
                    .update_contact_attribute(contact_id, ContactAttribute::Name, value)
                    .await
            }
            "email" => {
                self.db
                    .update_contact_attribute(contact_id, ContactAttribute::Email, value)
                    .await
            }
            custom => {
                contact.upsert_custom_field(custom, value);
                let db = &self.db;
                try_join_all(
                    contact
                        .custom_fields
                        .iter()
                        .filter(|f| !f.name.is_empty() && !f.value.is_empty())
                        .map(|f| db.upsert_custom_field(contact_id, &f.name, &f.value)),
                )
                .await
                .map(|_| ())
            }
        };

        match written {
            Ok(()) => {
                tracing::info!(contact_id, field, "Contact updated");
                Ok(ToolOutcome::Confirmed)
            }
            Err(e) => {
                tracing::error!(contact_id, error = %e, "Failed to update contact");
                Ok(ToolOutcome::Unavailable)
            }
        }
    }
}

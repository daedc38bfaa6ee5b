//! Domain records shared by the scanner, the replayer and the dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Pending,
    Closed,
    /// Any status this crate does not act on (kept verbatim).
    #[serde(untagged)]
    Other(String),
}

impl TicketStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::Pending => "pending",
            Self::Closed => "closed",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for TicketStatus {
    fn from(s: &str) -> Self {
        match s {
            "open" => Self::Open,
            "pending" => Self::Pending,
            "closed" => Self::Closed,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One tracked conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: i64,
    pub tenant_id: i64,
    pub status: TicketStatus,
    pub updated_at: DateTime<Utc>,
    /// Set while a scan pass is replaying this ticket.
    pub in_progress: bool,
    pub contact_id: i64,
    pub queue_id: Option<i64>,
    pub session_id: Option<i64>,
    pub user_id: Option<i64>,
}

/// AI assistant configuration bound to a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id: i64,
    pub name: String,
}

/// Routing bucket for tickets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Queue {
    pub id: i64,
    pub name: String,
    pub prompt: Option<Prompt>,
}

/// One chat message. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub ticket_id: i64,
    pub body: String,
    /// True when written by an agent or the bot, false when written by the end user.
    pub from_me: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Sort key: creation time, ties broken by id.
    pub fn order_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, self.id.as_str())
    }
}

/// Tenant-defined attribute attached to a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub name: String,
    pub value: String,
}

/// End-user identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    /// Numeric channel address.
    pub number: String,
    pub email: String,
    pub profile_pic_url: Option<String>,
    pub custom_fields: Vec<CustomField>,
}

impl Contact {
    /// Look up a custom field by exact, case-sensitive name.
    pub fn custom_field(&self, name: &str) -> Option<&CustomField> {
        self.custom_fields.iter().find(|f| f.name == name)
    }

    /// Insert a custom field, or overwrite the value of the existing one with that name.
    pub fn upsert_custom_field(&mut self, name: &str, value: &str) {
        match self.custom_fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.value = value.to_string(),
            None => self.custom_fields.push(CustomField {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

/// Built-in contact attributes that can be written directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactAttribute {
    Name,
    Email,
}

impl ContactAttribute {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
        }
    }
}

/// A future action created by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: i64,
    pub body: String,
    pub send_at: DateTime<Utc>,
    pub contact_id: Option<i64>,
    pub tenant_id: i64,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a [`Schedule`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewSchedule {
    pub body: String,
    pub send_at: DateTime<Utc>,
    pub contact_id: Option<i64>,
    pub tenant_id: i64,
    pub user_id: Option<i64>,
}

/// Ticket selected by the candidate query, with the relations the scan needs.
///
/// Only tickets whose queue carries a prompt can be represented here.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTicket {
    pub ticket: Ticket,
    pub contact: Contact,
    pub queue: Queue,
    pub prompt: Prompt,
}

/// Ticket with its contact, as resolved for a function call.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketDetails {
    pub ticket: Ticket,
    pub contact: Option<Contact>,
}

/// Scope of one function call.
///
/// Built once per assistant turn and passed by reference; it is never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountContext {
    pub ticket_id: i64,
    pub contact_id: Option<i64>,
    pub company_id: i64,
    pub user_id: Option<i64>,
}

impl AccountContext {
    pub fn new(ticket_id: i64, company_id: i64) -> Self {
        Self {
            ticket_id,
            contact_id: None,
            company_id,
            user_id: None,
        }
    }

    pub fn with_contact(mut self, contact_id: i64) -> Self {
        self.contact_id = Some(contact_id);
        self
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

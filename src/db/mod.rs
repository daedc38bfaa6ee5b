//! Datastore access.
//!
//! [`Database`] is the only path through which tickets, contacts, custom
//! fields, messages and schedules are read or mutated. The scanner and the
//! function dispatcher never cache what it returns across calls.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::models::{
    CandidateTicket, Contact, ContactAttribute, Message, NewSchedule, Schedule, TicketDetails,
};

pub use memory::MemoryStore;
pub use postgres::Store;

/// Database abstraction layer.
#[async_trait]
pub trait Database: Send + Sync {
    // --- Tickets ---

    /// Open tickets that are not being replayed and whose queue has a prompt.
    async fn find_stale_open_tickets(
        &self,
        tenant_id: Option<i64>,
    ) -> Result<Vec<CandidateTicket>, DatabaseError>;

    /// Resolve a ticket (scoped to its tenant) together with its contact.
    async fn find_ticket(
        &self,
        ticket_id: i64,
        tenant_id: i64,
    ) -> Result<Option<TicketDetails>, DatabaseError>;

    /// Set or clear the in-progress marker of one ticket. Idempotent.
    async fn set_in_progress(&self, ticket_id: i64, in_progress: bool)
        -> Result<(), DatabaseError>;

    /// Clear the in-progress marker for every ticket in `ticket_ids` at once.
    async fn clear_in_progress(&self, ticket_ids: &[i64]) -> Result<(), DatabaseError>;

    /// Clear markers set before `marked_before`, or with no recorded set time.
    ///
    /// Markers held by a live pass are newer than any sensible cutoff and
    /// are left alone. Returns how many tickets were released.
    async fn release_abandoned_markers(
        &self,
        marked_before: DateTime<Utc>,
    ) -> Result<u64, DatabaseError>;

    // --- Messages ---

    /// Most recent message written by the end user.
    async fn latest_inbound_message(&self, ticket_id: i64)
        -> Result<Option<Message>, DatabaseError>;

    /// Messages of the ticket, newest first (creation time, then id).
    async fn pending_inbound_messages(&self, ticket_id: i64)
        -> Result<Vec<Message>, DatabaseError>;

    // --- Contacts ---

    async fn find_contact(&self, contact_id: i64) -> Result<Option<Contact>, DatabaseError>;

    async fn update_contact_attribute(
        &self,
        contact_id: i64,
        attribute: ContactAttribute,
        value: &str,
    ) -> Result<(), DatabaseError>;

    /// Insert the field if absent, overwrite its value if present.
    async fn upsert_custom_field(
        &self,
        contact_id: i64,
        name: &str,
        value: &str,
    ) -> Result<(), DatabaseError>;

    // --- Schedules ---

    async fn create_schedule(&self, record: &NewSchedule) -> Result<Schedule, DatabaseError>;

    /// Number of schedules of the tenant at exactly `send_at`.
    async fn count_schedules_at(
        &self,
        send_at: DateTime<Utc>,
        tenant_id: i64,
    ) -> Result<i64, DatabaseError>;
}

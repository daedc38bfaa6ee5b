//! In-process implementation of [`Database`].
//!
//! Mirrors the PostgreSQL semantics closely enough to drive the scanner and
//! the dispatcher in tests. It also records writes and can be told to fail,
//! which is how error isolation is exercised.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::Database;
use crate::error::DatabaseError;
use crate::models::{
    CandidateTicket, Contact, ContactAttribute, Message, NewSchedule, Queue, Schedule, Ticket,
    TicketDetails, TicketStatus,
};

/// A write the store accepted, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    InProgress { ticket_id: i64, value: bool },
    ContactAttribute { contact_id: i64, attribute: ContactAttribute, value: String },
    CustomField { contact_id: i64, name: String, value: String },
    Schedule { id: i64 },
}

#[derive(Default)]
struct State {
    tickets: HashMap<i64, Ticket>,
    marked_at: HashMap<i64, DateTime<Utc>>,
    queues: HashMap<i64, Queue>,
    contacts: HashMap<i64, Contact>,
    messages: Vec<Message>,
    schedules: Vec<Schedule>,
    writes: Vec<Write>,
    fail_reads: bool,
    fail_writes: bool,
}

/// Datastore kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_ticket(&self, ticket: Ticket) {
        self.lock().tickets.insert(ticket.id, ticket);
    }

    pub fn insert_queue(&self, queue: Queue) {
        self.lock().queues.insert(queue.id, queue);
    }

    pub fn insert_contact(&self, contact: Contact) {
        self.lock().contacts.insert(contact.id, contact);
    }

    pub fn insert_message(&self, message: Message) {
        self.lock().messages.push(message);
    }

    pub fn ticket(&self, id: i64) -> Option<Ticket> {
        self.lock().tickets.get(&id).cloned()
    }

    pub fn contact(&self, id: i64) -> Option<Contact> {
        self.lock().contacts.get(&id).cloned()
    }

    pub fn schedules(&self) -> Vec<Schedule> {
        self.lock().schedules.clone()
    }

    /// Every accepted write so far.
    pub fn writes(&self) -> Vec<Write> {
        self.lock().writes.clone()
    }

    /// Make every read return [`DatabaseError::Unavailable`].
    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Make every write return [`DatabaseError::Unavailable`].
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    fn read(&self) -> Result<MutexGuard<'_, State>, DatabaseError> {
        let state = self.lock();
        if state.fail_reads {
            return Err(DatabaseError::Unavailable("reads disabled".to_string()));
        }
        Ok(state)
    }

    fn write(&self) -> Result<MutexGuard<'_, State>, DatabaseError> {
        let state = self.lock();
        if state.fail_writes {
            return Err(DatabaseError::Unavailable("writes disabled".to_string()));
        }
        Ok(state)
    }
}

fn newest_first(a: &Message, b: &Message) -> std::cmp::Ordering {
    b.order_key().cmp(&a.order_key())
}

#[async_trait]
impl Database for MemoryStore {
    async fn find_stale_open_tickets(
        &self,
        tenant_id: Option<i64>,
    ) -> Result<Vec<CandidateTicket>, DatabaseError> {
        let state = self.read()?;
        let mut candidates: Vec<CandidateTicket> = state
            .tickets
            .values()
            .filter(|t| t.status == TicketStatus::Open && !t.in_progress)
            .filter(|t| tenant_id.is_none_or(|tenant| t.tenant_id == tenant))
            .filter_map(|t| {
                let queue = state.queues.get(&t.queue_id?)?;
                let prompt = queue.prompt.clone()?;
                let contact = state.contacts.get(&t.contact_id)?;
                Some(CandidateTicket {
                    ticket: t.clone(),
                    contact: contact.clone(),
                    queue: queue.clone(),
                    prompt,
                })
            })
            .collect();
        candidates.sort_by_key(|c| c.ticket.id);
        Ok(candidates)
    }

    async fn find_ticket(
        &self,
        ticket_id: i64,
        tenant_id: i64,
    ) -> Result<Option<TicketDetails>, DatabaseError> {
        let state = self.read()?;
        Ok(state
            .tickets
            .get(&ticket_id)
            .filter(|t| t.tenant_id == tenant_id)
            .map(|t| TicketDetails {
                ticket: t.clone(),
                contact: state.contacts.get(&t.contact_id).cloned(),
            }))
    }

    async fn set_in_progress(
        &self,
        ticket_id: i64,
        in_progress: bool,
    ) -> Result<(), DatabaseError> {
        let mut state = self.write()?;
        if let Some(ticket) = state.tickets.get_mut(&ticket_id) {
            ticket.in_progress = in_progress;
        }
        if in_progress {
            state.marked_at.insert(ticket_id, Utc::now());
        } else {
            state.marked_at.remove(&ticket_id);
        }
        state.writes.push(Write::InProgress {
            ticket_id,
            value: in_progress,
        });
        Ok(())
    }

    async fn clear_in_progress(&self, ticket_ids: &[i64]) -> Result<(), DatabaseError> {
        let mut state = self.write()?;
        for id in ticket_ids {
            if let Some(ticket) = state.tickets.get_mut(id) {
                ticket.in_progress = false;
            }
            state.marked_at.remove(id);
            state.writes.push(Write::InProgress {
                ticket_id: *id,
                value: false,
            });
        }
        Ok(())
    }

    async fn release_abandoned_markers(
        &self,
        marked_before: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let mut state = self.write()?;
        let stuck: Vec<i64> = state
            .tickets
            .values()
            .filter(|t| t.in_progress)
            .filter(|t| {
                state
                    .marked_at
                    .get(&t.id)
                    .is_none_or(|at| *at < marked_before)
            })
            .map(|t| t.id)
            .collect();
        for id in &stuck {
            if let Some(ticket) = state.tickets.get_mut(id) {
                ticket.in_progress = false;
            }
            state.marked_at.remove(id);
            state.writes.push(Write::InProgress {
                ticket_id: *id,
                value: false,
            });
        }
        Ok(stuck.len() as u64)
    }

    async fn latest_inbound_message(
        &self,
        ticket_id: i64,
    ) -> Result<Option<Message>, DatabaseError> {
        let state = self.read()?;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.ticket_id == ticket_id && !m.from_me)
            .max_by(|a, b| a.order_key().cmp(&b.order_key()))
            .cloned())
    }

    async fn pending_inbound_messages(
        &self,
        ticket_id: i64,
    ) -> Result<Vec<Message>, DatabaseError> {
        let state = self.read()?;
        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.ticket_id == ticket_id)
            .cloned()
            .collect();
        messages.sort_by(newest_first);
        Ok(messages)
    }

    async fn find_contact(&self, contact_id: i64) -> Result<Option<Contact>, DatabaseError> {
        Ok(self.read()?.contacts.get(&contact_id).cloned())
    }

    async fn update_contact_attribute(
        &self,
        contact_id: i64,
        attribute: ContactAttribute,
        value: &str,
    ) -> Result<(), DatabaseError> {
        let mut state = self.write()?;
        let contact = state
            .contacts
            .get_mut(&contact_id)
            .ok_or(DatabaseError::NotFound {
                entity: "contact",
                id: contact_id,
            })?;
        match attribute {
            ContactAttribute::Name => contact.name = value.to_string(),
            ContactAttribute::Email => contact.email = value.to_string(),
        }
        state.writes.push(Write::ContactAttribute {
            contact_id,
            attribute,
            value: value.to_string(),
        });
        Ok(())
    }

    async fn upsert_custom_field(
        &self,
        contact_id: i64,
        name: &str,
        value: &str,
    ) -> Result<(), DatabaseError> {
        let mut state = self.write()?;
        let contact = state
            .contacts
            .get_mut(&contact_id)
            .ok_or(DatabaseError::NotFound {
                entity: "contact",
                id: contact_id,
            })?;
        contact.upsert_custom_field(name, value);
        state.writes.push(Write::CustomField {
            contact_id,
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn create_schedule(&self, record: &NewSchedule) -> Result<Schedule, DatabaseError> {
        let mut state = self.write()?;
        let schedule = Schedule {
            id: state.schedules.len() as i64 + 1,
            body: record.body.clone(),
            send_at: record.send_at,
            contact_id: record.contact_id,
            tenant_id: record.tenant_id,
            user_id: record.user_id,
            created_at: Utc::now(),
        };
        state.schedules.push(schedule.clone());
        state.writes.push(Write::Schedule { id: schedule.id });
        Ok(schedule)
    }

    async fn count_schedules_at(
        &self,
        send_at: DateTime<Utc>,
        tenant_id: i64,
    ) -> Result<i64, DatabaseError> {
        let state = self.read()?;
        Ok(state
            .schedules
            .iter()
            .filter(|s| s.send_at == send_at && s.tenant_id == tenant_id)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::Prompt;

    fn ticket(id: i64, queue_id: i64) -> Ticket {
        Ticket {
            id,
            tenant_id: 1,
            status: TicketStatus::Open,
            updated_at: Utc::now(),
            in_progress: false,
            contact_id: 10,
            queue_id: Some(queue_id),
            session_id: Some(1),
            user_id: None,
        }
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_contact(Contact {
            id: 10,
            tenant_id: 1,
            name: "Ana".to_string(),
            number: "5511999999999".to_string(),
            email: String::new(),
            profile_pic_url: None,
            custom_fields: Vec::new(),
        });
        store.insert_queue(Queue {
            id: 1,
            name: "ai".to_string(),
            prompt: Some(Prompt {
                id: 1,
                name: "assistant".to_string(),
            }),
        });
        store.insert_queue(Queue {
            id: 2,
            name: "humans".to_string(),
            prompt: None,
        });
        store
    }

    #[tokio::test]
    async fn test_candidates_require_prompt_and_open_status() {
        let store = seeded();
        store.insert_ticket(ticket(1, 1));
        store.insert_ticket(ticket(2, 2));
        let mut closed = ticket(3, 1);
        closed.status = TicketStatus::Closed;
        store.insert_ticket(closed);
        let mut busy = ticket(4, 1);
        busy.in_progress = true;
        store.insert_ticket(busy);

        let ids: Vec<i64> = store
            .find_stale_open_tickets(None)
            .await
            .unwrap()
            .iter()
            .map(|c| c.ticket.id)
            .collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn test_messages_newest_first_with_id_tiebreak() {
        let store = seeded();
        let at = Utc::now();
        for (id, offset) in [("a", 2), ("b", 1), ("c", 1)] {
            store.insert_message(Message {
                id: id.to_string(),
                ticket_id: 1,
                body: id.to_string(),
                from_me: false,
                created_at: at - Duration::minutes(offset),
                updated_at: at,
            });
        }

        let ids: Vec<String> = store
            .pending_inbound_messages(1)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_release_clears_markers_without_set_time() {
        let store = seeded();
        let mut stuck = ticket(5, 1);
        stuck.in_progress = true;
        store.insert_ticket(stuck);
        store.insert_ticket(ticket(6, 1));

        let cutoff = Utc::now() - Duration::minutes(4);
        assert_eq!(store.release_abandoned_markers(cutoff).await.unwrap(), 1);
        assert!(!store.ticket(5).unwrap().in_progress);
    }

    #[tokio::test]
    async fn test_release_keeps_recent_markers() {
        let store = seeded();
        store.insert_ticket(ticket(5, 1));
        store.set_in_progress(5, true).await.unwrap();

        let cutoff = Utc::now() - Duration::minutes(4);
        assert_eq!(store.release_abandoned_markers(cutoff).await.unwrap(), 0);
        assert!(store.ticket(5).unwrap().in_progress);

        // Once the cutoff passes the set time the marker counts as abandoned
        let cutoff = Utc::now() + Duration::seconds(1);
        assert_eq!(store.release_abandoned_markers(cutoff).await.unwrap(), 1);
        assert!(!store.ticket(5).unwrap().in_progress);
    }

    #[tokio::test]
    async fn test_failing_writes_leave_state_untouched() {
        let store = seeded();
        store.fail_writes(true);

        assert!(store.upsert_custom_field(10, "plan", "gold").await.is_err());
        assert!(store.contact(10).unwrap().custom_fields.is_empty());
        assert!(store.writes().is_empty());
    }
}

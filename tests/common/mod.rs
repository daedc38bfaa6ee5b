//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};

use wasbot::channels::{ChatTransport, InboundEvent};
use wasbot::db::MemoryStore;
use wasbot::error::ChannelError;
use wasbot::models::{
    Contact, CustomField, Message, Prompt, Queue, Ticket, TicketStatus,
};

pub const TENANT: i64 = 7;
pub const AI_QUEUE: i64 = 1;
pub const HUMAN_QUEUE: i64 = 2;

/// One delivery seen by [`RecordingTransport`].
#[derive(Debug, Clone)]
pub struct Delivery {
    pub session_id: i64,
    pub ticket_id: i64,
    pub event: InboundEvent,
    /// Whether the ticket's in-progress marker was set when delivery happened.
    pub marked: Option<bool>,
}

/// Transport that records deliveries instead of sending them.
#[derive(Default)]
pub struct RecordingTransport {
    deliveries: Mutex<Vec<Delivery>>,
    failing: Mutex<HashSet<i64>>,
    hanging: Mutex<HashSet<i64>>,
    delay: Mutex<Option<Duration>>,
    store: Option<std::sync::Arc<MemoryStore>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record each ticket's in-progress marker at delivery time.
    pub fn observing(store: std::sync::Arc<MemoryStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }

    pub fn fail_ticket(&self, ticket_id: i64) {
        self.failing.lock().unwrap().insert(ticket_id);
    }

    pub fn hang_ticket(&self, ticket_id: i64) {
        self.hanging.lock().unwrap().insert(ticket_id);
    }

    pub fn delay_each(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn delivered_ids(&self, ticket_id: i64) -> Vec<String> {
        self.deliveries()
            .into_iter()
            .filter(|d| d.ticket_id == ticket_id)
            .map(|d| d.event.message_id)
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(
        &self,
        session_id: i64,
        event: &InboundEvent,
        ticket: &Ticket,
        _contact: &Contact,
    ) -> Result<(), ChannelError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let hang = self.hanging.lock().unwrap().contains(&ticket.id);
        if hang {
            std::future::pending::<()>().await;
        }
        let fail = self.failing.lock().unwrap().contains(&ticket.id);
        if fail {
            return Err(ChannelError::SendFailed {
                name: "recording".to_string(),
                reason: "session closed".to_string(),
            });
        }

        let marked = self
            .store
            .as_ref()
            .and_then(|s| s.ticket(ticket.id))
            .map(|t| t.in_progress);
        self.deliveries.lock().unwrap().push(Delivery {
            session_id,
            ticket_id: ticket.id,
            event: event.clone(),
            marked,
        });
        Ok(())
    }
}

pub fn contact(id: i64) -> Contact {
    Contact {
        id,
        tenant_id: TENANT,
        name: "Ana".to_string(),
        number: "5511999999999".to_string(),
        email: String::new(),
        profile_pic_url: None,
        custom_fields: vec![CustomField {
            name: "plan".to_string(),
            value: "basic".to_string(),
        }],
    }
}

pub fn open_ticket(id: i64, queue_id: i64, contact_id: i64) -> Ticket {
    Ticket {
        id,
        tenant_id: TENANT,
        status: TicketStatus::Open,
        updated_at: Utc::now(),
        in_progress: false,
        contact_id,
        queue_id: Some(queue_id),
        session_id: Some(100 + id),
        user_id: None,
    }
}

pub fn message(id: &str, ticket_id: i64, minutes_ago: i64, from_me: bool) -> Message {
    let at = Utc::now() - TimeDelta::minutes(minutes_ago);
    Message {
        id: id.to_string(),
        ticket_id,
        body: format!("body of {id}"),
        from_me,
        created_at: at,
        updated_at: at,
    }
}

/// Store with one tenant, an AI queue, a human-only queue and contact 10.
pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_queue(Queue {
        id: AI_QUEUE,
        name: "assistant".to_string(),
        prompt: Some(Prompt {
            id: 1,
            name: "support".to_string(),
        }),
    });
    store.insert_queue(Queue {
        id: HUMAN_QUEUE,
        name: "humans".to_string(),
        prompt: None,
    });
    store.insert_contact(contact(10));
    store
}

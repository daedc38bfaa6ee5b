//! Realtime notification fan-out.
//!
//! Notifications are addressed to rooms (ticket status, `"notification"`,
//! ticket id, tenant main channel) and carry an event name plus a JSON
//! payload. Delivery to sockets is someone else's job; this module only
//! publishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::models::{Schedule, Ticket};

/// Room every agent dashboard listens on.
pub const NOTIFICATION_ROOM: &str = "notification";

/// One published notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub rooms: Vec<String>,
    pub event: String,
    pub payload: serde_json::Value,
}

impl Notification {
    /// Ticket-updated event, sent to the status room, the notification room
    /// and the ticket's own room, named after the ticket's tenant.
    pub fn ticket_updated(ticket: &Ticket) -> Self {
        Self {
            rooms: vec![
                ticket.status.to_string(),
                NOTIFICATION_ROOM.to_string(),
                ticket.id.to_string(),
            ],
            event: format!("company-{}-ticket", ticket.tenant_id),
            payload: serde_json::json!({
                "action": "update",
                "ticket": ticket,
            }),
        }
    }

    /// Schedule-created event, sent to the tenant's main channel.
    pub fn schedule_created(schedule: &Schedule) -> Self {
        Self {
            rooms: vec![format!("company-{}-mainchannel", schedule.tenant_id)],
            event: "schedule".to_string(),
            payload: serde_json::json!({
                "action": "create",
                "schedule": schedule,
            }),
        }
    }
}

/// Publish side of the notification channel.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: Notification);
}

/// Broadcasts notifications to every in-process subscriber.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
    published: Arc<AtomicU64>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        // Slow subscribers miss events; the next ticket update supersedes them.
        let (tx, _) = broadcast::channel(256);
        Self {
            tx,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total notifications published so far.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Stream of notifications published after this call.
    pub fn subscribe(&self) -> impl Stream<Item = Notification> + Send + 'static + use<> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|result| result.ok())
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for BroadcastNotifier {
    fn publish(&self, notification: Notification) {
        self.published.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            event = %notification.event,
            rooms = ?notification.rooms,
            "Publishing notification"
        );
        // No subscribers is fine
        let _ = self.tx.send(notification);
    }
}

//! Conversation replay.
//!
//! A stalled ticket is one where the user spoke last and nobody answered.
//! Replaying re-submits those trailing user messages to the conversation
//! engine as if they had just arrived, oldest first.

use std::sync::Arc;

use crate::channels::{ChatTransport, InboundEvent, Notification, NotificationSink};
use crate::db::Database;
use crate::error::{ChannelError, ReplayError};
use crate::models::{CandidateTicket, Message};

/// Messages after the last agent/bot reply, in chronological order.
///
/// `newest_first` must be sorted newest to oldest. Collection stops at the
/// first message with `from_me` set; that message is not included.
pub fn trailing_unanswered(newest_first: &[Message]) -> Vec<Message> {
    let mut window: Vec<Message> = newest_first
        .iter()
        .take_while(|m| !m.from_me)
        .cloned()
        .collect();
    window.reverse();
    window
}

/// Re-submits unanswered inbound messages through the chat transport.
pub struct Replayer {
    db: Arc<dyn Database>,
    transport: Arc<dyn ChatTransport>,
    notifier: Arc<dyn NotificationSink>,
}

impl Replayer {
    pub fn new(
        db: Arc<dyn Database>,
        transport: Arc<dyn ChatTransport>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            db,
            transport,
            notifier,
        }
    }

    /// Replay one ticket. Returns how many messages were delivered.
    ///
    /// Every delivery is awaited before the next one starts. The
    /// ticket-updated notification goes out once all of them completed and
    /// carries the ticket as currently stored, falling back to the candidate
    /// snapshot when it cannot be re-read.
    pub async fn replay(&self, candidate: &CandidateTicket) -> Result<usize, ReplayError> {
        let ticket = &candidate.ticket;
        let session_id = ticket
            .session_id
            .ok_or(ChannelError::NoSession {
                ticket_id: ticket.id,
            })?;

        let messages = self.db.pending_inbound_messages(ticket.id).await?;
        let window = trailing_unanswered(&messages);

        tracing::debug!(
            ticket_id = ticket.id,
            pending = window.len(),
            transport = self.transport.name(),
            "Replaying unanswered messages"
        );

        for message in &window {
            let event = InboundEvent::from_message(&candidate.contact, message);
            self.transport
                .deliver(session_id, &event, ticket, &candidate.contact)
                .await?;
        }

        let current = match self.db.find_ticket(ticket.id, ticket.tenant_id).await {
            Ok(Some(details)) => details.ticket,
            Ok(None) => ticket.clone(),
            Err(e) => {
                tracing::warn!(ticket_id = ticket.id, error = %e, "Failed to re-read ticket");
                ticket.clone()
            }
        };
        self.notifier.publish(Notification::ticket_updated(&current));

        Ok(window.len())
    }
}

//! Chat-session transport trait and the synthetic inbound event it carries.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ChannelError;
use crate::models::{Contact, Message, Ticket};

/// Suffix that turns a contact number into a remote address.
pub const REMOTE_ADDRESS_SUFFIX: &str = "@s.whatsapp.net";

/// An inbound message re-submitted to the conversation engine.
///
/// Looks exactly like a message the end user just sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub remote_address: String,
    /// Always false: the event impersonates the end user.
    pub from_me: bool,
    pub message_id: String,
    pub timestamp_secs: i64,
    pub text: String,
}

impl InboundEvent {
    /// Build the replay event for a stored user message.
    pub fn from_message(contact: &Contact, message: &Message) -> Self {
        Self {
            remote_address: remote_address(&contact.number),
            from_me: false,
            message_id: message.id.clone(),
            timestamp_secs: message.created_at.timestamp(),
            text: message.body.clone(),
        }
    }

    /// Shape expected by the messaging-session listener.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "key": {
                "remoteJid": self.remote_address,
                "fromMe": self.from_me,
                "id": self.message_id,
            },
            "messageTimestamp": self.timestamp_secs,
            "broadcast": false,
            "message": {
                "conversation": self.text,
            }
        })
    }
}

/// Remote address of a contact number.
pub fn remote_address(number: &str) -> String {
    format!("{}{}", number, REMOTE_ADDRESS_SUFFIX)
}

/// Live connection to one tenant's messaging account.
///
/// Delivering an event triggers the conversation engine exactly as a real
/// inbound message would, including any function calls the assistant makes.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport name, used in logs.
    fn name(&self) -> &str;

    /// Deliver one synthetic inbound event on the given chat session.
    ///
    /// Resolves only once the conversation engine finished handling it.
    async fn deliver(
        &self,
        session_id: i64,
        event: &InboundEvent,
        ticket: &Ticket,
        contact: &Contact,
    ) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn test_event_from_message() {
        let contact = Contact {
            id: 3,
            tenant_id: 1,
            name: "Ana".to_string(),
            number: "5511999999999".to_string(),
            email: String::new(),
            profile_pic_url: None,
            custom_fields: Vec::new(),
        };
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let message = Message {
            id: "ABC123".to_string(),
            ticket_id: 42,
            body: "oi".to_string(),
            from_me: false,
            created_at: created,
            updated_at: created,
        };

        let event = InboundEvent::from_message(&contact, &message);
        assert_eq!(event.remote_address, "5511999999999@s.whatsapp.net");
        assert!(!event.from_me);
        assert_eq!(event.timestamp_secs, created.timestamp());

        let wire = event.to_wire();
        assert_eq!(wire["key"]["remoteJid"], "5511999999999@s.whatsapp.net");
        assert_eq!(wire["key"]["fromMe"], false);
        assert_eq!(wire["key"]["id"], "ABC123");
        assert_eq!(wire["message"]["conversation"], "oi");
        assert_eq!(wire["broadcast"], false);
    }
}

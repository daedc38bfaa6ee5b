//! Transport that hands replayed messages to the conversation engine over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use crate::channels::{ChatTransport, InboundEvent};
use crate::config::EngineConfig;
use crate::error::ChannelError;
use crate::models::{Contact, Ticket};

const NAME: &str = "engine_webhook";

/// Posts each synthetic inbound event to the engine's webhook and waits for
/// it to finish processing.
pub struct WebhookTransport {
    client: Client,
    url: String,
    secret: Option<SecretString>,
}

impl WebhookTransport {
    pub fn new(config: &EngineConfig) -> Result<Self, ChannelError> {
        let url = config
            .webhook_url
            .clone()
            .ok_or_else(|| ChannelError::SendFailed {
                name: NAME.to_string(),
                reason: "ENGINE_WEBHOOK_URL is not set".to_string(),
            })?;

        // Replay timeouts are enforced by the scanner; this only guards against dead sockets.
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client,
            url,
            secret: config.webhook_secret.clone(),
        })
    }
}

#[async_trait]
impl ChatTransport for WebhookTransport {
    fn name(&self) -> &str {
        NAME
    }

    async fn deliver(
        &self,
        session_id: i64,
        event: &InboundEvent,
        ticket: &Ticket,
        contact: &Contact,
    ) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "sessionId": session_id,
            "ticketId": ticket.id,
            "companyId": ticket.tenant_id,
            "contactId": contact.id,
            "data": event.to_wire(),
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(ref secret) = self.secret {
            request = request.header("X-Webhook-Secret", secret.expose_secret());
        }

        tracing::debug!(
            ticket_id = ticket.id,
            message_id = %event.message_id,
            "Delivering replayed message to engine"
        );

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: NAME.to_string(),
                reason: format!("HTTP {}: {}", status, text),
            });
        }
        Ok(())
    }
}

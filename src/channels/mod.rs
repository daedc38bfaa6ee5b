//! Outbound channels.
//!
//! - [`ChatTransport`]: live chat sessions that replayed messages go through
//! - [`NotificationSink`]: realtime fan-out to agent dashboards

mod channel;
mod notify;
mod webhook;

pub use channel::{ChatTransport, InboundEvent, REMOTE_ADDRESS_SUFFIX, remote_address};
pub use notify::{BroadcastNotifier, NOTIFICATION_ROOM, Notification, NotificationSink};
pub use webhook::WebhookTransport;

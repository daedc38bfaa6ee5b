//! Calendar availability and scheduling.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, SubsecRound, TimeZone, Utc};

use crate::channels::{Notification, NotificationSink};
use crate::db::Database;
use crate::models::{AccountContext, NewSchedule};
use crate::tools::tool::{Tool, ToolError, ToolOutcome, string_param};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a date-time argument.
///
/// RFC 3339 strings carry their own offset. Naive date-times are read in
/// the tenant's `offset`. Fractions are cut to microseconds, the precision
/// `TIMESTAMPTZ` stores, so equal inputs compare equal after a round trip.
pub fn parse_datetime(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let parsed = match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed.with_timezone(&Utc),
        Err(_) => NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .and_then(|naive| offset.from_local_datetime(&naive).single())
            .map(|local| local.with_timezone(&Utc))?,
    };
    Some(parsed.trunc_subsecs(6))
}

/// Tells whether a time slot is free for the tenant.
pub struct CheckCalendarTool {
    db: Arc<dyn Database>,
    offset: FixedOffset,
}

impl CheckCalendarTool {
    pub fn new(db: Arc<dyn Database>, offset: FixedOffset) -> Self {
        Self { db, offset }
    }
}

#[async_trait]
impl Tool for CheckCalendarTool {
    fn name(&self) -> &str {
        "check_calendar"
    }

    fn description(&self) -> &str {
        "Check whether a date and time is free. Returns true when nothing is scheduled \
         at that exact time, false otherwise."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "date": {
                    "type": "string",
                    "description": "Date and time to check (YYYY-MM-DD HH:MM or ISO 8601)"
                }
            },
            "required": ["date"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &AccountContext,
    ) -> Result<ToolOutcome, ToolError> {
        let date = string_param(&params, "date");
        let Some(send_at) = date.and_then(|d| parse_datetime(d, self.offset)) else {
            tracing::warn!("Missing or unparseable date");
            return Ok(ToolOutcome::Invalid);
        };

        let count = self
            .db
            .count_schedules_at(send_at, ctx.company_id)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Count failed"))?;

        tracing::info!(
            company_id = ctx.company_id,
            %send_at,
            count,
            "Found schedules"
        );

        Ok(if count == 0 {
            ToolOutcome::Confirmed
        } else {
            ToolOutcome::Declined
        })
    }
}

/// Books a message for a future time.
pub struct ScheduleTool {
    db: Arc<dyn Database>,
    notifier: Arc<dyn NotificationSink>,
    offset: FixedOffset,
}

impl ScheduleTool {
    pub fn new(
        db: Arc<dyn Database>,
        notifier: Arc<dyn NotificationSink>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            db,
            notifier,
            offset,
        }
    }
}

#[async_trait]
impl Tool for ScheduleTool {
    fn name(&self) -> &str {
        "schedule"
    }

    fn description(&self) -> &str {
        "Schedule a message for the customer at the given date and time. Returns true \
         when the schedule was created."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "date": {
                    "type": "string",
                    "description": "When to send (YYYY-MM-DD HH:MM or ISO 8601)"
                },
                "message": {
                    "type": "string",
                    "description": "Message body"
                }
            },
            "required": ["date", "message"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &AccountContext,
    ) -> Result<ToolOutcome, ToolError> {
        let send_at = string_param(&params, "date").and_then(|d| parse_datetime(d, self.offset));
        let body = string_param(&params, "message").filter(|m| !m.trim().is_empty());
        let (Some(send_at), Some(body)) = (send_at, body) else {
            tracing::warn!("Missing date or message");
            return Ok(ToolOutcome::Declined);
        };

        let record = NewSchedule {
            body: body.to_string(),
            send_at,
            contact_id: ctx.contact_id,
            tenant_id: ctx.company_id,
            user_id: ctx.user_id,
        };

        match self.db.create_schedule(&record).await {
            Ok(schedule) => {
                tracing::info!(
                    schedule_id = schedule.id,
                    company_id = ctx.company_id,
                    "Schedule created"
                );
                self.notifier.publish(Notification::schedule_created(&schedule));
                Ok(ToolOutcome::Confirmed)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to create schedule");
                Ok(ToolOutcome::Declined)
            }
        }
    }
}

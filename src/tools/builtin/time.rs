//! Current date tool.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};

use crate::models::AccountContext;
use crate::tools::tool::{Tool, ToolError, ToolOutcome};

/// Renders `now` the way tenants write dates (`dd/mm/YYYY, HH:MM:SS`).
pub fn format_local(now: DateTime<Utc>, offset: FixedOffset) -> String {
    now.with_timezone(&offset)
        .format("%d/%m/%Y, %H:%M:%S")
        .to_string()
}

/// Gives the assistant the current local date and time.
pub struct CurrentDateTool {
    offset: FixedOffset,
}

impl CurrentDateTool {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

#[async_trait]
impl Tool for CurrentDateTool {
    fn name(&self) -> &str {
        "get_current_date"
    }

    fn description(&self) -> &str {
        "Get the current local date and time."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(
        &self,
        _params: serde_json::Value,
        _ctx: &AccountContext,
    ) -> Result<ToolOutcome, ToolError> {
        Ok(ToolOutcome::Found(format_local(Utc::now(), self.offset)))
    }
}

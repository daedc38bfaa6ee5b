//! Function registry and the dispatch boundary.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::FixedOffset;
use tracing::Instrument;

use crate::channels::NotificationSink;
use crate::db::Database;
use crate::models::AccountContext;
use crate::tools::builtin::{
    CheckCalendarTool, CurrentDateTool, FindCustomerTool, RegisterCustomerTool, ScheduleTool,
};
use crate::tools::tool::{Tool, ToolError, ToolSchema};

/// Functions available to the assistant, by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in function.
    pub fn with_builtins(
        db: Arc<dyn Database>,
        notifier: Arc<dyn NotificationSink>,
        offset: FixedOffset,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FindCustomerTool::new(Arc::clone(&db))));
        registry.register(Arc::new(RegisterCustomerTool::new(Arc::clone(&db))));
        registry.register(Arc::new(CheckCalendarTool::new(Arc::clone(&db), offset)));
        registry.register(Arc::new(ScheduleTool::new(db, notifier, offset)));
        registry.register(Arc::new(CurrentDateTool::new(offset)));
        registry
    }

    /// Add a function, replacing any with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!("Replaced function {}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Sorted names of registered functions.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Declarations for the conversation engine, sorted by name.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Run one function call and map its outcome to the string the
    /// conversation engine expects (`"true"`, `"false"`, `"null"` or a value).
    pub async fn dispatch(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &AccountContext,
    ) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownFunction(name.to_string()))?;

        let span = tracing::info_span!(
            "function",
            name,
            ticket_id = ctx.ticket_id,
            company_id = ctx.company_id
        );
        let outcome = tool.execute(args, ctx).instrument(span).await?;
        tracing::debug!(function = name, ?outcome, "Function call finished");
        Ok(outcome.into_sentinel())
    }

    /// Like [`dispatch`](Self::dispatch), with arguments given as the raw
    /// JSON string the assistant produced.
    pub async fn dispatch_raw(
        &self,
        name: &str,
        raw_args: &str,
        ctx: &AccountContext,
    ) -> Result<String, ToolError> {
        let args = if raw_args.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(raw_args)
                .map_err(|e| ToolError::InvalidParameters(e.to_string()))?
        };
        self.dispatch(name, args, ctx).await
    }
}

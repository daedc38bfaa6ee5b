//! Tool trait and types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::DatabaseError;
use crate::models::AccountContext;

/// Error type for function execution.
///
/// Validation problems are not errors: tools report them as a
/// [`ToolOutcome`]. An `Err` fails the assistant turn.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Tagged result of one function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// A literal value to hand back.
    Found(String),
    /// The requested action happened (or the slot is free).
    Confirmed,
    /// Accepted without effect.
    Ignored,
    /// The action was refused (slot taken, scheduling failed).
    Declined,
    NotFound,
    /// Arguments or caller scope failed validation.
    Invalid,
    /// The datastore rejected the write.
    Unavailable,
}

impl ToolOutcome {
    /// String handed to the conversation engine as the function output.
    pub fn into_sentinel(self) -> String {
        match self {
            Self::Found(value) => value,
            Self::Confirmed | Self::Ignored => "true".to_string(),
            Self::Declined => "false".to_string(),
            Self::NotFound | Self::Invalid | Self::Unavailable => "null".to_string(),
        }
    }

    /// `Found` for a non-empty value, `NotFound` otherwise.
    pub fn non_empty(value: &str) -> Self {
        if value.is_empty() {
            Self::NotFound
        } else {
            Self::Found(value.to_string())
        }
    }
}

/// Declaration of a function for the conversation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A function the assistant can call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Function name as the assistant calls it.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments object.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Run the function inside the caller's account scope.
    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &AccountContext,
    ) -> Result<ToolOutcome, ToolError>;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// String argument `key`, if present and actually a string.
pub fn string_param<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

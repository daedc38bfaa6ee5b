//! Function-call bridge.
//!
//! The assistant may call a small set of functions during a conversation
//! turn. Each one runs inside an [`AccountContext`](crate::models::AccountContext)
//! and answers with a short string: `"true"`, `"false"`, `"null"` or a
//! literal value. Internally every function returns a [`ToolOutcome`];
//! [`ToolRegistry::dispatch`] turns it into that string.

pub mod builtin;

mod registry;
mod tool;

pub use registry::ToolRegistry;
pub use tool::{Tool, ToolError, ToolOutcome, ToolSchema, string_param};

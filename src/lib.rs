//! Stalled-conversation reprocessing and assistant function dispatch for a
//! multi-tenant chat support desk.
//!
//! The [`agent`] module finds AI-handled tickets whose last user message was
//! never answered and replays those messages through the conversation engine.
//! The [`tools`] module is the other half: the functions the assistant calls
//! while it answers.

pub mod agent;
pub mod channels;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod tools;

pub use config::Config;

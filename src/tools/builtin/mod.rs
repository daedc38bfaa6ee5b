//! Functions the assistant can call.

mod calendar;
mod customer;
mod time;

pub use calendar::{CheckCalendarTool, ScheduleTool, parse_datetime};
pub use customer::{FindCustomerTool, RegisterCustomerTool, is_valid_email};
pub use time::{CurrentDateTool, format_local};

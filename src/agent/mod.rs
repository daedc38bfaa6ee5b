//! Stalled-conversation reprocessing.
//!
//! - [`StallScanner`] picks stalled tickets and replays them batch by batch
//! - [`Replayer`] re-submits one ticket's unanswered messages
//! - [`spawn_stall_scanner`] drives the scanner on a fixed interval

mod driver;
mod replay;
mod scanner;

pub use driver::{run_driver, spawn_stall_scanner};
pub use replay::{Replayer, trailing_unanswered};
pub use scanner::{ScanGuard, ScanOutcome, ScanPermit, ScanReport, StallScanner, is_stale};

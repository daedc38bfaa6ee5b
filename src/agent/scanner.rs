//! Stall scanner.
//!
//! Finds open AI-handled tickets whose last inbound message has gone
//! unanswered for longer than the freshness window, and replays them.
//!
//! Two layers of mutual exclusion are involved:
//!
//! - [`ScanGuard`] keeps a process to a single scan pass at a time. A tick
//!   that finds it held is dropped, not queued.
//! - The ticket's `in_progress` marker, written before any replay I/O and
//!   cleared per batch afterwards, keeps other processes (and the next pass)
//!   away from tickets that are being replayed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;

use crate::agent::replay::Replayer;
use crate::config::ScanConfig;
use crate::db::Database;
use crate::error::{DatabaseError, ReplayError, ScanError};
use crate::models::CandidateTicket;

/// Process-wide single-flight flag for scan passes.
#[derive(Debug, Default)]
pub struct ScanGuard {
    running: AtomicBool,
}

impl ScanGuard {
    pub const fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }

    /// Take the guard if nobody holds it.
    pub fn try_acquire(&self) -> Option<ScanPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ScanPermit { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held for the duration of one scan pass. Releases the guard when dropped.
#[derive(Debug)]
pub struct ScanPermit<'a> {
    guard: &'a ScanGuard,
}

impl ScanPermit<'_> {
    pub fn release(self) {}
}

impl Drop for ScanPermit<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

/// Whether activity at `last_activity` is older than `now - window`.
///
/// Activity exactly at the cutoff is still fresh.
pub fn is_stale(last_activity: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    match TimeDelta::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
    {
        Some(cutoff) => last_activity < cutoff,
        None => false,
    }
}

/// Result of one scan invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Another pass held the guard; nothing was done.
    AlreadyRunning,
    Completed(ScanReport),
}

/// Counters for a completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub candidates: usize,
    pub batches: usize,
    pub replayed: usize,
    pub failed: usize,
    pub skipped_fresh: usize,
    pub skipped_no_inbound: usize,
}

impl ScanReport {
    fn record(&mut self, result: &TicketResult) {
        match result {
            TicketResult::NoInbound => self.skipped_no_inbound += 1,
            TicketResult::Fresh => self.skipped_fresh += 1,
            TicketResult::Replayed => self.replayed += 1,
            TicketResult::Failed { .. } => self.failed += 1,
        }
    }
}

#[derive(Debug)]
enum TicketResult {
    NoInbound,
    Fresh,
    Replayed,
    Failed { marked: bool },
}

impl TicketResult {
    /// Whether the ticket's in-progress marker was written.
    fn marked(&self) -> bool {
        matches!(self, Self::Replayed | Self::Failed { marked: true })
    }
}

/// Periodic reprocessing of stalled conversations.
pub struct StallScanner {
    db: Arc<dyn Database>,
    replayer: Replayer,
    config: ScanConfig,
    guard: ScanGuard,
}

impl StallScanner {
    pub fn new(db: Arc<dyn Database>, replayer: Replayer, config: ScanConfig) -> Self {
        Self {
            db,
            replayer,
            config,
            guard: ScanGuard::new(),
        }
    }

    pub fn guard(&self) -> &ScanGuard {
        &self.guard
    }

    /// Release markers left behind by a process that died mid-pass.
    ///
    /// Only markers older than [`ScanConfig::abandoned_marker_age`] are
    /// touched, so a pass running in another process keeps its tickets.
    pub async fn recover_abandoned_markers(&self) -> Result<u64, DatabaseError> {
        let age = TimeDelta::from_std(self.config.abandoned_marker_age())
            .unwrap_or(TimeDelta::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.db.release_abandoned_markers(cutoff).await
    }

    /// Run one scan pass.
    ///
    /// Returns [`ScanOutcome::AlreadyRunning`] immediately when another pass
    /// is in flight. Only a failing candidate fetch is an error; failures on
    /// individual tickets are logged and counted in the report.
    pub async fn run_stall_scan(&self) -> Result<ScanOutcome, ScanError> {
        let Some(_permit) = self.guard.try_acquire() else {
            tracing::debug!("Stall scan already running, skipping tick");
            return Ok(ScanOutcome::AlreadyRunning);
        };

        let candidates = self
            .db
            .find_stale_open_tickets(self.config.tenant_id)
            .await
            .map_err(ScanError::CandidateFetch)?;

        let now = Utc::now();
        let batch_size = self.config.batch_size.max(1);
        let mut report = ScanReport {
            candidates: candidates.len(),
            ..ScanReport::default()
        };

        tracing::info!(
            candidates = candidates.len(),
            batch_size,
            tenant_id = ?self.config.tenant_id,
            "Stall scan started"
        );

        for batch in candidates.chunks(batch_size) {
            report.batches += 1;
            let results = join_all(batch.iter().map(|c| self.process_ticket(c, now))).await;

            let marked: Vec<i64> = batch
                .iter()
                .zip(&results)
                .filter(|(_, result)| result.marked())
                .map(|(candidate, _)| candidate.ticket.id)
                .collect();

            if !marked.is_empty()
                && let Err(e) = self.db.clear_in_progress(&marked).await
            {
                tracing::error!(
                    tickets = ?marked,
                    error = %e,
                    "Failed to clear in-progress markers"
                );
            }

            for result in &results {
                report.record(result);
            }
        }

        tracing::info!(
            candidates = report.candidates,
            batches = report.batches,
            replayed = report.replayed,
            failed = report.failed,
            skipped_fresh = report.skipped_fresh,
            skipped_no_inbound = report.skipped_no_inbound,
            "Stall scan finished"
        );

        Ok(ScanOutcome::Completed(report))
    }

    async fn process_ticket(
        &self,
        candidate: &CandidateTicket,
        now: DateTime<Utc>,
    ) -> TicketResult {
        let ticket_id = candidate.ticket.id;

        let latest = match self.db.latest_inbound_message(ticket_id).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::debug!(ticket_id, "No inbound message, skipping");
                return TicketResult::NoInbound;
            }
            Err(e) => {
                tracing::error!(ticket_id, error = %e, "Failed to load latest inbound message");
                return TicketResult::Failed { marked: false };
            }
        };

        if !is_stale(latest.updated_at, now, self.config.freshness_window) {
            tracing::debug!(ticket_id, "Conversation still fresh, skipping");
            return TicketResult::Fresh;
        }

        if let Err(e) = self.db.set_in_progress(ticket_id, true).await {
            tracing::error!(ticket_id, error = %e, "Failed to mark ticket in progress");
            return TicketResult::Failed { marked: false };
        }

        let replay = self.replayer.replay(candidate);
        let result = match tokio::time::timeout(self.config.replay_timeout, replay).await {
            Ok(result) => result,
            Err(_) => Err(ReplayError::Timeout(self.config.replay_timeout)),
        };

        match result {
            Ok(delivered) => {
                tracing::info!(
                    ticket_id,
                    tenant_id = candidate.ticket.tenant_id,
                    delivered,
                    "Replayed stalled ticket"
                );
                TicketResult::Replayed
            }
            Err(e) => {
                tracing::error!(ticket_id, error = %e, "Replay failed");
                TicketResult::Failed { marked: true }
            }
        }
    }
}

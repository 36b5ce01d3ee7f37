//! Paged detail loading over an ordered id list.
//!
//! The loader walks `ids` in fixed-size batches. A batch is started with
//! `begin()`, which hands out a `BatchTicket` and marks that batch in flight,
//! and finished with `complete()`, which appends the resolved apps and
//! advances the cursor. While a batch is outstanding further `begin()` calls
//! are rejected with `LoadStep::Busy` rather than queued.
//!
//! `reset()` starts a new session. Only the ticket currently in flight is
//! accepted by `complete()`: tickets from an earlier session, or ones already
//! completed or aborted, are ignored, so a slow response can never land in a
//! list it was not requested for and a batch is never appended twice.
//!
//! Dropping a `load_more()` future mid-request releases its batch.

use tracing::{debug, warn};

use crate::api::CatalogSource;
use crate::models::AppEntry;
use crate::repository::CatalogRepository;

pub const DEFAULT_BATCH_SIZE: usize = 10;

/// A batch handed out by `begin()`. Not `Clone`: each ticket is completed
/// or aborted at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct BatchTicket {
    serial: u64,
    session: u64,
    start: usize,
    end: usize,
    ids: Vec<String>,
}

impl BatchTicket {
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Half-open range of the id list this batch covers.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoadStep {
    /// Every id has been requested.
    Exhausted,
    /// A batch is already in flight.
    Busy,
    Fetch(BatchTicket),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Resolved apps appended by this batch.
    pub appended: usize,
    pub has_more: bool,
}

/// Result of the combined `load_more()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMore {
    Loaded(LoadOutcome),
    Exhausted,
    Busy,
    /// The batch was no longer the one in flight when it returned.
    Discarded,
}

#[derive(Debug)]
pub struct IncrementalLoader {
    ids: Vec<String>,
    cursor: usize,
    accumulated: Vec<AppEntry>,
    batch_size: usize,
    /// Serial of the outstanding ticket, if any
    in_flight: Option<u64>,
    next_serial: u64,
    session: u64,
}

impl IncrementalLoader {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = if batch_size == 0 {
            warn!("Batch size of 0 requested, using 1");
            1
        } else {
            batch_size
        };
        Self {
            ids: Vec::new(),
            cursor: 0,
            accumulated: Vec::new(),
            batch_size,
            in_flight: None,
            next_serial: 0,
            session: 0,
        }
    }

    /// Start a new session over `ids`, dropping everything loaded so far.
    pub fn reset(&mut self, ids: Vec<String>) {
        self.session += 1;
        debug!(session = self.session, ids = ids.len(), "Loader session reset");
        self.ids = ids;
        self.cursor = 0;
        self.accumulated.clear();
        self.in_flight = None;
    }

    /// Claim the next batch, if any.
    pub fn begin(&mut self) -> LoadStep {
        if self.in_flight.is_some() {
            debug!(cursor = self.cursor, "Batch already in flight");
            return LoadStep::Busy;
        }
        if self.cursor >= self.ids.len() {
            return LoadStep::Exhausted;
        }

        let start = self.cursor;
        let end = (start + self.batch_size).min(self.ids.len());
        let serial = self.next_serial;
        self.next_serial += 1;
        self.in_flight = Some(serial);
        LoadStep::Fetch(BatchTicket {
            serial,
            session: self.session,
            start,
            end,
            ids: self.ids[start..end].to_vec(),
        })
    }

    /// Finish a batch with its results (same order as the ticket ids).
    ///
    /// Unresolved ids are dropped. The cursor always advances by the batch
    /// size. Returns `None` when the ticket is not the one in flight.
    pub fn complete(&mut self, ticket: BatchTicket, results: Vec<Option<AppEntry>>) -> Option<LoadOutcome> {
        if !self.is_current(&ticket) {
            debug!(
                ticket_session = ticket.session,
                session = self.session,
                range = ?ticket.range(),
                "Discarding batch that is no longer in flight"
            );
            return None;
        }

        self.in_flight = None;
        let before = self.accumulated.len();
        self.accumulated.extend(results.into_iter().flatten());
        // TODO: advance to `ticket.end` once the short-final-batch behaviour is settled
        self.cursor += self.batch_size;

        let outcome = LoadOutcome {
            appended: self.accumulated.len() - before,
            has_more: ticket.end != self.ids.len(),
        };
        debug!(cursor = self.cursor, appended = outcome.appended, has_more = outcome.has_more, "Batch complete");
        Some(outcome)
    }

    /// Release a ticket without consuming its ids.
    pub fn abort(&mut self, ticket: BatchTicket) {
        if self.is_current(&ticket) {
            debug!(range = ?ticket.range(), "Batch aborted");
            self.in_flight = None;
        }
    }

    fn is_current(&self, ticket: &BatchTicket) -> bool {
        ticket.session == self.session && self.in_flight == Some(ticket.serial)
    }

    /// Request and append the next batch through the repository.
    pub async fn load_more<S: CatalogSource>(&mut self, repository: &CatalogRepository<S>) -> LoadMore {
        let ticket = match self.begin() {
            LoadStep::Exhausted => return LoadMore::Exhausted,
            LoadStep::Busy => return LoadMore::Busy,
            LoadStep::Fetch(ticket) => ticket,
        };

        let ids = ticket.ids().to_vec();
        let mut pending = PendingBatch {
            loader: self,
            ticket: Some(ticket),
        };
        let fetched = repository.details(&ids).await;
        match pending.finish(fetched.into_inner()) {
            Some(outcome) => LoadMore::Loaded(outcome),
            None => LoadMore::Discarded,
        }
    }

    pub fn apps(&self) -> &[AppEntry] {
        &self.accumulated
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn has_more(&self) -> bool {
        self.cursor < self.ids.len()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Holds a batch across the `load_more()` await. Aborts the batch if dropped
/// before `finish()`, so a cancelled request does not leave the loader busy.
struct PendingBatch<'a> {
    loader: &'a mut IncrementalLoader,
    ticket: Option<BatchTicket>,
}

impl PendingBatch<'_> {
    fn finish(&mut self, results: Vec<Option<AppEntry>>) -> Option<LoadOutcome> {
        let ticket = self.ticket.take()?;
        self.loader.complete(ticket, results)
    }
}

impl Drop for PendingBatch<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            debug!(range = ?ticket.range(), "Batch request dropped before completion");
            self.loader.abort(ticket);
        }
    }
}

impl Default for IncrementalLoader {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

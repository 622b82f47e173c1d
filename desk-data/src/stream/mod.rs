//! Paginated Range Streamer.
//!
//! Pulls an arbitrarily large time range out of a [`RangeQuery`] store in bounded pages, handing
//! each page to a callback before advancing. Peak memory is therefore one page plus whatever the
//! callback retains.
//!
//! The cursor resumes at the last delivered timestamp with an inclusive lower bound and skips the
//! samples at that timestamp it has already delivered, so a run of samples sharing one timestamp
//! is never cut at a page boundary.
//!
//! A run ends when:
//! - the store has nothing left past the cursor ([`StreamEnd::Exhausted`]),
//! - the store returns a short page ([`StreamEnd::FinalPage`]),
//! - the safety limit of fetched samples is reached ([`StreamEnd::SafetyLimit`]),
//! - the cursor fails to advance ([`StreamEnd::Stalled`]),
//! - the caller cancels ([`StreamEnd::Cancelled`]),
//! - or a page fetch fails ([`StreamEnd::Failed`]).
//!
//! None of these propagate as an `Err`, the caller always receives a [`StreamReport`] alongside
//! whatever pages were already delivered.

use crate::{
    config::StreamConfig,
    error::DataError,
    sample::{Sample, SourceSelector, TimeWindow},
    store::{RangeQuery, RangeRequest},
};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Resume point of a run: the first `skip` samples at or after `time` were already delivered.
///
/// Ordered by `time`, then `skip`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Deserialize, Serialize,
)]
#[display("{time} +{skip}")]
pub struct StreamPosition {
    pub time: DateTime<Utc>,
    pub skip: usize,
}

impl StreamPosition {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self { time, skip: 0 }
    }
}

/// Per-run cursor state, owned exclusively by one [`PaginatedStreamer::stream`] invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCursor {
    pub position: StreamPosition,
    pub last_seen: Option<DateTime<Utc>>,
    pub total_fetched: usize,
    pub pages: usize,
}

impl StreamCursor {
    fn new(start: DateTime<Utc>) -> Self {
        Self {
            position: StreamPosition::new(start),
            last_seen: None,
            total_fetched: 0,
            pages: 0,
        }
    }

    fn record_page(&mut self, len: usize, last_seen: DateTime<Utc>) {
        self.total_fetched += len;
        self.pages += 1;
        self.last_seen = Some(last_seen);
    }

    /// Number of leading samples in `page` that were delivered by an earlier page.
    fn delivered_prefix(&self, page: &[Sample]) -> usize {
        page.iter()
            .take(self.position.skip)
            .take_while(|sample| sample.time == self.position.time)
            .count()
    }
}

/// How a streamer run terminated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum StreamEnd {
    /// Store had no undelivered samples left in the window.
    Exhausted,
    /// Store returned fewer samples than requested.
    FinalPage,
    /// Safety limit reached, the result is truncated.
    SafetyLimit,
    /// Cursor failed to advance beyond `position`.
    Stalled { position: StreamPosition },
    /// Caller cancelled the run.
    Cancelled,
    /// A page fetch failed, the result is partial.
    Failed(DataError),
}

impl StreamEnd {
    /// Determine if the run read every sample in its window.
    pub fn is_complete(&self) -> bool {
        matches!(self, StreamEnd::Exhausted | StreamEnd::FinalPage)
    }
}

/// Outcome of one [`PaginatedStreamer::stream`] run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StreamReport {
    pub selector: SourceSelector,
    pub fetched: usize,
    pub pages: usize,
    pub end: StreamEnd,
}

impl StreamReport {
    fn log(&self) {
        let selector = &self.selector;
        match &self.end {
            StreamEnd::Failed(error) => error!(
                %selector,
                fetched = self.fetched,
                pages = self.pages,
                %error,
                "range stream fetch failed, keeping partial result"
            ),
            StreamEnd::Stalled { position } => error!(
                %selector,
                fetched = self.fetched,
                pages = self.pages,
                %position,
                "range stream pagination stalled, cursor did not advance"
            ),
            StreamEnd::SafetyLimit => warn!(
                %selector,
                fetched = self.fetched,
                pages = self.pages,
                "range stream reached safety limit, result truncated"
            ),
            StreamEnd::Cancelled => info!(
                %selector,
                fetched = self.fetched,
                pages = self.pages,
                "range stream cancelled"
            ),
            StreamEnd::Exhausted | StreamEnd::FinalPage => debug!(
                %selector,
                fetched = self.fetched,
                pages = self.pages,
                end = ?self.end,
                "range stream complete"
            ),
        }
    }
}

/// Cursor-based pager over a [`RangeQuery`] store.
#[derive(Debug)]
pub struct PaginatedStreamer<'a, Store: ?Sized> {
    store: &'a Store,
    config: StreamConfig,
}

impl<'a, Store> PaginatedStreamer<'a, Store>
where
    Store: RangeQuery + ?Sized,
{
    pub fn new(store: &'a Store, config: StreamConfig) -> Self {
        Self { store, config }
    }

    /// Stream every sample matching `selector` in `window`, invoking `on_page` once per
    /// non-empty page in time order.
    ///
    /// `on_page` never receives more than `page_size` samples, and never more than
    /// `safety_limit` samples in total.
    pub async fn stream<F>(
        &self,
        selector: &SourceSelector,
        window: TimeWindow,
        cancel: &CancellationToken,
        mut on_page: F,
    ) -> StreamReport
    where
        F: FnMut(&[Sample]),
    {
        let (page_size, safety_limit) = self.config.effective_limits();
        let mut cursor = StreamCursor::new(window.start);

        let end = loop {
            if cancel.is_cancelled() {
                break StreamEnd::Cancelled;
            }

            // Re-request the samples already delivered at the cursor timestamp, they are dropped
            // below and never count towards the page size
            let deliverable = page_size.min(safety_limit - cursor.total_fetched);
            let limit = deliverable.saturating_add(cursor.position.skip);
            let request = RangeRequest {
                selector: selector.clone(),
                lower: cursor.position.time,
                upper: window.end,
                limit,
            };

            let mut page = match self.fetch(&request, cancel).await {
                Ok(page) => page,
                Err(end) => break end,
            };

            if page.len() > limit {
                warn!(
                    %selector,
                    returned = page.len(),
                    limit,
                    "range query returned more samples than requested, truncating"
                );
                page.truncate(limit);
            }

            let delivered = cursor.delivered_prefix(&page);
            let consumed = page.len().min(delivered + deliverable);
            let fresh = &page[delivered..consumed];

            let Some(last_seen) = fresh.last().map(|sample| sample.time) else {
                break StreamEnd::Exhausted;
            };

            on_page(fresh);
            cursor.record_page(fresh.len(), last_seen);

            // The page starts at the cursor timestamp, so its trailing run at `last_seen` is
            // every sample delivered at that timestamp so far
            let next = StreamPosition {
                time: last_seen,
                skip: page[..consumed]
                    .iter()
                    .rev()
                    .take_while(|sample| sample.time == last_seen)
                    .count(),
            };
            if next <= cursor.position {
                break StreamEnd::Stalled {
                    position: cursor.position,
                };
            }
            cursor.position = next;

            if page.len() < limit && consumed == page.len() {
                break StreamEnd::FinalPage;
            }
            if cursor.total_fetched >= safety_limit {
                break StreamEnd::SafetyLimit;
            }
        };

        let report = StreamReport {
            selector: selector.clone(),
            fetched: cursor.total_fetched,
            pages: cursor.pages,
            end,
        };
        report.log();
        report
    }

    async fn fetch(
        &self,
        request: &RangeRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Sample>, StreamEnd> {
        let query = async {
            match self.config.page_timeout {
                Some(after) => tokio::time::timeout(after, self.store.query(request))
                    .await
                    .unwrap_or(Err(DataError::Timeout { after })),
                None => self.store.query(request).await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StreamEnd::Cancelled),
            result = query => result.map_err(StreamEnd::Failed),
        }
    }
}

//! Bucket Accumulator.
//!
//! Collapses raw samples into fixed-width time buckets holding a running `{sum, count}` per
//! source. Each concurrent streamer owns a private [`BucketAccumulator`], and the private maps are
//! combined with [`BucketAccumulator::merge`] once every streamer has finished, so no bucket cell
//! is ever shared between tasks.

use crate::{
    resolution::Resolution,
    sample::{Sample, SourceId},
};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Running `{sum, count}` of one source's prices within one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceTotals {
    pub sum: Decimal,
    pub count: u64,
}

impl SourceTotals {
    fn add(&mut self, price: Decimal) {
        self.sum += price;
        self.count += 1;
    }

    fn absorb(&mut self, other: SourceTotals) {
        self.sum += other.sum;
        self.count += other.count;
    }

    /// Average price, `None` when no sample has been recorded.
    pub fn mean(&self) -> Option<Decimal> {
        (self.count > 0).then(|| self.sum / Decimal::from(self.count))
    }
}

/// Per-source totals of a single bucket.
pub type Bucket = FnvHashMap<SourceId, SourceTotals>;

/// Buckets keyed by bucket start time, iterated in ascending time order.
pub type BucketMap = BTreeMap<DateTime<Utc>, Bucket>;

/// Incremental, in-memory time bucket aggregation at a fixed [`Resolution`].
#[derive(Debug, Clone, PartialEq)]
pub struct BucketAccumulator {
    resolution: Resolution,
    buckets: BucketMap,
}

impl BucketAccumulator {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            buckets: BucketMap::new(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Add every sample of `page` to its bucket.
    ///
    /// Samples are credited to `tag` when provided, otherwise to their own source. Buckets and
    /// source cells are created on first touch. Feeding overlapping pages twice inflates counts.
    pub fn accumulate(&mut self, page: &[Sample], tag: Option<&SourceId>) {
        for sample in page {
            let key = self.resolution.bucket_start(sample.time);
            let source = tag.unwrap_or(&sample.source);

            let bucket = self.buckets.entry(key).or_default();
            match bucket.get_mut(source) {
                Some(totals) => totals.add(sample.price),
                None => {
                    let mut totals = SourceTotals::default();
                    totals.add(sample.price);
                    bucket.insert(source.clone(), totals);
                }
            }
        }
    }

    /// Sum `other`'s cells into `self`.
    ///
    /// Accumulators of different resolutions re-bucket `other`'s keys at `self`'s resolution.
    pub fn merge(&mut self, other: BucketAccumulator) {
        let rebucket = other.resolution != self.resolution;

        for (key, bucket) in other.buckets {
            let key = if rebucket {
                self.resolution.bucket_start(key)
            } else {
                key
            };

            let target = self.buckets.entry(key).or_default();
            for (source, totals) in bucket {
                target.entry(source).or_default().absorb(totals);
            }
        }
    }

    /// Merge every accumulator in `parts` into a new one at `resolution`.
    pub fn merge_all(
        resolution: Resolution,
        parts: impl IntoIterator<Item = BucketAccumulator>,
    ) -> Self {
        parts.into_iter().fold(Self::new(resolution), |mut merged, part| {
            merged.merge(part);
            merged
        })
    }

    pub fn buckets(&self) -> &BucketMap {
        &self.buckets
    }

    pub fn into_buckets(self) -> BucketMap {
        self.buckets
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

//! Series Materializer.
//!
//! Walks a completed [`BucketMap`] in ascending time order and renders output points for a
//! requested [`SeriesShape`]:
//! - [`Values`]: one `{time, value, source}` point per bucket per source with data.
//! - [`Comparison`]: one `{time, source, price}` row per bucket per source with data.
//! - [`Spread`]: one `{time, priceA, priceB, spread, absSpread}` point per bucket, forward-filling
//!   a leg that is silent in a bucket with its last known average.
//!
//! Per-source shapes omit empty buckets since a gap in a single line is expected. The spread
//! carries values forward because a missing leg would otherwise break the line.

use crate::{
    aggregation::{Bucket, BucketMap},
    sample::SourceId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Output shape strategy for a materialized series.
pub trait SeriesShape {
    type Point;

    /// Sources that must be streamed to render this shape.
    fn sources(&self) -> Vec<SourceId>;

    /// Render points from completed buckets, in ascending time order.
    fn materialize(&self, buckets: &BucketMap) -> Vec<Self::Point>;
}

/// Single-value point of a per-source series.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValuePoint {
    pub time: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    pub source: SourceId,
}

/// One source's average price in one bucket of a multi-source comparison.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ComparisonPoint {
    pub time: DateTime<Utc>,
    pub source: SourceId,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

/// Paired source-to-source spread in one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadPoint {
    pub time: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_a: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_b: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub spread: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub abs_spread: Decimal,
}

impl SpreadPoint {
    pub fn new(time: DateTime<Utc>, price_a: Decimal, price_b: Decimal) -> Self {
        let spread = price_a - price_b;
        Self {
            time,
            price_a,
            price_b,
            spread,
            abs_spread: spread.abs(),
        }
    }
}

fn mean(bucket: &Bucket, source: &SourceId) -> Option<Decimal> {
    bucket.get(source).and_then(|totals| totals.mean())
}

/// Per-source series of bucket averages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Values {
    pub sources: Vec<SourceId>,
}

impl Values {
    pub fn new(sources: impl IntoIterator<Item = SourceId>) -> Self {
        Self {
            sources: sources.into_iter().collect(),
        }
    }
}

impl SeriesShape for Values {
    type Point = ValuePoint;

    fn sources(&self) -> Vec<SourceId> {
        self.sources.clone()
    }

    fn materialize(&self, buckets: &BucketMap) -> Vec<Self::Point> {
        buckets
            .iter()
            .flat_map(|(time, bucket)| {
                self.sources.iter().filter_map(move |source| {
                    mean(bucket, source).map(|value| ValuePoint {
                        time: *time,
                        value,
                        source: source.clone(),
                    })
                })
            })
            .collect()
    }
}

/// Multi-source comparison rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub sources: Vec<SourceId>,
}

impl Comparison {
    pub fn new(sources: impl IntoIterator<Item = SourceId>) -> Self {
        Self {
            sources: sources.into_iter().collect(),
        }
    }
}

impl SeriesShape for Comparison {
    type Point = ComparisonPoint;

    fn sources(&self) -> Vec<SourceId> {
        self.sources.clone()
    }

    fn materialize(&self, buckets: &BucketMap) -> Vec<Self::Point> {
        buckets
            .iter()
            .flat_map(|(time, bucket)| {
                self.sources.iter().filter_map(move |source| {
                    mean(bucket, source).map(|price| ComparisonPoint {
                        time: *time,
                        source: source.clone(),
                        price,
                    })
                })
            })
            .collect()
    }
}

/// Paired spread `a - b` with forward-fill of silent legs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spread {
    pub a: SourceId,
    pub b: SourceId,
}

impl Spread {
    pub fn new(a: impl Into<SourceId>, b: impl Into<SourceId>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
        }
    }
}

impl SeriesShape for Spread {
    type Point = SpreadPoint;

    fn sources(&self) -> Vec<SourceId> {
        if self.a == self.b {
            vec![self.a.clone()]
        } else {
            vec![self.a.clone(), self.b.clone()]
        }
    }

    fn materialize(&self, buckets: &BucketMap) -> Vec<Self::Point> {
        let mut last_a = None;
        let mut last_b = None;

        buckets
            .iter()
            .filter_map(|(time, bucket)| {
                let real_a = mean(bucket, &self.a);
                let real_b = mean(bucket, &self.b);
                if real_a.is_none() && real_b.is_none() {
                    return None;
                }

                last_a = real_a.or(last_a);
                last_b = real_b.or(last_b);

                Some(SpreadPoint::new(*time, last_a?, last_b?))
            })
            .collect()
    }
}

use crate::{
    aggregation::BucketAccumulator,
    config::EngineConfig,
    resolution::Resolution,
    sample::{SourceId, SourceSelector, TimeWindow},
    series::{
        Comparison, ComparisonPoint, SeriesShape, Spread, SpreadPoint, ValuePoint, Values,
    },
    store::RangeQuery,
    stream::{PaginatedStreamer, StreamReport},
};
use chrono::Utc;
use futures::future::join_all;
use itertools::Itertools;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Materialized series with the per-source stream reports it was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesOutput<Point> {
    pub resolution: Resolution,
    pub window: TimeWindow,
    pub points: Vec<Point>,
    pub reports: Vec<StreamReport>,
}

impl<Point> SeriesOutput<Point> {
    /// Determine if any source stopped before reading its whole window.
    pub fn is_partial(&self) -> bool {
        self.reports.iter().any(|report| !report.end.is_complete())
    }
}

/// Completed bucket aggregation for one call, before materialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub buckets: BucketAccumulator,
    pub reports: Vec<StreamReport>,
}

/// Entry point used by chart consumers.
///
/// Each call selects a [`Resolution`] for the requested span, streams every source concurrently
/// into private [`BucketAccumulator`]s, merges them once all streamers have joined, and renders
/// the requested [`SeriesShape`]. Stream faults are reported in [`SeriesOutput::reports`] and
/// never fail the call.
#[derive(Debug, Clone)]
pub struct SeriesEngine<Store> {
    store: Store,
    config: EngineConfig,
}

impl<Store> SeriesEngine<Store>
where
    Store: RangeQuery,
{
    pub fn new(store: Store) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Store, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Per-source averages over the trailing `hours`.
    pub async fn get_series(
        &self,
        sources: &[SourceId],
        hours: f64,
        cancel: &CancellationToken,
    ) -> SeriesOutput<ValuePoint> {
        let (window, resolution) = trailing(hours);
        self.fetch_at(&Values::new(sources.iter().cloned()), window, resolution, cancel)
            .await
    }

    /// Forward-filled `a - b` spread over the trailing `hours`.
    pub async fn get_spread(
        &self,
        a: &SourceId,
        b: &SourceId,
        hours: f64,
        cancel: &CancellationToken,
    ) -> SeriesOutput<SpreadPoint> {
        let (window, resolution) = trailing(hours);
        self.fetch_at(&Spread::new(a.clone(), b.clone()), window, resolution, cancel)
            .await
    }

    /// Multi-source comparison rows over the trailing `hours`.
    pub async fn get_comparison(
        &self,
        sources: &[SourceId],
        hours: f64,
        cancel: &CancellationToken,
    ) -> SeriesOutput<ComparisonPoint> {
        let (window, resolution) = trailing(hours);
        self.fetch_at(&Comparison::new(sources.iter().cloned()), window, resolution, cancel)
            .await
    }

    /// Render `shape` over an explicit `window`, at the resolution its span selects.
    pub async fn fetch<Shape>(
        &self,
        shape: &Shape,
        window: TimeWindow,
        cancel: &CancellationToken,
    ) -> SeriesOutput<Shape::Point>
    where
        Shape: SeriesShape,
    {
        let resolution = Resolution::for_span_hours(window.span_hours());
        self.fetch_at(shape, window, resolution, cancel).await
    }

    /// Render `shape` over `window` at an explicit `resolution`.
    pub async fn fetch_at<Shape>(
        &self,
        shape: &Shape,
        window: TimeWindow,
        resolution: Resolution,
        cancel: &CancellationToken,
    ) -> SeriesOutput<Shape::Point>
    where
        Shape: SeriesShape,
    {
        let Aggregation { buckets, reports } = self
            .aggregate(&shape.sources(), window, resolution, cancel)
            .await;

        let points = shape.materialize(buckets.buckets());
        info!(
            %resolution,
            buckets = buckets.len(),
            points = points.len(),
            sources = reports.len(),
            "materialized series"
        );

        SeriesOutput {
            resolution,
            window,
            points,
            reports,
        }
    }

    /// Stream every source in `sources` concurrently and merge their buckets.
    ///
    /// Duplicate sources are streamed once. Each streamer accumulates into its own map, the maps
    /// are merged only after every streamer has finished.
    pub async fn aggregate(
        &self,
        sources: &[SourceId],
        window: TimeWindow,
        resolution: Resolution,
        cancel: &CancellationToken,
    ) -> Aggregation {
        let streamer = PaginatedStreamer::new(&self.store, self.config.stream.clone());

        let runs = sources.iter().unique().map(|source| {
            let streamer = &streamer;
            async move {
                let selector = SourceSelector::Single(source.clone());
                let mut buckets = BucketAccumulator::new(resolution);
                let report = streamer
                    .stream(&selector, window, cancel, |page| {
                        buckets.accumulate(page, Some(source))
                    })
                    .await;
                debug!(%source, buckets = buckets.len(), "source aggregated");
                (buckets, report)
            }
        });

        let (parts, reports): (Vec<_>, Vec<_>) = join_all(runs).await.into_iter().unzip();

        Aggregation {
            buckets: BucketAccumulator::merge_all(resolution, parts),
            reports,
        }
    }
}

/// Window ending now, with the resolution selected from the requested `hours` rather than the
/// millisecond-truncated window span.
fn trailing(hours: f64) -> (TimeWindow, Resolution) {
    (
        TimeWindow::trailing_hours(hours, Utc::now()),
        Resolution::for_span_hours(hours),
    )
}

use crate::{
    error::DataError,
    sample::{Sample, SourceSelector},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// In-process [`RangeQuery`] implementation backed by a sorted sample vector.
pub mod memory;

/// [`RangeQuery`] implementation for the Supabase PostgREST API the ingest bridge writes to.
pub mod supabase;

/// One page request against the remote price-tick store.
///
/// Implementations must return at most `limit` samples matching `selector`, with
/// `lower <= time <= upper`, ordered by time ascending. Samples sharing a timestamp must come back
/// in the same relative order on every request.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct RangeRequest {
    pub selector: SourceSelector,
    pub lower: DateTime<Utc>,
    pub upper: DateTime<Utc>,
    pub limit: usize,
}

/// Remote range-query collaborator the streaming engine pages through.
#[async_trait]
pub trait RangeQuery: Send + Sync {
    async fn query(&self, request: &RangeRequest) -> Result<Vec<Sample>, DataError>;
}

#[async_trait]
impl<T> RangeQuery for Arc<T>
where
    T: RangeQuery + ?Sized,
{
    async fn query(&self, request: &RangeRequest) -> Result<Vec<Sample>, DataError> {
        (**self).query(request).await
    }
}

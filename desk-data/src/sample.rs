use crate::error::DataError;
use chrono::{DateTime, TimeDelta, Utc};
use derive_more::{Constructor, Display, From};
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::borrow::Borrow;

/// Identifier of an upstream price feed, eg/ one exchange.
#[derive(
    Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, From, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct SourceId(pub SmolStr);

impl SourceId {
    /// Bitkub THB_USDT order book mid-price.
    pub const BITKUB: &'static str = "bitkub";
    /// Binance TH USDTTHB order book mid-price.
    pub const BINANCE_TH: &'static str = "binance_th";
    /// MaxBit OTC quote mid-price.
    pub const MAXBIT: &'static str = "maxbit";
    /// USD/THB reference FX rate.
    pub const FX: &'static str = "fx";

    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for SourceId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for SourceId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

/// Raw price tick as read from the remote store.
///
/// Samples have no identity beyond `(source, time)`, and duplicates at identical timestamps are
/// tolerated.
#[derive(Clone, Eq, PartialEq, Debug, Constructor, Deserialize, Serialize)]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub source: SourceId,
    pub price: Decimal,
}

/// Which source(s) a single range query is filtered by.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub enum SourceSelector {
    Single(SourceId),
    Set(Vec<SourceId>),
}

impl SourceSelector {
    pub fn sources(&self) -> &[SourceId] {
        match self {
            SourceSelector::Single(source) => std::slice::from_ref(source),
            SourceSelector::Set(sources) => sources,
        }
    }

    pub fn contains(&self, source: &SourceId) -> bool {
        self.sources().contains(source)
    }
}

impl std::fmt::Display for SourceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSelector::Single(source) => write!(f, "{source}"),
            SourceSelector::Set(sources) => write!(f, "[{}]", sources.iter().join(",")),
        }
    }
}

impl From<SourceId> for SourceSelector {
    fn from(value: SourceId) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<SourceId>> for SourceSelector {
    fn from(mut value: Vec<SourceId>) -> Self {
        if value.len() == 1 {
            Self::Single(value.remove(0))
        } else {
            Self::Set(value)
        }
    }
}

/// Closed time range `[start, end]` a series is requested over.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DataError> {
        if start > end {
            return Err(DataError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Window covering the `hours` leading up to `end`.
    ///
    /// Negative, zero and non-finite spans collapse to an empty window ending at `end`.
    pub fn trailing_hours(hours: f64, end: DateTime<Utc>) -> Self {
        let millis = if hours.is_finite() && hours > 0.0 {
            (hours * 3_600_000.0).min(i64::MAX as f64 / 2.0) as i64
        } else {
            0
        };
        let start = TimeDelta::try_milliseconds(millis)
            .and_then(|span| end.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        Self { start, end }
    }

    pub fn span(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn span_hours(&self) -> f64 {
        self.span().num_milliseconds() as f64 / 3_600_000.0
    }
}

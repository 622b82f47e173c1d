use super::{RangeQuery, RangeRequest};
use crate::{error::DataError, sample::Sample};
use async_trait::async_trait;
use parking_lot::RwLock;

/// Price-tick store held in memory, sorted by time ascending.
///
/// Samples sharing a timestamp keep their insertion order.
#[derive(Debug)]
pub struct InMemoryStore {
    samples: RwLock<Vec<Sample>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            samples: RwLock::new(Vec::new()),
        }
    }

    pub fn with_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        let store = Self::new();
        store.extend(samples);
        store
    }

    pub fn insert(&self, sample: Sample) {
        let mut samples = self.samples.write();
        let index = samples.partition_point(|existing| existing.time <= sample.time);
        samples.insert(index, sample);
    }

    pub fn extend(&self, samples: impl IntoIterator<Item = Sample>) {
        let mut guard = self.samples.write();
        guard.extend(samples);
        guard.sort_by_key(|sample| sample.time);
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RangeQuery for InMemoryStore {
    async fn query(&self, request: &RangeRequest) -> Result<Vec<Sample>, DataError> {
        let samples = self.samples.read();
        let first = samples.partition_point(|sample| sample.time < request.lower);

        Ok(samples[first..]
            .iter()
            .take_while(|sample| sample.time <= request.upper)
            .filter(|sample| request.selector.contains(&sample.source))
            .take(request.limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{SourceId, SourceSelector};
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn store() -> InMemoryStore {
        InMemoryStore::with_samples([
            Sample::new(at(30), SourceId::from("bitkub"), dec!(31.20)),
            Sample::new(at(0), SourceId::from("bitkub"), dec!(31.10)),
            Sample::new(at(10), SourceId::from("maxbit"), dec!(31.25)),
            Sample::new(at(10), SourceId::from("bitkub"), dec!(31.15)),
            Sample::new(at(60), SourceId::from("fx"), dec!(36.50)),
        ])
    }

    #[tokio::test]
    async fn test_in_memory_store_query() {
        struct TestCase {
            request: RangeRequest,
            expected: Vec<DateTime<Utc>>,
        }

        let tests = vec![
            TestCase {
                // TC0: full range for a single source, time ascending
                request: RangeRequest {
                    selector: SourceSelector::Single(SourceId::from("bitkub")),
                    lower: at(0),
                    upper: at(100),
                    limit: 1000,
                },
                expected: vec![at(0), at(10), at(30)],
            },
            TestCase {
                // TC1: lower bound is inclusive
                request: RangeRequest {
                    selector: SourceSelector::Single(SourceId::from("bitkub")),
                    lower: at(10),
                    upper: at(100),
                    limit: 1000,
                },
                expected: vec![at(10), at(30)],
            },
            TestCase {
                // TC2: upper bound is inclusive
                request: RangeRequest {
                    selector: SourceSelector::Single(SourceId::from("bitkub")),
                    lower: at(0),
                    upper: at(10),
                    limit: 1000,
                },
                expected: vec![at(0), at(10)],
            },
            TestCase {
                // TC3: limit applies after source filtering
                request: RangeRequest {
                    selector: SourceSelector::Set(vec![
                        SourceId::from("maxbit"),
                        SourceId::from("fx"),
                    ]),
                    lower: at(0),
                    upper: at(100),
                    limit: 1,
                },
                expected: vec![at(10)],
            },
            TestCase {
                // TC4: empty range
                request: RangeRequest {
                    selector: SourceSelector::Single(SourceId::from("fx")),
                    lower: at(61),
                    upper: at(100),
                    limit: 1000,
                },
                expected: vec![],
            },
        ];

        let store = store();
        for (index, test) in tests.into_iter().enumerate() {
            let actual = store
                .query(&test.request)
                .await
                .unwrap()
                .into_iter()
                .map(|sample| sample.time)
                .collect::<Vec<_>>();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_in_memory_store_insert_keeps_order() {
        let store = store();
        store.insert(Sample::new(at(5), SourceId::from("fx"), dec!(36.40)));
        store.insert(Sample::new(at(10), SourceId::from("fx"), dec!(36.45)));

        let samples = store.samples.read();
        assert_eq!(samples.len(), 7);
        assert!(samples.windows(2).all(|pair| pair[0].time <= pair[1].time));

        // Equal timestamps keep insertion order
        let at_ten = samples
            .iter()
            .filter(|sample| sample.time == at(10))
            .map(|sample| sample.source.as_str())
            .collect::<Vec<_>>();
        assert_eq!(at_ten, vec!["maxbit", "bitkub", "fx"]);
    }
}

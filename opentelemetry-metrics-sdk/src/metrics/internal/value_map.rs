use std::collections::HashMap;
use std::mem;
use std::sync::RwLock;

use crate::metrics::attribute_set::{AttributeSet, OVERFLOW_ATTRIBUTE_SET};

use super::Aggregator;

/// The shared working set of one stream: a tracker per attribute set.
///
/// Measurements update trackers under the read lock; a new attribute set
/// takes the write lock once. Collection swaps the whole map out under the
/// write lock, so every measurement lands in exactly one drained generation.
pub(crate) struct ValueMap<A: Aggregator> {
    trackers: RwLock<HashMap<AttributeSet, A>>,
    /// Configuration required to create and update the [`Aggregator`]
    config: A::InitConfig,
    cardinality_limit: usize,
}

impl<A: Aggregator> ValueMap<A> {
    pub(crate) fn new(config: A::InitConfig, cardinality_limit: usize) -> Self {
        ValueMap {
            trackers: RwLock::new(HashMap::new()),
            config,
            cardinality_limit,
        }
    }

    pub(crate) fn config(&self) -> &A::InitConfig {
        &self.config
    }

    pub(crate) fn measure(&self, value: A::PreComputedValue, attributes: &AttributeSet) {
        {
            let trackers = self.trackers.read().unwrap_or_else(|err| err.into_inner());
            if let Some(tracker) = trackers.get(attributes) {
                tracker.update(value);
                return;
            }
        }

        let mut trackers = self.trackers.write().unwrap_or_else(|err| err.into_inner());
        // Recheck again in case another thread already inserted
        if let Some(tracker) = trackers.get(attributes) {
            tracker.update(value);
            return;
        }

        let key = if attributes.is_empty()
            || distinct_sets(&trackers) < self.cardinality_limit
        {
            attributes.clone()
        } else {
            OVERFLOW_ATTRIBUTE_SET.clone()
        };
        trackers
            .entry(key)
            .or_insert_with(|| A::create(&self.config))
            .update(value);
    }

    /// Takes every tracker recorded since the previous drain.
    pub(crate) fn drain(&self) -> HashMap<AttributeSet, A> {
        let mut trackers = self.trackers.write().unwrap_or_else(|err| err.into_inner());
        mem::take(&mut *trackers)
    }
}

/// Number of attribute sets that count towards the cardinality limit.
pub(crate) fn distinct_sets<V>(map: &HashMap<AttributeSet, V>) -> usize {
    let mut n = map.len();
    if map.contains_key(&*OVERFLOW_ATTRIBUTE_SET) {
        n -= 1;
    }
    if map.contains_key(&AttributeSet::default()) {
        n -= 1;
    }
    n
}

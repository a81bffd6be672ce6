use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use once_cell::sync::Lazy;
use ordered_float::OrderedFloat;

use opentelemetry::{Array, Key, KeyValue, Value};

/// Attribute attached to the series that absorbs measurements once an
/// instrument reaches its cardinality limit.
pub(crate) static OVERFLOW_ATTRIBUTE_SET: Lazy<AttributeSet> = Lazy::new(|| {
    let key_values = [KeyValue::new("otel.metric.overflow", true)];
    AttributeSet::from(&key_values[..])
});

/// A unique set of attributes identifying one time series of an instrument.
///
/// Keys are unique (the last value given for a key wins) and sorted, so the
/// same attributes passed in any order produce equal sets. The hash is
/// computed once at construction.
#[derive(Clone, Debug)]
pub(crate) struct AttributeSet {
    attrs: Vec<KeyValue>,
    hash: u64,
}

impl AttributeSet {
    pub(crate) fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub(crate) fn to_vec(&self) -> Vec<KeyValue> {
        self.attrs.clone()
    }

    pub(crate) fn into_vec(self) -> Vec<KeyValue> {
        self.attrs
    }

    fn calculate_hash(attrs: &[KeyValue]) -> u64 {
        let mut hasher = DefaultHasher::new();
        for kv in attrs {
            kv.key.hash(&mut hasher);
            hash_value(&kv.value, &mut hasher);
        }
        hasher.finish()
    }
}

impl Default for AttributeSet {
    fn default() -> Self {
        AttributeSet::from(&[][..])
    }
}

impl From<&[KeyValue]> for AttributeSet {
    fn from(values: &[KeyValue]) -> Self {
        let mut seen_keys: HashSet<&Key> = HashSet::with_capacity(values.len());
        let mut attrs: Vec<KeyValue> = values
            .iter()
            .rev()
            .filter(|kv| seen_keys.insert(&kv.key))
            .cloned()
            .collect();
        attrs.sort_unstable_by(|a, b| a.key.cmp(&b.key));

        let hash = AttributeSet::calculate_hash(&attrs);
        AttributeSet { attrs, hash }
    }
}

impl PartialEq for AttributeSet {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.attrs.len() == other.attrs.len()
            && self
                .attrs
                .iter()
                .zip(other.attrs.iter())
                .all(|(a, b)| a.key == b.key && value_eq(&a.value, &b.value))
    }
}

impl Eq for AttributeSet {}

impl Hash for AttributeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash)
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    std::mem::discriminant(value).hash(state);
    match value {
        Value::Bool(b) => b.hash(state),
        Value::I64(i) => i.hash(state),
        Value::F64(f) => OrderedFloat(*f).hash(state),
        Value::String(s) => s.hash(state),
        Value::Array(Array::F64(f)) => f.iter().for_each(|f| OrderedFloat(*f).hash(state)),
        other => other.as_str().hash(state),
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::F64(x), Value::F64(y)) => OrderedFloat(*x) == OrderedFloat(*y),
        (Value::Array(Array::F64(x)), Value::Array(Array::F64(y))) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|(x, y)| OrderedFloat(*x) == OrderedFloat(*y))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn order_does_not_matter() {
        let a = AttributeSet::from(&[KeyValue::new("k1", "v1"), KeyValue::new("k2", 2_i64)][..]);
        let b = AttributeSet::from(&[KeyValue::new("k2", 2_i64), KeyValue::new("k1", "v1")][..]);

        assert_eq!(a, b);

        let mut map = HashMap::new();
        map.insert(a, 1);
        assert_eq!(map.get(&b), Some(&1));
    }

    #[test]
    fn last_duplicate_key_wins() {
        let set = AttributeSet::from(
            &[
                KeyValue::new("k", "first"),
                KeyValue::new("other", true),
                KeyValue::new("k", "second"),
            ][..],
        );

        assert_eq!(
            set.to_vec(),
            vec![KeyValue::new("k", "second"), KeyValue::new("other", true)]
        );
    }

    #[test]
    fn nan_values_are_equal() {
        let a = AttributeSet::from(&[KeyValue::new("f", f64::NAN)][..]);
        let b = AttributeSet::from(&[KeyValue::new("f", f64::NAN)][..]);
        assert_eq!(a, b);

        let nans = || Value::Array(Array::from(vec![1.0, f64::NAN]));
        let a = AttributeSet::from(&[KeyValue::new("fs", nans())][..]);
        let b = AttributeSet::from(&[KeyValue::new("fs", nans())][..]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_values_differ() {
        let a = AttributeSet::from(&[KeyValue::new("k", 1_i64)][..]);
        let b = AttributeSet::from(&[KeyValue::new("k", "1")][..]);
        assert_ne!(a, b);
        assert!(AttributeSet::default().is_empty());
        assert!(!OVERFLOW_ATTRIBUTE_SET.is_empty());
    }
}

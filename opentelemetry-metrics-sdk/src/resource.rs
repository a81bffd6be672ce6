//! The entity every collection is reported for.
//!
//! A [Resource] is built once, handed to the meter provider and attached by
//! reference to each [`ResourceMetrics`](crate::metrics::data::ResourceMetrics).
//! [`Resource::builder`] fills in `telemetry.sdk.*`, then whatever
//! `OTEL_RESOURCE_ATTRIBUTES` lists, then `service.name`.
use std::borrow::Cow;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use opentelemetry::{Key, KeyValue, Value};

/// Attribute key naming the logical service.
pub const SERVICE_NAME: &str = "service.name";

const OTEL_RESOURCE_ATTRIBUTES: &str = "OTEL_RESOURCE_ATTRIBUTES";
const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
const UNKNOWN_SERVICE: &str = "unknown_service";

/// Immutable attributes describing the producer of the measurements.
///
/// Cloning shares the attribute table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resource {
    attrs: Arc<HashMap<Key, Value>>,
    schema_url: Option<Cow<'static, str>>,
}

impl Resource {
    /// A builder seeded from the SDK attributes and the environment.
    ///
    /// `service.name` comes from `OTEL_SERVICE_NAME`, then from a
    /// `service.name` entry of `OTEL_RESOURCE_ATTRIBUTES`, and is
    /// `unknown_service` otherwise. Anything set on the builder afterwards
    /// wins over detected values.
    pub fn builder() -> ResourceBuilder {
        let mut attrs = HashMap::from([
            (
                Key::from_static_str("telemetry.sdk.name"),
                Value::from(env!("CARGO_PKG_NAME")),
            ),
            (
                Key::from_static_str("telemetry.sdk.language"),
                Value::from("rust"),
            ),
            (
                Key::from_static_str("telemetry.sdk.version"),
                Value::from(env!("CARGO_PKG_VERSION")),
            ),
        ]);
        if let Ok(listed) = env::var(OTEL_RESOURCE_ATTRIBUTES) {
            attrs.extend(parse_attribute_list(&listed).map(|kv| (kv.key, kv.value)));
        }

        let service_name = env::var(OTEL_SERVICE_NAME)
            .ok()
            .filter(|name| !name.is_empty())
            .map(Value::from);
        let service_key = Key::from_static_str(SERVICE_NAME);
        match service_name {
            Some(name) => {
                attrs.insert(service_key, name);
            }
            None => {
                attrs
                    .entry(service_key)
                    .or_insert_with(|| Value::from(UNKNOWN_SERVICE));
            }
        }

        ResourceBuilder {
            attrs,
            schema_url: None,
        }
    }

    /// A builder with no attributes at all.
    pub fn builder_empty() -> ResourceBuilder {
        ResourceBuilder {
            attrs: HashMap::new(),
            schema_url: None,
        }
    }

    /// The value stored under `key`.
    pub fn get(&self, key: &Key) -> Option<Value> {
        self.attrs.get(key).cloned()
    }

    /// All attributes, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.attrs.iter()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// `true` without any attribute.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Schema url of the resource, if any.
    pub fn schema_url(&self) -> Option<&str> {
        self.schema_url.as_deref()
    }
}

/// Parses `k1=v1,k2=v2`. Entries without `=` are skipped and both sides are
/// trimmed.
fn parse_attribute_list(listed: &str) -> impl Iterator<Item = KeyValue> + '_ {
    listed.split_terminator(',').filter_map(|entry| {
        let (key, value) = entry.split_once('=')?;
        let key = key.trim();
        (!key.is_empty()).then(|| KeyValue::new(key.to_owned(), value.trim().to_owned()))
    })
}

/// Builder for [Resource].
#[derive(Debug)]
pub struct ResourceBuilder {
    attrs: HashMap<Key, Value>,
    schema_url: Option<Cow<'static, str>>,
}

impl ResourceBuilder {
    /// Sets one attribute, replacing an earlier value of the same key.
    pub fn with_attribute(mut self, kv: KeyValue) -> Self {
        self.attrs.insert(kv.key, kv.value);
        self
    }

    /// Sets several attributes; later ones replace earlier ones.
    pub fn with_attributes<T: IntoIterator<Item = KeyValue>>(mut self, kvs: T) -> Self {
        self.attrs
            .extend(kvs.into_iter().map(|kv| (kv.key, kv.value)));
        self
    }

    /// Sets `service.name`.
    pub fn with_service_name(self, name: impl Into<Value>) -> Self {
        self.with_attribute(KeyValue::new(SERVICE_NAME, name.into()))
    }

    /// Sets the schema url. An empty url clears it.
    pub fn with_schema_url(mut self, schema_url: impl Into<Cow<'static, str>>) -> Self {
        let schema_url = schema_url.into();
        self.schema_url = (!schema_url.is_empty()).then_some(schema_url);
        self
    }

    /// Freezes the attributes into a [Resource].
    pub fn build(self) -> Resource {
        Resource {
            attrs: Arc::new(self.attrs),
            schema_url: self.schema_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(resource: &Resource, key: &'static str) -> Option<String> {
        resource
            .get(&Key::from_static_str(key))
            .map(|value| value.to_string())
    }

    #[test]
    fn later_attributes_win() {
        let resource = Resource::builder_empty()
            .with_attributes([KeyValue::new("a", "1"), KeyValue::new("b", "2")])
            .with_attribute(KeyValue::new("a", "3"))
            .build();

        assert_eq!(resource.len(), 2);
        assert_eq!(string(&resource, "a").as_deref(), Some("3"));
    }

    #[test]
    fn attribute_list_from_environment() {
        temp_env::with_vars(
            [
                (OTEL_RESOURCE_ATTRIBUTES, Some("key=value, k = v ,novalue, =x, a= x, a=z")),
                (OTEL_SERVICE_NAME, None),
            ],
            || {
                let resource = Resource::builder().build();
                assert_eq!(string(&resource, "key").as_deref(), Some("value"));
                assert_eq!(string(&resource, "k").as_deref(), Some("v"));
                assert_eq!(string(&resource, "a").as_deref(), Some("z"));
                assert_eq!(string(&resource, "novalue"), None);
                assert_eq!(string(&resource, SERVICE_NAME).as_deref(), Some("unknown_service"));
                assert_eq!(string(&resource, "telemetry.sdk.language").as_deref(), Some("rust"));
            },
        );
    }

    #[test]
    fn service_name_precedence() {
        temp_env::with_vars(
            [
                (OTEL_SERVICE_NAME, None),
                (OTEL_RESOURCE_ATTRIBUTES, Some("service.name=billing")),
            ],
            || {
                let resource = Resource::builder().build();
                assert_eq!(string(&resource, SERVICE_NAME).as_deref(), Some("billing"));
            },
        );

        temp_env::with_vars(
            [
                (OTEL_SERVICE_NAME, Some("from-env")),
                (OTEL_RESOURCE_ATTRIBUTES, Some("service.name=billing")),
            ],
            || {
                let resource = Resource::builder().build();
                assert_eq!(string(&resource, SERVICE_NAME).as_deref(), Some("from-env"));

                let resource = Resource::builder().with_service_name("explicit").build();
                assert_eq!(string(&resource, SERVICE_NAME).as_deref(), Some("explicit"));
            },
        );
    }

    #[test]
    fn empty_schema_url_is_cleared() {
        let resource = Resource::builder_empty()
            .with_schema_url("https://opentelemetry.io/schemas/1.21.0")
            .build();
        assert_eq!(
            resource.schema_url(),
            Some("https://opentelemetry.io/schemas/1.21.0")
        );
        assert!(resource.is_empty());

        let resource = Resource::builder_empty().with_schema_url("").build();
        assert_eq!(resource.schema_url(), None);
    }
}

//! Action-label extraction from inbound event objects.
//!
//! Events reach the coordinator in several shapes. The label may sit on the
//! event's `target`, on the legacy `srcElement`, or on `currentTarget`, and
//! each of those can be a DOM-like element (attribute map plus dataset) or a
//! plain key/value record. Rather than probing arbitrary objects at runtime,
//! the shapes form a closed set of [`EventTarget`] variants, each answering
//! the lookups described by [`AttributeSource`].

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attribute consulted when the request does not name one.
pub const DEFAULT_ACTION_ATTRIBUTE: &str = "data-action";

const DATA_PREFIX: &str = "data-";

/// Converts a `data-*` attribute name into its dataset key.
///
/// `data-action` becomes `action`, `data-my-action` becomes `myAction`.
/// Names without the `data-` prefix are returned unchanged.
pub fn to_dataset_key(attribute: &str) -> Cow<'_, str> {
    let Some(rest) = attribute.strip_prefix(DATA_PREFIX) else {
        return Cow::Borrowed(attribute);
    };

    let mut key = String::with_capacity(rest.len());
    for (index, chunk) in rest.split('-').enumerate() {
        if index == 0 {
            key.push_str(chunk);
            continue;
        }
        let mut chars = chunk.chars();
        if let Some(first) = chars.next() {
            key.extend(first.to_uppercase());
            key.push_str(chars.as_str());
        }
    }
    Cow::Owned(key)
}

/// Lookup capabilities a target representation can offer.
///
/// Only string values count as found; anything else is treated as absent.
pub trait AttributeSource {
    /// Explicit attribute lookup (`getAttribute`-style or mapping `get`).
    fn attribute(&self, name: &str) -> Option<&str>;

    /// Nested dataset lookup by camelCase key.
    fn dataset(&self, key: &str) -> Option<&str>;

    /// Direct property lookup.
    fn property(&self, name: &str) -> Option<&str>;

    /// Reads `attribute` using the precedence attribute, dataset, property.
    fn read(&self, attribute: &str) -> Option<&str> {
        if let Some(value) = self.attribute(attribute) {
            return Some(value);
        }
        if attribute.starts_with(DATA_PREFIX)
            && let Some(value) = self.dataset(&to_dataset_key(attribute))
        {
            return Some(value);
        }
        self.property(attribute)
    }
}

/// A DOM-like element with separate attribute, dataset and property maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementTarget {
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub dataset: Map<String, Value>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl ElementTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute, e.g. `data-action`.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(name.into(), Value::String(value.into()));
        self
    }

    /// Sets a dataset entry, e.g. `action` for `data-action`.
    pub fn data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.dataset.insert(key.into(), Value::String(value.into()));
        self
    }

    /// Sets a direct property.
    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .insert(name.into(), Value::String(value.into()));
        self
    }
}

impl AttributeSource for ElementTarget {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    fn dataset(&self, key: &str) -> Option<&str> {
        self.dataset.get(key).and_then(Value::as_str)
    }

    fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }
}

/// The closed set of representations an event target can take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum EventTarget {
    /// Element exposing `attributes`, `dataset` and `properties` maps.
    Element(ElementTarget),
    /// Plain key/value record, optionally carrying a nested `dataset` object.
    Record(Map<String, Value>),
}

impl EventTarget {
    /// Builds a record target from a JSON object. Non-objects become an empty record.
    pub fn record(value: Value) -> Self {
        match value {
            Value::Object(map) => EventTarget::Record(map),
            _ => EventTarget::Record(Map::new()),
        }
    }

    fn source(&self) -> &dyn AttributeSource {
        match self {
            EventTarget::Element(element) => element,
            EventTarget::Record(record) => record,
        }
    }
}

impl AttributeSource for Map<String, Value> {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    fn dataset(&self, key: &str) -> Option<&str> {
        self.get("dataset")
            .and_then(Value::as_object)
            .and_then(|dataset| dataset.get(key))
            .and_then(Value::as_str)
    }

    fn property(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }
}

impl AttributeSource for EventTarget {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.source().attribute(name)
    }

    fn dataset(&self, key: &str) -> Option<&str> {
        self.source().dataset(key)
    }

    fn property(&self, name: &str) -> Option<&str> {
        self.source().property(name)
    }
}

impl From<ElementTarget> for EventTarget {
    fn from(element: ElementTarget) -> Self {
        EventTarget::Element(element)
    }
}

impl From<Value> for EventTarget {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) if map.get("attributes").is_some_and(Value::is_object) => {
                match serde_json::from_value::<ElementTarget>(Value::Object(map.clone())) {
                    Ok(element) => EventTarget::Element(element),
                    Err(_) => EventTarget::Record(map),
                }
            }
            other => EventTarget::record(other),
        }
    }
}

impl From<EventTarget> for Value {
    fn from(target: EventTarget) -> Self {
        match target {
            EventTarget::Element(element) => {
                serde_json::to_value(element).unwrap_or(Value::Object(Map::new()))
            }
            EventTarget::Record(map) => Value::Object(map),
        }
    }
}

/// An inbound event-like object.
///
/// Target precedence is `target`, then the legacy `srcElement`, then
/// `currentTarget`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<EventTarget>,
    #[serde(
        default,
        alias = "srcElement",
        skip_serializing_if = "Option::is_none"
    )]
    pub src_element: Option<EventTarget>,
    #[serde(
        default,
        alias = "currentTarget",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_target: Option<EventTarget>,
}

impl ActionEvent {
    pub fn with_target(target: impl Into<EventTarget>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn with_src_element(target: impl Into<EventTarget>) -> Self {
        Self {
            src_element: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn with_current_target(target: impl Into<EventTarget>) -> Self {
        Self {
            current_target: Some(target.into()),
            ..Self::default()
        }
    }

    /// Returns the first target present, by precedence.
    pub fn resolve_target(&self) -> Option<&EventTarget> {
        self.target
            .as_ref()
            .or(self.src_element.as_ref())
            .or(self.current_target.as_ref())
    }

    /// Returns true if the event carries no target of any kind.
    pub fn is_empty(&self) -> bool {
        self.resolve_target().is_none()
    }
}

/// Extracts the routing label of an event.
///
/// An empty string means "not found" and is never an error.
pub fn extract_action(event: &ActionEvent, attribute: &str) -> String {
    event
        .resolve_target()
        .and_then(|target| target.read(attribute))
        .unwrap_or_default()
        .to_string()
}

/// Seam for swapping the label extraction strategy.
pub trait ActionExtractor: Send + Sync {
    fn extract(&self, event: &ActionEvent, attribute: &str) -> String;
}

/// Extractor implementing the target and lookup precedence described above.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultActionExtractor;

impl ActionExtractor for DefaultActionExtractor {
    fn extract(&self, event: &ActionEvent, attribute: &str) -> String {
        extract_action(event, attribute)
    }
}

//! Dynamic model values.
//!
//! Binding produces a [`ModelValue`] graph and validation walks it. Composite
//! nodes (objects, lists, maps) live behind `Arc` and carry an [`ObjectId`] so
//! the same instance can be recognised when it is reachable more than once.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a composite model node.
///
/// Two [`ModelValue`]s that share an `ObjectId` are the same instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A bound enum value: the variant name and its numeric value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    /// Variant name (or `A, B` for combined flags).
    pub name: String,
    /// Numeric value.
    pub value: i64,
}

/// An uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormFile {
    /// Form field name the file was posted under.
    pub name: String,
    /// Client-supplied file name.
    pub file_name: String,
    /// Declared content type.
    pub content_type: Option<String>,
    /// File contents.
    pub content: Bytes,
}

impl FormFile {
    /// Creates a file posted under `name`.
    pub fn new(name: impl Into<String>, file_name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            content_type: None,
            content: content.into(),
        }
    }

    /// Sets the declared content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Returns the file length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Raw form fields and files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormCollection {
    /// Form fields in posted order.
    pub fields: Vec<(String, String)>,
    /// Uploaded files.
    pub files: Vec<FormFile>,
}

impl FormCollection {
    /// Returns every value posted for `name` (case-insensitive).
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns true if the form carries no fields and no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }
}

/// An ordered list node.
#[derive(Debug)]
pub struct ModelList {
    id: ObjectId,
    items: Vec<ModelValue>,
}

impl ModelList {
    /// Creates a list with a fresh identity.
    #[must_use]
    pub fn new(items: Vec<ModelValue>) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::next(),
            items,
        })
    }

    /// Returns the list identity.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns the items.
    #[must_use]
    pub fn items(&self) -> &[ModelValue] {
        &self.items
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A dictionary node. Entries keep insertion order.
#[derive(Debug)]
pub struct ModelMap {
    id: ObjectId,
    entries: Vec<(ModelValue, ModelValue)>,
}

impl ModelMap {
    /// Creates a map with a fresh identity.
    #[must_use]
    pub fn new(entries: Vec<(ModelValue, ModelValue)>) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::next(),
            entries,
        })
    }

    /// Returns the map identity.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns the entries.
    #[must_use]
    pub fn entries(&self) -> &[(ModelValue, ModelValue)] {
        &self.entries
    }

    /// Looks up the value for a string key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ModelValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A complex object node.
///
/// Properties are interior-mutable so a graph can be wired after construction,
/// including cycles back to an ancestor.
pub struct ModelObject {
    id: ObjectId,
    type_name: String,
    properties: RwLock<IndexMap<String, ModelValue>>,
}

impl ModelObject {
    /// Creates an empty object of the named type.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::next(),
            type_name: type_name.into(),
            properties: RwLock::new(IndexMap::new()),
        })
    }

    /// Returns the object identity.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns the declared type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns a property value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ModelValue> {
        self.properties.read().get(name).cloned()
    }

    /// Sets a property value, returning the previous one.
    pub fn set(&self, name: impl Into<String>, value: ModelValue) -> Option<ModelValue> {
        self.properties.write().insert(name.into(), value)
    }

    /// Returns true if the property has been assigned.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.properties.read().contains_key(name)
    }

    /// Returns the assigned property names in assignment order.
    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        self.properties.read().keys().cloned().collect()
    }

    /// Returns the number of assigned properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.read().len()
    }

    /// Returns true if no property has been assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.read().is_empty()
    }
}

impl fmt::Debug for ModelObject {
    // Only names are printed so cyclic graphs do not recurse.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelObject")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("properties", &self.property_names())
            .finish()
    }
}

/// A dynamically typed model value.
#[derive(Clone)]
pub enum ModelValue {
    /// Absent or null value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point number.
    Float(f64),
    /// Text.
    String(String),
    /// Single character.
    Char(char),
    /// UUID.
    Uuid(Uuid),
    /// Timestamp with offset.
    DateTime(DateTime<FixedOffset>),
    /// Enum variant.
    Enum(EnumValue),
    /// List node.
    List(Arc<ModelList>),
    /// Dictionary node.
    Map(Arc<ModelMap>),
    /// Complex object node.
    Object(Arc<ModelObject>),
    /// Uploaded file.
    File(FormFile),
    /// Whole form.
    Form(Arc<FormCollection>),
    /// Request cancellation token.
    CancellationToken(CancellationToken),
    /// Service resolved from the request's service provider.
    Service(Arc<dyn Any + Send + Sync>),
}

impl ModelValue {
    /// Builds a string value.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Builds a list value with a fresh identity.
    #[must_use]
    pub fn list(items: Vec<Self>) -> Self {
        Self::List(ModelList::new(items))
    }

    /// Builds a map value with a fresh identity.
    #[must_use]
    pub fn map(entries: Vec<(Self, Self)>) -> Self {
        Self::Map(ModelMap::new(entries))
    }

    /// Returns the identity of a composite node.
    #[must_use]
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Self::List(list) => Some(list.id()),
            Self::Map(map) => Some(map.id()),
            Self::Object(object) => Some(object.id()),
            _ => None,
        }
    }

    /// Returns true for [`ModelValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true for objects, lists and maps.
    #[must_use]
    pub const fn is_composite(&self) -> bool {
        matches!(self, Self::List(_) | Self::Map(_) | Self::Object(_))
    }

    /// Returns the text of a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns an integer view of numeric values that fit in `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            Self::Enum(e) => Some(e.value),
            _ => None,
        }
    }

    /// Returns a floating point view of any numeric value.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::UInt(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the boolean value.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the object node.
    #[must_use]
    pub fn as_object(&self) -> Option<&Arc<ModelObject>> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Returns the list node.
    #[must_use]
    pub fn as_list(&self) -> Option<&Arc<ModelList>> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    /// Returns the map node.
    #[must_use]
    pub fn as_map(&self) -> Option<&Arc<ModelMap>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Downcasts a bound service.
    #[must_use]
    pub fn as_service<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Self::Service(service) => Arc::clone(service).downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Returns a short name of the variant, used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Char(_) => "char",
            Self::Uuid(_) => "uuid",
            Self::DateTime(_) => "datetime",
            Self::Enum(_) => "enum",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
            Self::File(_) => "file",
            Self::Form(_) => "form",
            Self::CancellationToken(_) => "cancellation_token",
            Self::Service(_) => "service",
        }
    }

    /// Renders the value as JSON.
    ///
    /// A node already on the current path renders as `null`, so cyclic graphs
    /// terminate. Files, forms, tokens and services render as `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut path = HashSet::new();
        self.to_json_inner(&mut path)
    }

    fn to_json_inner(&self, path: &mut HashSet<ObjectId>) -> serde_json::Value {
        use serde_json::Value as Json;

        if let Some(id) = self.object_id() {
            if !path.insert(id) {
                return Json::Null;
            }
        }
        let json = match self {
            Self::Null
            | Self::File(_)
            | Self::Form(_)
            | Self::CancellationToken(_)
            | Self::Service(_) => Json::Null,
            Self::Bool(v) => Json::Bool(*v),
            Self::Int(v) => Json::from(*v),
            Self::UInt(v) => Json::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v).map_or(Json::Null, Json::Number),
            Self::String(s) => Json::String(s.clone()),
            Self::Char(c) => Json::String(c.to_string()),
            Self::Uuid(u) => Json::String(u.to_string()),
            Self::DateTime(dt) => Json::String(dt.to_rfc3339()),
            Self::Enum(e) => Json::String(e.name.clone()),
            Self::List(list) => Json::Array(
                list.items()
                    .iter()
                    .map(|item| item.to_json_inner(path))
                    .collect(),
            ),
            Self::Map(map) => {
                let mut out = serde_json::Map::new();
                for (key, value) in map.entries() {
                    out.insert(key.key_string(), value.to_json_inner(path));
                }
                Json::Object(out)
            }
            Self::Object(object) => {
                let properties: Vec<(String, ModelValue)> = object
                    .properties
                    .read()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let mut out = serde_json::Map::new();
                for (name, value) in properties {
                    out.insert(name, value.to_json_inner(path));
                }
                Json::Object(out)
            }
        };
        if let Some(id) = self.object_id() {
            path.remove(&id);
        }
        json
    }

    fn key_string(&self) -> String {
        match self.to_json() {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }
    }

    /// Deserializes the value into a concrete type through its JSON form.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_json())
    }
}

impl fmt::Debug for ModelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Self::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Self::UInt(v) => f.debug_tuple("UInt").field(v).finish(),
            Self::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Self::String(v) => f.debug_tuple("String").field(v).finish(),
            Self::Char(v) => f.debug_tuple("Char").field(v).finish(),
            Self::Uuid(v) => f.debug_tuple("Uuid").field(v).finish(),
            Self::DateTime(v) => f.debug_tuple("DateTime").field(v).finish(),
            Self::Enum(v) => f.debug_tuple("Enum").field(v).finish(),
            Self::List(v) => f.debug_tuple("List").field(&v.id()).field(&v.len()).finish(),
            Self::Map(v) => f.debug_tuple("Map").field(&v.id()).field(&v.len()).finish(),
            Self::Object(v) => fmt::Debug::fmt(v.as_ref(), f),
            Self::File(v) => f.debug_tuple("File").field(&v.file_name).finish(),
            Self::Form(v) => f.debug_tuple("Form").field(&v.fields.len()).finish(),
            Self::CancellationToken(_) => f.write_str("CancellationToken"),
            Self::Service(_) => f.write_str("Service"),
        }
    }
}

impl PartialEq for ModelValue {
    /// Scalars compare by value, lists and maps structurally, objects and
    /// services by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::UInt(a), Self::UInt(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Uuid(a), Self::Uuid(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::List(a), Self::List(b)) => a.items() == b.items(),
            (Self::Map(a), Self::Map(b)) => a.entries() == b.entries(),
            (Self::Object(a), Self::Object(b)) => a.id() == b.id(),
            (Self::File(a), Self::File(b)) => a == b,
            (Self::Form(a), Self::Form(b)) => a == b,
            (Self::Service(a), Self::Service(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for ModelValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ModelValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ModelValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ModelValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ids_are_unique() {
        let a = ModelObject::new("Person");
        let b = ModelObject::new("Person");
        assert_ne!(a.id(), b.id());
        assert_ne!(ModelList::new(vec![]).id(), ModelList::new(vec![]).id());
    }

    #[test]
    fn test_object_properties_keep_assignment_order() {
        let person = ModelObject::new("Person");
        person.set("name", "Ada".into());
        person.set("age", ModelValue::Int(36));
        assert_eq!(person.property_names(), vec!["name", "age"]);
        assert_eq!(person.get("age"), Some(ModelValue::Int(36)));
        assert!(person.get("missing").is_none());
    }

    #[test]
    fn test_to_json_breaks_cycles() {
        let node = ModelObject::new("Node");
        node.set("name", "root".into());
        node.set("next", ModelValue::Object(Arc::clone(&node)));

        let json = ModelValue::Object(node).to_json();
        assert_eq!(json["name"], "root");
        assert!(json["next"].is_null());
    }

    #[test]
    fn test_shared_child_is_rendered_twice() {
        let child = ModelObject::new("Child");
        child.set("v", ModelValue::Int(1));
        let parent = ModelObject::new("Parent");
        parent.set("a", ModelValue::Object(Arc::clone(&child)));
        parent.set("b", ModelValue::Object(child));

        let json = ModelValue::Object(parent).to_json();
        assert_eq!(json["a"]["v"], 1);
        assert_eq!(json["b"]["v"], 1);
    }

    #[test]
    fn test_deserialize_into_struct() {
        #[derive(serde::Deserialize)]
        struct Point {
            x: i64,
            tags: Vec<String>,
        }

        let point = ModelObject::new("Point");
        point.set("x", ModelValue::Int(4));
        point.set("tags", ModelValue::list(vec!["a".into(), "b".into()]));

        let decoded: Point = ModelValue::Object(point).deserialize().expect("deserialize");
        assert_eq!(decoded.x, 4);
        assert_eq!(decoded.tags, vec!["a", "b"]);
    }

    #[test]
    fn test_map_lookup_and_json() {
        let map = ModelValue::map(vec![
            ("en".into(), "hello".into()),
            ("fr".into(), "bonjour".into()),
        ]);
        assert_eq!(map.as_map().and_then(|m| m.get("fr")).and_then(ModelValue::as_str), Some("bonjour"));
        assert_eq!(map.to_json()["en"], "hello");
    }

    #[test]
    fn test_service_downcast() {
        #[derive(Debug)]
        struct Clock(u32);
        let value = ModelValue::Service(Arc::new(Clock(7)));
        assert_eq!(value.as_service::<Clock>().map(|c| c.0), Some(7));
        assert!(value.as_service::<String>().is_none());
    }
}

//! Attribute providers: the uniform view matchers have of a request value.
//!
//! A matched value is either a plain string or a structured value exposing
//! named attributes. The choice is made once, when the value is wrapped.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Result of evaluating an expression node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Str(String),
    List(Vec<String>),
    Null,
}

impl Value {
    /// Boolean coercion used by the logical operators.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty() && s != "0",
            Value::List(items) => !items.is_empty(),
            Value::Null => false,
        }
    }

    /// String form used when a value is matched again (`IS`).
    ///
    /// Booleans render as `"1"` and `""`.
    pub fn to_match_string(&self) -> String {
        match self {
            Value::Bool(true) => "1".to_string(),
            Value::Bool(false) => String::new(),
            Value::Str(s) => s.clone(),
            Value::List(items) => items.join(","),
            Value::Null => String::new(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Number(n) => Value::Str(n.to_string()),
            serde_json::Value::Array(items) => Value::List(
                items
                    .iter()
                    .map(|item| match item {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            serde_json::Value::Object(_) => Value::Str(v.to_string()),
        }
    }
}

/// A structured value that can take part in authorization checks.
pub trait Attributes: fmt::Debug + Send + Sync {
    /// Canonical string form, matched by string patterns.
    fn authorization_string(&self) -> String;

    /// Resolve a named attribute, or `None` if this value has no such attribute.
    fn attribute(&self, name: &str) -> Option<Value>;
}

/// A matched value as seen by expression nodes.
#[derive(Debug, Clone)]
pub enum AttributeProvider {
    /// Plain string; attribute lookups always fail.
    Str(String),
    /// Structured value with named attributes.
    Structured(Arc<dyn Attributes>),
}

impl AttributeProvider {
    pub fn structured(attrs: impl Attributes + 'static) -> Self {
        AttributeProvider::Structured(Arc::new(attrs))
    }

    pub fn as_string(&self) -> String {
        match self {
            AttributeProvider::Str(s) => s.clone(),
            AttributeProvider::Structured(attrs) => attrs.authorization_string(),
        }
    }

    /// Look up a named attribute. Unresolvable names yield [`Value::Null`].
    pub fn get_attribute(&self, name: &str) -> Value {
        match self {
            AttributeProvider::Str(_) => Value::Null,
            AttributeProvider::Structured(attrs) => attrs.attribute(name).unwrap_or(Value::Null),
        }
    }
}

impl From<&str> for AttributeProvider {
    fn from(s: &str) -> Self {
        AttributeProvider::Str(s.to_string())
    }
}

impl From<String> for AttributeProvider {
    fn from(s: String) -> Self {
        AttributeProvider::Str(s)
    }
}

impl From<AttributeMap> for AttributeProvider {
    fn from(map: AttributeMap) -> Self {
        AttributeProvider::structured(map)
    }
}

impl From<&serde_json::Value> for AttributeProvider {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::String(s) => AttributeProvider::Str(s.clone()),
            serde_json::Value::Object(members) => {
                AttributeProvider::structured(AttributeMap::from_json_object(members))
            }
            other => AttributeProvider::Str(Value::from(other).to_match_string()),
        }
    }
}

/// Ready-made structured value: a canonical name plus named attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMap {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl AttributeMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Every member becomes an attribute; the name comes from `name`, else `id`.
    pub fn from_json_object(members: &serde_json::Map<String, serde_json::Value>) -> Self {
        let name = ["name", "id"]
            .iter()
            .find_map(|key| members.get(*key))
            .map(|v| Value::from(v).to_match_string())
            .unwrap_or_default();
        let attributes = members
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v)))
            .collect();
        Self { name, attributes }
    }
}

impl Attributes for AttributeMap {
    fn authorization_string(&self) -> String {
        self.name.clone()
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.get(name).cloned()
    }
}

/// Values presented for one access check, keyed by matcher name.
///
/// Names are lower-cased on insertion, matching how rules store matchers.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    entries: BTreeMap<String, AttributeProvider>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<AttributeProvider>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<AttributeProvider>) {
        self.entries.insert(name.to_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&AttributeProvider> {
        self.entries.get(&name.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeProvider)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a context from a JSON object; each member becomes one entry.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let members = value.as_object()?;
        let mut ctx = Self::new();
        for (name, v) in members {
            ctx.insert(name, v);
        }
        Some(ctx)
    }
}

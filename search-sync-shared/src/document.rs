//! Entity identifiers and the document representation stored in the index.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single identifier component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Integer(i64),
    Text(String),
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdValue::Integer(value) => write!(f, "{}", value),
            IdValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for IdValue {
    fn from(value: i64) -> Self {
        IdValue::Integer(value)
    }
}

impl From<i32> for IdValue {
    fn from(value: i32) -> Self {
        IdValue::Integer(i64::from(value))
    }
}

impl From<&str> for IdValue {
    fn from(value: &str) -> Self {
        IdValue::Text(value.to_string())
    }
}

impl From<String> for IdValue {
    fn from(value: String) -> Self {
        IdValue::Text(value)
    }
}

impl IdValue {
    /// Convert to a JSON value for storage inside a document.
    pub fn to_json(&self) -> Value {
        match self {
            IdValue::Integer(value) => Value::from(*value),
            IdValue::Text(value) => Value::from(value.as_str()),
        }
    }
}

/// Identifier of an entity. Single-column keys hold one part; multi-column
/// keys hold the parts in the order of the mapped id columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Vec<IdValue>);

impl EntityId {
    /// Create an id made of a single value.
    pub fn single(value: impl Into<IdValue>) -> Self {
        Self(vec![value.into()])
    }

    /// Create a composite id. An empty part list is not a valid id.
    pub fn composite(parts: Vec<IdValue>) -> Option<Self> {
        if parts.is_empty() {
            None
        } else {
            Some(Self(parts))
        }
    }

    pub fn parts(&self) -> &[IdValue] {
        &self.0
    }

    pub fn is_composite(&self) -> bool {
        self.0.len() > 1
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self::single(value)
    }
}

impl From<i32> for EntityId {
    fn from(value: i32) -> Self {
        Self::single(value)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::single(value)
    }
}

/// A document in the search index, representing the current state of one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDocument {
    /// The entity type the document belongs to.
    pub entity_type: String,
    /// The entity's identifier.
    pub id: EntityId,
    /// Indexed field values, keyed by field name.
    pub fields: Map<String, Value>,
    /// When the document was built for indexing.
    pub indexed_at: DateTime<Utc>,
}

impl EntityDocument {
    /// Create a new document without fields.
    pub fn new(entity_type: impl Into<String>, id: impl Into<EntityId>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            fields: Map::new(),
            indexed_at: Utc::now(),
        }
    }

    /// Set a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Key that is unique across all entity types in one index.
    pub fn document_key(&self) -> String {
        document_key(&self.entity_type, &self.id)
    }
}

/// Build the index key for an entity type and id.
pub fn document_key(entity_type: &str, id: &EntityId) -> String {
    format!("{}:{}", entity_type, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_display() {
        assert_eq!(EntityId::single(42).to_string(), "42");
        let composite =
            EntityId::composite(vec![IdValue::from(1), IdValue::from("abc")]).unwrap();
        assert_eq!(composite.to_string(), "1:abc");
        assert!(composite.is_composite());
    }

    #[test]
    fn test_empty_composite_is_rejected() {
        assert!(EntityId::composite(vec![]).is_none());
    }

    #[test]
    fn test_document_key_and_fields() {
        let doc = EntityDocument::new("Book", 7).with_field("title", "The Hobbit");

        assert_eq!(doc.document_key(), "Book:7");
        assert_eq!(doc.field("title"), Some(&Value::from("The Hobbit")));
        assert!(doc.field("missing").is_none());
    }

    #[test]
    fn test_document_key_for_delete_matches_document() {
        let id = EntityId::composite(vec![IdValue::from(1), IdValue::from("abc")]).unwrap();
        let doc = EntityDocument::new("Place", id.clone());

        assert_eq!(crate::document_key("Place", &id), doc.document_key());
        assert_eq!(crate::document_key("Place", &id), "Place:1:abc");
    }

    #[test]
    fn test_id_serialization() {
        let id = EntityId::composite(vec![IdValue::from(3), IdValue::from("x")]).unwrap();
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!([3, "x"]));

        let back: EntityId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }
}

//! Provider-side representation of a resource.

use serde_json::{Map, Value};

use super::schema::{Kind, KindSchema};

/// The provider's current record for one resource instance, normalized.
///
/// `id` is `None` only for projected states computed in dry-run mode for
/// resources that do not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResource {
    /// Resource kind.
    kind: Kind,
    /// Immutable identifier.
    id: Option<String>,
    /// Normalized attributes, including the identifier.
    attributes: Map<String, Value>,
}

impl RemoteResource {
    /// Creates a resource from normalized attributes, reading the identifier
    /// from the schema's id key.
    #[must_use]
    pub fn from_attributes(schema: &KindSchema, attributes: Map<String, Value>) -> Self {
        let id = attributes
            .get(schema.id_key)
            .and_then(Value::as_str)
            .map(String::from);

        Self {
            kind: schema.kind,
            id,
            attributes,
        }
    }

    /// Returns the kind.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        self.kind
    }

    /// Returns the identifier, if the resource exists remotely.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Returns a string attribute.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Returns the lifecycle status reported by the provider, if any.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.get_str("status")
    }

    /// Sets an attribute, used to project dry-run states.
    pub fn set(&mut self, key: &str, value: Value) {
        self.attributes.insert(key.to_string(), value);
    }

    /// Removes an attribute.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    /// Returns all attributes.
    #[must_use]
    pub const fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Returns the attributes as a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.attributes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::schema_of;
    use serde_json::json;

    #[test]
    fn test_id_is_read_from_schema_key() {
        let attributes = json!({"uuid": "abc", "name": "web1"});
        let Value::Object(map) = attributes else {
            panic!("object expected");
        };

        let resource = RemoteResource::from_attributes(schema_of(Kind::Server), map);
        assert_eq!(resource.id(), Some("abc"));
        assert_eq!(resource.get_str("name"), Some("web1"));
        assert_eq!(resource.kind(), Kind::Server);
    }

    #[test]
    fn test_projection_without_id() {
        let mut resource =
            RemoteResource::from_attributes(schema_of(Kind::Volume), Map::new());
        assert_eq!(resource.id(), None);

        resource.set("size_gb", json!(100));
        assert_eq!(resource.to_value(), json!({"size_gb": 100}));
        assert_eq!(resource.remove("size_gb"), Some(json!(100)));
    }
}

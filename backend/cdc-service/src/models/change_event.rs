use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Semantic verb for a store mutation.
///
/// Raw operation codes from the change stream are mapped through a fixed
/// table; anything unmapped is carried through upper-cased instead of
/// failing, so an unknown operation can never stall the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOperation {
    Insert,
    Update,
    Replace,
    Delete,
    Other(String),
}

impl ChangeOperation {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "insert" => ChangeOperation::Insert,
            "update" => ChangeOperation::Update,
            "replace" => ChangeOperation::Replace,
            "delete" => ChangeOperation::Delete,
            other => ChangeOperation::Other(other.to_uppercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ChangeOperation::Insert => "INSERT",
            ChangeOperation::Update => "UPDATE",
            ChangeOperation::Replace => "REPLACE",
            ChangeOperation::Delete => "DELETE",
            ChangeOperation::Other(raw) => raw,
        }
    }

    /// Routing verb used when building the topic name. Only inserts route to
    /// `crear`; updates, replacements, deletions and unknowns all route to
    /// `modificar`. The table is fixed, not configurable per call.
    pub fn routing_verb(&self) -> &'static str {
        match self {
            ChangeOperation::Insert => "crear",
            _ => "modificar",
        }
    }
}

impl Serialize for ChangeOperation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ChangeOperation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "INSERT" => ChangeOperation::Insert,
            "UPDATE" => ChangeOperation::Update,
            "REPLACE" => ChangeOperation::Replace,
            "DELETE" => ChangeOperation::Delete,
            _ => ChangeOperation::Other(raw),
        })
    }
}

/// Canonical change event: one per store mutation, immutable after
/// construction. This is both the published payload and the message shape
/// every change listener parses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub collection: String,
    pub event_type: ChangeOperation,
    pub document_id: String,
    pub timestamp: String,
    /// Full (populated) document snapshot. Always plain JSON values, never
    /// store-internal handles. For deletions this is just the document key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Partial map of field -> new value for update operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_fields: Option<Map<String, Value>>,
}

impl ChangeEvent {
    pub fn new(
        collection: &str,
        event_type: ChangeOperation,
        document_id: &str,
        data: Option<Value>,
        updated_fields: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            collection: collection.to_string(),
            event_type,
            document_id: document_id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            data,
            updated_fields,
        }
    }

    /// Status field as the handlers see it: the partial update wins over the
    /// full snapshot.
    pub fn status(&self) -> Option<String> {
        self.updated_fields
            .as_ref()
            .and_then(|f| f.get("status"))
            .or_else(|| self.data.as_ref().and_then(|d| d.get("status")))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Subject document id, preferring the snapshot `_id` over the envelope.
    pub fn subject_id(&self) -> Option<String> {
        self.data
            .as_ref()
            .and_then(|d| d.get("_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                if self.document_id.is_empty() {
                    None
                } else {
                    Some(self.document_id.clone())
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_known_operations() {
        assert_eq!(ChangeOperation::from_raw("insert"), ChangeOperation::Insert);
        assert_eq!(ChangeOperation::from_raw("update"), ChangeOperation::Update);
        assert_eq!(
            ChangeOperation::from_raw("replace"),
            ChangeOperation::Replace
        );
        assert_eq!(ChangeOperation::from_raw("delete"), ChangeOperation::Delete);
    }

    #[test]
    fn unknown_operation_is_uppercased_not_rejected() {
        let op = ChangeOperation::from_raw("invalidate");
        assert_eq!(op, ChangeOperation::Other("INVALIDATE".to_string()));
        assert_eq!(op.as_str(), "INVALIDATE");
        assert_eq!(op.routing_verb(), "modificar");
    }

    #[test]
    fn routing_verb_table_is_fixed() {
        assert_eq!(ChangeOperation::Insert.routing_verb(), "crear");
        assert_eq!(ChangeOperation::Update.routing_verb(), "modificar");
        assert_eq!(ChangeOperation::Replace.routing_verb(), "modificar");
        assert_eq!(ChangeOperation::Delete.routing_verb(), "modificar");
    }

    #[test]
    fn serializes_with_camel_case_wire_fields() {
        let event = ChangeEvent::new(
            "events",
            ChangeOperation::Update,
            "abc",
            Some(json!({"_id": "abc", "status": "ACTIVE"})),
            None,
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["eventType"], "UPDATE");
        assert_eq!(value["documentId"], "abc");
        assert!(value.get("updatedFields").is_none());
    }

    #[test]
    fn status_prefers_updated_fields_over_snapshot() {
        let mut fields = Map::new();
        fields.insert("status".to_string(), json!("CLOSED_DOWN"));
        let event = ChangeEvent::new(
            "culturalplaces",
            ChangeOperation::Update,
            "abc",
            Some(json!({"_id": "abc", "status": "ACTIVE"})),
            Some(fields),
        );
        assert_eq!(event.status().as_deref(), Some("CLOSED_DOWN"));
    }

    #[test]
    fn subject_id_falls_back_to_document_id() {
        let event = ChangeEvent::new("events", ChangeOperation::Delete, "the-id", None, None);
        assert_eq!(event.subject_id().as_deref(), Some("the-id"));
    }
}

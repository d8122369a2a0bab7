use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Numeric form category. Only [`FormType::DATASET`] triggers an audit event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct FormType(pub i32);

impl FormType {
    pub const DATASET: FormType = FormType(2);

    pub fn is_dataset(&self) -> bool {
        *self == Self::DATASET
    }
}

impl std::fmt::Display for FormType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque form payload attached to an upload.
///
/// Only `type` is interpreted; every other key is carried verbatim from the gateway to the
/// form store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormData {
    #[serde(rename = "type", default)]
    pub form_type: FormType,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl FormData {
    /// True when the payload carries anything besides its type code.
    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// Persisted form document. `id` is assigned by the store and is distinct from the upload id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FormDocument {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub form_type: FormType,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl FormDocument {
    /// Builds the document a store persists for `form`, with a fresh id.
    pub fn from_form_data(form: &FormData) -> Self {
        Self {
            id: Uuid::new_v4(),
            form_type: form.form_type,
            data: Value::Object(form.fields.clone()),
            created_at: Utc::now(),
        }
    }

    /// Recovers the payload this document was created from.
    pub fn to_form_data(&self) -> FormData {
        let fields = match &self.data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        FormData {
            form_type: self.form_type,
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_is_split_from_the_other_fields() {
        let form: FormData =
            serde_json::from_value(json!({"type": 2, "title": "cats", "tags": ["a", "b"]}))
                .unwrap();
        assert!(form.form_type.is_dataset());
        assert!(form.has_fields());
        assert_eq!(form.fields.len(), 2);
        assert!(!form.fields.contains_key("type"));

        let back = serde_json::to_value(&form).unwrap();
        assert_eq!(back, json!({"type": 2, "title": "cats", "tags": ["a", "b"]}));
    }

    #[test]
    fn empty_payload_has_no_fields() {
        let form: FormData = serde_json::from_str("{}").unwrap();
        assert_eq!(form.form_type, FormType(0));
        assert!(!form.has_fields());

        let typed_only: FormData = serde_json::from_str(r#"{"type": 2}"#).unwrap();
        assert!(!typed_only.has_fields());
    }

    #[test]
    fn document_keeps_every_field() {
        let form: FormData =
            serde_json::from_value(json!({"type": 2, "owner": "ops", "rows": 10})).unwrap();
        let doc = FormDocument::from_form_data(&form);
        assert_eq!(doc.to_form_data(), form);
    }
}

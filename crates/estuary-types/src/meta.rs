//! Chat metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{keys, time, FieldMap};

/// The mutable metadata of a chat: display name, image URL, optional
/// custom data, and the creation timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMeta {
    pub name: String,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<FieldMap>,
}

impl ChatMeta {
    pub fn new(name: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_url: image_url.into(),
            created: None,
            data: None,
        }
    }

    pub fn with_data(
        name: impl Into<String>,
        image_url: impl Into<String>,
        data: Option<FieldMap>,
    ) -> Self {
        Self {
            data,
            ..Self::new(name, image_url)
        }
    }

    /// Serialises this metadata to its stored field map. `created` is
    /// only written when present; the store stamps it at creation time.
    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert(keys::NAME.to_string(), Value::from(self.name.clone()));
        fields.insert(
            keys::IMAGE_URL.to_string(),
            Value::from(self.image_url.clone()),
        );
        if let Some(data) = &self.data {
            fields.insert(keys::DATA.to_string(), Value::Object(data.clone()));
        }
        if let Some(created) = self.created {
            fields.insert(
                keys::CREATED.to_string(),
                Value::from(time::to_millis(created)),
            );
        }
        fields
    }

    /// Parses metadata from a stored field map; absent fields default.
    pub fn from_fields(fields: &FieldMap) -> Self {
        Self {
            name: fields
                .get(keys::NAME)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            image_url: fields
                .get(keys::IMAGE_URL)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            created: fields
                .get(keys::CREATED)
                .and_then(Value::as_i64)
                .and_then(time::from_millis),
            data: fields
                .get(keys::DATA)
                .and_then(Value::as_object)
                .cloned(),
        }
    }
}

//! Event payloads and the builder that stamps them
//!
//! A payload is one categorized, timestamped record. Its wire form flattens
//! the category-specific fields next to the envelope keys:
//!
//! ```text
//! {"type": "custom", "site_id": "s1", "timestamp": "2026-01-01T00:00:00.000Z", "event_name": "click", ...}
//! ```

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Envelope keys that category fields may not shadow.
const RESERVED_KEYS: [&str; 3] = ["type", "site_id", "timestamp"];

/// Closed set of payload categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Identity,
    Page,
    Device,
    Location,
    Marketing,
    Performance,
    Custom,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Identity => "identity",
            Category::Page => "page",
            Category::Device => "device",
            Category::Location => "location",
            Category::Marketing => "marketing",
            Category::Performance => "performance",
            Category::Custom => "custom",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discrete tracked event, immutable once built
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPayload {
    #[serde(rename = "type")]
    category: Category,

    site_id: String,

    /// Assigned at build time, not at send time
    #[serde(serialize_with = "serialize_iso_millis")]
    timestamp: DateTime<Utc>,

    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl EventPayload {
    pub fn category(&self) -> Category {
        self.category
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Look up a single category field
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Wire representation sent to the ingestion endpoint
    pub fn to_json(&self) -> Value {
        // Serializing a map of JSON values cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// `2026-01-01T00:00:00.000Z`, matching what browsers emit for ISO timestamps
fn serialize_iso_millis<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Shapes payloads for one site
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    site_id: String,
}

impl PayloadBuilder {
    pub fn new(site_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// Build a payload stamped with the current time
    pub fn build(&self, category: Category, fields: Map<String, Value>) -> EventPayload {
        self.build_at(category, fields, Utc::now())
    }

    /// Build a payload with an explicit timestamp
    pub fn build_at(
        &self,
        category: Category,
        mut fields: Map<String, Value>,
        timestamp: DateTime<Utc>,
    ) -> EventPayload {
        for key in RESERVED_KEYS {
            if fields.remove(key).is_some() {
                tracing::debug!(%category, key, "Dropped reserved field from payload");
            }
        }

        EventPayload {
            category,
            site_id: self.site_id.clone(),
            timestamp,
            fields,
        }
    }
}

//! Publication list attached to a notification.

use serde::de::Deserializer;
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The FT Pink publication. Its presence in a publication list
/// short-circuits the single-publication check.
pub const FT_PINK_UUID: &str = "88fdde6c-2aa4-4f78-af02-9f680097cfd6";

const FT_PINK: Uuid = uuid::uuid!("88fdde6c-2aa4-4f78-af02-9f680097cfd6");

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublicationError {
    #[error("more than one publication in the list")]
    MoreThanOne,
}

/// Ordered list of publication UUIDs.
///
/// Deserialization is lenient: every UUID-shaped string found anywhere in
/// the JSON value is collected, anything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Publications {
    pub uuids: Vec<Uuid>,
}

impl Publications {
    pub fn new(uuids: Vec<Uuid>) -> Self {
        Self { uuids }
    }

    pub fn is_empty(&self) -> bool {
        self.uuids.is_empty()
    }

    /// Chooses the canonical representative for access evaluation:
    /// FT Pink when present, otherwise the single entry, otherwise `None`
    /// for an empty (unconstrained) list. A plural list without FT Pink is
    /// ambiguous and fails.
    pub fn only_one_or_pink(&self) -> Result<Option<String>, PublicationError> {
        if self.uuids.contains(&FT_PINK) {
            return Ok(Some(FT_PINK_UUID.to_string()));
        }
        match self.uuids.as_slice() {
            [] => Ok(None),
            [single] => Ok(Some(single.to_string())),
            _ => Err(PublicationError::MoreThanOne),
        }
    }
}

impl Serialize for Publications {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.uuids.len()))?;
        for uuid in &self.uuids {
            seq.serialize_element(&uuid.to_string())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Publications {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let mut uuids = Vec::new();
        collect_uuids(&value, &mut uuids);
        Ok(Publications { uuids })
    }
}

fn collect_uuids(value: &serde_json::Value, out: &mut Vec<Uuid>) {
    match value {
        serde_json::Value::String(s) => {
            if let Ok(uuid) = Uuid::parse_str(s) {
                out.push(uuid);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_uuids(item, out);
            }
        }
        _ => {}
    }
}

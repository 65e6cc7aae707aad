use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The content a block carries.
///
/// Encoded as `{"kind": ..., "value": ...}` so the hash preimage never
/// depends on guessing the payload's runtime type. Byte payloads travel as
/// lowercase hex; structured objects serialize with sorted keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BlockPayload {
    Text(String),
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
    Structured(serde_json::Value),
}

impl BlockPayload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            BlockPayload::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }
}

/// The rendering fed into the mining preimage
impl fmt::Display for BlockPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockPayload::Text(text) => f.write_str(text),
            BlockPayload::Bytes(bytes) => f.write_str(&HEXLOWER.encode(bytes)),
            BlockPayload::Structured(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for BlockPayload {
    fn from(text: &str) -> Self {
        BlockPayload::Text(text.to_string())
    }
}

impl From<String> for BlockPayload {
    fn from(text: String) -> Self {
        BlockPayload::Text(text)
    }
}

impl From<Vec<u8>> for BlockPayload {
    fn from(bytes: Vec<u8>) -> Self {
        BlockPayload::Bytes(bytes)
    }
}

impl From<serde_json::Value> for BlockPayload {
    fn from(value: serde_json::Value) -> Self {
        BlockPayload::Structured(value)
    }
}

mod hex_bytes {
    use data_encoding::HEXLOWER_PERMISSIVE;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&data_encoding::HEXLOWER.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        HEXLOWER_PERMISSIVE
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

//! Broker wire messages. Both are JSON with the field names the other services on the
//! platform already produce and consume.

use serde::{Deserialize, Serialize};

use super::{FormData, UploadId};

/// Announcement that a file has been staged and is ready to be chunked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathMessage {
    pub name: String,
    pub uuid: UploadId,
    pub filepath: String,
    /// Declared size in bytes. Zero or negative means unknown.
    pub filesize: i64,
    #[serde(rename = "formData", default)]
    pub form_data: FormData,
    #[serde(rename = "userName", default, skip_serializing_if = "String::is_empty")]
    pub user_name: String,
    #[serde(rename = "userId", default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
}

/// One contiguous slice of a staged file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMessage {
    pub name: String,
    pub uuid: UploadId,
    pub is_last_chunk: bool,
    /// Destination the assembler writes to. Empty means "synthesize one".
    #[serde(default)]
    pub filepath: String,
    #[serde(rename = "chunkData", with = "base64_bytes", default)]
    pub chunk_data: Vec<u8>,
    #[serde(rename = "chunkIndex")]
    pub chunk_index: u64,
    #[serde(rename = "formData", default)]
    pub form_data: FormData,
    #[serde(rename = "userName", default)]
    pub user_name: String,
    #[serde(rename = "userId", default)]
    pub user_id: String,
}

impl PathMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl ChunkMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Standard base64 for byte payloads; `null` decodes to an empty payload.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD.decode(encoded).map_err(de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Identity of one upload attempt, generated by the gateway and carried unchanged through
/// every message and persisted row.
///
/// Serialized as the hyphenated UUID string. The same string, as UTF-8 bytes, is the
/// broker message key so all chunks of an upload share a partition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct UploadId(Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn into_uuid(self) -> Uuid {
        self.0
    }

    /// Broker key for every message belonging to this upload.
    pub fn message_key(&self) -> Vec<u8> {
        self.0.hyphenated().to_string().into_bytes()
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for UploadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl From<Uuid> for UploadId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_plain_uuid_string() {
        let id: UploadId = "6f1c1e2a-3b4d-4c5e-8f90-a1b2c3d4e5f6".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"6f1c1e2a-3b4d-4c5e-8f90-a1b2c3d4e5f6\"");
        assert_eq!(
            id.message_key(),
            b"6f1c1e2a-3b4d-4c5e-8f90-a1b2c3d4e5f6".to_vec()
        );
    }

    #[test]
    fn fresh_ids_are_version_four() {
        let id = UploadId::new();
        assert_eq!(id.as_uuid().get_version_num(), 4);
        assert_ne!(id, UploadId::new());
    }
}

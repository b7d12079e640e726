//! Sync data models: wire format shared with the relay.

use serde::{Deserialize, Serialize};

/// One versioned vault record as transported between client and server.
///
/// `ciphertext` is `nonce(12) || ciphertext || auth_tag(16)` under the
/// master key and decrypts to an [`Envelope`]. It is empty for deleted
/// records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultBlob {
    pub id: String,
    pub version: u64,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_url: Option<String>,
}

/// Plaintext inside every vault blob: which local storage owns the record,
/// plus that storage's own encoding of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Envelope {
    pub fn new(kind: &str, data: Vec<u8>) -> Self {
        Self {
            kind: kind.to_string(),
            data,
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// One `(id, known version)` pair of a delta request manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVaultRequest {
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVaultResponse {
    pub id: String,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateVaultRequest {
    /// Version the client last saw; the update is rejected if it moved.
    pub version: u64,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateVaultResponse {
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub manifest: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub vaults: Vec<VaultBlob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

/// Error body returned by the relay for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Custom base64 serialization for `Vec<u8>`.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleted_blob_without_ciphertext_parses() {
        let blob: VaultBlob =
            serde_json::from_str(r#"{"id":"X","version":3,"is_deleted":true}"#).unwrap();
        assert!(blob.is_deleted);
        assert!(blob.ciphertext.is_empty());
        assert_eq!(blob.blob_url, None);
    }

    #[test]
    fn vault_blob_ciphertext_is_base64() {
        let blob = VaultBlob {
            id: "X".to_string(),
            version: 0,
            is_deleted: false,
            ciphertext: vec![0xff, 0x00, 0x10],
            blob_url: None,
        };
        let json = serde_json::to_string(&blob).unwrap();
        assert!(json.contains(r#""ciphertext":"/wAQ""#));
        assert!(!json.contains("blob_url"));
        assert_eq!(serde_json::from_str::<VaultBlob>(&json).unwrap(), blob);
    }

    #[test]
    fn envelope_carries_kind() {
        let envelope = Envelope::new("site-login", b"{}".to_vec());
        let decoded = Envelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.kind, "site-login");
        assert_eq!(decoded.data, b"{}");
    }
}

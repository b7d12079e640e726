//! Website login records.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::storage::record::RecordPayload;
use crate::storage::vault::LocalVault;

/// A saved site login.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct CredentialPayload {
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl fmt::Debug for CredentialPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPayload")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .field("site", &self.site)
            .field("notes", &self.notes.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl RecordPayload for CredentialPayload {
    const KIND: &'static str = "site-login";
}

pub type CredentialVault = LocalVault<CredentialPayload>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_password() {
        let payload = CredentialPayload {
            login: "alice".to_string(),
            password: "hunter2".to_string(),
            site: None,
            notes: Some("pin 1234".to_string()),
        };
        let rendered = format!("{payload:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("1234"));
    }

    #[test]
    fn optional_fields_default() {
        let decoded = CredentialPayload::decode(br#"{"login":"a","password":"b"}"#).unwrap();
        assert_eq!(decoded.site, None);
        assert_eq!(decoded.notes, None);
    }
}

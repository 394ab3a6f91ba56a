// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Structured barcode payload printed on the card back.

use cardwerk_core::error::Result;
use cardwerk_core::types::{Identity, LicenseCategory};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Payload format revision.
pub const PAYLOAD_VERSION: u8 = 1;

/// Compact JSON document encoded in the PDF417 symbol. Field order is fixed
/// by declaration so the bytes are stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarcodePayload {
    pub v: u8,
    /// License number.
    pub ln: String,
    /// National id number.
    pub id: String,
    pub cat: LicenseCategory,
    /// Issue date, ISO 8601.
    pub iss: String,
    /// Expiry date, ISO 8601.
    pub exp: String,
    /// Birth date, ISO 8601.
    pub dob: String,
    /// Verification code.
    pub vc: String,
}

impl BarcodePayload {
    pub fn from_identity(identity: &Identity, issuing_state: &str) -> Self {
        Self {
            v: PAYLOAD_VERSION,
            ln: identity.license_number.clone(),
            id: identity.id_number.clone(),
            cat: identity.category,
            iss: identity.issue_date.to_string(),
            exp: identity.expiry_date.to_string(),
            dob: identity.birth_date.to_string(),
            vc: verification_code(&identity.license_number, &identity.id_number, issuing_state),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// First eight hex digits (upper case) of SHA-256 over the concatenated fields.
pub fn verification_code(license_number: &str, id_number: &str, issuing_state: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(license_number.as_bytes());
    hasher.update(id_number.as_bytes());
    hasher.update(issuing_state.as_bytes());
    hex::encode_upper(&hasher.finalize()[..4])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn payload_is_compact_json() {
        let identity = Identity {
            surname: "Doe".into(),
            given_names: "John".into(),
            id_number: "9001015800085".into(),
            license_number: "L-ABCD-1234-EFGH".into(),
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            issue_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            expiry_date: NaiveDate::from_ymd_opt(2029, 2, 28).unwrap(),
            sex: Default::default(),
            nationality: None,
            category: LicenseCategory::B,
            restrictions: vec![],
        };
        let payload = BarcodePayload::from_identity(&identity, "ZAF");
        let text = String::from_utf8(payload.to_bytes().unwrap()).unwrap();
        assert!(text.starts_with(r#"{"v":1,"ln":"L-ABCD-1234-EFGH","id":"9001015800085","cat":"B""#));
        assert!(!text.contains(' '));
        assert_eq!(payload.vc.len(), 8);
        assert_eq!(BarcodePayload::from_bytes(text.as_bytes()).unwrap(), payload);
    }

    #[test]
    fn verification_code_depends_on_state() {
        assert_ne!(
            verification_code("L1", "ID1", "ZAF"),
            verification_code("L1", "ID1", "NAM")
        );
    }
}

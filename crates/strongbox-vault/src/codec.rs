//! Entity codec: one vault record to and from one JSON document.
//!
//! Each record is an independent unit, so a corrupt member of a bundle can
//! never block its siblings. List-shaped members (categories, timeline,
//! trash) go through [`decode_records`], which decodes every element on
//! its own and reports failures per element.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::entities::{
    Category, CommonAccountInfo, Credential, EntityKind, GeneratedPassword, OperationLogEntry,
    SecureItem, TrashedCredential, TrashedItem, VaultEntity,
};

/// Entity encode/decode failure.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The bytes are not a valid record of the requested kind.
    #[error("malformed {kind} record: {reason}")]
    Malformed {
        /// Kind the caller asked for.
        kind: EntityKind,
        /// Parser message.
        reason: String,
    },

    /// A list member was not a JSON array.
    #[error("expected a JSON array of records: {0}")]
    NotAList(String),

    /// Serialization failed.
    #[error("failed to encode {kind} record: {reason}")]
    Encode {
        /// Kind being encoded.
        kind: EntityKind,
        /// Serializer message.
        reason: String,
    },
}

/// Encode a single entity as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode(entity: &VaultEntity) -> Result<Vec<u8>, CodecError> {
    let kind = entity.kind();
    let result = match entity {
        VaultEntity::Credential(c) => to_json(c),
        VaultEntity::Note(i) | VaultEntity::SecureItem(i) => to_json(i),
        VaultEntity::Category(c) => to_json(c),
        VaultEntity::OperationLogEntry(e) => to_json(e),
        VaultEntity::TrashedCredential(t) => to_json(t),
        VaultEntity::TrashedItem(t) => to_json(t),
        VaultEntity::CommonAccountInfo(a) => to_json(a),
        VaultEntity::GeneratedPassword(g) => to_json(g),
    };
    result.map_err(|e| CodecError::Encode {
        kind,
        reason: e.to_string(),
    })
}

/// Decode a single entity of the hinted kind.
///
/// A [`EntityKind::Note`] or [`EntityKind::SecureItem`] hint yields the
/// variant matching the decoded item's own kind, and a note record without
/// an `itemType` is a note.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the bytes are not a valid record.
pub fn decode(bytes: &[u8], hint: EntityKind) -> Result<VaultEntity, CodecError> {
    let malformed = |e: serde_json::Error| CodecError::Malformed {
        kind: hint,
        reason: e.to_string(),
    };
    Ok(match hint {
        EntityKind::Credential => VaultEntity::Credential(from_json(bytes).map_err(malformed)?),
        EntityKind::Note | EntityKind::SecureItem => {
            let item: SecureItem = from_json(bytes).map_err(malformed)?;
            VaultEntity::from_secure_item(item)
        }
        EntityKind::Category => VaultEntity::Category(from_json(bytes).map_err(malformed)?),
        EntityKind::OperationLogEntry => {
            VaultEntity::OperationLogEntry(from_json(bytes).map_err(malformed)?)
        }
        EntityKind::TrashedCredential => {
            VaultEntity::TrashedCredential(from_json(bytes).map_err(malformed)?)
        }
        EntityKind::TrashedItem => VaultEntity::TrashedItem(from_json(bytes).map_err(malformed)?),
        EntityKind::CommonAccountInfo => {
            VaultEntity::CommonAccountInfo(from_json(bytes).map_err(malformed)?)
        }
        EntityKind::GeneratedPassword => {
            VaultEntity::GeneratedPassword(from_json(bytes).map_err(malformed)?)
        }
    })
}

/// Encode a list of records as one JSON array.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if any record fails to serialize.
pub fn encode_records<T: Serialize>(records: &[T], kind: EntityKind) -> Result<Vec<u8>, CodecError> {
    to_json(&records).map_err(|e| CodecError::Encode {
        kind,
        reason: e.to_string(),
    })
}

/// Decode a JSON array element by element.
///
/// The outer result fails only when the bytes are not an array at all;
/// each element carries its own result.
///
/// # Errors
///
/// Returns [`CodecError::NotAList`] if the bytes are not a JSON array.
pub fn decode_records<T: DeserializeOwned>(
    bytes: &[u8],
    kind: EntityKind,
) -> Result<Vec<Result<T, CodecError>>, CodecError> {
    let values: Vec<serde_json::Value> =
        from_json(bytes).map_err(|e| CodecError::NotAList(e.to_string()))?;
    Ok(values
        .into_iter()
        .map(|value| {
            serde_json::from_value(value).map_err(|e| CodecError::Malformed {
                kind,
                reason: e.to_string(),
            })
        })
        .collect())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(value)
}

fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_json::Error> {
    // Tolerate a UTF-8 BOM written by some editors.
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    serde_json::from_slice(bytes)
}

/// Archive member name for a single credential.
#[must_use]
pub fn credential_member_name(credential: &Credential) -> String {
    format!("{}_{}.json", credential.id, credential.created_at)
}

/// Archive member name for a single secure item, within its kind's
/// directory.
#[must_use]
pub fn item_member_name(item: &SecureItem) -> String {
    format!("{}_{}.json", item.id, item.created_at)
}

impl From<Credential> for VaultEntity {
    fn from(value: Credential) -> Self {
        Self::Credential(value)
    }
}

impl From<Category> for VaultEntity {
    fn from(value: Category) -> Self {
        Self::Category(value)
    }
}

impl From<OperationLogEntry> for VaultEntity {
    fn from(value: OperationLogEntry) -> Self {
        Self::OperationLogEntry(value)
    }
}

impl From<TrashedCredential> for VaultEntity {
    fn from(value: TrashedCredential) -> Self {
        Self::TrashedCredential(value)
    }
}

impl From<TrashedItem> for VaultEntity {
    fn from(value: TrashedItem) -> Self {
        Self::TrashedItem(value)
    }
}

impl From<CommonAccountInfo> for VaultEntity {
    fn from(value: CommonAccountInfo) -> Self {
        Self::CommonAccountInfo(value)
    }
}

impl From<GeneratedPassword> for VaultEntity {
    fn from(value: GeneratedPassword) -> Self {
        Self::GeneratedPassword(value)
    }
}

impl From<SecureItem> for VaultEntity {
    fn from(value: SecureItem) -> Self {
        Self::from_secure_item(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_credential() -> Credential {
        Credential {
            id: 12,
            title: "Bank".into(),
            username: "alice".into(),
            password: "s3cret".into(),
            website: "bank.com".into(),
            category_name: Some("Finance".into()),
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_500_000,
            ..Credential::default()
        }
    }

    #[test]
    fn credential_round_trips_every_field() {
        let entity = VaultEntity::Credential(sample_credential());
        let bytes = encode(&entity).expect("encode should succeed");
        let decoded = decode(&bytes, EntityKind::Credential).expect("decode should succeed");
        assert_eq!(decoded, entity);
    }

    #[test]
    fn missing_fields_decode_to_defaults() {
        let decoded = decode(br#"{"id":3,"title":"Old"}"#, EntityKind::Credential)
            .expect("decode should succeed");
        let VaultEntity::Credential(c) = decoded else {
            panic!("expected credential");
        };
        assert_eq!(c.id, 3);
        assert_eq!(c.title, "Old");
        assert!(c.password.is_empty());
        assert!(c.category_name.is_none());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let decoded = decode(
            br#"{"id":1,"title":"T","passkeyBlob":"zzz","futureFlag":true}"#,
            EntityKind::Credential,
        );
        assert!(decoded.is_ok());
    }

    #[test]
    fn note_hint_without_item_type_is_a_note() {
        let decoded = decode(br#"{"id":5,"title":"Memo","notes":"body"}"#, EntityKind::Note)
            .expect("decode should succeed");
        assert_eq!(decoded.kind(), EntityKind::Note);
        assert_eq!(decoded.title(), "Memo");
    }

    #[test]
    fn garbage_is_malformed() {
        let result = decode(b"{not json", EntityKind::Credential);
        assert!(matches!(
            result,
            Err(CodecError::Malformed {
                kind: EntityKind::Credential,
                ..
            })
        ));
    }

    #[test]
    fn bom_prefixed_json_decodes() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(br#"{"id":1,"name":"Work","sortOrder":2}"#);
        let decoded = decode(&bytes, EntityKind::Category).expect("decode should succeed");
        assert_eq!(decoded.title(), "Work");
    }

    #[test]
    fn record_lists_isolate_bad_elements() {
        let bytes = br#"[{"id":1,"name":"A"},{"id":"oops"},{"id":3,"name":"C"}]"#;
        let results: Vec<Result<Category, CodecError>> =
            decode_records(bytes, EntityKind::Category).expect("array should parse");
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().name, "C");
    }

    #[test]
    fn non_array_list_member_is_rejected() {
        let result: Result<Vec<Result<Category, CodecError>>, _> =
            decode_records(br#"{"id":1}"#, EntityKind::Category);
        assert!(matches!(result, Err(CodecError::NotAList(_))));
    }

    #[test]
    fn member_names_embed_id_and_creation_time() {
        assert_eq!(
            credential_member_name(&sample_credential()),
            "12_1700000000000.json"
        );
    }
}

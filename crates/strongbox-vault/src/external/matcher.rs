//! Mapping between vault records and container entries, and the rules
//! deciding which entry a record corresponds to.
//!
//! An entry carrying a stable identity field is matched by id when the
//! record has a persisted id. Otherwise credentials fall back to a
//! case-insensitive (title, username, url) match and secure items to
//! (title, item type).

use std::collections::BTreeMap;

use uuid::Uuid;

use super::tree::{Entry, FieldValue, Times};
use crate::entities::{parse_image_paths, Credential, SecureItem, SecureItemKind};

// ---------------------------------------------------------------------------
// Field names
// ---------------------------------------------------------------------------

/// Standard title field.
pub const TITLE: &str = "Title";
/// Standard username field.
pub const USER_NAME: &str = "UserName";
/// Standard password field.
pub const PASSWORD: &str = "Password";
/// Standard URL field.
pub const URL: &str = "URL";
/// Standard notes field.
pub const NOTES: &str = "Notes";

/// Local credential id embedded in an entry.
pub const LOCAL_ID: &str = "StrongboxLocalId";
/// Local secure-item id embedded in an entry.
pub const SECURE_ITEM_ID: &str = "StrongboxSecureItemId";
/// Secure-item kind tag.
pub const ITEM_TYPE: &str = "StrongboxItemType";
/// Secure-item payload.
pub const ITEM_DATA: &str = "StrongboxItemData";
/// Secure-item image file names (JSON array).
pub const IMAGE_PATHS: &str = "StrongboxImagePaths";
/// Secure-item favorite flag.
pub const IS_FAVORITE: &str = "StrongboxIsFavorite";

/// Plain value of `name`, or `""` when absent.
#[must_use]
pub fn field<'a>(entry: &'a Entry, name: &str) -> &'a str {
    entry.fields.get(name).map_or("", |f| f.value.as_str())
}

fn id_field(entry: &Entry, name: &str) -> Option<i64> {
    field(entry, name).trim().parse().ok()
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Whether `entry` stands for `credential`.
#[must_use]
pub fn matches_credential(entry: &Entry, credential: &Credential) -> bool {
    if let Some(id) = id_field(entry, LOCAL_ID) {
        if credential.id > 0 {
            return id == credential.id;
        }
    }
    field(entry, TITLE).eq_ignore_ascii_case(&credential.title)
        && field(entry, USER_NAME).eq_ignore_ascii_case(&credential.username)
        && field(entry, URL).eq_ignore_ascii_case(&credential.website)
}

/// Whether `entry` stands for `item`.
#[must_use]
pub fn matches_secure_item(entry: &Entry, item: &SecureItem) -> bool {
    if let Some(id) = id_field(entry, SECURE_ITEM_ID) {
        if item.id > 0 {
            return id == item.id;
        }
    }
    field(entry, TITLE).eq_ignore_ascii_case(&item.title)
        && field(entry, ITEM_TYPE).eq_ignore_ascii_case(item.kind.as_str())
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn set(fields: &mut BTreeMap<String, FieldValue>, name: &str, value: &str, protected: bool) {
    fields.insert(
        name.to_string(),
        FieldValue {
            value: value.to_string(),
            protected,
        },
    );
}

fn base_entry(existing: Option<&Entry>, now_millis: i64) -> Entry {
    existing.map_or_else(
        || Entry {
            uuid: Uuid::new_v4(),
            times: Times {
                created_millis: now_millis,
                ..Times::default()
            },
            ..Entry::default()
        },
        Clone::clone,
    )
}

/// Entry for `credential`, built on `existing` when updating so fields
/// this engine does not manage survive.
#[must_use]
pub fn credential_entry(existing: Option<&Entry>, credential: &Credential, now_millis: i64) -> Entry {
    let mut entry = base_entry(existing, now_millis);
    let fields = &mut entry.fields;
    set(fields, TITLE, &credential.title, false);
    set(fields, USER_NAME, &credential.username, false);
    set(fields, PASSWORD, &credential.password, true);
    set(fields, URL, &credential.website, false);
    set(fields, NOTES, &credential.notes, false);
    if credential.id > 0 {
        set(fields, LOCAL_ID, &credential.id.to_string(), false);
    }
    entry.times.modified_millis = now_millis;
    entry
}

/// Entry for `item`; see [`credential_entry`].
#[must_use]
pub fn secure_item_entry(existing: Option<&Entry>, item: &SecureItem, now_millis: i64) -> Entry {
    let mut entry = base_entry(existing, now_millis);
    let images = serde_json::to_string(&item.image_paths).unwrap_or_else(|_| "[]".into());
    let fields = &mut entry.fields;
    set(fields, TITLE, &item.title, false);
    set(fields, USER_NAME, "", false);
    set(fields, PASSWORD, "", true);
    set(fields, URL, "", false);
    set(fields, NOTES, &item.notes, false);
    set(fields, ITEM_TYPE, item.kind.as_str(), false);
    set(fields, ITEM_DATA, &item.item_data, true);
    set(fields, IMAGE_PATHS, &images, false);
    set(fields, IS_FAVORITE, if item.is_favorite { "true" } else { "false" }, false);
    if item.id > 0 {
        set(fields, SECURE_ITEM_ID, &item.id.to_string(), false);
    }
    entry.times.modified_millis = now_millis;
    entry
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// A credential found in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCredential {
    /// Entry identity in the container.
    pub uuid: Uuid,
    /// Group path below the root, if not in the root itself.
    pub group_path: Option<String>,
    /// Local id embedded in the entry, if any.
    pub local_id: Option<i64>,
    /// The entry as a credential (id 0, not yet persisted).
    pub credential: Credential,
}

/// A secure item found in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSecureItem {
    /// Entry identity in the container.
    pub uuid: Uuid,
    /// Group path below the root, if not in the root itself.
    pub group_path: Option<String>,
    /// Local id embedded in the entry, if any.
    pub local_id: Option<i64>,
    /// The entry as a secure item (id 0, not yet persisted).
    pub item: SecureItem,
}

/// Read `entry` as a credential.
///
/// Secure-item entries and entries with no username, password or url
/// are not credentials.
#[must_use]
pub fn read_credential(entry: &Entry, group_path: Option<String>) -> Option<ExternalCredential> {
    if !field(entry, ITEM_TYPE).trim().is_empty() {
        return None;
    }
    let username = field(entry, USER_NAME);
    let password = field(entry, PASSWORD);
    let url = field(entry, URL);
    if username.trim().is_empty() && password.trim().is_empty() && url.trim().is_empty() {
        return None;
    }
    Some(ExternalCredential {
        uuid: entry.uuid,
        group_path,
        local_id: id_field(entry, LOCAL_ID),
        credential: Credential {
            title: field(entry, TITLE).to_string(),
            username: username.to_string(),
            password: password.to_string(),
            website: url.to_string(),
            notes: field(entry, NOTES).to_string(),
            created_at: entry.times.created_millis,
            updated_at: entry.times.modified_millis,
            ..Credential::default()
        },
    })
}

/// Read `entry` as a secure item. Needs a known kind and a payload.
#[must_use]
pub fn read_secure_item(entry: &Entry, group_path: Option<String>) -> Option<ExternalSecureItem> {
    let kind = SecureItemKind::parse(field(entry, ITEM_TYPE))?;
    let data = field(entry, ITEM_DATA);
    if data.trim().is_empty() {
        return None;
    }
    let title = field(entry, TITLE);
    Some(ExternalSecureItem {
        uuid: entry.uuid,
        group_path,
        local_id: id_field(entry, SECURE_ITEM_ID),
        item: SecureItem {
            kind,
            title: if title.trim().is_empty() { "Untitled" } else { title }.to_string(),
            item_data: data.to_string(),
            notes: field(entry, NOTES).to_string(),
            is_favorite: field(entry, IS_FAVORITE).trim().eq_ignore_ascii_case("true"),
            image_paths: parse_image_paths(field(entry, IMAGE_PATHS)),
            created_at: entry.times.created_millis,
            updated_at: entry.times.modified_millis,
            ..SecureItem::default()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> Credential {
        Credential {
            title: "Bank".into(),
            username: "alice".into(),
            website: "bank.com".into(),
            password: "old".into(),
            ..Credential::default()
        }
    }

    #[test]
    fn triple_match_ignores_case() {
        let entry = credential_entry(None, &bank(), 1);
        let probe = Credential {
            title: "BANK".into(),
            username: "Alice".into(),
            website: "BANK.com".into(),
            ..Credential::default()
        };
        assert!(matches_credential(&entry, &probe));

        let other = Credential {
            username: "bob".into(),
            ..probe
        };
        assert!(!matches_credential(&entry, &other));
    }

    #[test]
    fn embedded_id_wins_over_fields() {
        let stored = Credential { id: 7, ..bank() };
        let entry = credential_entry(None, &stored, 1);

        let renamed = Credential {
            id: 7,
            title: "Renamed".into(),
            ..bank()
        };
        assert!(matches_credential(&entry, &renamed));

        let other_id = Credential { id: 8, ..bank() };
        assert!(!matches_credential(&entry, &other_id));

        // A record without a persisted id falls back to the triple.
        assert!(matches_credential(&entry, &bank()));
    }

    #[test]
    fn update_keeps_unmanaged_fields() {
        let mut entry = credential_entry(None, &bank(), 1);
        entry.fields.insert(
            "otp".into(),
            FieldValue {
                value: "otpauth://totp/x".into(),
                protected: true,
            },
        );
        entry.tags.push("finance".into());

        let updated = credential_entry(
            Some(&entry),
            &Credential {
                password: "new".into(),
                ..bank()
            },
            5,
        );
        assert_eq!(updated.uuid, entry.uuid);
        assert_eq!(field(&updated, PASSWORD), "new");
        assert_eq!(field(&updated, "otp"), "otpauth://totp/x");
        assert_eq!(updated.tags, vec!["finance".to_string()]);
        assert_eq!(updated.times.created_millis, 1);
        assert_eq!(updated.times.modified_millis, 5);
        assert!(updated.fields[PASSWORD].protected);
        assert!(!updated.fields.contains_key(LOCAL_ID));
    }

    #[test]
    fn credentials_read_back() {
        let entry = credential_entry(None, &Credential { id: 3, ..bank() }, 1);
        let read = read_credential(&entry, Some("Finance".into())).unwrap();
        assert_eq!(read.local_id, Some(3));
        assert_eq!(read.group_path.as_deref(), Some("Finance"));
        assert_eq!(read.credential.id, 0);
        assert_eq!(read.credential.password, "old");
        assert!(read_secure_item(&entry, None).is_none());
    }

    #[test]
    fn empty_login_entries_are_skipped() {
        let entry = credential_entry(
            None,
            &Credential {
                title: "Just a note".into(),
                notes: "text".into(),
                ..Credential::default()
            },
            1,
        );
        assert!(read_credential(&entry, None).is_none());
    }

    #[test]
    fn secure_items_round_trip_through_entries() {
        let item = SecureItem {
            id: 4,
            kind: SecureItemKind::BankCard,
            title: "Visa".into(),
            item_data: r#"{"number":"4111"}"#.into(),
            is_favorite: true,
            image_paths: vec!["a.enc".into()],
            ..SecureItem::default()
        };
        let entry = secure_item_entry(None, &item, 9);
        assert!(matches_secure_item(&entry, &item));
        assert!(read_credential(&entry, None).is_none());

        let read = read_secure_item(&entry, None).unwrap();
        assert_eq!(read.local_id, Some(4));
        assert_eq!(read.item.kind, SecureItemKind::BankCard);
        assert_eq!(read.item.item_data, item.item_data);
        assert!(read.item.is_favorite);
        assert_eq!(read.item.image_paths, item.image_paths);
    }

    #[test]
    fn secure_item_fallback_needs_matching_kind() {
        let note = SecureItem {
            kind: SecureItemKind::Note,
            title: "Wifi".into(),
            item_data: "{}".into(),
            ..SecureItem::default()
        };
        let entry = secure_item_entry(None, &note, 1);
        let doc = SecureItem {
            kind: SecureItemKind::Document,
            ..note.clone()
        };
        assert!(matches_secure_item(&entry, &note));
        assert!(!matches_secure_item(&entry, &doc));
    }
}

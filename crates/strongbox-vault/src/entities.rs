//! Vault entity records as they travel through backups.
//!
//! Every record is `#[serde(default)]` so older bundles missing newer
//! fields still decode, and unknown fields from newer bundles are ignored.
//! Timestamps are Unix milliseconds.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

/// Discriminant of [`VaultEntity`], also used as the decode hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Website or app login.
    Credential,
    /// Free-form secure note.
    Note,
    /// Second-factor secret, bank card or document.
    SecureItem,
    /// Named grouping of credentials.
    Category,
    /// Entry of the operation timeline.
    OperationLogEntry,
    /// Credential in the trash.
    TrashedCredential,
    /// Secure item in the trash.
    TrashedItem,
    /// Profile defaults used for autofill.
    CommonAccountInfo,
    /// Entry of the generated-password history.
    GeneratedPassword,
}

impl EntityKind {
    /// Stable lowercase label used in reports and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Credential => "credential",
            Self::Note => "note",
            Self::SecureItem => "secure_item",
            Self::Category => "category",
            Self::OperationLogEntry => "operation_log_entry",
            Self::TrashedCredential => "trashed_credential",
            Self::TrashedItem => "trashed_item",
            Self::CommonAccountInfo => "common_account_info",
            Self::GeneratedPassword => "generated_password",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// How a credential signs in.
///
/// Decoding is lenient: anything other than `"SSO"` is a password login, so
/// an unknown login type from a newer bundle never fails the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LoginType {
    /// Username and password.
    #[default]
    Password,
    /// Federated sign-in through another account.
    Sso,
}

impl From<String> for LoginType {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("SSO") {
            Self::Sso
        } else {
            Self::Password
        }
    }
}

impl From<LoginType> for String {
    fn from(value: LoginType) -> Self {
        match value {
            LoginType::Password => "PASSWORD".into(),
            LoginType::Sso => "SSO".into(),
        }
    }
}

/// A stored login.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Credential {
    /// Local identity, unique among credentials. `0` means "not persisted".
    pub id: i64,
    /// Display title.
    pub title: String,
    /// Account username.
    pub username: String,
    /// Secret.
    pub password: String,
    /// Website or app identifier.
    pub website: String,
    /// Free-form notes.
    pub notes: String,
    /// Favorite flag.
    pub is_favorite: bool,
    /// Local category identity, resolved again on restore.
    pub category_id: Option<i64>,
    /// Category name captured at backup time.
    pub category_name: Option<String>,
    /// Account email.
    pub email: String,
    /// Account phone number.
    pub phone: String,
    /// Creation time (ms).
    pub created_at: i64,
    /// Last update time (ms).
    pub updated_at: i64,
    /// Second-factor secret bound to this login.
    pub authenticator_key: String,
    /// Password or federated login.
    pub login_type: LoginType,
    /// Federated provider name (e.g. `"google"`).
    pub sso_provider: String,
    /// Credential holding the federated account, if any.
    pub sso_ref_entry_id: Option<i64>,
    /// Position within its group.
    pub sort_order: i32,
    /// Whether this credential represents its group.
    pub is_group_cover: bool,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// Soft-delete time (ms).
    pub deleted_at: Option<i64>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("username", &self.username)
            .field("password", &"***")
            .field("website", &self.website)
            .field("category_id", &self.category_id)
            .field("category_name", &self.category_name)
            .field("created_at", &self.created_at)
            .field("is_deleted", &self.is_deleted)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Secure items and notes
// ---------------------------------------------------------------------------

/// Kind of a [`SecureItem`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecureItemKind {
    /// Second-factor (TOTP) secret.
    Totp,
    /// Payment card.
    BankCard,
    /// Identity or other document.
    Document,
    /// Secure note.
    #[default]
    Note,
}

impl SecureItemKind {
    /// Upper-case tag used in tabular exports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Totp => "TOTP",
            Self::BankCard => "BANK_CARD",
            Self::Document => "DOCUMENT",
            Self::Note => "NOTE",
        }
    }

    /// Parse the upper-case tag; `None` for unknown tags.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim() {
            "TOTP" => Some(Self::Totp),
            "BANK_CARD" => Some(Self::BankCard),
            "DOCUMENT" => Some(Self::Document),
            "NOTE" => Some(Self::Note),
            _ => None,
        }
    }
}

/// A note, second-factor secret, card or document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecureItem {
    /// Local identity, unique among secure items.
    pub id: i64,
    /// Item kind.
    #[serde(rename = "itemType")]
    pub kind: SecureItemKind,
    /// Display title.
    pub title: String,
    /// Kind-specific payload as an opaque JSON string.
    pub item_data: String,
    /// Free-form notes.
    pub notes: String,
    /// Favorite flag.
    pub is_favorite: bool,
    /// Encrypted image file names (`<uuid>.enc`).
    #[serde(deserialize_with = "deserialize_image_paths")]
    pub image_paths: Vec<String>,
    /// Creation time (ms).
    pub created_at: i64,
    /// Last update time (ms).
    pub updated_at: i64,
    /// Local category identity.
    pub category_id: Option<i64>,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// Soft-delete time (ms).
    pub deleted_at: Option<i64>,
}

/// Older bundles store image paths as a JSON array encoded in a string.
fn deserialize_image_paths<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Paths {
        List(Vec<String>),
        Encoded(String),
        Null(()),
    }

    Ok(match Paths::deserialize(deserializer)? {
        Paths::List(list) => list,
        Paths::Encoded(text) => parse_image_paths(&text),
        Paths::Null(()) => Vec::new(),
    })
}

/// Parse a JSON-array string of image paths, tolerating blanks and junk.
#[must_use]
pub fn parse_image_paths(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(text).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Other records
// ---------------------------------------------------------------------------

/// Named credential grouping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Category {
    /// Local identity.
    pub id: i64,
    /// Display name; matched case-sensitively on restore.
    pub name: String,
    /// Position in the category list.
    pub sort_order: i32,
}

/// One entry of the operation timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationLogEntry {
    /// Local identity.
    pub id: i64,
    /// Kind of item touched (`"PASSWORD"`, `"NOTE"`, ...).
    pub item_type: String,
    /// Identity of the item touched.
    pub item_id: i64,
    /// Title of the item at the time of the operation.
    pub item_title: String,
    /// `"CREATE"`, `"UPDATE"`, `"DELETE"`, ...
    pub operation_type: String,
    /// JSON description of the changed fields.
    pub changes_json: String,
    /// Originating device identifier.
    pub device_id: String,
    /// Originating device name.
    pub device_name: String,
    /// Operation time (ms); timeline restores deduplicate on it.
    pub timestamp: i64,
    /// Whether the operation was undone.
    pub is_reverted: bool,
}

/// A credential sitting in the trash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrashedCredential(pub Credential);

/// A secure item sitting in the trash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrashedItem(pub SecureItem);

/// Key used to recognise a trashed record already present locally.
///
/// Two different records sharing a title and creation millisecond collide;
/// see DESIGN.md.
pub type TrashKey = (String, i64);

impl TrashedCredential {
    /// Deduplication key: `(title, created_at)`.
    #[must_use]
    pub fn trash_key(&self) -> TrashKey {
        (self.0.title.clone(), self.0.created_at)
    }
}

impl TrashedItem {
    /// Deduplication key: `(title, created_at)`.
    #[must_use]
    pub fn trash_key(&self) -> TrashKey {
        (self.0.title.clone(), self.0.created_at)
    }
}

/// Profile defaults offered by autofill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommonAccountInfo {
    /// Default email.
    pub email: String,
    /// Default phone number.
    pub phone: String,
    /// Default username.
    pub username: String,
    /// Whether autofill suggests these values.
    pub auto_fill_enabled: bool,
}

impl CommonAccountInfo {
    /// Fill only the fields that are empty locally; local values win.
    #[must_use]
    pub fn merged_into(&self, local: &Self) -> Self {
        let pick = |local: &String, backup: &String| {
            if local.trim().is_empty() {
                backup.clone()
            } else {
                local.clone()
            }
        };
        Self {
            email: pick(&local.email, &self.email),
            phone: pick(&local.phone, &self.phone),
            username: pick(&local.username, &self.username),
            auto_fill_enabled: local.auto_fill_enabled || self.auto_fill_enabled,
        }
    }
}

/// One generated password remembered by the generator.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratedPassword {
    /// Local identity.
    pub id: i64,
    /// Generated secret.
    pub password: String,
    /// Site the password was generated for, if known.
    pub website: String,
    /// Username the password was generated for, if known.
    pub username: String,
    /// Generation time (ms).
    pub created_at: i64,
}

impl fmt::Debug for GeneratedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedPassword")
            .field("id", &self.id)
            .field("password", &"***")
            .field("website", &self.website)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tagged union
// ---------------------------------------------------------------------------

/// Any record the engine backs up or restores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultEntity {
    /// See [`Credential`].
    Credential(Credential),
    /// A [`SecureItem`] of kind [`SecureItemKind::Note`].
    Note(SecureItem),
    /// A [`SecureItem`] of any other kind.
    SecureItem(SecureItem),
    /// See [`Category`].
    Category(Category),
    /// See [`OperationLogEntry`].
    OperationLogEntry(OperationLogEntry),
    /// See [`TrashedCredential`].
    TrashedCredential(TrashedCredential),
    /// See [`TrashedItem`].
    TrashedItem(TrashedItem),
    /// See [`CommonAccountInfo`].
    CommonAccountInfo(CommonAccountInfo),
    /// See [`GeneratedPassword`].
    GeneratedPassword(GeneratedPassword),
}

impl VaultEntity {
    /// Wrap a secure item in the variant matching its kind.
    #[must_use]
    pub fn from_secure_item(item: SecureItem) -> Self {
        if item.kind == SecureItemKind::Note {
            Self::Note(item)
        } else {
            Self::SecureItem(item)
        }
    }

    /// Variant discriminant.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Credential(_) => EntityKind::Credential,
            Self::Note(_) => EntityKind::Note,
            Self::SecureItem(_) => EntityKind::SecureItem,
            Self::Category(_) => EntityKind::Category,
            Self::OperationLogEntry(_) => EntityKind::OperationLogEntry,
            Self::TrashedCredential(_) => EntityKind::TrashedCredential,
            Self::TrashedItem(_) => EntityKind::TrashedItem,
            Self::CommonAccountInfo(_) => EntityKind::CommonAccountInfo,
            Self::GeneratedPassword(_) => EntityKind::GeneratedPassword,
        }
    }

    /// Local identity; `0` for records without one.
    #[must_use]
    pub const fn identity(&self) -> i64 {
        match self {
            Self::Credential(c) => c.id,
            Self::Note(i) | Self::SecureItem(i) => i.id,
            Self::Category(c) => c.id,
            Self::OperationLogEntry(e) => e.id,
            Self::TrashedCredential(t) => t.0.id,
            Self::TrashedItem(t) => t.0.id,
            Self::CommonAccountInfo(_) => 0,
            Self::GeneratedPassword(g) => g.id,
        }
    }

    /// Display title used in reports.
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Credential(c) => &c.title,
            Self::Note(i) | Self::SecureItem(i) => &i.title,
            Self::Category(c) => &c.name,
            Self::OperationLogEntry(e) => &e.item_title,
            Self::TrashedCredential(t) => &t.0.title,
            Self::TrashedItem(t) => &t.0.title,
            Self::CommonAccountInfo(a) => &a.username,
            Self::GeneratedPassword(g) => &g.website,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_serde_uses_camel_case() {
        let cred = Credential {
            id: 7,
            is_favorite: true,
            category_name: Some("Work".into()),
            login_type: LoginType::Sso,
            ..Credential::default()
        };
        let json = serde_json::to_string(&cred).unwrap();
        assert!(json.contains("\"isFavorite\":true"));
        assert!(json.contains("\"categoryName\":\"Work\""));
        assert!(json.contains("\"loginType\":\"SSO\""));
        assert!(!json.contains("is_favorite"));
    }

    #[test]
    fn unknown_login_type_falls_back_to_password() {
        let cred: Credential = serde_json::from_str(r#"{"loginType":"PASSKEY"}"#).unwrap();
        assert_eq!(cred.login_type, LoginType::Password);
    }

    #[test]
    fn credential_debug_masks_password() {
        let cred = Credential {
            password: "hunter2".into(),
            ..Credential::default()
        };
        let debug = format!("{cred:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn image_paths_accept_encoded_string_and_list() {
        let legacy: SecureItem =
            serde_json::from_str(r#"{"imagePaths":"[\"a.enc\",\"b.enc\"]"}"#).unwrap();
        assert_eq!(legacy.image_paths, vec!["a.enc", "b.enc"]);

        let current: SecureItem = serde_json::from_str(r#"{"imagePaths":["c.enc"]}"#).unwrap();
        assert_eq!(current.image_paths, vec!["c.enc"]);

        let blank: SecureItem = serde_json::from_str(r#"{"imagePaths":""}"#).unwrap();
        assert!(blank.image_paths.is_empty());

        let null: SecureItem = serde_json::from_str(r#"{"imagePaths":null}"#).unwrap();
        assert!(null.image_paths.is_empty());
    }

    #[test]
    fn secure_item_kind_uses_item_type_tag() {
        let item: SecureItem = serde_json::from_str(r#"{"itemType":"BANK_CARD"}"#).unwrap();
        assert_eq!(item.kind, SecureItemKind::BankCard);
        assert_eq!(SecureItemKind::parse("TOTP"), Some(SecureItemKind::Totp));
        assert_eq!(SecureItemKind::parse("PASSWORD"), None);
    }

    #[test]
    fn trashed_records_serialize_transparently() {
        let trashed = TrashedCredential(Credential {
            title: "Old".into(),
            created_at: 42,
            deleted_at: Some(99),
            is_deleted: true,
            ..Credential::default()
        });
        let json = serde_json::to_value(&trashed).unwrap();
        assert_eq!(json["title"], "Old");
        assert_eq!(json["deletedAt"], 99);
        assert_eq!(trashed.trash_key(), ("Old".to_string(), 42));
    }

    #[test]
    fn common_account_merge_keeps_local_values() {
        let local = CommonAccountInfo {
            email: "me@local".into(),
            ..CommonAccountInfo::default()
        };
        let backup = CommonAccountInfo {
            email: "me@backup".into(),
            phone: "555".into(),
            username: "me".into(),
            auto_fill_enabled: true,
        };
        let merged = backup.merged_into(&local);
        assert_eq!(merged.email, "me@local");
        assert_eq!(merged.phone, "555");
        assert_eq!(merged.username, "me");
        assert!(merged.auto_fill_enabled);
    }

    #[test]
    fn from_secure_item_routes_notes() {
        let note = SecureItem::default();
        assert_eq!(VaultEntity::from_secure_item(note).kind(), EntityKind::Note);
        let card = SecureItem {
            kind: SecureItemKind::BankCard,
            ..SecureItem::default()
        };
        assert_eq!(VaultEntity::from_secure_item(card).kind(), EntityKind::SecureItem);
    }
}

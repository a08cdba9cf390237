//! Portable backup bundles.
//!
//! A bundle is a zip archive with one JSON member per credential and per
//! secure item, list members for categories, timeline, trash and history,
//! raw encrypted image blobs, and CSV copies kept for older readers. The
//! whole archive may be wrapped by the envelope codec.

pub mod builder;
pub mod restorer;

use serde::{Deserialize, Serialize};

use crate::entities::{
    Category, CommonAccountInfo, Credential, GeneratedPassword, OperationLogEntry, SecureItem,
    SecureItemKind, TrashedCredential, TrashedItem,
};

pub use builder::{build, BuildOptions, BuiltBundle};
pub use restorer::{restore, RestoreContext, RestoredBundle};

// ---------------------------------------------------------------------------
// Archive layout
// ---------------------------------------------------------------------------

/// Directory of per-credential members.
pub const PASSWORDS_DIR: &str = "passwords/";
/// Directory of per-note members.
pub const NOTES_DIR: &str = "notes/";
/// Directory of per-secret second-factor members.
pub const TOTP_DIR: &str = "totp/";
/// Directory of per-card members.
pub const BANK_CARDS_DIR: &str = "bank_cards/";
/// Directory of per-document members.
pub const DOCUMENTS_DIR: &str = "documents/";
/// Directory of raw image blobs.
pub const IMAGES_DIR: &str = "images/";
/// Category list member.
pub const CATEGORIES_MEMBER: &str = "categories.json";
/// Operation timeline member.
pub const TIMELINE_MEMBER: &str = "timeline_history.json";
/// Trashed credentials member.
pub const TRASH_PASSWORDS_MEMBER: &str = "trash/trash_passwords.json";
/// Trashed secure items member.
pub const TRASH_ITEMS_MEMBER: &str = "trash/trash_secure_items.json";
/// Profile defaults member.
pub const COMMON_ACCOUNT_MEMBER: &str = "common_account.json";
/// Prefix of the tabular compatibility members.
pub const TABULAR_PREFIX: &str = "strongbox";

/// Directory holding the members of one secure-item kind.
#[must_use]
pub const fn secure_item_dir(kind: SecureItemKind) -> &'static str {
    match kind {
        SecureItemKind::Note => NOTES_DIR,
        SecureItemKind::Totp => TOTP_DIR,
        SecureItemKind::BankCard => BANK_CARDS_DIR,
        SecureItemKind::Document => DOCUMENTS_DIR,
    }
}

/// Name of a tabular or history member: `<prefix>_<ts>_<suffix>`.
#[must_use]
pub fn tabular_member(timestamp: &str, suffix: &str) -> String {
    format!("{TABULAR_PREFIX}_{timestamp}_{suffix}")
}

// ---------------------------------------------------------------------------
// Selection and input
// ---------------------------------------------------------------------------

/// Which classes of vault data go into a bundle.
///
/// Categories travel with any included record that references one.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupSelection {
    /// Credentials and their categories.
    pub credentials: bool,
    /// Secure notes.
    pub notes: bool,
    /// Second-factor secrets.
    pub totp: bool,
    /// Payment cards.
    pub bank_cards: bool,
    /// Documents.
    pub documents: bool,
    /// Image blobs referenced by included items.
    pub images: bool,
    /// Generated-password history.
    pub generated_history: bool,
    /// Operation timeline.
    pub timeline: bool,
    /// Trashed records.
    pub trash: bool,
    /// Profile defaults.
    pub common_account: bool,
}

impl Default for BackupSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl BackupSelection {
    /// Every flag set.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            credentials: true,
            notes: true,
            totp: true,
            bank_cards: true,
            documents: true,
            images: true,
            generated_history: true,
            timeline: true,
            trash: true,
            common_account: true,
        }
    }

    /// Every flag cleared.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            credentials: false,
            notes: false,
            totp: false,
            bank_cards: false,
            documents: false,
            images: false,
            generated_history: false,
            timeline: false,
            trash: false,
            common_account: false,
        }
    }

    /// Whether at least one flag is set.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.credentials
            || self.notes
            || self.totp
            || self.bank_cards
            || self.documents
            || self.images
            || self.generated_history
            || self.timeline
            || self.trash
            || self.common_account
    }
}

/// Everything the vault holds, as handed to the builder.
///
/// `secure_items` mixes notes with the other secure-item kinds; the
/// builder routes each by its kind.
#[derive(Debug, Clone, Default)]
pub struct VaultSnapshot {
    /// Active credentials.
    pub credentials: Vec<Credential>,
    /// Active notes, second-factor secrets, cards and documents.
    pub secure_items: Vec<SecureItem>,
    /// Categories.
    pub categories: Vec<Category>,
    /// Operation timeline.
    pub timeline: Vec<OperationLogEntry>,
    /// Trashed credentials.
    pub trashed_credentials: Vec<TrashedCredential>,
    /// Trashed secure items.
    pub trashed_items: Vec<TrashedItem>,
    /// Profile defaults, if set.
    pub common_account: Option<CommonAccountInfo>,
    /// Generated-password history.
    pub generated: Vec<GeneratedPassword>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_defaults_to_everything() {
        let selection: BackupSelection = serde_json::from_str("{}").unwrap();
        assert_eq!(selection, BackupSelection::all());
        assert!(selection.any());
        assert!(!BackupSelection::none().any());
    }

    #[test]
    fn single_flag_counts_as_a_selection() {
        let selection = BackupSelection {
            trash: true,
            ..BackupSelection::none()
        };
        assert!(selection.any());
    }

    #[test]
    fn every_kind_has_its_own_directory() {
        let dirs = [
            SecureItemKind::Note,
            SecureItemKind::Totp,
            SecureItemKind::BankCard,
            SecureItemKind::Document,
        ]
        .map(secure_item_dir);
        assert_eq!(dirs, ["notes/", "totp/", "bank_cards/", "documents/"]);
    }

    #[test]
    fn tabular_members_share_a_prefix() {
        assert_eq!(
            tabular_member("20240101_120000", "password.csv"),
            "strongbox_20240101_120000_password.csv"
        );
    }
}

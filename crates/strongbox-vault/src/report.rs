//! Reconciliation report returned by every backup and restore call.
//!
//! The report is built incrementally and is never discarded on partial
//! failure. `success` is authoritative: a call that returns `Ok` may still
//! carry failed items.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::entities::SecureItemKind;

/// Class of a reported item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemClass {
    /// Website or app login.
    Credential,
    /// Secure note.
    Note,
    /// Second-factor secret.
    Totp,
    /// Payment card.
    BankCard,
    /// Identity or other document.
    Document,
    /// Encrypted image blob.
    Image,
    /// Generated-password history entry.
    GeneratedPassword,
    /// Operation timeline entry.
    Timeline,
    /// Trashed credential or item.
    Trash,
    /// Category.
    Category,
    /// Profile defaults.
    CommonAccount,
}

impl ItemClass {
    /// Class of a secure item of the given kind.
    #[must_use]
    pub const fn of_secure(kind: SecureItemKind) -> Self {
        match kind {
            SecureItemKind::Totp => Self::Totp,
            SecureItemKind::BankCard => Self::BankCard,
            SecureItemKind::Document => Self::Document,
            SecureItemKind::Note => Self::Note,
        }
    }
}

/// Per-class item counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemCounts {
    /// Credentials.
    pub credentials: usize,
    /// Secure notes.
    pub notes: usize,
    /// Second-factor secrets.
    pub totp: usize,
    /// Payment cards.
    pub bank_cards: usize,
    /// Documents.
    pub documents: usize,
    /// Image blobs.
    pub images: usize,
    /// Generated-password history entries.
    pub generated: usize,
    /// Timeline entries.
    pub timeline: usize,
    /// Trashed records.
    pub trash: usize,
    /// Categories.
    pub categories: usize,
}

impl ItemCounts {
    /// Increment the counter for `class` (profile defaults are not counted).
    pub fn bump(&mut self, class: ItemClass) {
        self.add(class, 1);
    }

    /// Add `n` to the counter for `class`.
    pub fn add(&mut self, class: ItemClass, n: usize) {
        let slot = match class {
            ItemClass::Credential => &mut self.credentials,
            ItemClass::Note => &mut self.notes,
            ItemClass::Totp => &mut self.totp,
            ItemClass::BankCard => &mut self.bank_cards,
            ItemClass::Document => &mut self.documents,
            ItemClass::Image => &mut self.images,
            ItemClass::GeneratedPassword => &mut self.generated,
            ItemClass::Timeline => &mut self.timeline,
            ItemClass::Trash => &mut self.trash,
            ItemClass::Category => &mut self.categories,
            ItemClass::CommonAccount => return,
        };
        *slot = slot.saturating_add(n);
    }

    /// Sum over every class.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.credentials
            .saturating_add(self.notes)
            .saturating_add(self.totp)
            .saturating_add(self.bank_cards)
            .saturating_add(self.documents)
            .saturating_add(self.images)
            .saturating_add(self.generated)
            .saturating_add(self.timeline)
            .saturating_add(self.trash)
            .saturating_add(self.categories)
    }
}

/// One item that could not be encoded, decoded or applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    /// Local identity if known, `0` otherwise.
    pub identity: i64,
    /// Item class.
    pub class: ItemClass,
    /// Display title, or the archive member name when the title is unknown.
    pub title: String,
    /// What went wrong.
    pub reason: String,
}

/// Accounting of one backup or restore call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconciliationReport {
    /// `true` when the call completed without any failed item.
    pub success: bool,
    /// Items seen (in the vault for a backup, in the bundle for a restore).
    #[serde(rename = "backupContains")]
    pub found: ItemCounts,
    /// Items successfully written or materialized.
    #[serde(rename = "restoredSuccessfully")]
    pub restored: ItemCounts,
    /// Records already present locally and therefore not restored again.
    pub duplicates_skipped: usize,
    /// Failures, in processing order.
    pub failed_items: Vec<FailedItem>,
    /// Non-fatal issues, in processing order.
    pub warnings: Vec<String>,
}

impl ReconciliationReport {
    /// Empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an item as seen.
    pub fn count_found(&mut self, class: ItemClass) {
        self.found.bump(class);
    }

    /// Count an item as successfully processed.
    pub fn count_restored(&mut self, class: ItemClass) {
        self.restored.bump(class);
    }

    /// Record a failed item.
    pub fn fail(
        &mut self,
        class: ItemClass,
        identity: i64,
        title: impl Into<String>,
        reason: impl Into<String>,
    ) {
        let item = FailedItem {
            identity,
            class,
            title: title.into(),
            reason: reason.into(),
        };
        tracing::warn!(
            class = ?item.class,
            identity = item.identity,
            reason = %item.reason,
            "item failed"
        );
        self.failed_items.push(item);
    }

    /// Count a record skipped because it already exists locally.
    pub fn count_duplicate(&mut self) {
        self.duplicates_skipped = self.duplicates_skipped.saturating_add(1);
    }

    /// Record a non-fatal warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(%message, "report warning");
        self.warnings.push(message);
    }

    /// Set `success` from the failed-item list and return the report.
    #[must_use]
    pub fn finish(mut self) -> Self {
        self.success = self.failed_items.is_empty();
        self
    }

    /// One-line summary for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{}/{} items, {} failed, {} warnings",
            self.restored.total(),
            self.found.total(),
            self.failed_items.len(),
            self.warnings.len()
        )
    }
}

/// Run one item's work, converting a panic into an error message.
///
/// Used at item boundaries so that a bug triggered by one record becomes a
/// [`FailedItem`] instead of aborting the whole operation.
pub(crate) fn isolate<T>(work: impl FnOnce() -> Result<T, String>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(work)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("internal error: {message}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_class() {
        let mut counts = ItemCounts::default();
        counts.bump(ItemClass::Credential);
        counts.bump(ItemClass::of_secure(SecureItemKind::BankCard));
        counts.add(ItemClass::Image, 3);
        counts.bump(ItemClass::CommonAccount);
        assert_eq!(counts.credentials, 1);
        assert_eq!(counts.bank_cards, 1);
        assert_eq!(counts.images, 3);
        assert_eq!(counts.total(), 5);
    }

    #[test]
    fn success_reflects_failed_items_only() {
        let mut report = ReconciliationReport::new();
        report.warn("image missing");
        assert!(report.clone().finish().success);

        report.fail(ItemClass::Note, 4, "Memo", "bad json");
        let report = report.finish();
        assert!(!report.success);
        assert_eq!(report.failed_items[0].identity, 4);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn report_serializes_camel_case() {
        let mut report = ReconciliationReport::new();
        report.fail(ItemClass::BankCard, 1, "Visa", "x");
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"failedItems\""));
        assert!(json.contains("\"bankCard\""));
        assert!(json.contains("\"bankCards\":0"));
        assert!(json.contains("\"backupContains\""));
        assert!(json.contains("\"restoredSuccessfully\""));
    }

    #[test]
    fn isolate_turns_panics_into_errors() {
        let ok: Result<u8, String> = isolate(|| Ok(1));
        assert_eq!(ok, Ok(1));

        let err: Result<u8, String> = isolate(|| panic!("boom"));
        assert_eq!(err, Err("internal error: boom".to_string()));
    }
}

//! Assemble a bundle from a vault snapshot.

use std::collections::{BTreeSet, HashMap};
use std::io::{Cursor, Write};
use std::path::Path;

use serde::Serialize;
use strongbox_crypto_core::{EnvelopeCodec, Passphrase};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{
    secure_item_dir, tabular_member, BackupSelection, VaultSnapshot, CATEGORIES_MEMBER,
    COMMON_ACCOUNT_MEMBER, IMAGES_DIR, PASSWORDS_DIR, TIMELINE_MEMBER, TRASH_ITEMS_MEMBER,
    TRASH_PASSWORDS_MEMBER,
};
use crate::clock;
use crate::codec::{self, credential_member_name, item_member_name};
use crate::entities::{EntityKind, SecureItem, SecureItemKind, VaultEntity};
use crate::error::VaultError;
use crate::legacy::{export_credentials_csv, export_secure_items_csv};
use crate::report::{isolate, ItemClass, ReconciliationReport};

/// Inputs of [`build`] besides the data itself.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions<'a> {
    /// Directory holding the encrypted image blobs, if images are stored.
    pub image_dir: Option<&'a Path>,
    /// Wrap the archive in an envelope under this passphrase.
    pub passphrase: Option<&'a Passphrase>,
    /// Envelope parameters.
    pub envelope: EnvelopeCodec,
    /// Time embedded in tabular member names (ms).
    pub timestamp_millis: i64,
}

impl Default for BuildOptions<'_> {
    fn default() -> Self {
        Self {
            image_dir: None,
            passphrase: None,
            envelope: EnvelopeCodec::default(),
            timestamp_millis: clock::now_millis(),
        }
    }
}

/// A finished bundle.
#[derive(Debug, Clone)]
pub struct BuiltBundle {
    /// Archive bytes, enveloped when `encrypted`.
    pub bytes: Vec<u8>,
    /// Whether the bytes are enveloped.
    pub encrypted: bool,
    /// What went in, what failed and why.
    pub report: ReconciliationReport,
}

/// Build a bundle of the selected classes.
///
/// A record that fails to encode becomes a failed item and the rest of
/// the batch carries on. Missing image files are warnings.
///
/// # Errors
///
/// Returns [`VaultError::NoSelection`] before touching anything when no
/// selection flag is set, [`VaultError::Export`] if the archive cannot be
/// written, or an envelope error if encryption fails.
pub fn build(
    snapshot: &VaultSnapshot,
    selection: &BackupSelection,
    options: &BuildOptions<'_>,
) -> Result<BuiltBundle, VaultError> {
    if !selection.any() {
        return Err(VaultError::NoSelection);
    }

    let mut report = ReconciliationReport::new();
    let mut archive = Archive::new();
    let stamp = clock::backup_timestamp(options.timestamp_millis);

    if selection.credentials {
        add_credentials(&mut archive, &mut report, snapshot, &stamp)?;
    }

    let included = |kind: SecureItemKind| match kind {
        SecureItemKind::Note => selection.notes,
        SecureItemKind::Totp => selection.totp,
        SecureItemKind::BankCard => selection.bank_cards,
        SecureItemKind::Document => selection.documents,
    };
    let items: Vec<&SecureItem> = snapshot
        .secure_items
        .iter()
        .filter(|item| included(item.kind))
        .collect();

    if references_categories(snapshot, selection, &items) {
        add_categories(&mut archive, &mut report, snapshot)?;
    }
    add_secure_items(&mut archive, &mut report, &items)?;
    add_item_tables(&mut archive, &items, &stamp)?;
    if selection.images {
        add_images(&mut archive, &mut report, &items, options.image_dir)?;
    }
    if selection.generated_history {
        let name = tabular_member(&stamp, "generated_history.json");
        let generated = List::new(
            &name,
            EntityKind::GeneratedPassword,
            ItemClass::GeneratedPassword,
        );
        add_list(&mut archive, &mut report, &generated, &snapshot.generated)?;
    }
    if selection.timeline {
        let timeline = List::new(
            TIMELINE_MEMBER,
            EntityKind::OperationLogEntry,
            ItemClass::Timeline,
        );
        add_list(&mut archive, &mut report, &timeline, &snapshot.timeline)?;
    }
    if selection.trash {
        let trashed = List::new(
            TRASH_PASSWORDS_MEMBER,
            EntityKind::TrashedCredential,
            ItemClass::Trash,
        );
        add_list(&mut archive, &mut report, &trashed, &snapshot.trashed_credentials)?;
        let trashed = List::new(TRASH_ITEMS_MEMBER, EntityKind::TrashedItem, ItemClass::Trash);
        add_list(&mut archive, &mut report, &trashed, &snapshot.trashed_items)?;
    }
    if selection.common_account {
        if let Some(account) = &snapshot.common_account {
            match codec::encode(&VaultEntity::CommonAccountInfo(account.clone())) {
                Ok(bytes) => archive.add(COMMON_ACCOUNT_MEMBER, &bytes)?,
                Err(e) => report.warn(format!("common account skipped: {e}")),
            }
        }
    }

    let mut bytes = archive.finish()?;
    let encrypted = if let Some(passphrase) = options.passphrase {
        bytes = options.envelope.encrypt(&bytes, passphrase)?;
        true
    } else {
        false
    };

    let report = report.finish();
    tracing::info!(encrypted, size = bytes.len(), summary = %report.summary(), "bundle built");
    Ok(BuiltBundle {
        bytes,
        encrypted,
        report,
    })
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

fn add_credentials(
    archive: &mut Archive,
    report: &mut ReconciliationReport,
    snapshot: &VaultSnapshot,
    stamp: &str,
) -> Result<(), VaultError> {
    let names: HashMap<i64, &str> = snapshot
        .categories
        .iter()
        .map(|c| (c.id, c.name.as_str()))
        .collect();

    let mut written = Vec::new();
    for credential in &snapshot.credentials {
        report.count_found(ItemClass::Credential);
        let mut credential = credential.clone();
        if credential.category_name.is_none() {
            credential.category_name = credential
                .category_id
                .and_then(|id| names.get(&id))
                .map(|name| (*name).to_string());
        }
        let member = format!("{PASSWORDS_DIR}{}", credential_member_name(&credential));
        let entity = VaultEntity::Credential(credential);
        match isolate(|| codec::encode(&entity).map_err(|e| e.to_string())) {
            Ok(bytes) => {
                archive.add(&member, &bytes)?;
                report.count_restored(ItemClass::Credential);
                if let VaultEntity::Credential(c) = entity {
                    written.push(c);
                }
            }
            Err(reason) => {
                report.fail(ItemClass::Credential, entity.identity(), entity.title(), reason);
            }
        }
    }

    if !written.is_empty() {
        let name = tabular_member(stamp, "password.csv");
        archive.add(&name, export_credentials_csv(&written).as_bytes())?;
    }
    Ok(())
}

/// Whether any included record carries a category identity that only the
/// category list can translate.
fn references_categories(
    snapshot: &VaultSnapshot,
    selection: &BackupSelection,
    items: &[&SecureItem],
) -> bool {
    selection.credentials
        || items.iter().any(|i| i.category_id.is_some())
        || (selection.trash
            && (snapshot
                .trashed_credentials
                .iter()
                .any(|t| t.0.category_id.is_some())
                || snapshot.trashed_items.iter().any(|t| t.0.category_id.is_some())))
}

fn add_categories(
    archive: &mut Archive,
    report: &mut ReconciliationReport,
    snapshot: &VaultSnapshot,
) -> Result<(), VaultError> {
    report.found.add(ItemClass::Category, snapshot.categories.len());
    match codec::encode_records(&snapshot.categories, EntityKind::Category) {
        Ok(bytes) => {
            archive.add(CATEGORIES_MEMBER, &bytes)?;
            report.restored.add(ItemClass::Category, snapshot.categories.len());
        }
        Err(e) => report.fail(ItemClass::Category, 0, CATEGORIES_MEMBER, e.to_string()),
    }
    Ok(())
}

/// One JSON member per item, under its kind's directory.
fn add_secure_items(
    archive: &mut Archive,
    report: &mut ReconciliationReport,
    items: &[&SecureItem],
) -> Result<(), VaultError> {
    for item in items {
        let class = ItemClass::of_secure(item.kind);
        report.count_found(class);
        let member = format!("{}{}", secure_item_dir(item.kind), item_member_name(item));
        let entity = VaultEntity::from_secure_item((*item).clone());
        match isolate(|| codec::encode(&entity).map_err(|e| e.to_string())) {
            Ok(bytes) => {
                archive.add(&member, &bytes)?;
                report.count_restored(class);
            }
            Err(reason) => report.fail(class, item.id, &item.title, reason),
        }
    }
    Ok(())
}

/// Current-layout CSV copies of second-factor secrets, cards and documents
/// for readers that predate the per-item members. Restore prefers the JSON
/// members, so these are not counted.
fn add_item_tables(
    archive: &mut Archive,
    items: &[&SecureItem],
    stamp: &str,
) -> Result<(), VaultError> {
    let tables: [(&str, &[SecureItemKind]); 2] = [
        ("totp.csv", &[SecureItemKind::Totp]),
        (
            "cards_docs.csv",
            &[SecureItemKind::BankCard, SecureItemKind::Document],
        ),
    ];
    for (suffix, kinds) in tables {
        let rows: Vec<SecureItem> = items
            .iter()
            .filter(|i| kinds.contains(&i.kind))
            .map(|i| (*i).clone())
            .collect();
        if rows.is_empty() {
            continue;
        }
        archive.add(
            &tabular_member(stamp, suffix),
            export_secure_items_csv(&rows).as_bytes(),
        )?;
    }
    Ok(())
}

fn add_images(
    archive: &mut Archive,
    report: &mut ReconciliationReport,
    items: &[&SecureItem],
    image_dir: Option<&Path>,
) -> Result<(), VaultError> {
    let names: BTreeSet<&str> = items
        .iter()
        .flat_map(|i| i.image_paths.iter().map(String::as_str))
        .filter(|name| !name.trim().is_empty())
        .collect();
    if names.is_empty() {
        return Ok(());
    }
    report.found.add(ItemClass::Image, names.len());

    let Some(dir) = image_dir else {
        report.warn(format!(
            "{} images skipped: no image directory configured",
            names.len()
        ));
        return Ok(());
    };

    for name in names {
        if !is_plain_file_name(name) {
            report.warn(format!("image {name:?} skipped: not a plain file name"));
            continue;
        }
        match std::fs::read(dir.join(name)) {
            Ok(blob) => {
                archive.add(&format!("{IMAGES_DIR}{name}"), &blob)?;
                report.count_restored(ItemClass::Image);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                report.warn(format!("image {name} missing"));
            }
            Err(e) => report.fail(ItemClass::Image, 0, name, e.to_string()),
        }
    }
    Ok(())
}

/// A list-shaped member.
struct List<'a> {
    member: &'a str,
    kind: EntityKind,
    class: ItemClass,
}

impl<'a> List<'a> {
    const fn new(member: &'a str, kind: EntityKind, class: ItemClass) -> Self {
        Self {
            member,
            kind,
            class,
        }
    }
}

/// Add a list member. A failed encode is a warning, since these classes
/// are supplementary to the records themselves.
fn add_list<T: Serialize>(
    archive: &mut Archive,
    report: &mut ReconciliationReport,
    list: &List<'_>,
    records: &[T],
) -> Result<(), VaultError> {
    if records.is_empty() {
        return Ok(());
    }
    report.found.add(list.class, records.len());
    match codec::encode_records(records, list.kind) {
        Ok(bytes) => {
            archive.add(list.member, &bytes)?;
            report.restored.add(list.class, records.len());
        }
        Err(e) => report.warn(format!("{} skipped: {e}", list.member)),
    }
    Ok(())
}

pub(crate) fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

// ---------------------------------------------------------------------------
// Zip writer
// ---------------------------------------------------------------------------

struct Archive {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
}

impl Archive {
    fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
        }
    }

    fn add(&mut self, name: &str, bytes: &[u8]) -> Result<(), VaultError> {
        self.zip
            .start_file(name, self.options)
            .map_err(|e| VaultError::Export(format!("{name}: {e}")))?;
        self.zip
            .write_all(bytes)
            .map_err(|e| VaultError::Export(format!("{name}: {e}")))
    }

    fn finish(self) -> Result<Vec<u8>, VaultError> {
        self.zip
            .finish()
            .map(Cursor::into_inner)
            .map_err(|e| VaultError::Export(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use strongbox_crypto_core::is_enveloped;
    use zip::ZipArchive;

    use super::*;
    use crate::entities::{Category, Credential};

    fn member_names(bytes: &[u8]) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(bytes.to_vec())).expect("archive should open");
        archive.file_names().map(str::to_string).collect()
    }

    fn snapshot() -> VaultSnapshot {
        VaultSnapshot {
            credentials: vec![Credential {
                id: 1,
                title: "Bank".into(),
                password: "pw".into(),
                category_id: Some(9),
                created_at: 100,
                ..Credential::default()
            }],
            categories: vec![Category {
                id: 9,
                name: "Finance".into(),
                sort_order: 0,
            }],
            secure_items: vec![
                SecureItem {
                    id: 2,
                    title: "Memo".into(),
                    created_at: 200,
                    image_paths: vec!["scan.enc".into(), "gone.enc".into()],
                    ..SecureItem::default()
                },
                SecureItem {
                    id: 3,
                    kind: SecureItemKind::Totp,
                    title: "GitHub".into(),
                    ..SecureItem::default()
                },
            ],
            ..VaultSnapshot::default()
        }
    }

    fn options(image_dir: Option<&Path>) -> BuildOptions<'_> {
        BuildOptions {
            image_dir,
            timestamp_millis: 1_700_000_000_000,
            envelope: EnvelopeCodec::with_iterations(1_000),
            ..BuildOptions::default()
        }
    }

    #[test]
    fn empty_selection_is_rejected() {
        let result = build(&snapshot(), &BackupSelection::none(), &options(None));
        assert!(matches!(result, Err(VaultError::NoSelection)));
    }

    #[test]
    fn layout_follows_the_selection() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scan.enc"), b"blob").unwrap();

        let built = build(&snapshot(), &BackupSelection::all(), &options(Some(dir.path())))
            .expect("build should succeed");
        assert!(!built.encrypted);
        let names = member_names(&built.bytes);
        assert!(names.contains(&"passwords/1_100.json".to_string()));
        assert!(names.contains(&"notes/2_200.json".to_string()));
        assert!(names.contains(&"totp/3_0.json".to_string()));
        assert!(names.contains(&"categories.json".to_string()));
        assert!(names.contains(&"images/scan.enc".to_string()));
        assert!(names.contains(&"strongbox_20231114_221320_password.csv".to_string()));
        assert!(names.contains(&"strongbox_20231114_221320_totp.csv".to_string()));
        assert!(!names.iter().any(|n| n.ends_with("cards_docs.csv")));

        let report = built.report;
        assert!(report.success);
        assert_eq!(report.found.images, 2);
        assert_eq!(report.restored.images, 1);
        assert_eq!(report.warnings, vec!["image gone.enc missing".to_string()]);
        assert_eq!(report.restored.credentials, 1);
        assert_eq!(report.restored.totp, 1);
    }

    #[test]
    fn credentials_capture_category_names() {
        let built = build(
            &snapshot(),
            &BackupSelection {
                credentials: true,
                ..BackupSelection::none()
            },
            &options(None),
        )
        .expect("build should succeed");
        let mut archive = ZipArchive::new(Cursor::new(built.bytes)).unwrap();
        let mut json = String::new();
        archive
            .by_name("passwords/1_100.json")
            .unwrap()
            .read_to_string(&mut json)
            .unwrap();
        assert!(json.contains("\"categoryName\": \"Finance\""));
        assert!(!archive.file_names().any(|n| n.starts_with("notes/")));
    }

    #[test]
    fn passphrase_envelopes_the_archive() {
        let passphrase = Passphrase::from("correct horse");
        let opts = BuildOptions {
            passphrase: Some(&passphrase),
            ..options(None)
        };
        let built = build(&snapshot(), &BackupSelection::all(), &opts).expect("build should succeed");
        assert!(built.encrypted);
        assert!(is_enveloped(&built.bytes));
    }

    #[test]
    fn plain_file_names_only() {
        assert!(is_plain_file_name("a.enc"));
        assert!(!is_plain_file_name("../a.enc"));
        assert!(!is_plain_file_name("dir\\a.enc"));
        assert!(!is_plain_file_name(".."));
    }
}

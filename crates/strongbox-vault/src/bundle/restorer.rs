//! Restore a bundle into vault records.
//!
//! Members are staged into a temporary directory that is removed on every
//! exit path, then dispatched by path through [`DISPATCH`]. A member that
//! fails to decode becomes a failed item; the rest of the bundle is still
//! restored.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use strongbox_crypto_core::{is_enveloped, EnvelopeCodec, Passphrase};
use zip::ZipArchive;

use super::builder::is_plain_file_name;
use super::{
    secure_item_dir, CATEGORIES_MEMBER, COMMON_ACCOUNT_MEMBER, IMAGES_DIR, PASSWORDS_DIR,
    TIMELINE_MEMBER, TRASH_ITEMS_MEMBER, TRASH_PASSWORDS_MEMBER,
};
use crate::codec::{self, CodecError};
use crate::entities::{
    Category, CommonAccountInfo, Credential, EntityKind, GeneratedPassword, OperationLogEntry,
    SecureItem, SecureItemKind, TrashKey, TrashedCredential, TrashedItem, VaultEntity,
};
use crate::error::VaultError;
use crate::legacy::{import_credentials, import_secure_items};
use crate::report::{isolate, ItemClass, ReconciliationReport};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Local state the restorer reconciles against.
#[derive(Debug, Clone, Default)]
pub struct RestoreContext {
    /// Categories already in the vault.
    pub categories: Vec<Category>,
    /// `(title, created_at)` of records already in the trash.
    pub trash_keys: HashSet<TrashKey>,
    /// Timestamps of timeline entries already recorded.
    pub timeline_timestamps: HashSet<i64>,
    /// Current profile defaults.
    pub common_account: Option<CommonAccountInfo>,
    /// Directory receiving image blobs; images are skipped when `None`.
    pub image_store: Option<PathBuf>,
    /// Envelope parameters.
    pub envelope: EnvelopeCodec,
}

/// Records recovered from a bundle, ready for the caller to persist.
#[derive(Debug, Clone, Default)]
pub struct RestoredBundle {
    /// Credentials with category identities resolved locally.
    pub credentials: Vec<Credential>,
    /// Notes, second-factor secrets, cards and documents.
    pub secure_items: Vec<SecureItem>,
    /// Categories created during resolution (not yet persisted).
    pub created_categories: Vec<Category>,
    /// New timeline entries.
    pub timeline: Vec<OperationLogEntry>,
    /// New trashed credentials.
    pub trashed_credentials: Vec<TrashedCredential>,
    /// New trashed secure items.
    pub trashed_items: Vec<TrashedItem>,
    /// Profile defaults merged with the local ones.
    pub common_account: Option<CommonAccountInfo>,
    /// Generated-password history.
    pub generated: Vec<GeneratedPassword>,
    /// Image file names copied into the image store.
    pub images: Vec<String>,
    /// What was found, what was restored, what failed and why.
    pub report: ReconciliationReport,
}

impl RestoredBundle {
    /// Every recovered record as a [`VaultEntity`].
    #[must_use]
    pub fn entities(&self) -> Vec<VaultEntity> {
        let mut out: Vec<VaultEntity> = Vec::new();
        out.extend(self.created_categories.iter().cloned().map(VaultEntity::from));
        out.extend(self.credentials.iter().cloned().map(VaultEntity::from));
        out.extend(self.secure_items.iter().cloned().map(VaultEntity::from));
        out.extend(self.timeline.iter().cloned().map(VaultEntity::from));
        out.extend(self.trashed_credentials.iter().cloned().map(VaultEntity::from));
        out.extend(self.trashed_items.iter().cloned().map(VaultEntity::from));
        out.extend(self.common_account.iter().cloned().map(VaultEntity::from));
        out.extend(self.generated.iter().cloned().map(VaultEntity::from));
        out
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// How a member is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// One credential.
    Credential,
    /// One secure item of the given kind.
    SecureItem(SecureItemKind),
    /// Category list.
    Categories,
    /// Operation timeline.
    Timeline,
    /// Trashed credentials.
    TrashedCredentials,
    /// Trashed secure items.
    TrashedItems,
    /// Profile defaults.
    CommonAccount,
    /// Generated-password history.
    GeneratedHistory,
    /// Tabular credentials, used only when no JSON credential was found.
    CredentialTable,
    /// Tabular secure items, used only when no structured second-factor,
    /// card or document member was found.
    SecureItemTable,
    /// Raw image blob.
    Image,
    /// Nothing matched.
    Unknown,
}

impl MemberKind {
    /// Class used for a failed member, when it maps to one.
    const fn class(self) -> Option<ItemClass> {
        match self {
            Self::Credential | Self::CredentialTable => Some(ItemClass::Credential),
            Self::SecureItem(kind) => Some(ItemClass::of_secure(kind)),
            Self::Categories => Some(ItemClass::Category),
            Self::Timeline => Some(ItemClass::Timeline),
            Self::TrashedCredentials | Self::TrashedItems => Some(ItemClass::Trash),
            Self::CommonAccount => Some(ItemClass::CommonAccount),
            Self::GeneratedHistory => Some(ItemClass::GeneratedPassword),
            Self::Image => Some(ItemClass::Image),
            Self::SecureItemTable | Self::Unknown => None,
        }
    }

    /// Whether one member holds exactly one record.
    const fn is_single_record(self) -> bool {
        matches!(self, Self::Credential | Self::SecureItem(_) | Self::Image)
    }
}

type Rule = (MemberKind, fn(&str) -> bool);

/// Path rules, first match wins.
pub const DISPATCH: [Rule; 14] = [
    (MemberKind::Credential, is_credential_member),
    (MemberKind::SecureItem(SecureItemKind::Note), is_note_member),
    (MemberKind::SecureItem(SecureItemKind::Totp), is_totp_member),
    (MemberKind::SecureItem(SecureItemKind::BankCard), is_bank_card_member),
    (MemberKind::SecureItem(SecureItemKind::Document), is_document_member),
    (MemberKind::Categories, is_categories),
    (MemberKind::Timeline, is_timeline),
    (MemberKind::TrashedCredentials, is_trashed_credentials),
    (MemberKind::TrashedItems, is_trashed_items),
    (MemberKind::CommonAccount, is_common_account),
    (MemberKind::GeneratedHistory, is_generated_history),
    (MemberKind::CredentialTable, is_credential_table),
    (MemberKind::SecureItemTable, is_secure_item_table),
    (MemberKind::Image, is_image),
];

/// Classify a normalised member path.
#[must_use]
pub fn classify(path: &str) -> MemberKind {
    DISPATCH
        .iter()
        .find(|(_, matches)| matches(path))
        .map_or(MemberKind::Unknown, |(kind, _)| *kind)
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn is_credential_member(path: &str) -> bool {
    path.starts_with(PASSWORDS_DIR) && path.ends_with(".json")
}

fn is_item_member(path: &str, kind: SecureItemKind) -> bool {
    path.starts_with(secure_item_dir(kind)) && path.ends_with(".json")
}

fn is_note_member(path: &str) -> bool {
    is_item_member(path, SecureItemKind::Note)
}

fn is_totp_member(path: &str) -> bool {
    is_item_member(path, SecureItemKind::Totp)
}

fn is_bank_card_member(path: &str) -> bool {
    is_item_member(path, SecureItemKind::BankCard)
}

fn is_document_member(path: &str) -> bool {
    is_item_member(path, SecureItemKind::Document)
}

fn is_categories(path: &str) -> bool {
    path == CATEGORIES_MEMBER
}

fn is_timeline(path: &str) -> bool {
    path == TIMELINE_MEMBER
}

fn is_trashed_credentials(path: &str) -> bool {
    path == TRASH_PASSWORDS_MEMBER
}

fn is_trashed_items(path: &str) -> bool {
    path == TRASH_ITEMS_MEMBER
}

fn is_common_account(path: &str) -> bool {
    path == COMMON_ACCOUNT_MEMBER
}

fn is_generated_history(path: &str) -> bool {
    file_name(path).ends_with("_generated_history.json")
}

fn is_credential_table(path: &str) -> bool {
    let name = file_name(path);
    name.ends_with("_password.csv") || name == "passwords.csv"
}

fn is_secure_item_table(path: &str) -> bool {
    let name = file_name(path);
    ["_totp.csv", "_cards_docs.csv", "_notes.csv", "_other.csv"]
        .iter()
        .any(|suffix| name.ends_with(suffix))
        || name == "secure_items.csv"
        || name == "backup.csv"
}

fn is_image(path: &str) -> bool {
    path.starts_with(IMAGES_DIR) || path.ends_with(".enc")
}

/// Normalise separators and reject paths that could escape the staging
/// directory.
#[must_use]
pub fn normalize_member_path(raw: &str) -> Option<String> {
    let path = raw.replace('\\', "/");
    let has_drive = path.as_bytes().get(1) == Some(&b':');
    if path.starts_with('/') || has_drive || path.split('/').any(|segment| segment == "..") {
        return None;
    }
    let path = path.trim_start_matches("./");
    (!path.is_empty()).then(|| path.to_string())
}

// ---------------------------------------------------------------------------
// Restore
// ---------------------------------------------------------------------------

/// Restore a bundle.
///
/// # Errors
///
/// Returns [`VaultError::PassphraseRequired`] when the bundle is enveloped
/// and no passphrase was given, [`VaultError::WrongPassphrase`] when the
/// passphrase does not open it, [`VaultError::CorruptArchive`] when the
/// bytes are not an archive, or [`VaultError::Io`] if the staging directory
/// cannot be created. Problems with individual members never fail the call.
pub fn restore(
    bytes: &[u8],
    passphrase: Option<&Passphrase>,
    ctx: &RestoreContext,
) -> Result<RestoredBundle, VaultError> {
    if is_enveloped(bytes) && passphrase.is_none() {
        return Err(VaultError::PassphraseRequired);
    }
    let plain = ctx.envelope.decrypt_if_needed(bytes.to_vec(), passphrase)?;
    let mut archive = ZipArchive::new(Cursor::new(plain))
        .map_err(|e| VaultError::CorruptArchive(e.to_string()))?;

    let staging = tempfile::Builder::new()
        .prefix("strongbox-restore-")
        .tempdir()?;

    let mut run = Restore::new(ctx);
    let staged = run.stage(&mut archive, staging.path());
    for (path, file) in &staged {
        run.handle(path, file);
    }
    run.apply_credential_tables();
    run.apply_item_tables();
    run.resolve_categories();

    drop(staging);
    Ok(run.finish())
}

struct Restore<'a> {
    ctx: &'a RestoreContext,
    out: RestoredBundle,
    backup_categories: Vec<Category>,
    credential_tables: Vec<(String, String)>,
    item_tables: Vec<(String, String)>,
    structured_items: bool,
    seen_trash: HashSet<TrashKey>,
    seen_timeline: HashSet<i64>,
}

impl<'a> Restore<'a> {
    fn new(ctx: &'a RestoreContext) -> Self {
        Self {
            ctx,
            out: RestoredBundle::default(),
            backup_categories: Vec::new(),
            credential_tables: Vec::new(),
            item_tables: Vec::new(),
            structured_items: false,
            seen_trash: ctx.trash_keys.clone(),
            seen_timeline: ctx.timeline_timestamps.clone(),
        }
    }

    fn report(&mut self) -> &mut ReconciliationReport {
        &mut self.out.report
    }

    /// Copy every safe member into `dir`, in archive order.
    fn stage(
        &mut self,
        archive: &mut ZipArchive<Cursor<Vec<u8>>>,
        dir: &Path,
    ) -> Vec<(String, PathBuf)> {
        let mut staged = Vec::new();
        let mut names = HashSet::new();
        for index in 0..archive.len() {
            let mut member = match archive.by_index(index) {
                Ok(member) => member,
                Err(e) => {
                    self.report().warn(format!("member #{index} unreadable: {e}"));
                    continue;
                }
            };
            if member.is_dir() {
                continue;
            }
            let raw = member.name().to_string();
            let Some(path) = normalize_member_path(&raw) else {
                self.report()
                    .warn(format!("member {raw:?} rejected: path escapes the archive"));
                continue;
            };
            if !names.insert(path.clone()) {
                let kind = classify(&path);
                self.member_failed(kind, &path, "duplicate member name, first copy kept".into());
                continue;
            }

            let target = dir.join(&path);
            let written = target
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|()| fs::File::create(&target))
                .and_then(|mut out| io::copy(&mut member, &mut out));
            match written {
                Ok(_) => staged.push((path, target)),
                Err(e) => {
                    let kind = classify(&path);
                    self.member_failed(kind, &path, format!("unreadable: {e}"));
                }
            }
        }
        staged
    }

    /// Process one staged member, turning errors and panics into a failed
    /// item.
    fn handle(&mut self, path: &str, file: &Path) {
        let kind = classify(path);
        match isolate(|| self.process(kind, path, file)) {
            Ok(()) => self.member_found(kind),
            Err(reason) => self.member_failed(kind, path, reason),
        }
    }

    /// Count a processed single-record member. Members that failed before
    /// or during processing are counted by [`Self::member_failed`] instead.
    fn member_found(&mut self, kind: MemberKind) {
        if let (true, Some(class)) = (kind.is_single_record(), kind.class()) {
            self.report().count_found(class);
        }
    }

    fn member_failed(&mut self, kind: MemberKind, path: &str, reason: String) {
        let Some(class) = kind.class() else {
            self.report().warn(format!("{path}: {reason}"));
            return;
        };
        if kind.is_single_record() {
            self.report().count_found(class);
        }
        let identity = member_identity(path);
        self.report().fail(class, identity, path, reason);
    }

    fn process(&mut self, kind: MemberKind, path: &str, file: &Path) -> Result<(), String> {
        match kind {
            MemberKind::Credential => {
                let bytes = read(file)?;
                match codec::decode(&bytes, EntityKind::Credential) {
                    Ok(VaultEntity::Credential(credential)) => {
                        self.out.credentials.push(credential);
                        self.report().count_restored(ItemClass::Credential);
                    }
                    Ok(other) => {
                        let reason = format!("unexpected {}", other.kind());
                        self.fail_member(ItemClass::Credential, path, reason);
                    }
                    Err(e) => self.fail_member(ItemClass::Credential, path, e.to_string()),
                }
            }
            MemberKind::SecureItem(expected) => {
                let class = ItemClass::of_secure(expected);
                self.structured_items |= expected != SecureItemKind::Note;
                let bytes = read(file)?;
                match codec::decode(&bytes, EntityKind::SecureItem) {
                    Ok(VaultEntity::Note(item) | VaultEntity::SecureItem(item))
                        if item.kind == expected =>
                    {
                        self.out.secure_items.push(item);
                        self.report().count_restored(class);
                    }
                    Ok(VaultEntity::Note(item) | VaultEntity::SecureItem(item)) => {
                        let reason = format!("unexpected {} item", item.kind.as_str());
                        self.fail_member(class, path, reason);
                    }
                    Ok(other) => {
                        let reason = format!("unexpected {}", other.kind());
                        self.fail_member(class, path, reason);
                    }
                    Err(e) => self.fail_member(class, path, e.to_string()),
                }
            }
            MemberKind::Categories => {
                let categories: Vec<Category> =
                    self.records(path, file, EntityKind::Category, ItemClass::Category)?;
                self.backup_categories.extend(categories);
            }
            MemberKind::Timeline => {
                let entries: Vec<OperationLogEntry> =
                    self.records(path, file, EntityKind::OperationLogEntry, ItemClass::Timeline)?;
                for entry in entries {
                    if self.seen_timeline.insert(entry.timestamp) {
                        self.out.timeline.push(entry);
                    } else {
                        self.report().count_duplicate();
                    }
                }
            }
            MemberKind::TrashedCredentials => {
                let trashed: Vec<TrashedCredential> =
                    self.records(path, file, EntityKind::TrashedCredential, ItemClass::Trash)?;
                for record in trashed {
                    if self.seen_trash.insert(record.trash_key()) {
                        self.out.trashed_credentials.push(record);
                    } else {
                        self.report().count_duplicate();
                    }
                }
            }
            MemberKind::TrashedItems => {
                let trashed: Vec<TrashedItem> =
                    self.records(path, file, EntityKind::TrashedItem, ItemClass::Trash)?;
                for record in trashed {
                    if self.seen_trash.insert(record.trash_key()) {
                        self.out.trashed_items.push(record);
                    } else {
                        self.report().count_duplicate();
                    }
                }
            }
            MemberKind::CommonAccount => {
                let bytes = read(file)?;
                match codec::decode(&bytes, EntityKind::CommonAccountInfo) {
                    Ok(VaultEntity::CommonAccountInfo(backup)) => {
                        let local = self.ctx.common_account.clone().unwrap_or_default();
                        self.out.common_account = Some(backup.merged_into(&local));
                    }
                    Ok(_) => {}
                    Err(e) => self.report().warn(format!("{path}: {e}")),
                }
            }
            MemberKind::GeneratedHistory => {
                let generated: Vec<GeneratedPassword> = self.records(
                    path,
                    file,
                    EntityKind::GeneratedPassword,
                    ItemClass::GeneratedPassword,
                )?;
                self.out.generated.extend(generated);
            }
            MemberKind::CredentialTable => {
                let text = read_text(file)?;
                self.credential_tables.push((path.to_string(), text));
            }
            MemberKind::SecureItemTable => {
                let text = read_text(file)?;
                self.item_tables.push((path.to_string(), text));
            }
            MemberKind::Image => self.restore_image(path, file),
            MemberKind::Unknown => {
                self.report()
                    .warn(format!("{path}: unrecognised member skipped"));
            }
        }
        Ok(())
    }

    /// Decode a list member element by element, counting each element.
    fn records<T: DeserializeOwned>(
        &mut self,
        path: &str,
        file: &Path,
        kind: EntityKind,
        class: ItemClass,
    ) -> Result<Vec<T>, String> {
        let bytes = read(file)?;
        let results =
            codec::decode_records::<T>(&bytes, kind).map_err(|e: CodecError| e.to_string())?;
        let mut out = Vec::with_capacity(results.len());
        for (index, result) in results.into_iter().enumerate() {
            self.report().count_found(class);
            match result {
                Ok(record) => {
                    self.report().count_restored(class);
                    out.push(record);
                }
                Err(e) => {
                    let title = format!("{path}[{index}]");
                    self.report().fail(class, 0, title, e.to_string());
                }
            }
        }
        Ok(out)
    }

    fn restore_image(&mut self, path: &str, file: &Path) {
        let name = file_name(path);
        let Some(store) = self.ctx.image_store.as_deref() else {
            self.report()
                .warn(format!("image {name} skipped: no image store configured"));
            return;
        };
        if !is_plain_file_name(name) {
            self.report()
                .warn(format!("image {name:?} skipped: not a plain file name"));
            return;
        }
        let copied = fs::create_dir_all(store).and_then(|()| fs::copy(file, store.join(name)));
        match copied {
            Ok(_) => {
                self.out.images.push(name.to_string());
                self.report().count_restored(ItemClass::Image);
            }
            Err(e) => self.report().fail(ItemClass::Image, 0, name, e.to_string()),
        }
    }

    fn fail_member(&mut self, class: ItemClass, path: &str, reason: String) {
        let identity = member_identity(path);
        self.report().fail(class, identity, path, reason);
    }

    /// Structured credentials win; tables are read only when none exist.
    fn apply_credential_tables(&mut self) {
        let tables = std::mem::take(&mut self.credential_tables);
        if tables.is_empty() {
            return;
        }
        if !self.out.credentials.is_empty() {
            tracing::debug!(
                tables = tables.len(),
                "structured credentials present, tabular members ignored"
            );
            return;
        }
        for (path, text) in tables {
            let import = import_credentials(&text);
            tracing::info!(
                member = %path,
                format = ?import.layout.format,
                rows = import.rows_seen(),
                "restoring credentials from table"
            );
            for _ in &import.records {
                self.report().count_found(ItemClass::Credential);
                self.report().count_restored(ItemClass::Credential);
            }
            for warning in import.warnings(&path) {
                self.report().warn(warning);
            }
            self.out.credentials.extend(import.records);
        }
    }

    /// Tabular secure items stand in for older bundles only; a bundle with
    /// structured second-factor, card or document members carries the
    /// tables as a copy.
    fn apply_item_tables(&mut self) {
        let tables = std::mem::take(&mut self.item_tables);
        if tables.is_empty() {
            return;
        }
        if self.structured_items {
            tracing::debug!(
                tables = tables.len(),
                "structured secure items present, tabular members ignored"
            );
            return;
        }
        for (path, text) in tables {
            let import = import_secure_items(&text);
            for item in &import.records {
                let class = ItemClass::of_secure(item.kind);
                self.report().count_found(class);
                self.report().count_restored(class);
            }
            for warning in import.warnings(&path) {
                self.report().warn(warning);
            }
            self.out.secure_items.extend(import.records);
        }
    }

    /// Map captured category names onto local categories, creating each
    /// missing name once.
    fn resolve_categories(&mut self) {
        let ctx = self.ctx;
        let mut resolver = CategoryResolver::new(&ctx.categories);
        let mut backup = self.backup_categories.clone();
        backup.sort_by_key(|c| c.sort_order);
        for category in &backup {
            resolver.resolve(&category.name);
        }
        let names: HashMap<i64, String> = backup.into_iter().map(|c| (c.id, c.name)).collect();

        let mut resolve_credential = |credential: &mut Credential| {
            let name = credential
                .category_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .or_else(|| credential.category_id.and_then(|id| names.get(&id).cloned()));
            credential.category_id = name.as_deref().and_then(|n| resolver.resolve(n));
            credential.category_name = name;
        };
        for credential in &mut self.out.credentials {
            resolve_credential(credential);
        }
        for trashed in &mut self.out.trashed_credentials {
            resolve_credential(&mut trashed.0);
        }
        let items = self
            .out
            .secure_items
            .iter_mut()
            .chain(self.out.trashed_items.iter_mut().map(|t| &mut t.0));
        for item in items {
            item.category_id = item
                .category_id
                .and_then(|id| names.get(&id))
                .and_then(|n| resolver.resolve(n));
        }

        let created = resolver.into_created();
        if !created.is_empty() {
            tracing::info!(count = created.len(), "categories created during restore");
        }
        self.out.created_categories = created;
    }

    fn finish(mut self) -> RestoredBundle {
        self.out.report = std::mem::take(&mut self.out.report).finish();
        tracing::info!(summary = %self.out.report.summary(), "bundle restored");
        self.out
    }
}

/// Resolves category names against local categories, creating missing
/// ones with the next free identity and sort position.
pub(crate) struct CategoryResolver<'a> {
    existing: &'a [Category],
    created: Vec<Category>,
    next_id: i64,
    next_sort: i32,
}

impl<'a> CategoryResolver<'a> {
    pub(crate) fn new(existing: &'a [Category]) -> Self {
        let next_id = existing.iter().map(|c| c.id).max().unwrap_or(0).saturating_add(1);
        let next_sort = existing
            .iter()
            .map(|c| c.sort_order)
            .max()
            .map_or(0, |s| s.saturating_add(1));
        Self {
            existing,
            created: Vec::new(),
            next_id,
            next_sort,
        }
    }

    /// Identity of the category named `name` (case-sensitive), creating it
    /// if needed. Blank names resolve to `None`.
    pub(crate) fn resolve(&mut self, name: &str) -> Option<i64> {
        if name.trim().is_empty() {
            return None;
        }
        if let Some(found) = self
            .existing
            .iter()
            .chain(self.created.iter())
            .find(|c| c.name == name)
        {
            return Some(found.id);
        }
        let category = Category {
            id: self.next_id,
            name: name.to_string(),
            sort_order: self.next_sort,
        };
        self.next_id = self.next_id.saturating_add(1);
        self.next_sort = self.next_sort.saturating_add(1);
        let id = category.id;
        self.created.push(category);
        Some(id)
    }

    pub(crate) fn into_created(self) -> Vec<Category> {
        self.created
    }
}

fn read(file: &Path) -> Result<Vec<u8>, String> {
    fs::read(file).map_err(|e| e.to_string())
}

fn read_text(file: &Path) -> Result<String, String> {
    String::from_utf8(read(file)?).map_err(|e| format!("not UTF-8: {e}"))
}

/// Identity encoded in `<id>_<created>.json` member names, `0` otherwise.
fn member_identity(path: &str) -> i64 {
    file_name(path)
        .split('_')
        .next()
        .and_then(|id| id.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;

    fn archive(members: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, text) in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(text.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn dispatch_order_is_stable() {
        let order: Vec<_> = DISPATCH.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(order.first(), Some(&MemberKind::Credential));
        assert_eq!(order.last(), Some(&MemberKind::Image));
        assert_eq!(classify("passwords/1_2.json"), MemberKind::Credential);
        assert_eq!(
            classify("notes/1_2.json"),
            MemberKind::SecureItem(SecureItemKind::Note)
        );
        assert_eq!(
            classify("bank_cards/1_2.json"),
            MemberKind::SecureItem(SecureItemKind::BankCard)
        );
        assert_eq!(classify("categories.json"), MemberKind::Categories);
        assert_eq!(classify("strongbox_x_generated_history.json"), MemberKind::GeneratedHistory);
        assert_eq!(classify("old/backup_password.csv"), MemberKind::CredentialTable);
        assert_eq!(classify("strongbox_x_cards_docs.csv"), MemberKind::SecureItemTable);
        assert_eq!(classify("images/a.enc"), MemberKind::Image);
        assert_eq!(classify("loose.enc"), MemberKind::Image);
        assert_eq!(classify("readme.txt"), MemberKind::Unknown);
    }

    #[test]
    fn unsafe_paths_are_rejected() {
        assert_eq!(normalize_member_path("notes\\1_2.json").as_deref(), Some("notes/1_2.json"));
        assert_eq!(normalize_member_path("./categories.json").as_deref(), Some("categories.json"));
        assert!(normalize_member_path("../evil.json").is_none());
        assert!(normalize_member_path("notes/../../evil").is_none());
        assert!(normalize_member_path("/etc/passwd").is_none());
        assert!(normalize_member_path("C:\\evil").is_none());
    }

    #[test]
    fn enveloped_bundle_without_passphrase_is_rejected() {
        let codec = EnvelopeCodec::with_iterations(1_000);
        let sealed = codec
            .encrypt(&archive(&[]), &Passphrase::from("pw"))
            .unwrap();
        let ctx = RestoreContext {
            envelope: codec,
            ..RestoreContext::default()
        };
        assert!(matches!(
            restore(&sealed, None, &ctx),
            Err(VaultError::PassphraseRequired)
        ));
    }

    #[test]
    fn garbage_is_a_corrupt_archive() {
        let result = restore(b"definitely not a zip", None, &RestoreContext::default());
        assert!(matches!(result, Err(VaultError::CorruptArchive(_))));
    }

    #[test]
    fn traversal_members_become_warnings() {
        let bytes = archive(&[
            ("../escape.json", "{}"),
            ("passwords/1_5.json", r#"{"id":1,"title":"Bank","createdAt":5}"#),
        ]);
        let restored = restore(&bytes, None, &RestoreContext::default()).unwrap();
        assert_eq!(restored.credentials.len(), 1);
        assert!(restored.report.warnings.iter().any(|w| w.contains("escape")));
        assert!(restored.report.success);
    }

    #[test]
    fn corrupt_member_is_isolated() {
        let bytes = archive(&[
            ("passwords/1_5.json", r#"{"id":1,"title":"A"}"#),
            ("passwords/2_5.json", "{broken"),
            ("passwords/3_5.json", r#"{"id":3,"title":"C"}"#),
        ]);
        let restored = restore(&bytes, None, &RestoreContext::default()).unwrap();
        assert_eq!(restored.credentials.len(), 2);
        assert_eq!(restored.report.failed_items.len(), 1);
        assert_eq!(restored.report.failed_items[0].identity, 2);
        assert_eq!(restored.report.found.credentials, 3);
        assert_eq!(restored.report.restored.credentials, 2);
        assert!(!restored.report.success);
    }

    #[test]
    fn tables_are_ignored_when_json_credentials_exist() {
        let bytes = archive(&[
            ("passwords/1_5.json", r#"{"id":1,"title":"Json"}"#),
            ("x_password.csv", "name,url,username,password\nCsv,c.com,u,p\n"),
        ]);
        let restored = restore(&bytes, None, &RestoreContext::default()).unwrap();
        assert_eq!(restored.credentials.len(), 1);
        assert_eq!(restored.credentials[0].title, "Json");
    }

    #[test]
    fn unreadable_member_is_counted_once() {
        let staging = tempfile::tempdir().unwrap();
        let ctx = RestoreContext::default();
        let mut run = Restore::new(&ctx);
        run.handle("passwords/1_5.json", &staging.path().join("missing.json"));
        let report = run.finish().report;
        assert_eq!(report.found.credentials, 1);
        assert_eq!(report.restored.credentials, 0);
        assert_eq!(report.failed_items.len(), 1);
        assert_eq!(report.failed_items[0].identity, 1);
    }

    #[test]
    fn duplicate_member_names_keep_the_first_copy() {
        let bytes = archive(&[
            ("passwords/1_5.json", r#"{"id":1,"title":"First"}"#),
            ("./passwords/1_5.json", r#"{"id":1,"title":"Second"}"#),
        ]);
        let restored = restore(&bytes, None, &RestoreContext::default()).unwrap();
        assert_eq!(restored.credentials.len(), 1);
        assert_eq!(restored.credentials[0].title, "First");
        let report = &restored.report;
        assert_eq!(report.found.credentials, 2);
        assert_eq!(report.restored.credentials, 1);
        assert_eq!(report.failed_items.len(), 1);
        assert!(report.failed_items[0].reason.contains("duplicate"));
    }

    #[test]
    fn item_tables_stand_in_only_for_older_bundles() {
        let table = "ID,Type,Title,Data,Notes,IsFavorite,ImagePaths,CreatedAt,UpdatedAt\n\
                     7,TOTP,Csv,{},,false,[],1,2\n";
        let json = r#"{"id":7,"itemType":"TOTP","title":"Json","createdAt":1}"#;

        let older = restore(&archive(&[("x_totp.csv", table)]), None, &RestoreContext::default())
            .unwrap();
        assert_eq!(older.secure_items.len(), 1);
        assert_eq!(older.secure_items[0].title, "Csv");
        assert_eq!(older.report.restored.totp, 1);

        let current = archive(&[("totp/7_1.json", json), ("x_totp.csv", table)]);
        let restored = restore(&current, None, &RestoreContext::default()).unwrap();
        assert_eq!(restored.secure_items.len(), 1);
        assert_eq!(restored.secure_items[0].title, "Json");
        assert_eq!(restored.report.found.totp, 1);
    }

    #[test]
    fn item_in_the_wrong_directory_fails() {
        let card = r#"{"id":3,"itemType":"BANK_CARD","title":"Visa"}"#;
        let restored =
            restore(&archive(&[("totp/3_0.json", card)]), None, &RestoreContext::default())
                .unwrap();
        assert!(restored.secure_items.is_empty());
        assert_eq!(restored.report.failed_items.len(), 1);
        assert_eq!(restored.report.failed_items[0].class, ItemClass::Totp);
    }

    #[test]
    fn tables_are_used_when_no_json_credentials_exist() {
        let bytes = archive(&[("x_password.csv", "name,url,username,password\nCsv,c.com,u,p\n")]);
        let restored = restore(&bytes, None, &RestoreContext::default()).unwrap();
        assert_eq!(restored.credentials.len(), 1);
        assert_eq!(restored.credentials[0].website, "c.com");
    }

    #[test]
    fn trash_and_timeline_skip_known_records() {
        let bytes = archive(&[
            (
                "trash/trash_passwords.json",
                r#"[{"title":"Old","createdAt":1},{"title":"New","createdAt":2}]"#,
            ),
            ("timeline_history.json", r#"[{"timestamp":10},{"timestamp":11},{"timestamp":11}]"#),
        ]);
        let ctx = RestoreContext {
            trash_keys: HashSet::from([("Old".to_string(), 1)]),
            timeline_timestamps: HashSet::from([10]),
            ..RestoreContext::default()
        };
        let restored = restore(&bytes, None, &ctx).unwrap();
        assert_eq!(restored.trashed_credentials.len(), 1);
        assert_eq!(restored.trashed_credentials[0].0.title, "New");
        assert_eq!(restored.timeline.len(), 1);
        assert_eq!(restored.report.duplicates_skipped, 3);
        assert!(restored.report.warnings.is_empty());
    }

    #[test]
    fn resolver_creates_each_missing_name_once() {
        let existing = [Category {
            id: 4,
            name: "Work".into(),
            sort_order: 7,
        }];
        let mut resolver = CategoryResolver::new(&existing);
        assert_eq!(resolver.resolve("Work"), Some(4));
        assert_eq!(resolver.resolve("Home"), Some(5));
        assert_eq!(resolver.resolve("Home"), Some(5));
        assert_eq!(resolver.resolve("home"), Some(6));
        assert_eq!(resolver.resolve("  "), None);
        let created = resolver.into_created();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].sort_order, 8);
        assert_eq!(created[1].sort_order, 9);
    }

    #[test]
    fn images_need_an_image_store() {
        let bytes = archive(&[("images/a.enc", "blob")]);
        let restored = restore(&bytes, None, &RestoreContext::default()).unwrap();
        assert!(restored.images.is_empty());
        assert_eq!(restored.report.found.images, 1);
        assert_eq!(restored.report.warnings.len(), 1);

        let store = tempfile::tempdir().unwrap();
        let ctx = RestoreContext {
            image_store: Some(store.path().to_path_buf()),
            ..RestoreContext::default()
        };
        let restored = restore(&bytes, None, &ctx).unwrap();
        assert_eq!(restored.images, vec!["a.enc"]);
        assert_eq!(fs::read(store.path().join("a.enc")).unwrap(), b"blob");
    }
}

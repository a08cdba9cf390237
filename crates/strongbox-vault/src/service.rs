//! Backup service: bundles in, bundles out, over a [`RemoteStore`].
//!
//! Remote file names follow `strongbox_backup_<yyyyMMdd_HHmmss>[_permanent].zip`,
//! with `.enc.zip` in place of `.zip` for enveloped bundles. Permanent
//! backups are never removed by retention cleanup.

use std::path::Path;

use strongbox_crypto_core::envelope::ENCRYPTED_SUFFIX;
use strongbox_crypto_core::{EnvelopeCodec, Passphrase};
use tracing::{info, warn};

use crate::bundle::{self, BuildOptions, RestoreContext, RestoredBundle, VaultSnapshot};
use crate::clock::{backup_timestamp, day_number, MILLIS_PER_DAY, MILLIS_PER_HOUR};
use crate::config::EngineConfig;
use crate::error::VaultError;
use crate::guard::BackupGuard;
use crate::remote::{self, join_path, RemoteFile, RemoteStore};
use crate::report::ReconciliationReport;

const NAME_PREFIX: &str = "strongbox_backup_";
const PERMANENT_MARKER: &str = "_permanent";
const PLAIN_SUFFIX: &str = ".zip";

/// Build the remote file name of a backup.
#[must_use]
pub fn backup_file_name(timestamp_millis: i64, permanent: bool, encrypted: bool) -> String {
    let marker = if permanent { PERMANENT_MARKER } else { "" };
    let suffix = if encrypted { ENCRYPTED_SUFFIX } else { PLAIN_SUFFIX };
    format!("{NAME_PREFIX}{}{marker}{suffix}", backup_timestamp(timestamp_millis))
}

fn split_suffix(name: &str) -> Option<(&str, &'static str)> {
    name.strip_suffix(ENCRYPTED_SUFFIX)
        .map(|stem| (stem, ENCRYPTED_SUFFIX))
        .or_else(|| name.strip_suffix(PLAIN_SUFFIX).map(|stem| (stem, PLAIN_SUFFIX)))
}

/// A backup as listed on the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    /// Remote file name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification, epoch milliseconds.
    pub modified_millis: i64,
    /// Exempt from retention cleanup.
    pub is_permanent: bool,
    /// Older than the expiry-warning threshold and not permanent.
    pub is_expiring: bool,
    /// Enveloped bundle.
    pub is_encrypted: bool,
}

/// Per-call inputs of [`BackupService::create_and_upload`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadRequest<'a> {
    /// Backup passphrase; required when encryption is enabled.
    pub passphrase: Option<&'a Passphrase>,
    /// Mark the backup permanent.
    pub permanent: bool,
    /// Directory of the encrypted image blobs.
    pub image_dir: Option<&'a Path>,
    /// Creation time, epoch milliseconds.
    pub now_millis: i64,
}

/// Outcome of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadedBackup {
    /// Remote file name.
    pub name: String,
    /// Whether the bundle was enveloped.
    pub encrypted: bool,
    /// What went in.
    pub report: ReconciliationReport,
}

/// Creates, lists, restores and prunes remote backups.
pub struct BackupService<S: RemoteStore> {
    store: S,
    config: EngineConfig,
    guard: BackupGuard,
    envelope: EnvelopeCodec,
}

impl<S: RemoteStore> BackupService<S> {
    /// A service over `store` with `config`.
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            guard: BackupGuard::new(),
            envelope: EnvelopeCodec::default(),
        }
    }

    /// Override the envelope parameters (lower iteration counts in tests).
    #[must_use]
    pub const fn with_envelope(mut self, envelope: EnvelopeCodec) -> Self {
        self.envelope = envelope;
        self
    }

    /// The remote store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Current settings.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Mutable settings; the caller persists them.
    pub fn config_mut(&mut self) -> &mut EngineConfig {
        &mut self.config
    }

    /// The guard serializing [`create_and_upload`](Self::create_and_upload).
    pub const fn guard(&self) -> &BackupGuard {
        &self.guard
    }

    fn path_of(&self, name: &str) -> String {
        join_path(&self.config.remote_directory, name)
    }

    /// Probe the configured remote directory.
    ///
    /// # Errors
    ///
    /// Returns the last probe's transport error when every probe fails.
    pub fn test_connection(&self) -> Result<&'static str, VaultError> {
        Ok(remote::test_connection(
            &self.store,
            &self.config.remote_directory,
        )?)
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// Build a bundle of the configured selection and upload it.
    ///
    /// Only one call runs at a time; a concurrent call fails immediately.
    ///
    /// # Errors
    ///
    /// - [`VaultError::BackupInProgress`] if another backup holds the guard
    /// - [`VaultError::NotConfigured`] if encryption is on and no passphrase was given
    /// - [`VaultError::NoSelection`] if the configured selection is empty
    /// - [`VaultError::Transport`] if the upload fails
    pub fn create_and_upload(
        &self,
        snapshot: &VaultSnapshot,
        request: UploadRequest<'_>,
    ) -> Result<UploadedBackup, VaultError> {
        let permit = self.guard.try_acquire().ok_or(VaultError::BackupInProgress)?;

        let passphrase = if self.config.encryption.enabled {
            Some(request.passphrase.ok_or_else(|| {
                VaultError::NotConfigured("backup encryption is on but no passphrase was given".into())
            })?)
        } else {
            None
        };

        let built = bundle::build(
            snapshot,
            &self.config.selection,
            &BuildOptions {
                image_dir: request.image_dir,
                passphrase,
                envelope: self.envelope,
                timestamp_millis: request.now_millis,
            },
        )?;

        let name = backup_file_name(request.now_millis, request.permanent, built.encrypted);
        self.store.put(&self.path_of(&name), &built.bytes)?;
        info!(
            backup = %name,
            bytes = built.bytes.len(),
            items = built.report.restored.total(),
            "backup uploaded"
        );

        permit.release();
        Ok(UploadedBackup {
            name,
            encrypted: built.encrypted,
            report: built.report,
        })
    }

    /// Record a finished backup for [`should_auto_backup`](Self::should_auto_backup).
    pub fn record_backup(&mut self, at_millis: i64) {
        self.config.last_backup_at_millis = Some(at_millis);
    }

    // -----------------------------------------------------------------------
    // List / restore / delete
    // -----------------------------------------------------------------------

    /// Backups in the remote directory, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Transport`] if listing fails.
    pub fn list_backups(&self, now_millis: i64) -> Result<Vec<BackupFile>, VaultError> {
        let warn_after = days_to_millis(self.config.expiry_warning_days);
        let mut files: Vec<BackupFile> = self
            .store
            .list(&self.config.remote_directory)?
            .into_iter()
            .filter(|f| f.name.ends_with(PLAIN_SUFFIX))
            .map(|f| describe(f, now_millis, warn_after))
            .collect();
        files.sort_by(|a, b| b.modified_millis.cmp(&a.modified_millis));
        Ok(files)
    }

    /// Download `name` and restore it against `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Transport`] if the download fails, otherwise
    /// whatever [`bundle::restore`] returns.
    pub fn download_and_restore(
        &self,
        name: &str,
        passphrase: Option<&Passphrase>,
        ctx: &RestoreContext,
    ) -> Result<RestoredBundle, VaultError> {
        let bytes = self.store.get(&self.path_of(name))?;
        let restored = bundle::restore(&bytes, passphrase, ctx)?;
        info!(backup = %name, summary = %restored.report.summary(), "backup restored");
        Ok(restored)
    }

    /// Delete `name` from the remote.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Transport`] if the delete fails.
    pub fn delete_backup(&self, name: &str) -> Result<(), VaultError> {
        self.store.delete(&self.path_of(name))?;
        info!(backup = %name, "backup deleted");
        Ok(())
    }

    /// Rename `name` to its permanent form. Returns the new name.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotConfigured`] for a name that is not a
    /// backup, or [`VaultError::Transport`] if the rename fails.
    pub fn mark_permanent(&self, name: &str) -> Result<String, VaultError> {
        let (stem, suffix) = split_suffix(name)
            .ok_or_else(|| VaultError::NotConfigured(format!("{name} is not a backup file")))?;
        if stem.ends_with(PERMANENT_MARKER) {
            return Ok(name.to_string());
        }
        let renamed = format!("{stem}{PERMANENT_MARKER}{suffix}");
        self.store
            .move_to(&self.path_of(name), &self.path_of(&renamed))?;
        Ok(renamed)
    }

    /// Rename `name` back to its ordinary form. Returns the new name.
    ///
    /// # Errors
    ///
    /// Same as [`mark_permanent`](Self::mark_permanent).
    pub fn unmark_permanent(&self, name: &str) -> Result<String, VaultError> {
        let (stem, suffix) = split_suffix(name)
            .ok_or_else(|| VaultError::NotConfigured(format!("{name} is not a backup file")))?;
        let Some(base) = stem.strip_suffix(PERMANENT_MARKER) else {
            return Ok(name.to_string());
        };
        let renamed = format!("{base}{suffix}");
        self.store
            .move_to(&self.path_of(name), &self.path_of(&renamed))?;
        Ok(renamed)
    }

    // -----------------------------------------------------------------------
    // Retention and scheduling
    // -----------------------------------------------------------------------

    /// Delete non-permanent backups older than the retention period.
    ///
    /// A backup that cannot be deleted is logged and skipped. Returns the
    /// names that were deleted.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Transport`] only if the listing itself fails.
    pub fn cleanup_expired(&self, now_millis: i64) -> Result<Vec<String>, VaultError> {
        let keep_for = days_to_millis(self.config.retention_days);
        let mut deleted = Vec::new();
        for file in self.list_backups(now_millis)? {
            if file.is_permanent || now_millis.saturating_sub(file.modified_millis) <= keep_for {
                continue;
            }
            match self.store.delete(&self.path_of(&file.name)) {
                Ok(()) => {
                    info!(backup = %file.name, "expired backup deleted");
                    deleted.push(file.name);
                }
                Err(e) => warn!(backup = %file.name, error = %e, "could not delete expired backup"),
            }
        }
        Ok(deleted)
    }

    /// Whether a scheduled backup is due at `now_millis`.
    ///
    /// Due when scheduling is on and the vault was never backed up, the
    /// last backup was on an earlier UTC day, or the configured interval
    /// has elapsed.
    #[must_use]
    pub fn should_auto_backup(&self, now_millis: i64) -> bool {
        if !self.config.auto_backup_enabled {
            return false;
        }
        let Some(last) = self.config.last_backup_at_millis else {
            return true;
        };
        if day_number(now_millis) != day_number(last) {
            return true;
        }
        let interval =
            i64::from(self.config.auto_backup_interval_hours).saturating_mul(MILLIS_PER_HOUR);
        now_millis.saturating_sub(last) >= interval
    }
}

fn days_to_millis(days: u32) -> i64 {
    i64::from(days).saturating_mul(MILLIS_PER_DAY)
}

fn describe(file: RemoteFile, now_millis: i64, warn_after: i64) -> BackupFile {
    let is_permanent =
        split_suffix(&file.name).is_some_and(|(stem, _)| stem.ends_with(PERMANENT_MARKER));
    let age = now_millis.saturating_sub(file.modified_millis);
    BackupFile {
        is_permanent,
        is_expiring: !is_permanent && age >= warn_after,
        is_encrypted: file.name.ends_with(ENCRYPTED_SUFFIX),
        name: file.name,
        size: file.size,
        modified_millis: file.modified_millis,
    }
}

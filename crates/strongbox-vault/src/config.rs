//! Backup engine settings, stored as plain JSON next to the vault.
//!
//! Nothing secret lives here: the backup passphrase is supplied per call
//! and never persisted.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bundle::BackupSelection;

/// Settings of the backup service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Directory on the remote store holding the bundles.
    #[serde(default = "default_remote_directory")]
    pub remote_directory: String,

    /// Age in days after which non-permanent backups are deleted.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Age in days after which a backup is flagged as expiring.
    #[serde(default = "default_expiry_warning_days")]
    pub expiry_warning_days: u32,

    /// Whether scheduled backups run.
    #[serde(default)]
    pub auto_backup_enabled: bool,

    /// Minimum hours between two scheduled backups on the same day.
    #[serde(default = "default_auto_backup_interval_hours")]
    pub auto_backup_interval_hours: u32,

    /// Bundle encryption settings.
    #[serde(default)]
    pub encryption: EncryptionSettings,

    /// What goes into a bundle.
    #[serde(default)]
    pub selection: BackupSelection,

    /// When the last backup finished, epoch milliseconds.
    #[serde(default)]
    pub last_backup_at_millis: Option<i64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            remote_directory: default_remote_directory(),
            retention_days: default_retention_days(),
            expiry_warning_days: default_expiry_warning_days(),
            auto_backup_enabled: false,
            auto_backup_interval_hours: default_auto_backup_interval_hours(),
            encryption: EncryptionSettings::default(),
            selection: BackupSelection::all(),
            last_backup_at_millis: None,
        }
    }
}

fn default_remote_directory() -> String {
    "Strongbox_Backups".into()
}
const fn default_retention_days() -> u32 {
    60
}
const fn default_expiry_warning_days() -> u32 {
    50
}
const fn default_auto_backup_interval_hours() -> u32 {
    12
}

/// Whether bundles are wrapped in the envelope before upload.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionSettings {
    /// Encrypt uploads.
    #[serde(default)]
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

const CONFIG_FILE: &str = "backup_config.json";
const CONFIG_TMP_FILE: &str = ".backup_config.json.tmp";

impl EngineConfig {
    /// Load from `{data_dir}/backup_config.json`.
    ///
    /// A missing or unparsable file yields the defaults.
    #[must_use]
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(CONFIG_FILE);
        fs::read_to_string(&path).map_or_else(
            |_| Self::default(),
            |contents| serde_json::from_str(&contents).unwrap_or_default(),
        )
    }

    /// Persist to `{data_dir}/backup_config.json` via a `.tmp` file and rename.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the directory is missing or the write or
    /// rename is rejected.
    pub fn save(&self, data_dir: &Path) -> std::io::Result<()> {
        let path = data_dir.join(CONFIG_FILE);
        let tmp = data_dir.join(CONFIG_TMP_FILE);

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(&tmp, &json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.remote_directory, "Strongbox_Backups");
        assert_eq!(config.retention_days, 60);
        assert_eq!(config.expiry_warning_days, 50);
        assert_eq!(config.auto_backup_interval_hours, 12);
        assert!(!config.auto_backup_enabled);
        assert!(!config.encryption.enabled);
        assert_eq!(config.selection, BackupSelection::all());
        assert!(config.last_backup_at_millis.is_none());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        assert_eq!(EngineConfig::load(dir.path()), EngineConfig::default());
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{ nope").unwrap();
        assert_eq!(EngineConfig::load(dir.path()), EngineConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"retentionDays":7,"selection":{"trash":false}}"#,
        )
        .unwrap();

        let config = EngineConfig::load(dir.path());
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.remote_directory, "Strongbox_Backups");
        assert!(!config.selection.trash);
        assert!(config.selection.credentials);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            auto_backup_enabled: true,
            encryption: EncryptionSettings { enabled: true },
            last_backup_at_millis: Some(1_700_000_000_000),
            ..EngineConfig::default()
        };
        config.save(dir.path()).unwrap();

        assert_eq!(EngineConfig::load(dir.path()), config);
        assert!(!dir.path().join(CONFIG_TMP_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn save_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        EngineConfig::default().save(dir.path()).unwrap();
        let mode = fs::metadata(dir.path().join(CONFIG_FILE))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn serde_uses_camel_case() {
        let json = serde_json::to_string(&EngineConfig::default()).unwrap();
        assert!(json.contains("remoteDirectory"));
        assert!(json.contains("autoBackupIntervalHours"));
        assert!(json.contains("lastBackupAtMillis"));
        assert!(!json.contains("retention_days"));
    }
}

//! Tabular (CSV) formats kept for backward compatibility.
//!
//! Older bundles and third-party password managers export flat CSV files.
//! [`detect`] classifies a file from its first record, [`records`] maps
//! one row of a known layout to a vault record, and [`csv`] does the
//! quoting. A malformed row is skipped and reported, never fatal.

pub mod csv;
pub mod detect;
pub mod records;

use serde::Serialize;

use crate::entities::{Credential, SecureItem};

pub use detect::{detect_format, DetectionFailed};
pub use records::{
    export_credentials_csv, export_secure_items_csv, parse_record, parse_secure_item,
};

// ---------------------------------------------------------------------------
// Layout description
// ---------------------------------------------------------------------------

/// Known tabular layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LegacyFormat {
    /// Current app export: `ID,Type,Title,Data,Notes,IsFavorite,ImagePaths,CreatedAt,UpdatedAt,CategoryId`.
    Current,
    /// Early app export with eleven positional columns.
    LegacyA,
    /// Desktop password-manager export, columns located by header.
    LegacyB,
    /// Browser-style export: `name,url,username,password,note`.
    ThirdPartyExport,
    /// Nothing matched; each row is tried against every layout.
    Unknown,
}

/// Column positions for header-mapped layouts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    /// Display title.
    pub title: Option<usize>,
    /// Website.
    pub url: Option<usize>,
    /// Username.
    pub username: Option<usize>,
    /// Password.
    pub password: Option<usize>,
    /// Notes.
    pub notes: Option<usize>,
    /// Email.
    pub email: Option<usize>,
    /// Phone.
    pub phone: Option<usize>,
}

impl ColumnMap {
    /// Positions of a header-less third-party export.
    #[must_use]
    pub const fn third_party() -> Self {
        Self {
            title: Some(0),
            url: Some(1),
            username: Some(2),
            password: Some(3),
            notes: Some(4),
            email: Some(5),
            phone: Some(6),
        }
    }
}

/// Result of format detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Detected format.
    pub format: LegacyFormat,
    /// Whether the first record is a header and must not be parsed as data.
    pub has_header: bool,
    /// Column positions (only meaningful for header-mapped layouts).
    pub columns: ColumnMap,
}

impl Layout {
    pub(crate) const fn with_header(format: LegacyFormat, columns: ColumnMap) -> Self {
        Self {
            format,
            has_header: true,
            columns,
        }
    }

    pub(crate) const fn headerless(format: LegacyFormat) -> Self {
        let columns = match format {
            LegacyFormat::ThirdPartyExport => ColumnMap::third_party(),
            _ => ColumnMap {
                title: None,
                url: None,
                username: None,
                password: None,
                notes: None,
                email: None,
                phone: None,
            },
        };
        Self {
            format,
            has_header: false,
            columns,
        }
    }

    /// Layout used when nothing matched.
    #[must_use]
    pub const fn unknown() -> Self {
        Self::headerless(LegacyFormat::Unknown)
    }
}

// ---------------------------------------------------------------------------
// Whole-file import
// ---------------------------------------------------------------------------

/// A data row that could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRow {
    /// 1-based record number within the file (the header is record 1).
    pub row: usize,
    /// Why the row was skipped.
    pub reason: String,
}

/// Outcome of importing one tabular file.
#[derive(Debug, Clone)]
pub struct TabularImport<T> {
    /// Layout the file was read with.
    pub layout: Layout,
    /// Records recovered, in file order.
    pub records: Vec<T>,
    /// Rows that were skipped.
    pub skipped: Vec<SkippedRow>,
}

impl<T> TabularImport<T> {
    /// Number of data rows seen (recovered plus skipped).
    #[must_use]
    pub fn rows_seen(&self) -> usize {
        self.records.len().saturating_add(self.skipped.len())
    }

    /// Human-readable warning per skipped row.
    #[must_use]
    pub fn warnings(&self, file_name: &str) -> Vec<String> {
        self.skipped
            .iter()
            .map(|s| format!("{file_name}: row {} skipped: {}", s.row, s.reason))
            .collect()
    }
}

/// Import credentials from a CSV document of any known layout.
#[must_use]
pub fn import_credentials(text: &str) -> TabularImport<Credential> {
    import_with(text, |fields, layout| {
        parse_record(fields, layout).ok_or_else(|| row_reason(fields, layout))
    })
}

/// Import notes, second-factor secrets, cards and documents from a CSV
/// document in the [`LegacyFormat::Current`] layout.
#[must_use]
pub fn import_secure_items(text: &str) -> TabularImport<SecureItem> {
    import_with(text, |fields, _| {
        parse_secure_item(fields).ok_or_else(|| {
            let tag = fields.get(1).map(|f| f.trim()).unwrap_or_default();
            if tag.eq_ignore_ascii_case(records::PASSWORD_TYPE) {
                "credential row in a secure-item file".to_string()
            } else {
                format!("unrecognised item row (type {tag:?})")
            }
        })
    })
}

fn import_with<T>(
    text: &str,
    parse: impl Fn(&[String], &Layout) -> Result<T, String>,
) -> TabularImport<T> {
    let rows = csv::read_records(text);
    let Some(first) = rows.first() else {
        return TabularImport {
            layout: Layout::unknown(),
            records: Vec::new(),
            skipped: Vec::new(),
        };
    };
    let layout = detect_format(first);
    let skip = usize::from(layout.has_header);

    let mut records = Vec::new();
    let mut skipped = Vec::new();
    for (index, fields) in rows.iter().enumerate().skip(skip) {
        match parse(fields, &layout) {
            Ok(record) => records.push(record),
            Err(reason) => {
                let row = index.saturating_add(1);
                tracing::debug!(row, %reason, "tabular row skipped");
                skipped.push(SkippedRow { row, reason });
            }
        }
    }
    TabularImport {
        layout,
        records,
        skipped,
    }
}

fn row_reason(fields: &[String], layout: &Layout) -> String {
    match layout.format {
        LegacyFormat::Current => {
            let tag = fields.get(1).map(|f| f.trim()).unwrap_or_default();
            if fields.len() < 9 {
                format!("expected at least 9 fields, found {}", fields.len())
            } else {
                format!("not a credential row (type {tag:?})")
            }
        }
        LegacyFormat::LegacyA => format!(
            "expected 11 fields with numeric timestamps, found {}",
            fields.len()
        ),
        LegacyFormat::LegacyB | LegacyFormat::ThirdPartyExport => {
            "row has neither a title nor a password".to_string()
        }
        LegacyFormat::Unknown => format!("unrecognised layout with {} fields", fields.len()),
    }
}

//! Row-level mapping between tabular layouts and vault records.

use super::csv::{join_record, BOM};
use super::{ColumnMap, Layout, LegacyFormat};
use crate::clock;
use crate::entities::{parse_image_paths, Credential, SecureItem, SecureItemKind};

/// Type tag of credential rows in the current layout.
pub const PASSWORD_TYPE: &str = "PASSWORD";

/// Marker that introduces credential metadata appended to a note.
pub const META_MARKER: &str = "[StrongboxMeta]";

/// Header of the third-party compatible credential export.
pub const THIRD_PARTY_HEADER: [&str; 7] =
    ["name", "url", "username", "password", "note", "email", "phone"];

/// Header of the current app layout.
pub const CURRENT_HEADER: [&str; 10] = [
    "ID",
    "Type",
    "Title",
    "Data",
    "Notes",
    "IsFavorite",
    "ImagePaths",
    "CreatedAt",
    "UpdatedAt",
    "CategoryId",
];

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Map one data row to a credential.
///
/// Returns `None` for rows that do not fit the layout. Layouts with an id
/// column keep it; the others yield identity `0`. Missing timestamps
/// default to now.
#[must_use]
pub fn parse_record(fields: &[String], layout: &Layout) -> Option<Credential> {
    match layout.format {
        LegacyFormat::Current => parse_current(fields),
        LegacyFormat::LegacyA => parse_legacy_a(fields),
        LegacyFormat::LegacyB | LegacyFormat::ThirdPartyExport => {
            parse_mapped(fields, &layout.columns)
        }
        LegacyFormat::Unknown => parse_current(fields)
            .or_else(|| parse_legacy_a(fields))
            .or_else(|| {
                (4..=7)
                    .contains(&fields.len())
                    .then(|| parse_mapped(fields, &ColumnMap::third_party()))
                    .flatten()
            }),
    }
}

/// Map one current-layout row to a secure item.
///
/// Credential rows and unknown type tags yield `None`.
#[must_use]
pub fn parse_secure_item(fields: &[String]) -> Option<SecureItem> {
    if fields.len() < 9 {
        return None;
    }
    let kind = SecureItemKind::parse(&fields[1])?;
    let now = clock::now_millis();
    Some(SecureItem {
        id: parse_id(&fields[0]),
        kind,
        title: fields[2].clone(),
        item_data: fields[3].clone(),
        notes: fields[4].clone(),
        is_favorite: parse_bool(&fields[5]),
        image_paths: parse_image_paths(&fields[6]),
        created_at: parse_millis(&fields[7]).unwrap_or(now),
        updated_at: parse_millis(&fields[8]).unwrap_or(now),
        category_id: fields.get(9).and_then(|f| f.trim().parse().ok()),
        is_deleted: false,
        deleted_at: None,
    })
}

fn parse_current(fields: &[String]) -> Option<Credential> {
    if fields.len() < 9 || !fields[1].trim().eq_ignore_ascii_case(PASSWORD_TYPE) {
        return None;
    }
    let data = AppData::parse(&fields[3]);
    let now = clock::now_millis();
    Some(Credential {
        id: parse_id(&fields[0]),
        title: fields[2].clone(),
        username: data.username,
        password: data.password,
        website: data.website,
        email: data.email,
        phone: data.phone,
        notes: fields[4].clone(),
        is_favorite: parse_bool(&fields[5]),
        created_at: parse_millis(&fields[7]).unwrap_or(now),
        updated_at: parse_millis(&fields[8]).unwrap_or(now),
        category_id: fields.get(9).and_then(|f| f.trim().parse().ok()),
        ..Credential::default()
    })
}

fn parse_legacy_a(fields: &[String]) -> Option<Credential> {
    if fields.len() < 11 {
        return None;
    }
    Some(Credential {
        id: parse_id(&fields[0]),
        title: fields[1].clone(),
        website: fields[2].clone(),
        username: fields[3].clone(),
        password: fields[4].clone(),
        notes: fields[5].clone(),
        is_favorite: parse_bool(&fields[6]),
        created_at: parse_millis(&fields[7])?,
        updated_at: parse_millis(&fields[8])?,
        sort_order: fields[9].trim().parse().unwrap_or_default(),
        is_group_cover: parse_bool(&fields[10]),
        ..Credential::default()
    })
}

/// Identifying columns are trimmed; the password and notes are secrets or
/// free text and stay exactly as quoted.
fn parse_mapped(fields: &[String], columns: &ColumnMap) -> Option<Credential> {
    let raw = |column: Option<usize>| {
        column
            .and_then(|i| fields.get(i))
            .cloned()
            .unwrap_or_default()
    };
    let get = |column: Option<usize>| raw(column).trim().to_string();
    let url = get(columns.url);
    let username = get(columns.username);
    let password = raw(columns.password);
    let title = [get(columns.title), url.clone(), username.clone()]
        .into_iter()
        .find(|t| !t.is_empty())
        .unwrap_or_default();
    if title.is_empty() && password.trim().is_empty() {
        return None;
    }

    let (notes, meta) = extract_meta(&raw(columns.notes));
    let now = clock::now_millis();
    let created_at = meta.created_at.unwrap_or(now);
    Some(Credential {
        title,
        website: url,
        username,
        password,
        notes,
        email: get(columns.email),
        phone: get(columns.phone),
        is_favorite: meta.is_favorite.unwrap_or(false),
        created_at,
        updated_at: meta.updated_at.unwrap_or(created_at),
        sort_order: meta.sort_order.unwrap_or(0),
        is_group_cover: meta.is_group_cover.unwrap_or(false),
        ..Credential::default()
    })
}

fn parse_bool(field: &str) -> bool {
    let field = field.trim();
    field.eq_ignore_ascii_case("true") || field == "1"
}

fn parse_id(field: &str) -> i64 {
    field.trim().parse().unwrap_or_default()
}

fn parse_millis(field: &str) -> Option<i64> {
    field.trim().parse().ok()
}

// ---------------------------------------------------------------------------
// App data string
// ---------------------------------------------------------------------------

/// Login fields packed into the `Data` column of current-layout password
/// rows: `username:x;password:y;website:z;email:e;phone:p`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AppData {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
    /// Website.
    pub website: String,
    /// Email.
    pub email: String,
    /// Phone.
    pub phone: String,
}

impl AppData {
    /// Parse a data string; unknown keys and pairs without `:` are ignored.
    #[must_use]
    pub fn parse(data: &str) -> Self {
        let mut out = Self::default();
        for pair in data.split(';') {
            let Some((key, value)) = pair.split_once(':') else {
                continue;
            };
            let value = value.to_string();
            match key.trim() {
                "username" => out.username = value,
                "password" => out.password = value,
                "website" => out.website = value,
                "email" => out.email = value,
                "phone" => out.phone = value,
                _ => {}
            }
        }
        out
    }

    /// Pack a credential's login fields.
    #[must_use]
    pub fn pack(credential: &Credential) -> String {
        format!(
            "username:{};password:{};website:{};email:{};phone:{}",
            credential.username,
            credential.password,
            credential.website,
            credential.email,
            credential.phone
        )
    }
}

// ---------------------------------------------------------------------------
// Note metadata marker
// ---------------------------------------------------------------------------

/// Credential fields carried through the note column of a third-party
/// export. `None` means the key was absent or unparsable.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecordMeta {
    /// Favorite flag.
    pub is_favorite: Option<bool>,
    /// Creation time (ms).
    pub created_at: Option<i64>,
    /// Last update time (ms).
    pub updated_at: Option<i64>,
    /// Position within its group.
    pub sort_order: Option<i32>,
    /// Group cover flag.
    pub is_group_cover: Option<bool>,
}

/// Append the metadata marker line to a credential's notes.
#[must_use]
pub fn append_meta(credential: &Credential) -> String {
    format!(
        "{}\n\n{META_MARKER}isFavorite={}|createdAt={}|updatedAt={}|sortOrder={}|isGroupCover={}",
        credential.notes,
        credential.is_favorite,
        credential.created_at,
        credential.updated_at,
        credential.sort_order,
        credential.is_group_cover
    )
}

/// Split a note into its user-visible text and the metadata marker.
///
/// Line endings are normalised to `\n`; without a marker the note is
/// returned unchanged apart from that.
#[must_use]
pub fn extract_meta(note: &str) -> (String, RecordMeta) {
    let note = note.replace("\r\n", "\n");
    let Some(at) = note.rfind(META_MARKER) else {
        return (note, RecordMeta::default());
    };
    let (text, rest) = note.split_at(at);
    let line = rest
        .get(META_MARKER.len()..)
        .unwrap_or_default()
        .lines()
        .next()
        .unwrap_or_default();

    let mut meta = RecordMeta::default();
    for pair in line.split('|') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "isFavorite" => meta.is_favorite = value.parse().ok(),
            "createdAt" => meta.created_at = value.parse().ok(),
            "updatedAt" => meta.updated_at = value.parse().ok(),
            "sortOrder" => meta.sort_order = value.parse().ok(),
            "isGroupCover" => meta.is_group_cover = value.parse().ok(),
            _ => {}
        }
    }
    (text.trim_end_matches('\n').to_string(), meta)
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Export credentials in the third-party layout, BOM-prefixed.
///
/// The title column falls back to the website, then the username.
#[must_use]
pub fn export_credentials_csv(credentials: &[Credential]) -> String {
    let mut out = String::new();
    out.push(BOM);
    out.push_str(&join_record(&THIRD_PARTY_HEADER));
    out.push('\n');
    for c in credentials {
        let title = [&c.title, &c.website, &c.username]
            .into_iter()
            .find(|t| !t.is_empty())
            .cloned()
            .unwrap_or_default();
        let row = [
            title,
            c.website.clone(),
            c.username.clone(),
            c.password.clone(),
            append_meta(c),
            c.email.clone(),
            c.phone.clone(),
        ];
        out.push_str(&join_record(&row));
        out.push('\n');
    }
    out
}

/// Export secure items in the current app layout, BOM-prefixed.
#[must_use]
pub fn export_secure_items_csv(items: &[SecureItem]) -> String {
    let mut out = String::new();
    out.push(BOM);
    out.push_str(&join_record(&CURRENT_HEADER));
    out.push('\n');
    for item in items {
        let images = serde_json::to_string(&item.image_paths).unwrap_or_else(|_| "[]".into());
        let row = [
            item.id.to_string(),
            item.kind.as_str().to_string(),
            item.title.clone(),
            item.item_data.clone(),
            item.notes.clone(),
            item.is_favorite.to_string(),
            images,
            item.created_at.to_string(),
            item.updated_at.to_string(),
            item.category_id.map(|id| id.to_string()).unwrap_or_default(),
        ];
        out.push_str(&join_record(&row));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::super::{csv::split_line, import_credentials, import_secure_items};
    use super::*;

    fn layout(format: LegacyFormat) -> Layout {
        Layout::headerless(format)
    }

    #[test]
    fn app_data_string_splits_on_first_colon() {
        let data = AppData::parse("username:alice;password:a:b:c;website:bank.com;bogus;x:y");
        assert_eq!(data.username, "alice");
        assert_eq!(data.password, "a:b:c");
        assert_eq!(data.website, "bank.com");
        assert!(data.email.is_empty());
    }

    #[test]
    fn current_password_row_parses() {
        let fields = split_line("7,PASSWORD,Bank,username:alice;password:pw;email:a@x,memo,true,[],100,200,3");
        let cred = parse_record(&fields, &layout(LegacyFormat::Current)).expect("row should parse");
        assert_eq!(cred.id, 7);
        assert_eq!(cred.title, "Bank");
        assert_eq!(cred.username, "alice");
        assert_eq!(cred.email, "a@x");
        assert!(cred.is_favorite);
        assert_eq!(cred.created_at, 100);
        assert_eq!(cred.category_id, Some(3));
    }

    #[test]
    fn current_non_password_row_is_not_a_credential() {
        let fields = split_line("7,TOTP,GitHub,{},,false,[],100,200");
        assert!(parse_record(&fields, &layout(LegacyFormat::Current)).is_none());
    }

    #[test]
    fn legacy_a_requires_numeric_timestamps() {
        let good = split_line("1,Bank,bank.com,alice,pw,n,true,100,200,4,true");
        let cred = parse_record(&good, &layout(LegacyFormat::LegacyA)).expect("row should parse");
        assert_eq!(cred.website, "bank.com");
        assert_eq!(cred.sort_order, 4);
        assert!(cred.is_group_cover);

        let bad = split_line("1,Bank,bank.com,alice,pw,n,true,yesterday,200,4,true");
        assert!(parse_record(&bad, &layout(LegacyFormat::LegacyA)).is_none());
    }

    #[test]
    fn third_party_title_falls_back_to_url_then_username() {
        let third = layout(LegacyFormat::ThirdPartyExport);
        let by_url = parse_record(&split_line(",site.org,bob,pw"), &third).expect("row should parse");
        assert_eq!(by_url.title, "site.org");
        let by_user = parse_record(&split_line(",,bob,pw"), &third).expect("row should parse");
        assert_eq!(by_user.title, "bob");
        assert!(parse_record(&split_line(",,,"), &third).is_none());
    }

    #[test]
    fn quoted_password_and_note_keep_their_padding() {
        let third = layout(LegacyFormat::ThirdPartyExport);
        let fields = split_line(r#"  Bank  ,bank.com,alice," pass word ","  indented""#);
        let cred = parse_record(&fields, &third).expect("row should parse");
        assert_eq!(cred.title, "Bank");
        assert_eq!(cred.password, " pass word ");
        assert_eq!(cred.notes, "  indented");
    }

    #[test]
    fn unknown_layout_tries_every_parser() {
        let unknown = Layout::unknown();
        let current = split_line("1,PASSWORD,Bank,username:alice,,false,[],1,2");
        assert_eq!(parse_record(&current, &unknown).expect("current").username, "alice");
        let third = split_line("Mail,mail.com,bob,pw,note");
        assert_eq!(parse_record(&third, &unknown).expect("third").username, "bob");
        assert!(parse_record(&split_line("a,b"), &unknown).is_none());
    }

    #[test]
    fn metadata_marker_is_stripped_and_applied() {
        let note = "line one\r\nline two\r\n\r\n[StrongboxMeta]isFavorite=true|createdAt=5|updatedAt=9|sortOrder=2|isGroupCover=false";
        let (text, meta) = extract_meta(note);
        assert_eq!(text, "line one\nline two");
        assert_eq!(meta.is_favorite, Some(true));
        assert_eq!(meta.created_at, Some(5));
        assert_eq!(meta.updated_at, Some(9));
        assert_eq!(meta.sort_order, Some(2));
        assert_eq!(meta.is_group_cover, Some(false));
    }

    #[test]
    fn note_without_marker_is_kept() {
        let (text, meta) = extract_meta("plain");
        assert_eq!(text, "plain");
        assert_eq!(meta, RecordMeta::default());
    }

    #[test]
    fn exported_credentials_reimport_with_metadata() {
        let original = Credential {
            title: String::new(),
            website: "shop.com".into(),
            username: "carol".into(),
            password: "p,w\"1".into(),
            notes: "multi\nline".into(),
            email: "c@shop.com".into(),
            is_favorite: true,
            created_at: 1_000,
            updated_at: 2_000,
            sort_order: 5,
            ..Credential::default()
        };
        let csv = export_credentials_csv(std::slice::from_ref(&original));
        assert!(csv.starts_with('\u{FEFF}'));

        let import = import_credentials(&csv);
        assert_eq!(import.layout.format, LegacyFormat::ThirdPartyExport);
        let cred = &import.records[0];
        assert_eq!(cred.title, "shop.com");
        assert_eq!(cred.password, "p,w\"1");
        assert_eq!(cred.notes, "multi\nline");
        assert_eq!(cred.email, "c@shop.com");
        assert!(cred.is_favorite);
        assert_eq!(cred.created_at, 1_000);
        assert_eq!(cred.updated_at, 2_000);
        assert_eq!(cred.sort_order, 5);
    }

    #[test]
    fn exported_secure_items_reimport() {
        let card = SecureItem {
            id: 4,
            kind: SecureItemKind::BankCard,
            title: "Visa".into(),
            item_data: r#"{"number":"4111"}"#.into(),
            image_paths: vec!["front.enc".into()],
            created_at: 10,
            updated_at: 20,
            category_id: Some(2),
            ..SecureItem::default()
        };
        let csv = export_secure_items_csv(std::slice::from_ref(&card));
        let import = import_secure_items(&csv);
        assert_eq!(import.records.len(), 1);
        let item = &import.records[0];
        assert_eq!(item.kind, SecureItemKind::BankCard);
        assert_eq!(item.item_data, card.item_data);
        assert_eq!(item.image_paths, card.image_paths);
        assert_eq!(item.id, 4);
        assert_eq!(item.category_id, Some(2));
    }
}

//! KeePass KDBX containers through the `keepass` crate.
//!
//! The tree carries fields, tags and the creation/modification times. The
//! rest of the KeePass model (history, icons, auto-type, binary fields,
//! database metadata) is not mirrored in the tree; encode merges the tree
//! into the database this codec last decoded, matching groups and entries
//! by uuid, so those parts survive an update untouched.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, NaiveDateTime};
use keepass::db::{Entry as KdbxEntry, Group as KdbxGroup, Node, Value};
use keepass::error::DatabaseOpenError;
use keepass::config::DatabaseConfig;
use keepass::{Database, DatabaseKey};
use secstr::SecStr;
use uuid::Uuid;

use super::codec::{ContainerCodec, ContainerCredentials};
use super::tree::{Container, Entry, Extra, FieldValue, Group, Times};
use super::ExternalStoreError;

const CREATION_TIME: &str = "CreationTime";
const MODIFICATION_TIME: &str = "LastModificationTime";

/// Reads and writes KDBX files that other KeePass clients open.
#[derive(Default)]
pub struct KdbxCodec {
    base: Mutex<Option<Database>>,
}

impl KdbxCodec {
    /// A codec with nothing decoded yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for KdbxCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let loaded = self.base.lock().is_ok_and(|base| base.is_some());
        f.debug_struct("KdbxCodec").field("loaded", &loaded).finish()
    }
}

impl ContainerCodec for KdbxCodec {
    fn decode(
        &self,
        bytes: &[u8],
        credentials: &ContainerCredentials,
    ) -> Result<Container, ExternalStoreError> {
        let key = database_key(credentials)
            .map_err(|e| ExternalStoreError::CorruptContainer(format!("key file: {e}")))?;
        let db = Database::open(&mut Cursor::new(bytes), key).map_err(|e| match e {
            DatabaseOpenError::Key(_) => ExternalStoreError::WrongPassword,
            other => ExternalStoreError::CorruptContainer(other.to_string()),
        })?;

        let mut meta = BTreeMap::new();
        if let Some(name) = &db.meta.database_name {
            meta.insert("name".to_string(), name.clone());
        }
        if let Some(generator) = &db.meta.generator {
            meta.insert("generator".to_string(), generator.clone());
        }
        let container = Container {
            meta,
            root: group_from(&db.root),
            extra: Extra::new(),
        };

        *self.base.lock().unwrap_or_else(PoisonError::into_inner) = Some(db);
        Ok(container)
    }

    fn encode(
        &self,
        container: &Container,
        credentials: &ContainerCredentials,
    ) -> Result<Vec<u8>, ExternalStoreError> {
        let key = database_key(credentials)
            .map_err(|e| ExternalStoreError::Encode(format!("key file: {e}")))?;

        let mut base = self.base.lock().unwrap_or_else(PoisonError::into_inner);
        let mut db = base
            .take()
            .unwrap_or_else(|| Database::new(DatabaseConfig::default()));

        let previous = std::mem::replace(&mut db.root, KdbxGroup::new(""));
        let mut index = Index::default();
        index.add(&previous);
        db.root = group_into(&container.root, &index);
        if let Some(name) = container.meta.get("name") {
            db.meta.database_name = Some(name.clone());
        }
        if let Some(generator) = container.meta.get("generator") {
            db.meta.generator = Some(generator.clone());
        }

        let mut out = Vec::new();
        let saved = db.save(&mut out, key);
        *base = Some(db);
        saved.map_err(|e| ExternalStoreError::Encode(e.to_string()))?;
        Ok(out)
    }
}

/// KeePass key: the password unless it is empty and a key file is given,
/// plus the key file.
fn database_key(credentials: &ContainerCredentials) -> io::Result<DatabaseKey> {
    let password = String::from_utf8_lossy(credentials.passphrase.expose());
    let mut key = DatabaseKey::new();
    if !password.is_empty() || credentials.key_file.is_none() {
        key = key.with_password(&password);
    }
    if let Some(file) = &credentials.key_file {
        key = key.with_keyfile(&mut file.as_slice())?;
    }
    Ok(key)
}

// ---------------------------------------------------------------------------
// KDBX to tree
// ---------------------------------------------------------------------------

fn group_from(group: &KdbxGroup) -> Group {
    let mut groups = Vec::new();
    let mut entries = Vec::new();
    for child in &group.children {
        match child {
            Node::Group(g) => groups.push(group_from(g)),
            Node::Entry(e) => entries.push(entry_from(e)),
        }
    }
    Group {
        uuid: group.uuid,
        name: group.name.clone(),
        notes: group.notes.clone().unwrap_or_default(),
        groups,
        entries,
        custom_data: BTreeMap::new(),
        extra: Extra::new(),
    }
}

fn entry_from(entry: &KdbxEntry) -> Entry {
    let fields = entry
        .fields
        .iter()
        .filter_map(|(name, value)| {
            let field = match value {
                Value::Unprotected(text) => FieldValue {
                    value: text.clone(),
                    protected: false,
                },
                Value::Protected(secret) => FieldValue {
                    value: String::from_utf8_lossy(secret.unsecure()).into_owned(),
                    protected: true,
                },
                Value::Bytes(_) => return None,
            };
            Some((name.clone(), field))
        })
        .collect();
    Entry {
        uuid: entry.uuid,
        fields,
        tags: entry.tags.clone(),
        times: Times {
            created_millis: millis(entry.times.times.get(CREATION_TIME)),
            modified_millis: millis(entry.times.times.get(MODIFICATION_TIME)),
            extra: Extra::new(),
        },
        custom_data: BTreeMap::new(),
        extra: Extra::new(),
    }
}

fn millis(time: Option<&NaiveDateTime>) -> i64 {
    time.map_or(0, |t| t.and_utc().timestamp_millis())
}

// ---------------------------------------------------------------------------
// Tree to KDBX
// ---------------------------------------------------------------------------

/// Groups and entries of the previously decoded database, by uuid.
#[derive(Default)]
struct Index<'a> {
    groups: HashMap<Uuid, &'a KdbxGroup>,
    entries: HashMap<Uuid, &'a KdbxEntry>,
}

impl<'a> Index<'a> {
    fn add(&mut self, group: &'a KdbxGroup) {
        self.groups.insert(group.uuid, group);
        for child in &group.children {
            match child {
                Node::Group(g) => self.add(g),
                Node::Entry(e) => {
                    self.entries.insert(e.uuid, e);
                }
            }
        }
    }
}

fn group_into(group: &Group, index: &Index<'_>) -> KdbxGroup {
    let mut out = index
        .groups
        .get(&group.uuid)
        .map_or_else(|| KdbxGroup::new(&group.name), |base| KdbxGroup::clone(base));
    out.uuid = group.uuid;
    out.name = group.name.clone();
    out.notes = (!group.notes.is_empty()).then(|| group.notes.clone());
    out.children = group
        .entries
        .iter()
        .map(|e| Node::Entry(entry_into(e, index)))
        .chain(group.groups.iter().map(|g| Node::Group(group_into(g, index))))
        .collect();
    out
}

fn entry_into(entry: &Entry, index: &Index<'_>) -> KdbxEntry {
    let mut out = index
        .entries
        .get(&entry.uuid)
        .map_or_else(KdbxEntry::new, |base| KdbxEntry::clone(base));
    out.uuid = entry.uuid;
    // Binary fields are not in the tree; every text field is.
    out.fields.retain(|_, value| matches!(value, Value::Bytes(_)));
    for (name, field) in &entry.fields {
        let value = if field.protected {
            Value::Protected(SecStr::new(field.value.as_bytes().to_vec()))
        } else {
            Value::Unprotected(field.value.clone())
        };
        out.fields.insert(name.clone(), value);
    }
    out.tags.clone_from(&entry.tags);
    set_time(&mut out.times.times, CREATION_TIME, entry.times.created_millis);
    set_time(&mut out.times.times, MODIFICATION_TIME, entry.times.modified_millis);
    out
}

fn set_time(times: &mut HashMap<String, NaiveDateTime>, key: &str, millis: i64) {
    if millis == 0 {
        return;
    }
    if let Some(time) = DateTime::from_timestamp_millis(millis) {
        times.insert(key.to_string(), time.naive_utc());
    }
}

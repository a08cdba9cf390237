//! Group/entry tree of an external container.
//!
//! The tree is treated as immutable: every change goes through
//! [`rebuild`] or [`Group::with_entry_at`], which return a new tree and
//! leave the input untouched. Keys this engine does not know are kept in
//! `extra` so a decode/encode cycle never drops them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unknown keys carried through unchanged.
pub type Extra = BTreeMap<String, Value>;

/// A decoded container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Generator, database name and similar header values.
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    /// Root group.
    pub root: Group,
    /// Unknown keys.
    #[serde(flatten)]
    pub extra: Extra,
}

impl Container {
    /// An empty container whose root group is called `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut meta = BTreeMap::new();
        meta.insert("generator".into(), "Strongbox".into());
        meta.insert("name".into(), name.into());
        Self {
            meta,
            root: Group::named(name),
            extra: Extra::new(),
        }
    }

    /// Same container with a different root.
    #[must_use]
    pub fn with_root(&self, root: Group) -> Self {
        Self {
            meta: self.meta.clone(),
            root,
            extra: self.extra.clone(),
        }
    }
}

/// A group of entries and subgroups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Stable group identity.
    pub uuid: Uuid,
    /// Display name, also the path segment.
    #[serde(default)]
    pub name: String,
    /// Free-form notes.
    #[serde(default)]
    pub notes: String,
    /// Child groups, in display order.
    #[serde(default)]
    pub groups: Vec<Group>,
    /// Entries directly in this group.
    #[serde(default)]
    pub entries: Vec<Entry>,
    /// Plugin data.
    #[serde(default)]
    pub custom_data: BTreeMap<String, String>,
    /// Unknown keys.
    #[serde(flatten)]
    pub extra: Extra,
}

/// A single entry: named fields plus bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Stable entry identity.
    pub uuid: Uuid,
    /// Field name to value.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Timestamps.
    #[serde(default)]
    pub times: Times,
    /// Plugin data.
    #[serde(default)]
    pub custom_data: BTreeMap<String, String>,
    /// Unknown keys.
    #[serde(flatten)]
    pub extra: Extra,
}

/// A field value; protected values are shown masked by viewers.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValue {
    /// Field content.
    pub value: String,
    /// Whether the value is sensitive.
    #[serde(default)]
    pub protected: bool,
}

impl std::fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.protected {
            f.write_str("FieldValue(***)")
        } else {
            f.debug_tuple("FieldValue").field(&self.value).finish()
        }
    }
}

/// Entry timestamps (ms).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Times {
    /// Creation time.
    #[serde(default)]
    pub created_millis: i64,
    /// Last modification time.
    #[serde(default)]
    pub modified_millis: i64,
    /// Unknown keys (expiry, usage counts).
    #[serde(flatten)]
    pub extra: Extra,
}

impl Group {
    /// A new empty group with a fresh identity.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Entries in this group and all descendants.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.groups
            .iter()
            .fold(self.entries.len(), |n, g| n.saturating_add(g.entry_count()))
    }

    /// Every entry with its `/`-separated group path below this group
    /// (`None` for entries of this group itself), depth first.
    #[must_use]
    pub fn entries_with_paths(&self) -> Vec<(Option<String>, &Entry)> {
        let mut out = Vec::new();
        collect(self, None, &mut out);
        out
    }

    /// First entry accepted by `matches`, depth first with a group's own
    /// entries before its subgroups.
    pub fn find_first<M: Fn(&Entry) -> bool>(&self, matches: &M) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|&e| matches(e))
            .or_else(|| self.groups.iter().find_map(|g| g.find_first(matches)))
    }

    /// Copy of this group with `entry` appended to the group at `path`,
    /// creating missing groups. Empty segments are ignored.
    #[must_use]
    pub fn with_entry_at(&self, path: &[&str], entry: Entry) -> Self {
        let mut group = self.clone();
        match path.split_first() {
            None => group.entries.push(entry),
            Some((head, rest)) if head.is_empty() => return self.with_entry_at(rest, entry),
            Some((head, rest)) => {
                match group.groups.iter().position(|g| g.name == *head) {
                    Some(i) => {
                        let child = group.groups[i].with_entry_at(rest, entry);
                        group.groups[i] = child;
                    }
                    None => group.groups.push(Self::named(head).with_entry_at(rest, entry)),
                }
            }
        }
        group
    }
}

fn collect<'a>(group: &'a Group, path: Option<String>, out: &mut Vec<(Option<String>, &'a Entry)>) {
    for entry in &group.entries {
        out.push((path.clone(), entry));
    }
    for child in &group.groups {
        let child_path = match &path {
            Some(parent) => format!("{parent}/{}", child.name),
            None => child.name.clone(),
        };
        collect(child, Some(child_path), out);
    }
}

/// Split a `/`-separated group path, dropping empty segments.
#[must_use]
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').map(str::trim).filter(|s| !s.is_empty()).collect()
}

/// Rebuild `group` bottom-up, passing every entry accepted by `matches`
/// to `mutate`.
///
/// `mutate` returns the replacement entry, or `None` to drop it. Returns
/// the new group and the number of matched entries. `group` itself is
/// never modified.
pub fn rebuild<M, F>(group: &Group, matches: &M, mutate: &mut F) -> (Group, usize)
where
    M: Fn(&Entry) -> bool,
    F: FnMut(&Entry) -> Option<Entry>,
{
    let mut count = 0usize;

    let entries = group
        .entries
        .iter()
        .filter_map(|entry| {
            if matches(entry) {
                count = count.saturating_add(1);
                mutate(entry)
            } else {
                Some(entry.clone())
            }
        })
        .collect();

    let groups = group
        .groups
        .iter()
        .map(|child| {
            let (rebuilt, n) = rebuild(child, matches, &mut *mutate);
            count = count.saturating_add(n);
            rebuilt
        })
        .collect();

    let rebuilt = Group {
        uuid: group.uuid,
        name: group.name.clone(),
        notes: group.notes.clone(),
        groups,
        entries,
        custom_data: group.custom_data.clone(),
        extra: group.extra.clone(),
    };
    (rebuilt, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str) -> Entry {
        let mut fields = BTreeMap::new();
        fields.insert(
            "Title".to_string(),
            FieldValue {
                value: title.to_string(),
                protected: false,
            },
        );
        Entry {
            uuid: Uuid::new_v4(),
            fields,
            ..Entry::default()
        }
    }

    fn title(e: &Entry) -> &str {
        e.fields.get("Title").map_or("", |f| f.value.as_str())
    }

    fn sample() -> Group {
        let mut root = Group::named("Root");
        root.entries.push(entry("a"));
        let mut work = Group::named("Work");
        work.entries.push(entry("b"));
        let mut deep = Group::named("Deep");
        deep.entries.push(entry("a"));
        work.groups.push(deep);
        root.groups.push(work);
        root
    }

    #[test]
    fn rebuild_counts_and_replaces_everywhere() {
        let root = sample();
        let (rebuilt, n) = rebuild(&root, &|e: &Entry| title(e) == "a", &mut |e: &Entry| {
            let mut e = e.clone();
            e.tags.push("seen".into());
            Some(e)
        });
        assert_eq!(n, 2);
        assert_eq!(rebuilt.entry_count(), 3);
        assert_eq!(rebuilt.entries[0].tags, vec!["seen".to_string()]);
        assert_eq!(rebuilt.groups[0].groups[0].entries[0].tags, vec!["seen".to_string()]);
        // Input untouched.
        assert!(root.entries[0].tags.is_empty());
    }

    #[test]
    fn rebuild_can_remove() {
        let root = sample();
        let (rebuilt, n) = rebuild(&root, &|e: &Entry| title(e) == "a", &mut |_: &Entry| None);
        assert_eq!(n, 2);
        assert_eq!(rebuilt.entry_count(), 1);
        assert_eq!(root.entry_count(), 3);
        assert_eq!(rebuilt.groups[0].uuid, root.groups[0].uuid);
    }

    #[test]
    fn find_first_prefers_shallow_entries() {
        let root = sample();
        let found = root.find_first(&|e: &Entry| title(e) == "a").unwrap();
        assert_eq!(found.uuid, root.entries[0].uuid);
        assert!(root.find_first(&|e: &Entry| title(e) == "zzz").is_none());
    }

    #[test]
    fn paths_are_reported() {
        let root = sample();
        let paths: Vec<_> = root
            .entries_with_paths()
            .into_iter()
            .map(|(p, e)| (p, title(e).to_string()))
            .collect();
        assert_eq!(
            paths,
            vec![
                (None, "a".to_string()),
                (Some("Work".to_string()), "b".to_string()),
                (Some("Work/Deep".to_string()), "a".to_string()),
            ]
        );
    }

    #[test]
    fn insertion_creates_missing_groups_once() {
        let root = sample();
        let added = root.with_entry_at(&path_segments("Work/New/"), entry("c"));
        let again = added.with_entry_at(&path_segments("/Work/New"), entry("d"));

        assert_eq!(root.entry_count(), 3);
        assert_eq!(again.entry_count(), 5);
        let work = &again.groups[0];
        assert_eq!(work.groups.len(), 2);
        assert_eq!(work.groups[1].name, "New");
        assert_eq!(work.groups[1].entries.len(), 2);
    }

    #[test]
    fn unknown_keys_survive_serde() {
        let json = r#"{
            "meta": {"name": "db"},
            "root": {
                "uuid": "00000000-0000-0000-0000-000000000001",
                "name": "Root",
                "iconId": 48,
                "entries": [{
                    "uuid": "00000000-0000-0000-0000-000000000002",
                    "fields": {"Title": {"value": "x"}},
                    "times": {"createdMillis": 1, "expires": true},
                    "history": [1, 2]
                }]
            },
            "deletedObjects": []
        }"#;
        let container: Container = serde_json::from_str(json).unwrap();
        let entry = &container.root.entries[0];
        assert_eq!(entry.extra.get("history"), Some(&serde_json::json!([1, 2])));
        assert_eq!(entry.times.extra.get("expires"), Some(&Value::Bool(true)));
        assert_eq!(container.root.extra.get("iconId"), Some(&serde_json::json!(48)));

        let encoded = serde_json::to_string(&container).unwrap();
        let back: Container = serde_json::from_str(&encoded).unwrap();
        assert_eq!(back, container);
        assert!(back.extra.contains_key("deletedObjects"));
    }

    #[test]
    fn protected_values_are_masked_in_debug() {
        let value = FieldValue {
            value: "secret".into(),
            protected: true,
        };
        assert_eq!(format!("{value:?}"), "FieldValue(***)");
    }
}

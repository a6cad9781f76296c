//! Nested configuration trees: building from flat keys, merging, lookup and diff.
//!
//! Every segment stored in a [`Tree`] is lower-cased, so lookups are
//! case-insensitive. Merging never mutates its inputs; readers holding an
//! older snapshot keep seeing exactly what they loaded.

use std::collections::BTreeSet;
use std::sync::Arc;

use toml::{Table, Value};

use super::source::Values;

/// A case-normalized configuration tree.
pub type Tree = Table;

/// Maps a provider-native key to its path segments.
pub type Splitter = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// Returns a splitter that cuts keys on a fixed delimiter.
pub fn delimiter_splitter(delimiter: impl Into<String>) -> Splitter {
    let delimiter = delimiter.into();
    Arc::new(move |key: &str| {
        if delimiter.is_empty() {
            return vec![key.to_string()];
        }
        key.split(delimiter.as_str()).map(str::to_string).collect()
    })
}

/// Builds a tree from a flat map of provider keys.
///
/// Keys of nested tables go through the splitter as well. Keys whose
/// splitter yields no non-empty segment are dropped.
pub fn build(values: &Values, splitter: &(dyn Fn(&str) -> Vec<String> + Send + Sync)) -> Tree {
    let mut tree = Tree::new();

    for (key, value) in values {
        let path = split(key, splitter);
        if path.is_empty() {
            continue;
        }
        let value = match value {
            Value::Table(nested) => Value::Table(build(nested, splitter)),
            other => other.clone(),
        };
        insert_path(&mut tree, &path, value);
    }

    tree
}

fn split(key: &str, splitter: &(dyn Fn(&str) -> Vec<String> + Send + Sync)) -> Vec<String> {
    splitter(key)
        .into_iter()
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_lowercase())
        .collect()
}

/// Merges `overlay` on top of `base` into a new tree.
///
/// Nested tables merge recursively; anything else at an overlay path
/// (scalars, arrays, or a table replacing a scalar) overwrites the base.
pub fn merge(base: &Tree, overlay: &Tree) -> Tree {
    let mut merged = base.clone();
    deep_merge(&mut merged, overlay);
    merged
}

/// Inserts `value` at `path`, creating intermediate tables as needed.
///
/// An existing scalar on the way is replaced by a table. When both the
/// existing and the new value are tables they are deep-merged.
pub fn insert_path(table: &mut Table, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        if let Value::Table(overlay) = value {
            deep_merge(table, &overlay);
        }
        return;
    };

    if rest.is_empty() {
        match (table.get_mut(first), value) {
            (Some(Value::Table(base)), Value::Table(overlay)) => deep_merge(base, &overlay),
            (_, value) => {
                table.insert(first.clone(), value);
            }
        }
        return;
    }

    if !matches!(table.get(first), Some(Value::Table(_))) {
        table.insert(first.clone(), Value::Table(Table::new()));
    }

    if let Some(Value::Table(nested)) = table.get_mut(first) {
        insert_path(nested, rest, value);
    }
}

/// Resolves a dotted, case-insensitive path against `tree`.
///
/// Returns the value at the path, which may be a leaf or a nested table.
pub fn lookup<'a>(tree: &'a Tree, path: &str) -> Option<&'a Value> {
    let mut segments = path_segments(path);
    let first = segments.next()?;
    let mut current = tree.get(&first)?;

    for segment in segments {
        current = current.as_table()?.get(&segment)?;
    }

    Some(current)
}

/// Computes the dotted paths whose leaf value differs between two trees.
///
/// A path is reported when its value changed, when it exists on only one
/// side, or when it switched between a leaf and a table. Removed or added
/// sub-trees report every leaf below them.
pub fn diff(old: &Tree, new: &Tree) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();
    diff_tables(old, new, "", &mut changed);
    changed
}

/// Returns whether `prefix` addresses `path` or one of its ancestors.
///
/// An empty prefix covers every path.
pub fn covers(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() || path == prefix {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('.'))
}

/// Normalizes a dotted path to the canonical form used by [`diff`].
pub fn normalize_path(path: &str) -> String {
    path_segments(path).collect::<Vec<_>>().join(".")
}

fn path_segments(path: &str) -> impl Iterator<Item = String> + '_ {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .map(str::to_lowercase)
}

fn deep_merge(base: &mut Table, overlay: &Table) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Table(base_table)), Value::Table(overlay_table)) => {
                deep_merge(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn diff_tables(old: &Table, new: &Table, prefix: &str, changed: &mut BTreeSet<String>) {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();

    for key in keys {
        let path = join(prefix, key);
        match (old.get(key), new.get(key)) {
            (Some(Value::Table(a)), Some(Value::Table(b))) => diff_tables(a, b, &path, changed),
            (Some(a), Some(b)) if a == b => {}
            (a, b) => {
                for side in [a, b].into_iter().flatten() {
                    collect_leaves(side, &path, changed);
                }
            }
        }
    }
}

fn collect_leaves(value: &Value, path: &str, changed: &mut BTreeSet<String>) {
    match value {
        Value::Table(table) if !table.is_empty() => {
            for (key, child) in table {
                collect_leaves(child, &join(path, key), changed);
            }
        }
        _ => {
            changed.insert(path.to_string());
        }
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

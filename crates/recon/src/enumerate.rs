use std::collections::HashSet;
use std::io::BufRead;

use crate::error::{ReconError, StoreError};
use crate::model::Identifier;
use crate::store::{normalize_root, ObjectStore};

/// List the distinct identifiers one level below `root` in `store`.
///
/// The identifier is the first path segment after `root`. Empty segments
/// are dropped; duplicates keep their first position. Any listing error
/// fails the whole call.
pub fn list_identifiers(store: &dyn ObjectStore, root: &str) -> Result<Vec<Identifier>, StoreError> {
    let root = normalize_root(root);
    let prefixes = store.list_prefixes(&root, '/')?;

    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(prefixes.len());
    for prefix in prefixes {
        let rest = prefix.strip_prefix(root.as_str()).unwrap_or(&prefix);
        let id = rest.split('/').next().unwrap_or("");
        if id.is_empty() {
            continue;
        }
        if seen.insert(id.to_string()) {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

/// Read identifiers one per line. Lines are trimmed; blank lines skipped.
pub fn read_identifiers(reader: impl BufRead) -> Result<Vec<Identifier>, ReconError> {
    let mut ids = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let id = line.trim();
        if !id.is_empty() {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

/// Drop repeated identifiers, keeping first occurrence. Returns how many
/// were removed.
pub fn dedup_identifiers(ids: &mut Vec<Identifier>) -> usize {
    let before = ids.len();
    let mut seen = HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));
    before - ids.len()
}

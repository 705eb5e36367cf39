use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::StoreError;

/// An object-listing backend bound to one bucket / namespace.
///
/// Implementations must be safe to share across worker threads. Neither
/// method retries; retry policy belongs to the caller.
pub trait ObjectStore: Send + Sync {
    /// Human label used in logs and errors (usually the bucket name).
    fn name(&self) -> &str;

    /// Number of objects whose key starts with `prefix`.
    fn count(&self, prefix: &str) -> Result<u64, StoreError>;

    /// Distinct common prefixes directly under `root`, each ending in
    /// `delimiter` (one "directory" level).
    fn list_prefixes(&self, root: &str, delimiter: char) -> Result<Vec<String>, StoreError>;
}

/// `root` with exactly one trailing `/`, or empty for the bucket root.
pub fn normalize_root(root: &str) -> String {
    let trimmed = root.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Identifier-scoped prefix: `root/identifier/` followed by the optional
/// per-store `suffix`.
pub fn scope_path(root: &str, identifier: &str, suffix: Option<&str>) -> String {
    let mut path = normalize_root(root);
    path.push_str(identifier);
    path.push('/');
    if let Some(suffix) = suffix {
        path.push_str(suffix.trim_start_matches('/'));
    }
    path
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

struct Fault {
    prefix: String,
    error: StoreError,
    /// `None` = fail forever.
    remaining: Option<u32>,
}

/// Keys held in memory. Faults and latency can be injected per prefix.
pub struct MemoryStore {
    name: String,
    keys: BTreeSet<String>,
    faults: Mutex<Vec<Fault>>,
    delays: Vec<(String, Duration)>,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: BTreeSet::new(),
            faults: Mutex::new(Vec::new()),
            delays: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_object(mut self, key: impl Into<String>) -> Self {
        self.keys.insert(key.into());
        self
    }

    /// Add `n` objects directly under `prefix`.
    pub fn with_count(mut self, prefix: &str, n: u64) -> Self {
        for i in 0..n {
            self.keys.insert(format!("{prefix}obj-{i:06}"));
        }
        self
    }

    /// Operations touching `prefix` fail with `error` forever.
    pub fn with_failure(self, prefix: impl Into<String>, error: StoreError) -> Self {
        self.faults.lock().push(Fault {
            prefix: prefix.into(),
            error,
            remaining: None,
        });
        self
    }

    /// Operations touching `prefix` fail `times` times, then succeed.
    pub fn with_flaky(self, prefix: impl Into<String>, error: StoreError, times: u32) -> Self {
        self.faults.lock().push(Fault {
            prefix: prefix.into(),
            error,
            remaining: Some(times),
        });
        self
    }

    /// Operations touching `prefix` sleep for `delay` first.
    pub fn with_delay(mut self, prefix: impl Into<String>, delay: Duration) -> Self {
        self.delays.push((prefix.into(), delay));
        self
    }

    /// Total `count` + `list_prefixes` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, path: &str) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((_, delay)) = self.delays.iter().find(|(p, _)| path.starts_with(p.as_str())) {
            thread::sleep(*delay);
        }
        let mut faults = self.faults.lock();
        for fault in faults.iter_mut() {
            if !path.starts_with(fault.prefix.as_str()) {
                continue;
            }
            match fault.remaining {
                None => return Err(fault.error.clone()),
                Some(0) => {}
                Some(ref mut n) => {
                    *n -= 1;
                    return Err(fault.error.clone());
                }
            }
        }
        Ok(())
    }

    fn keys_under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a String> + 'a {
        self.keys
            .range(prefix.to_string()..)
            .take_while(move |k| k.starts_with(prefix))
    }
}

impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self, prefix: &str) -> Result<u64, StoreError> {
        self.enter(prefix)?;
        Ok(self.keys_under(prefix).count() as u64)
    }

    fn list_prefixes(&self, root: &str, delimiter: char) -> Result<Vec<String>, StoreError> {
        self.enter(root)?;
        let mut prefixes: Vec<String> = Vec::new();
        for key in self.keys_under(root) {
            let rest = &key[root.len()..];
            let Some(pos) = rest.find(delimiter) else {
                continue;
            };
            let prefix = &key[..root.len() + pos + delimiter.len_utf8()];
            if prefixes.last().map(String::as_str) != Some(prefix) {
                prefixes.push(prefix.to_string());
            }
        }
        Ok(prefixes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_path_forms() {
        assert_eq!(scope_path("v2/", "abc", None), "v2/abc/");
        assert_eq!(scope_path("v2", "abc", None), "v2/abc/");
        assert_eq!(scope_path("", "abc", None), "abc/");
        assert_eq!(
            scope_path("CompleteLivestreamRecording", "abc", Some("/compositeRecording")),
            "CompleteLivestreamRecording/abc/compositeRecording"
        );
    }

    #[test]
    fn normalize_root_forms() {
        assert_eq!(normalize_root(""), "");
        assert_eq!(normalize_root("/"), "");
        assert_eq!(normalize_root("a/b"), "a/b/");
        assert_eq!(normalize_root("a/b//"), "a/b/");
    }

    #[test]
    fn memory_count_does_not_bleed_into_sibling_ids() {
        let store = MemoryStore::new("m")
            .with_count("v2/abc/", 3)
            .with_count("v2/abcd/", 5);
        assert_eq!(store.count("v2/abc/").unwrap(), 3);
        assert_eq!(store.count("v2/abcd/").unwrap(), 5);
        assert_eq!(store.count("v2/zzz/").unwrap(), 0);
    }

    #[test]
    fn memory_lists_one_level() {
        let store = MemoryStore::new("m")
            .with_object("v2/a/x.ts")
            .with_object("v2/a/y/z.ts")
            .with_object("v2/b/x.ts")
            .with_object("v2/loose.txt")
            .with_object("v3/c/x.ts");
        let prefixes = store.list_prefixes("v2/", '/').unwrap();
        assert_eq!(prefixes, vec!["v2/a/", "v2/b/"]);
    }

    #[test]
    fn flaky_fault_recovers() {
        let store = MemoryStore::new("m")
            .with_count("p/", 2)
            .with_flaky("p/", StoreError::Transport("reset".into()), 2);
        assert!(store.count("p/").is_err());
        assert!(store.count("p/").is_err());
        assert_eq!(store.count("p/").unwrap(), 2);
        assert_eq!(store.calls(), 3);
    }
}

//! Per-entry evaluation context.
//!
//! One `Context` owns one `Entry` plus the memo of attribute values
//! computed for it. Every attribute is computed at most once per entry;
//! failed computations are memoized as missing and short-circuit
//! repeated attempts. Cacheable attributes read through to and write
//! through to the persistent cache.

use crate::cache::{stat_pair, Cache, CachedValue};
use crate::registry::{AttrId, Registry};
use crate::types::Value;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::fs::Metadata;
use std::path::{Path, PathBuf};

/// The ignore engine's verdict for an entry, attached by the walker when
/// ignore processing is active.
#[derive(Debug, Clone)]
pub struct IgnoreDecision {
    pub ignored: bool,
    /// The ignore file containing the winning rule.
    pub source: Option<PathBuf>,
}

/// One filesystem object under consideration.
#[derive(Debug)]
pub struct Entry {
    /// Path as discovered (relative to the starting point unless
    /// absolute output was requested).
    pub path: PathBuf,
    pub file_name: String,
    /// Depth below the starting point; direct children are 1.
    pub depth: usize,
    /// `lstat` result, or the followed stat under `-L`. `None` when the
    /// entry could not be stat'ed.
    pub metadata: Option<Metadata>,
    pub ignore: Option<IgnoreDecision>,
}

impl Entry {
    pub fn new(path: PathBuf, depth: usize, metadata: Option<Metadata>) -> Entry {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Entry {
            path,
            file_name,
            depth,
            metadata,
            ignore: None,
        }
    }

    /// Stats `path` and builds a standalone entry, as needed for file
    /// references.
    pub fn from_path(path: &Path) -> std::io::Result<Entry> {
        let metadata = std::fs::symlink_metadata(path)?;
        Ok(Entry::new(path.to_path_buf(), 0, Some(metadata)))
    }

    pub fn is_dir(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.is_dir())
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Ready(Value),
    Failed,
}

/// Per-entry scratchpad mediating provider calls and cache access.
pub struct Context<'a> {
    registry: &'a Registry,
    cache: Option<&'a Cache>,
    entry: Entry,
    values: HashMap<AttrId, Slot>,
    processed: HashSet<u16>,
    current_provider: Option<u16>,
}

impl<'a> Context<'a> {
    pub fn new(registry: &'a Registry, cache: Option<&'a Cache>, entry: Entry) -> Context<'a> {
        Context {
            registry,
            cache,
            entry,
            values: HashMap::new(),
            processed: HashSet::new(),
            current_provider: None,
        }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    fn stat_key(&self) -> Option<(i64, u64)> {
        self.entry.metadata.as_ref().map(stat_pair)
    }

    /// Returns the attribute's value, computing (and memoizing) it on
    /// first use. Missing and failed attributes yield `Value::Null`.
    pub fn get(&mut self, id: AttrId) -> Value {
        if let Some(slot) = self.values.get(&id) {
            return match slot {
                Slot::Ready(value) => value.clone(),
                Slot::Failed => Value::Null,
            };
        }

        let def = self.registry.def(id);
        if def.cacheable {
            if let (Some(cache), Some((mtime_ns, size))) = (self.cache, self.stat_key()) {
                let qualified = self.registry.qualified(id);
                if let Some(cached) = cache.get(&self.entry.path, &qualified, mtime_ns, size) {
                    let slot = match cached {
                        CachedValue::Ok(value) => Slot::Ready(value),
                        CachedValue::Error => Slot::Failed,
                    };
                    self.values.insert(id, slot.clone());
                    return match slot {
                        Slot::Ready(value) => value,
                        Slot::Failed => Value::Null,
                    };
                }
            }
        }

        if !self.processed.contains(&id.provider) {
            self.processed.insert(id.provider);
            let registry = self.registry;
            self.current_provider = Some(id.provider);
            registry.provider(id.provider).process(self);
            self.current_provider = None;

            // Anything the provider left unset is missing for this entry,
            // and that outcome is cacheable too.
            for attr_id in registry.provider_attr_ids(id.provider) {
                if !self.values.contains_key(&attr_id) {
                    self.values.insert(attr_id, Slot::Failed);
                    self.write_through(attr_id, CachedValue::Error);
                }
            }
        }

        match self.values.get(&id) {
            Some(Slot::Ready(value)) => value.clone(),
            _ => {
                self.values.entry(id).or_insert(Slot::Failed);
                Value::Null
            }
        }
    }

    /// Sets an attribute from inside a provider's `process` call. Names
    /// resolve within the calling provider's own declarations.
    pub fn set(&mut self, name: &str, value: Value) {
        let Some(provider_idx) = self.current_provider else {
            debug!("attribute '{name}' set outside a provider run; ignored");
            return;
        };
        let Some(id) = self.registry.attr_in_provider(provider_idx, name) else {
            debug!(
                "provider '{}' set undeclared attribute '{name}'; ignored",
                self.registry.provider(provider_idx).name()
            );
            return;
        };
        self.write_through(id, CachedValue::Ok(value.clone()));
        self.values.insert(id, Slot::Ready(value));
    }

    fn write_through(&self, id: AttrId, value: CachedValue) {
        if !self.registry.def(id).cacheable {
            return;
        }
        if let (Some(cache), Some((mtime_ns, size))) = (self.cache, self.stat_key()) {
            cache.put(
                &self.entry.path,
                &self.registry.qualified(id),
                mtime_ns,
                size,
                value,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::registry::Registry;
    use std::fs;
    use tempfile::TempDir;

    fn file_entry(dir: &TempDir, name: &str, content: &str) -> Entry {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        Entry::new(path.clone(), 1, Some(fs::symlink_metadata(&path).unwrap()))
    }

    #[test]
    fn test_memoized_file_attributes() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let entry = file_entry(&dir, "foo", "data");
        let mut ctx = Context::new(&registry, None, entry);

        let size_id = registry.resolve("size").unwrap();
        assert_eq!(ctx.get(size_id), Value::Size(4));
        // second read comes from the memo
        assert_eq!(ctx.get(size_id), Value::Size(4));
        let name_id = registry.resolve("name").unwrap();
        assert_eq!(ctx.get(name_id), Value::Text("foo".into()));
    }

    #[test]
    fn test_missing_attribute_is_null() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        // directories have no link target
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let entry = Entry::new(sub.clone(), 1, Some(fs::symlink_metadata(&sub).unwrap()));
        let mut ctx = Context::new(&registry, None, entry);

        let link_id = registry.resolve("link").unwrap();
        assert_eq!(ctx.get(link_id), Value::Null);
        assert_eq!(ctx.get(link_id), Value::Null);
    }

    #[test]
    fn test_cache_write_through_and_read_back() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let cache = Cache::open(&dir.path().join("ff.db"));
        let lines_id = registry.resolve("text.lines").unwrap();

        let entry = file_entry(&dir, "foo.txt", "a\nb\nc\n");
        let path = entry.path.clone();
        let (mtime_ns, size) = stat_pair(entry.metadata.as_ref().unwrap());

        let mut ctx = Context::new(&registry, Some(&cache), entry);
        assert_eq!(ctx.get(lines_id), Value::Number(3));

        // the computed value was written through
        assert_eq!(
            cache.get(&path, "text.lines", mtime_ns, size),
            Some(CachedValue::Ok(Value::Number(3)))
        );

        // a fresh context over the same entry is served from the cache
        let entry = Entry::new(
            path.clone(),
            1,
            Some(fs::symlink_metadata(&path).unwrap()),
        );
        let mut ctx = Context::new(&registry, Some(&cache), entry);
        assert_eq!(ctx.get(lines_id), Value::Number(3));
    }

    #[test]
    fn test_cached_error_marker_short_circuits() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let cache = Cache::open(&dir.path().join("ff.db"));
        let lines_id = registry.resolve("text.lines").unwrap();

        let entry = file_entry(&dir, "foo.txt", "x\n");
        let path = entry.path.clone();
        let (mtime_ns, size) = stat_pair(entry.metadata.as_ref().unwrap());
        cache.put(&path, "text.lines", mtime_ns, size, CachedValue::Error);

        let mut ctx = Context::new(&registry, Some(&cache), entry);
        assert_eq!(ctx.get(lines_id), Value::Null);
    }

    #[test]
    fn test_entry_from_path_missing_file() {
        assert!(Entry::from_path(Path::new("/no/such/file")).is_err());
    }
}

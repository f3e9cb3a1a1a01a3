//! Persistent cross-run attribute cache.
//!
//! A single durable file holds a map from `(path, attribute)` to the
//! serialized value plus the `(mtime, size)` stat pair it was computed
//! under. A hit is honored only while both stat fields still match; a
//! mismatch evicts the record. In-process access is serialized by a
//! mutex and the file is replaced atomically on flush, so concurrent
//! processes degrade to last-writer-wins rather than corruption.

use crate::types::Value;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A cached computation outcome. Failed computations are cached too so
/// repeated runs do not retry expensive work that cannot succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CachedValue {
    Ok(Value),
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
    mtime_ns: i64,
    size: u64,
    value: CachedValue,
}

fn key_for(path: &Path, attr: &str) -> String {
    format!("{}\u{0}{}", path.to_string_lossy(), attr)
}

#[derive(Default)]
struct Store {
    map: HashMap<String, Record>,
    dirty: bool,
}

/// Handle to the on-disk cache file.
pub struct Cache {
    file: PathBuf,
    inner: Mutex<Store>,
}

impl Cache {
    /// Opens (or creates) the cache at `file`. An unreadable or corrupt
    /// file starts an empty store rather than failing the run.
    pub fn open(file: &Path) -> Cache {
        let map = match fs::read(file) {
            Ok(bytes) => match bincode::deserialize(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    debug!("cache file {} is corrupt ({e}), starting empty", file.display());
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                debug!("cannot read cache file {} ({e}), starting empty", file.display());
                HashMap::new()
            }
        };
        debug!("cache opened with {} records", map.len());
        Cache {
            file: file.to_path_buf(),
            inner: Mutex::new(Store { map, dirty: false }),
        }
    }

    /// Looks up a record. A record whose stat pair no longer matches the
    /// live `(mtime_ns, size)` is evicted and reported as a miss.
    pub fn get(&self, path: &Path, attr: &str, mtime_ns: i64, size: u64) -> Option<CachedValue> {
        let key = key_for(path, attr);
        let mut store = self.inner.lock().expect("cache mutex poisoned");
        match store.map.get(&key) {
            Some(record) if record.mtime_ns == mtime_ns && record.size == size => {
                Some(record.value.clone())
            }
            Some(_) => {
                store.map.remove(&key);
                store.dirty = true;
                None
            }
            None => None,
        }
    }

    pub fn put(&self, path: &Path, attr: &str, mtime_ns: i64, size: u64, value: CachedValue) {
        let key = key_for(path, attr);
        let mut store = self.inner.lock().expect("cache mutex poisoned");
        store.map.insert(
            key,
            Record {
                mtime_ns,
                size,
                value,
            },
        );
        store.dirty = true;
    }

    pub fn delete(&self, path: &Path, attr: &str) {
        let key = key_for(path, attr);
        let mut store = self.inner.lock().expect("cache mutex poisoned");
        if store.map.remove(&key).is_some() {
            store.dirty = true;
        }
    }

    /// Removes records whose path no longer exists or whose live stat
    /// differs from the recorded pair. Returns the number removed.
    pub fn clean(&self) -> usize {
        let mut store = self.inner.lock().expect("cache mutex poisoned");
        let before = store.map.len();
        store.map.retain(|key, record| {
            let path = match key.split('\u{0}').next() {
                Some(p) => Path::new(p),
                None => return false,
            };
            match fs::symlink_metadata(path) {
                Ok(meta) => stat_pair(&meta) == (record.mtime_ns, record.size),
                Err(_) => false,
            }
        });
        let removed = before - store.map.len();
        if removed > 0 {
            store.dirty = true;
        }
        debug!("cache clean removed {removed} records");
        removed
    }

    /// Rewrites the backing file, dropping any evicted records.
    pub fn vacuum(&self) -> io::Result<()> {
        let mut store = self.inner.lock().expect("cache mutex poisoned");
        store.dirty = true;
        Self::write_file(&self.file, &mut store)
    }

    /// Persists the store if it changed. Writes to a temp file in the
    /// same directory and renames over the target.
    pub fn flush(&self) -> io::Result<()> {
        let mut store = self.inner.lock().expect("cache mutex poisoned");
        if !store.dirty {
            return Ok(());
        }
        Self::write_file(&self.file, &mut store)
    }

    fn write_file(file: &Path, store: &mut Store) -> io::Result<()> {
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = bincode::serialize(&store.map)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = file.with_extension(format!("tmp.{}", std::process::id()));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, file)?;
        store.dirty = false;
        debug!("cache flushed {} records to {}", store.map.len(), file.display());
        Ok(())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").map.len()
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            debug!("cache flush failed: {e}");
        }
    }
}

/// `(mtime in nanoseconds, size)` from live metadata, the pair every
/// cache decision compares against.
pub fn stat_pair(meta: &fs::Metadata) -> (i64, u64) {
    use std::os::unix::fs::MetadataExt;
    let mtime_ns = meta.mtime().wrapping_mul(1_000_000_000).wrapping_add(meta.mtime_nsec());
    (mtime_ns, meta.size())
}

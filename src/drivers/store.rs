#[cfg(test)]
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use crate::drivers::LinkError;
/// Small key-value blob storage. The calibration profile is its only tenant.
pub trait KeyValueStore {
    /// `Ok(None)` when the key has never been written.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, LinkError>;
    /// Replaces the value as a whole; readers never observe a half-written blob.
    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), LinkError>;
}
/// One file per key inside a directory.
pub struct FileStore {
    root: PathBuf,
}
impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}
impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, LinkError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LinkError::StorageRead(format!("{key}: {e}"))),
        }
    }
    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), LinkError> {
        let target = self.path_for(key);
        let tmp = self.path_for(&format!("{key}.tmp"));
        let write = || -> std::io::Result<()> {
            if !self.root.as_os_str().is_empty() {
                fs::create_dir_all(&self.root)?;
            }
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            // rename replaces the old file in one step
            fs::rename(&tmp, &target)
        };
        write().map_err(|e| {
            let _ = fs::remove_file(&tmp);
            LinkError::StorageWrite(format!("{}: {e}", target.display()))
        })
    }
}
/// In-memory store for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
    pub fail_writes: bool,
}
#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_entry(key: &str, bytes: &[u8]) -> Self {
        let mut store = Self::new();
        store.entries.insert(key.to_string(), bytes.to_vec());
        store
    }
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }
}
#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, LinkError> {
        Ok(self.entries.get(key).cloned())
    }
    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), LinkError> {
        if self.fail_writes {
            return Err(LinkError::StorageWrite(format!("{key}: store is read-only")));
        }
        self.entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("touchlink-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }
    #[test]
    fn file_store_missing_key_is_none() {
        let store = FileStore::new(scratch_dir("missing"));
        assert!(store.load("calibration.json").unwrap().is_none());
    }
    #[test]
    fn file_store_overwrites_whole_value() {
        let dir = scratch_dir("overwrite");
        let mut store = FileStore::new(&dir);
        store.save("calibration.json", b"first value").unwrap();
        store.save("calibration.json", b"2nd").unwrap();
        assert_eq!(store.load("calibration.json").unwrap().unwrap(), b"2nd".to_vec());
        assert!(!dir.join("calibration.json.tmp").exists());
        let _ = fs::remove_dir_all(&dir);
    }
    #[test]
    fn memory_store_can_refuse_writes() {
        let mut store = MemoryStore::with_entry("k", b"old");
        store.fail_writes = true;
        assert!(matches!(store.save("k", b"new"), Err(LinkError::StorageWrite(_))));
        assert_eq!(store.get("k"), Some(&b"old"[..]));
    }
}

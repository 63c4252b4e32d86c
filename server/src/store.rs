//! # File-Backed Config Store
//!
//! The working-directory implementation of [`ConfigStore`]: one file per
//! blob, whole-file rewrite on save. Holds the watchdog config, the
//! credential map, and the optional RPC dumps.

use std::io::ErrorKind;
use std::path::PathBuf;

use chainwatch::transport::ConfigStore;
use chainwatch::{Error, Result};

/// Stores blobs as files under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl ConfigStore for FileStore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.root.join(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::Store(format!("cannot read {name}: {err}"))),
        }
    }

    fn save(&self, name: &str, bytes: &[u8]) -> Result<()> {
        std::fs::write(self.root.join(name), bytes)
            .map_err(|err| Error::Store(format!("cannot write {name}: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().to_path_buf());

        assert!(store.load("watchdog.config.json").unwrap().is_none());

        store.save("watchdog.config.json", b"{\"a\":1}").unwrap();
        assert_eq!(
            store.load("watchdog.config.json").unwrap().unwrap(),
            b"{\"a\":1}".to_vec()
        );

        // Saves replace, not append.
        store.save("watchdog.config.json", b"{}").unwrap();
        assert_eq!(
            store.load("watchdog.config.json").unwrap().unwrap(),
            b"{}".to_vec()
        );
    }
}

//! JSON save file backing the world's durable store.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use geocoin_world::Store;
use tracing::warn;

/// [`Store`] that keeps every record in one JSON object on disk.
///
/// Each write rewrites the whole file through a temporary sibling that is
/// renamed into place, so an interrupted write leaves the previous save intact.
#[derive(Debug)]
pub(crate) struct FileStore {
    path: PathBuf,
    records: BTreeMap<String, String>,
}

impl FileStore {
    /// Opens the save file at `path`. A missing file is an empty store; an
    /// unreadable one is moved aside to `<name>.corrupt` and the store opens empty.
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let records = match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(records) => records,
                Err(error) => {
                    let aside = corrupt_path_for(path);
                    fs::rename(path, &aside).with_context(|| {
                        format!(
                            "save file {} is unreadable and could not be moved to {}",
                            path.display(),
                            aside.display()
                        )
                    })?;
                    warn!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        error = %error,
                        "save_file_unreadable"
                    );
                    BTreeMap::new()
                }
            },
            Err(error) if error.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to read save file {}", path.display()))
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    /// Replaces every record in the save file at `path`.
    pub(crate) fn overwrite(path: &Path, records: BTreeMap<String, String>) -> Result<Self> {
        let store = Self {
            path: path.to_path_buf(),
            records,
        };
        store
            .write()
            .with_context(|| format!("failed to write save file {}", path.display()))?;
        Ok(store)
    }

    /// Records currently held by the store.
    pub(crate) fn records(&self) -> &BTreeMap<String, String> {
        &self.records
    }

    fn write(&self) -> io::Result<()> {
        let text = serde_json::to_string_pretty(&self.records)
            .expect("string map serialization never fails");
        write_text_atomic(&self.path, &text)
    }

    fn persist(&self) {
        if let Err(error) = self.write() {
            warn!(path = %self.path.display(), error = %error, "save_file_write_failed");
        }
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.records.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        if self.records.get(key) == Some(&value) {
            return;
        }
        let _ = self.records.insert(key.to_owned(), value);
        self.persist();
    }

    fn clear(&mut self) {
        self.records.clear();
        self.persist();
    }
}

fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let staging = staging_path_for(path);
    fs::write(&staging, text)?;
    if let Err(error) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(error);
    }
    Ok(())
}

fn staging_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("geocoin-save.json");
    path.with_file_name(format!("{file_name}.tmp"))
}

fn corrupt_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("geocoin-save.json");
    path.with_file_name(format!("{file_name}.corrupt"))
}

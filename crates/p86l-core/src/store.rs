//! Namespaced on-disk key/value store and the records kept in it.
//!
//! Every namespace is a directory under the store root and every key a file
//! inside it. Writes go through a uniquely named temp file followed by a
//! rename, so a concurrent reader sees either the previous record or the new
//! one, never a partial write.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::release::{ReleaseDescriptor, ReleaseNotes};

pub const GAME_NAMESPACE: &str = "game";
pub const GAME_KEY: &str = "game.json";
pub const CHANGELOG_NAMESPACE: &str = "changelog";
pub const CHANGELOG_KEY: &str = "changelog.json";
pub const INSTALL_NAMESPACE: &str = "install";
pub const INSTALL_KEY: &str = "installed.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cached record {namespace}/{key} is corrupt: {source}")]
    Corrupt {
        namespace: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize record {namespace}/{key}: {source}")]
    Serialize {
        namespace: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid store name '{name}'")]
    InvalidName { name: String },
}

impl StoreError {
    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of a key on disk.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidName`] unless both names are a single
    /// plain path component.
    pub fn path_of(&self, namespace: &str, key: &str) -> Result<PathBuf, StoreError> {
        Ok(self.namespace_dir(namespace)?.join(validate_name(key)?))
    }

    #[must_use]
    pub fn exists(&self, namespace: &str, key: &str) -> bool {
        self.path_of(namespace, key)
            .is_ok_and(|path| path.is_file())
    }

    /// Read a key. A missing key is `Ok(None)`, never an error.
    ///
    /// # Errors
    /// Returns an error for invalid names or when the file exists but cannot
    /// be read.
    pub fn load(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_of(namespace, key)?;
        match std::fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(StoreError::io("failed to read", &path, error)),
        }
    }

    /// Atomically replace the value stored under a key.
    ///
    /// # Errors
    /// Returns an error if the namespace directory or the record cannot be
    /// written.
    pub fn save(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let dir = self.namespace_dir(namespace)?;
        std::fs::create_dir_all(&dir)
            .map_err(|error| StoreError::io("failed to create namespace", &dir, error))?;
        let path = dir.join(validate_name(key)?);
        write_atomic(&path, data).map_err(|error| StoreError::io("failed to write", &path, error))
    }

    /// Remove a single key; a missing key is not an error.
    ///
    /// # Errors
    /// Returns an error if an existing file cannot be removed.
    pub fn delete(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        let path = self.path_of(namespace, key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(StoreError::io("failed to delete", &path, error)),
        }
    }

    /// Remove a namespace and everything in it; a missing namespace is not
    /// an error.
    ///
    /// # Errors
    /// Returns an error if an existing namespace cannot be removed.
    pub fn delete_namespace(&self, namespace: &str) -> Result<(), StoreError> {
        let dir = self.namespace_dir(namespace)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!("Deleted store namespace {namespace}");
                Ok(())
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(StoreError::io("failed to delete namespace", &dir, error)),
        }
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(validate_name(namespace)?))
    }

    fn load_record<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let Some(data) = self.load(namespace, key)? else {
            return Ok(None);
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                namespace: namespace.to_string(),
                key: key.to_string(),
                source,
            })
    }

    fn save_record<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        record: &T,
    ) -> Result<(), StoreError> {
        let data = serde_json::to_vec(record).map_err(|source| StoreError::Serialize {
            namespace: namespace.to_string(),
            key: key.to_string(),
            source,
        })?;
        self.save(namespace, key, &data)
    }
}

fn validate_name(name: &str) -> Result<&str, StoreError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(name),
        _ => Err(StoreError::InvalidName {
            name: name.to_string(),
        }),
    }
}

/// TTL-bounded release metadata kept in the [`BlobStore`].
///
/// The install marker may live in a separate store so that wiping the
/// release cache directory never makes an installed game look missing.
#[derive(Debug, Clone)]
pub struct ReleaseCache {
    store: BlobStore,
    markers: BlobStore,
}

impl ReleaseCache {
    #[must_use]
    pub fn new(store: BlobStore) -> Self {
        Self {
            markers: store.clone(),
            store,
        }
    }

    /// Keep the install marker in `markers` instead of the release store.
    #[must_use]
    pub fn with_marker_store(mut self, markers: BlobStore) -> Self {
        self.markers = markers;
        self
    }

    #[must_use]
    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    /// Load a descriptor. `Ok(None)` means "never fetched".
    ///
    /// # Errors
    /// Returns [`StoreError::Corrupt`] when the stored record cannot be
    /// decoded, or an I/O error when it cannot be read.
    pub fn load(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<ReleaseDescriptor>, StoreError> {
        self.store.load_record(namespace, key)
    }

    /// # Errors
    /// Returns an error if the descriptor cannot be serialized or written.
    pub fn save(
        &self,
        namespace: &str,
        key: &str,
        descriptor: &ReleaseDescriptor,
    ) -> Result<(), StoreError> {
        self.store.save_record(namespace, key, descriptor)
    }

    #[must_use]
    pub fn is_fresh(descriptor: &ReleaseDescriptor) -> bool {
        descriptor.is_fresh()
    }

    /// # Errors
    /// Returns an error if an existing namespace cannot be removed.
    pub fn delete(&self, namespace: &str) -> Result<(), StoreError> {
        self.store.delete_namespace(namespace)
    }

    /// # Errors
    /// See [`ReleaseCache::load`].
    pub fn load_game(&self) -> Result<Option<ReleaseDescriptor>, StoreError> {
        self.load(GAME_NAMESPACE, GAME_KEY)
    }

    /// # Errors
    /// See [`ReleaseCache::save`].
    pub fn save_game(&self, descriptor: &ReleaseDescriptor) -> Result<(), StoreError> {
        self.save(GAME_NAMESPACE, GAME_KEY, descriptor)
    }

    /// # Errors
    /// See [`ReleaseCache::load`].
    pub fn load_notes(&self) -> Result<Option<ReleaseNotes>, StoreError> {
        self.store.load_record(CHANGELOG_NAMESPACE, CHANGELOG_KEY)
    }

    /// # Errors
    /// See [`ReleaseCache::save`].
    pub fn save_notes(&self, notes: &ReleaseNotes) -> Result<(), StoreError> {
        self.store
            .save_record(CHANGELOG_NAMESPACE, CHANGELOG_KEY, notes)
    }

    /// Drop every cached release record, leaving the install marker alone.
    ///
    /// # Errors
    /// Returns an error if a namespace cannot be removed.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.delete(GAME_NAMESPACE)?;
        self.delete(CHANGELOG_NAMESPACE)
    }

    /// # Errors
    /// See [`ReleaseCache::load`].
    pub fn load_installed(&self) -> Result<Option<InstalledRecord>, StoreError> {
        self.markers.load_record(INSTALL_NAMESPACE, INSTALL_KEY)
    }

    /// # Errors
    /// See [`ReleaseCache::save`].
    pub fn save_installed(&self, record: &InstalledRecord) -> Result<(), StoreError> {
        self.markers.save_record(INSTALL_NAMESPACE, INSTALL_KEY, record)
    }

    /// # Errors
    /// Returns an error if the marker exists but cannot be removed.
    pub fn remove_installed(&self) -> Result<(), StoreError> {
        self.markers.delete(INSTALL_NAMESPACE, INSTALL_KEY)
    }
}

/// Marker written once a build has been fully extracted into the install root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRecord {
    pub tag: String,
    #[serde(default)]
    pub asset_name: String,
    pub installed_at: DateTime<Utc>,
}

fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "store path has no parent")
    })?;

    let file_name = path
        .file_name()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("record");
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    let pid = std::process::id();

    let mut tmp_path = None;
    for attempt in 0..16_u8 {
        let candidate = parent.join(format!(".{file_name}.{pid}.{timestamp}.{attempt}.tmp"));
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(mut file) => {
                let written = file.write_all(data).and_then(|()| file.sync_all());
                if let Err(error) = written {
                    drop(file);
                    let _ = std::fs::remove_file(&candidate);
                    return Err(error);
                }
                tmp_path = Some(candidate);
                break;
            }
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(error) => return Err(error),
        }
    }

    let Some(tmp_path) = tmp_path else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "failed to create unique temp file",
        ));
    };

    if let Err(error) = replace_file(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(error);
    }

    Ok(())
}

fn replace_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{
            MOVEFILE_REPLACE_EXISTING, MOVEFILE_WRITE_THROUGH, MoveFileExW,
        };

        let src_utf16: Vec<u16> = src
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let dst_utf16: Vec<u16> = dst
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: both paths are NUL-terminated UTF-16 buffers that live for
        // the duration of the FFI call.
        let moved = unsafe {
            MoveFileExW(
                src_utf16.as_ptr(),
                dst_utf16.as_ptr(),
                MOVEFILE_REPLACE_EXISTING | MOVEFILE_WRITE_THROUGH,
            )
        };
        if moved != 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::fs::rename(src, dst)
    }
}

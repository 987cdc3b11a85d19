use std::path::{Path, PathBuf};
use thiserror::Error;

/// Company and application folder appended to every platform base directory.
pub const APP_DIR_NAME: &str = "Project-86-Community/Project-86-Launcher";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine home directory")]
    HomeDirUnavailable,
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine cache directory")]
    CacheDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
}

/// Source of every directory the launcher reads from or writes to.
///
/// The update pipeline never computes a location on its own; it asks the
/// provider it was built with, so tests and portable installs can point the
/// whole launcher at a scratch directory.
pub trait PathProvider: Send + Sync {
    fn config_dir(&self) -> &Path;
    fn cache_dir(&self) -> &Path;
    fn data_dir(&self) -> &Path;

    /// Root of the namespaced release cache.
    fn store_dir(&self) -> PathBuf {
        self.cache_dir().join("store")
    }

    /// Root of the store holding the install marker. Kept next to the
    /// install so clearing the OS cache cannot orphan the game.
    fn marker_dir(&self) -> PathBuf {
        self.data_dir().join("state")
    }

    /// Directory the game archive is extracted into.
    fn install_dir(&self) -> PathBuf {
        self.data_dir().join("run")
    }

    /// Scratch space for in-flight downloads and extraction staging.
    fn download_dir(&self) -> PathBuf {
        self.cache_dir().join("downloads")
    }

    fn settings_file(&self) -> PathBuf {
        self.config_dir().join("settings.json")
    }

    fn log_file(&self) -> PathBuf {
        self.data_dir().join("debug.log")
    }

    fn install_lock_file(&self) -> PathBuf {
        self.data_dir().join("install.lock")
    }

    /// Ensure the config, cache and data directories exist on disk.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::create_dir_all(self.cache_dir())?;
        std::fs::create_dir_all(self.data_dir())?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Build application paths for the current platform.
    ///
    /// # Errors
    /// Returns an error when a required base directory (for example the user
    /// home/config/cache/data directory) cannot be determined.
    pub fn new() -> Result<Self, AppPathsError> {
        #[cfg(target_os = "macos")]
        {
            let home = dirs::home_dir().ok_or(AppPathsError::HomeDirUnavailable)?;
            Ok(Self {
                config_dir: home.join("Library/Application Support").join(APP_DIR_NAME),
                cache_dir: home.join("Library/Caches").join(APP_DIR_NAME),
                data_dir: home.join("Library/Application Support").join(APP_DIR_NAME),
            })
        }

        #[cfg(not(target_os = "macos"))]
        {
            Ok(Self {
                config_dir: dirs::config_dir()
                    .ok_or(AppPathsError::ConfigDirUnavailable)?
                    .join(APP_DIR_NAME),
                cache_dir: dirs::cache_dir()
                    .ok_or(AppPathsError::CacheDirUnavailable)?
                    .join(APP_DIR_NAME),
                data_dir: dirs::data_dir()
                    .ok_or(AppPathsError::DataDirUnavailable)?
                    .join(APP_DIR_NAME),
            })
        }
    }

    /// Lay out every directory under a single root.
    #[must_use]
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
            data_dir: root.join("data"),
        }
    }
}

impl PathProvider for AppPaths {
    fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

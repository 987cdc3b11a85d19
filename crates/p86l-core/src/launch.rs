use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use log::{debug, info};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("'{name}' not found under {}", .root.display())]
    FileNotFound { name: String, root: PathBuf },
    #[error("failed to read directory {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to launch {}: {source}", .path.display())]
    LaunchFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Depth-first search for a file called `name` under `root`.
///
/// Directory entries are visited in lexical order, so the first match is
/// deterministic. Directories carrying the name are not matches.
///
/// # Errors
/// Returns [`LaunchError::FileNotFound`] when `root` is missing or nothing
/// matches, and [`LaunchError::Io`] when a directory cannot be listed.
pub fn find_executable(root: &Path, name: &str) -> Result<PathBuf, LaunchError> {
    let not_found = || LaunchError::FileNotFound {
        name: name.to_string(),
        root: root.to_path_buf(),
    };

    if !root.is_dir() {
        return Err(not_found());
    }

    let found = search(root, name)?.ok_or_else(not_found)?;
    debug!("Found {name} at {}", found.display());
    Ok(found)
}

fn search(dir: &Path, name: &str) -> Result<Option<PathBuf>, LaunchError> {
    let io = |source| LaunchError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = std::fs::read_dir(dir)
        .map_err(io)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(io)?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().map_err(io)?;

        if file_type.is_dir() {
            if let Some(found) = search(&path, name)? {
                return Ok(Some(found));
            }
        } else if entry.file_name() == name {
            return Ok(Some(path));
        }
    }

    Ok(None)
}

/// Start the executable with its own directory as working directory and
/// wait for it to exit.
///
/// The exit status is returned for logging only; a non-zero exit is not an
/// error because the game owns its own lifecycle.
///
/// # Errors
/// Returns [`LaunchError::LaunchFailed`] when the process cannot be started.
pub async fn run_executable(path: &Path) -> Result<ExitStatus, LaunchError> {
    let launch_failed = |source| LaunchError::LaunchFailed {
        path: path.to_path_buf(),
        source,
    };

    let mut command = Command::new(path);
    if let Some(parent) = path.parent() {
        command.current_dir(parent);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    info!("Launching {}", path.display());
    let mut child = command.spawn().map_err(launch_failed)?;
    let status = child.wait().await.map_err(launch_failed)?;
    info!("{} exited with {status}", path.display());
    Ok(status)
}

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("archive entry '{entry}' would escape the destination directory")]
    UnsafeArchiveEntry { entry: String },
}

impl ExtractError {
    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }
}

struct PlannedEntry {
    index: usize,
    relative: PathBuf,
    is_dir: bool,
}

/// Expand every entry of the zip at `archive` under `dest`.
///
/// All entry names are checked before anything is written: an entry that is
/// absolute, carries a drive prefix, or climbs above `dest` through `..`
/// aborts the whole extraction with [`ExtractError::UnsafeArchiveEntry`].
/// Existing files are overwritten, so running it twice yields the same tree.
///
/// # Errors
/// Returns an error when the archive cannot be read, contains an unsafe
/// entry, or a file cannot be written.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), ExtractError> {
    info!("Extracting {} to {}", archive.display(), dest.display());

    let file = File::open(archive)
        .map_err(|error| ExtractError::io("failed to open zip file", archive, error))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|error| ExtractError::zip("failed to read zip archive", error))?;

    let plan = plan_entries(&mut zip)?;

    std::fs::create_dir_all(dest).map_err(|error| {
        ExtractError::io("failed to create extraction directory", dest, error)
    })?;

    for planned in &plan {
        let out_path = dest.join(&planned.relative);

        if planned.is_dir {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                ExtractError::io("failed to create extraction directory", &out_path, error)
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                ExtractError::io("failed to create extraction parent directory", parent, error)
            })?;
        }

        let mut entry = zip
            .by_index(planned.index)
            .map_err(|error| ExtractError::zip("failed to read zip entry", error))?;
        let mut outfile = File::create(&out_path).map_err(|error| {
            ExtractError::io("failed to create extracted file", &out_path, error)
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|error| {
            ExtractError::io("failed to extract archive entry", &out_path, error)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = std::fs::set_permissions(
                    &out_path,
                    std::fs::Permissions::from_mode(file_mode(mode)),
                );
            }
        }
    }

    debug!(
        "Extraction complete: {} entries to {}",
        plan.len(),
        dest.display()
    );
    Ok(())
}

fn plan_entries(zip: &mut zip::ZipArchive<File>) -> Result<Vec<PlannedEntry>, ExtractError> {
    let mut plan = Vec::with_capacity(zip.len());

    for index in 0..zip.len() {
        let entry = zip
            .by_index_raw(index)
            .map_err(|error| ExtractError::zip("failed to read zip entry", error))?;
        let name = entry.name().to_string();
        let is_dir = entry.is_dir();

        let Some(relative) = contained_path(&name) else {
            return Err(ExtractError::UnsafeArchiveEntry { entry: name });
        };

        if relative.as_os_str().is_empty() {
            if is_dir {
                continue;
            }
            return Err(ExtractError::UnsafeArchiveEntry { entry: name });
        }

        plan.push(PlannedEntry {
            index,
            relative,
            is_dir,
        });
    }

    Ok(plan)
}

/// Lexically resolve an entry name relative to the extraction root.
///
/// Returns `None` when the name is absolute or its `..` segments climb
/// above the root. Backslashes count as separators.
fn contained_path(name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    if has_drive_prefix(&normalized) {
        return None;
    }

    let mut resolved = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Permission bits applied to an extracted file. Setuid, setgid and sticky
/// bits from the archive are dropped.
#[cfg_attr(not(unix), allow(dead_code))]
fn file_mode(archived: u32) -> u32 {
    archived & 0o777
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::path::{Path, PathBuf};

    use super::{ExtractError, contained_path, extract_archive, file_mode};

    fn write_zip(path: &Path, entries: &[(&str, Option<&[u8]>)]) {
        let zip_file = std::fs::File::create(path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(zip_file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
        for (name, content) in entries {
            match content {
                Some(content) => {
                    writer
                        .start_file(*name, options)
                        .expect("file entry should be started");
                    writer
                        .write_all(content)
                        .expect("file entry should be written");
                }
                None => writer
                    .add_directory(*name, options)
                    .expect("directory entry should be written"),
            }
        }
        writer.finish().expect("zip archive should be finalized");
    }

    #[test]
    fn extract_expands_files_and_directories() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("game.zip");
        let extract_dir = temp.path().join("run");

        write_zip(
            &zip_path,
            &[
                ("Game/", None),
                ("Game/Project-86.exe", Some(b"binary-content")),
                ("Game/Data/level0.dat", Some(b"level")),
            ],
        );

        extract_archive(&zip_path, &extract_dir).expect("zip should extract");

        let exe = std::fs::read(extract_dir.join("Game/Project-86.exe"))
            .expect("extracted file should exist and be readable");
        assert_eq!(exe, b"binary-content");
        assert!(extract_dir.join("Game/Data/level0.dat").is_file());
    }

    #[test]
    fn traversal_entry_aborts_before_writing_anything() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("unsafe.zip");
        let extract_dir = temp.path().join("nested").join("run");

        write_zip(
            &zip_path,
            &[
                ("readme.txt", Some(b"harmless")),
                ("../../evil.txt", Some(b"should not be extracted")),
            ],
        );

        let result = extract_archive(&zip_path, &extract_dir);
        assert!(matches!(
            result,
            Err(ExtractError::UnsafeArchiveEntry { ref entry }) if entry == "../../evil.txt"
        ));
        assert!(!temp.path().join("evil.txt").exists());
        assert!(
            !extract_dir.exists(),
            "no entry should be written when any entry is unsafe"
        );
    }

    #[test]
    fn extraction_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("game.zip");
        let extract_dir = temp.path().join("run");

        write_zip(
            &zip_path,
            &[("a/b.txt", Some(b"first")), ("c.txt", Some(b"second"))],
        );

        extract_archive(&zip_path, &extract_dir).expect("first extraction should succeed");
        extract_archive(&zip_path, &extract_dir).expect("second extraction should succeed");

        assert_eq!(
            std::fs::read(extract_dir.join("a/b.txt")).expect("a/b.txt should exist"),
            b"first"
        );
        assert_eq!(
            std::fs::read(extract_dir.join("c.txt")).expect("c.txt should exist"),
            b"second"
        );
    }

    #[test]
    fn special_permission_bits_are_dropped() {
        assert_eq!(file_mode(0o104_755), 0o755);
        assert_eq!(file_mode(0o6755), 0o755);
        assert_eq!(file_mode(0o1777), 0o777);
        assert_eq!(file_mode(0o644), 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn extracted_files_keep_plain_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("game.zip");
        let extract_dir = temp.path().join("run");
        write_zip(&zip_path, &[("Project-86", Some(b"binary"))]);

        extract_archive(&zip_path, &extract_dir).expect("zip should extract");

        let mode = std::fs::metadata(extract_dir.join("Project-86"))
            .expect("extracted file should exist")
            .permissions()
            .mode();
        assert_eq!(mode & 0o7777, 0o644);
    }

    #[test]
    fn not_a_zip_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let bogus = temp.path().join("bogus.zip");
        std::fs::write(&bogus, b"definitely not a zip").expect("bogus file should be written");

        let result = extract_archive(&bogus, &temp.path().join("run"));
        assert!(matches!(result, Err(ExtractError::Zip { .. })));
    }

    #[test]
    fn contained_path_resolves_lexically() {
        assert_eq!(contained_path("a/./b"), Some(PathBuf::from("a/b")));
        assert_eq!(contained_path("a/../b"), Some(PathBuf::from("b")));
        assert_eq!(contained_path("a\\b.txt"), Some(PathBuf::from("a/b.txt")));
        assert_eq!(contained_path("./"), Some(PathBuf::new()));

        assert_eq!(contained_path("../x"), None);
        assert_eq!(contained_path("a/../../x"), None);
        assert_eq!(contained_path("/etc/passwd"), None);
        assert_eq!(contained_path("C:/Windows/x.dll"), None);
        assert_eq!(contained_path("..\\..\\x"), None);
    }
}

//! Packages a saved scene document into a distributable usdz archive.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Reserved prefix for per-session work directories. The cleanup step only
/// ever deletes directories carrying it.
pub const TEMP_DIR_PREFIX: &str = "temp-";

/// Extension of produced archives.
pub const ARCHIVE_EXTENSION: &str = "usdz";

/// The process working directory is global state; archive creation changes
/// it to resolve referenced images by relative path, so all packaging is
/// serialized through this gate.
static CWD_GATE: Mutex<()> = Mutex::new(());

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("scene document has no file name: {0}")]
    BadDocumentPath(PathBuf),
    #[error("usdz archive creation failed: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Restores the prior working directory on drop. A leaked working-directory
/// change corrupts the host environment for unrelated operations, so the
/// restore must survive every exit path.
struct WorkingDirGuard {
    prior: PathBuf,
}

impl WorkingDirGuard {
    fn change_to(dir: &Path) -> std::io::Result<Self> {
        let prior = env::current_dir()?;
        env::set_current_dir(dir)?;
        Ok(Self { prior })
    }
}

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        if let Err(err) = env::set_current_dir(&self.prior) {
            tracing::warn!(
                prior = %self.prior.display(),
                error = %err,
                "failed to restore working directory"
            );
        }
    }
}

/// Turns saved scene documents into usdz archives in the output directory.
#[derive(Debug, Clone)]
pub struct Packager {
    output_dir: PathBuf,
    delete_intermediates: bool,
}

impl Packager {
    pub fn new(output_dir: PathBuf, delete_intermediates: bool) -> Self {
        Self {
            output_dir,
            delete_intermediates,
        }
    }

    /// Archive the document at `document_path` as `<stem>.usdz` in the
    /// output directory. On failure nothing is deleted; on success the
    /// intermediate directory is removed when configured, and only when its
    /// name carries the reserved temp prefix.
    pub fn package(&self, document_path: &Path) -> Result<PathBuf, PackageError> {
        let document_path = document_path.canonicalize()?;
        let document_name = document_path
            .file_name()
            .ok_or_else(|| PackageError::BadDocumentPath(document_path.clone()))?
            .to_os_string();
        let stem = document_path
            .file_stem()
            .ok_or_else(|| PackageError::BadDocumentPath(document_path.clone()))?
            .to_string_lossy()
            .into_owned();
        let document_dir = document_path
            .parent()
            .ok_or_else(|| PackageError::BadDocumentPath(document_path.clone()))?
            .to_path_buf();

        fs::create_dir_all(&self.output_dir)?;
        let archive_path = self
            .output_dir
            .canonicalize()?
            .join(format!("{stem}.{ARCHIVE_EXTENSION}"));

        let result = {
            let _cwd = CWD_GATE.lock();
            let _restore = WorkingDirGuard::change_to(&document_dir)?;
            create_usdz_archive(Path::new(&document_name), &archive_path)
        };

        if let Err(err) = result {
            tracing::error!(
                document = %document_path.display(),
                error = %err,
                "usdz archive creation failed"
            );
            return Err(err);
        }

        tracing::info!(archive = %archive_path.display(), "usdz package written");

        if self.delete_intermediates {
            remove_intermediate_dir(&document_dir);
        }
        Ok(archive_path)
    }
}

/// usdz is a zip of stored (uncompressed) entries with the scene document
/// first; referenced files from the document's directory follow. `document`
/// is relative and resolved against the working directory.
fn create_usdz_archive(document: &Path, archive_path: &Path) -> Result<(), PackageError> {
    let file = fs::File::create(archive_path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);

    add_entry(&mut zip, document, options)?;

    let mut siblings: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(".")? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name() == document.as_os_str() {
            continue;
        }
        siblings.push(PathBuf::from(entry.file_name()));
    }
    siblings.sort();
    for sibling in siblings {
        add_entry(&mut zip, &sibling, options)?;
    }

    zip.finish()?;
    Ok(())
}

fn add_entry(
    zip: &mut ZipWriter<fs::File>,
    path: &Path,
    options: FileOptions,
) -> Result<(), PackageError> {
    zip.start_file(path.to_string_lossy(), options)?;
    let bytes = fs::read(path)?;
    zip.write_all(&bytes)?;
    Ok(())
}

/// Deleting the wrong directory here would be catastrophic, so anything not
/// matching the temp naming pattern is refused.
fn remove_intermediate_dir(dir: &Path) {
    let looks_temporary = dir
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(TEMP_DIR_PREFIX));
    if !looks_temporary {
        tracing::warn!(
            dir = %dir.display(),
            "refusing to delete intermediate directory without temp prefix"
        );
        return;
    }
    if let Err(err) = fs::remove_dir_all(dir) {
        tracing::warn!(dir = %dir.display(), error = %err, "failed to delete intermediate directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_document(dir: &Path, name: &str) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, b"#usda 1.0\n").unwrap();
        path
    }

    #[test]
    fn packages_document_and_siblings() {
        let root = tempdir().unwrap();
        let work = root.path().join("temp-chair");
        let doc = write_document(&work, "chair.usda");
        fs::write(work.join("wood.png"), b"png").unwrap();

        let packager = Packager::new(root.path().to_path_buf(), false);
        let archive = packager.package(&doc).unwrap();

        assert!(archive.ends_with("chair.usdz"));
        assert!(archive.exists());
        // Intermediates kept when the delete flag is off.
        assert!(doc.exists());

        let file = fs::File::open(&archive).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        assert_eq!(zip.len(), 2);
        // The scene document must be the first entry.
        assert_eq!(zip.by_index(0).unwrap().name(), "chair.usda");
    }

    #[test]
    fn deletes_intermediate_dir_only_with_temp_prefix() {
        let root = tempdir().unwrap();

        let temp_work = root.path().join("temp-box");
        let doc = write_document(&temp_work, "box.usdc");
        Packager::new(root.path().to_path_buf(), true)
            .package(&doc)
            .unwrap();
        assert!(!temp_work.exists());

        let plain_work = root.path().join("assets");
        let doc = write_document(&plain_work, "table.usdc");
        Packager::new(root.path().to_path_buf(), true)
            .package(&doc)
            .unwrap();
        // Guard refuses to touch a directory without the reserved prefix.
        assert!(plain_work.exists());
    }

    #[test]
    fn failure_leaves_intermediates_in_place() {
        let root = tempdir().unwrap();
        let work = root.path().join("temp-lamp");
        fs::create_dir_all(&work).unwrap();
        let missing = work.join("lamp.usdc");

        let packager = Packager::new(root.path().to_path_buf(), true);
        assert!(packager.package(&missing).is_err());
        assert!(work.exists());
    }

    #[test]
    fn working_directory_is_restored_after_packaging() {
        let root = tempdir().unwrap();
        let work = root.path().join("temp-mug");
        let doc = write_document(&work, "mug.usda");

        // Observe the cwd only while holding the gate, so a concurrent
        // packaging run cannot be caught mid-change.
        let before = {
            let _gate = CWD_GATE.lock();
            env::current_dir().unwrap()
        };
        Packager::new(root.path().to_path_buf(), false)
            .package(&doc)
            .unwrap();
        let after = {
            let _gate = CWD_GATE.lock();
            env::current_dir().unwrap()
        };
        assert_eq!(after, before);
    }
}

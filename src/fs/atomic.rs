//! Atomic file writes.
//!
//! Every write goes to a uniquely named temporary file in the target's
//! directory, is synced, and is then renamed over the target. Readers of a
//! session lease or a sequence counter therefore never observe a torn file.
//!
//! Source and destination share a directory, so the rename never crosses a
//! filesystem boundary. A crash can leave a `.{filename}.{uuid}.tmp` file
//! behind; namespace listings skip dot-files.

use super::io_failure;
use crate::error::{NsLockError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Atomically write bytes to a file, creating the parent directory if needed.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent)
            .map_err(|e| io_failure("create parent directory", parent, e))?;
    }

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        io_failure("atomically replace", path, e)
    })?;

    sync_parent(path);
    Ok(())
}

/// Persist the directory entry of a freshly renamed file.
#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

/// Atomically write a string to a file.
pub fn atomic_write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

fn generate_temp_path(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            NsLockError::Unavailable(format!("invalid file path '{}'", target.display()))
        })?;

    Ok(parent.join(format!(".{}.{}.tmp", filename, Uuid::new_v4().simple())))
}

fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| io_failure("create temporary file", path, e))?;

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        io_failure("write temporary file", path, e)
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        io_failure("sync temporary file", path, e)
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("lease.json");

        atomic_write(&file_path, b"{}").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "{}");
    }

    #[test]
    fn test_atomic_write_overwrites_existing() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join(".sequence");

        fs::write(&file_path, "7").unwrap();
        atomic_write_file(&file_path, "8").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "8");
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("sessions").join("abc.json");

        atomic_write_file(&file_path, "nested").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "nested");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("counter");

        atomic_write(&file_path, b"1").unwrap();
        atomic_write(&file_path, b"2").unwrap();

        let names: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["counter".to_string()]);
    }

    #[test]
    fn test_generate_temp_path_is_hidden_and_unique() {
        let target = Path::new("/some/path/file.txt");
        let first = generate_temp_path(target).unwrap();
        let second = generate_temp_path(target).unwrap();

        assert_eq!(first.parent().unwrap(), Path::new("/some/path"));
        let name = first.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".file.txt."));
        assert!(name.ends_with(".tmp"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_atomic_write_concurrent_same_target() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shared.txt");

        std::thread::scope(|s| {
            for i in 0..8 {
                let path = &path;
                s.spawn(move || atomic_write_file(path, &format!("writer {}", i)).unwrap());
            }
        });

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("writer "));
    }
}

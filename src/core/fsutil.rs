use std::path::{Path, PathBuf};

use crate::core::error::{CompanionError, CompanionResult};

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CompanionError + '_ {
    move |source| CompanionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub fn ensure_dir(path: &Path) -> CompanionResult<()> {
    std::fs::create_dir_all(path).map_err(io_err(path))
}

/// Ensure `path` exists and contains nothing.
pub fn ensure_empty_dir(path: &Path) -> CompanionResult<()> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(io_err(path))?;
    }
    ensure_dir(path)
}

pub fn remove_dir_if_present(path: &Path) -> CompanionResult<()> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(io_err(path))?;
    }
    Ok(())
}

/// Immediate subdirectories of `path`, in directory order.
pub fn list_subdirs(path: &Path) -> CompanionResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(path).map_err(io_err(path))? {
        let entry = entry.map_err(io_err(path))?;
        if entry.file_type().map_err(io_err(path))?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

/// Immediate entries of `path` (files and directories).
pub fn list_entries(path: &Path) -> CompanionResult<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(path).map_err(io_err(path))? {
        let entry = entry.map_err(io_err(path))?;
        entries.push(entry.path());
    }
    Ok(entries)
}

/// Copy the contents of `source` into `destination`, which must exist.
/// Directory copies are sequential on purpose: backup and restore ordering
/// stays deterministic.
pub fn copy_dir_recursive(source: &Path, destination: &Path) -> CompanionResult<()> {
    for entry in std::fs::read_dir(source).map_err(io_err(source))? {
        let entry = entry.map_err(io_err(source))?;
        let src_path = entry.path();
        let dst_path = destination.join(entry.file_name());
        let file_type = entry.file_type().map_err(io_err(&src_path))?;

        if file_type.is_dir() {
            std::fs::create_dir_all(&dst_path).map_err(io_err(&dst_path))?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            if dst_path.exists() {
                std::fs::remove_file(&dst_path).map_err(io_err(&dst_path))?;
            }
            std::fs::copy(&src_path, &dst_path).map_err(io_err(&dst_path))?;
        }
    }
    Ok(())
}

pub fn read_json(path: &Path) -> CompanionResult<serde_json::Value> {
    let raw = std::fs::read_to_string(path).map_err(io_err(path))?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_dir_recursive_preserves_nested_layout() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::create_dir(src.path().join("sub")).unwrap();
        std::fs::write(src.path().join("a.txt"), "a").unwrap();
        std::fs::write(src.path().join("sub").join("b.txt"), "b").unwrap();

        copy_dir_recursive(src.path(), dst.path()).unwrap();

        assert_eq!(std::fs::read_to_string(dst.path().join("a.txt")).unwrap(), "a");
        assert_eq!(
            std::fs::read_to_string(dst.path().join("sub").join("b.txt")).unwrap(),
            "b"
        );
    }

    #[test]
    fn ensure_empty_dir_clears_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("entry");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("stale.txt"), "old").unwrap();

        ensure_empty_dir(&target).unwrap();

        assert!(target.exists());
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 0);
    }
}

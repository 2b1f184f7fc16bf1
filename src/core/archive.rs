// ─── Archive handling ───
// Release archives arrive as zip (Windows targets, GitHub zipballs) or
// tar.gz (macOS loader builds). Extraction always lands in a fresh temp
// directory; the payload is located afterwards.

use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;

use crate::core::error::{CompanionError, CompanionResult};
use crate::core::fsutil;

/// Unpack `archive` into `dest`, dispatching on the file extension.
pub fn extract_archive(archive: &Path, dest: &Path) -> CompanionResult<()> {
    fsutil::ensure_dir(dest)?;
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        extract_tar_gz(archive, dest)
    } else {
        extract_zip(archive, dest)
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> CompanionResult<()> {
    let file = File::open(archive).map_err(|source| CompanionError::Io {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut zip = zip::ZipArchive::new(file)?;
    zip.extract(dest)?;
    debug!("Extracted zip {:?} -> {:?}", archive, dest);
    Ok(())
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> CompanionResult<()> {
    let file = File::open(archive).map_err(|source| CompanionError::Io {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut tar = Archive::new(GzDecoder::new(file));
    tar.unpack(dest)
        .map_err(|e| CompanionError::ExtractionFailed(format!("{:?}: {e}", archive)))?;
    debug!("Extracted tarball {:?} -> {:?}", archive, dest);
    Ok(())
}

/// Locate the install payload inside an extraction directory.
///
/// A single top-level directory is unwrapped so its contents install
/// directly (GitHub zipballs nest everything one level down). Zero entries
/// is an empty archive; any other shape installs as-is.
pub fn locate_payload(extract_dir: &Path) -> CompanionResult<PathBuf> {
    let entries = fsutil::list_entries(extract_dir)?;
    match entries.as_slice() {
        [] => Err(CompanionError::EmptyArchive),
        [single] if single.is_dir() => Ok(single.clone()),
        _ => Ok(extract_dir.to_path_buf()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;

    /// Build an in-memory zip from (path, contents) pairs. Paths ending in
    /// `/` become directories.
    pub fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            for (path, contents) in entries {
                if path.ends_with('/') {
                    writer.add_directory(path.trim_end_matches('/'), options).unwrap();
                } else {
                    writer.start_file(*path, options).unwrap();
                    writer.write_all(contents.as_bytes()).unwrap();
                }
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }
}

// ─── Version Cache ───
// On-disk archive of previously-installed mod versions, keyed by
// `{prefix}-{version}` directory name. Presence of the directory is the
// index; entries are re-validated by content inspection on read.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::error::{CompanionError, CompanionResult};
use crate::core::fsutil;
use crate::core::scan::{self, IdentityMatch, LogicalMod};

pub struct VersionCache {
    root: PathBuf,
}

impl VersionCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, logical_mod: LogicalMod, version: &str) -> PathBuf {
        self.root
            .join(format!("{}-{}", logical_mod.cache_prefix(), version))
    }

    /// Archive `source_dir` under the (logical mod, version) key.
    /// Clear-then-copy: a previous entry for the same key is fully replaced,
    /// never merged.
    pub fn store(
        &self,
        logical_mod: LogicalMod,
        version: &str,
        source_dir: &Path,
    ) -> CompanionResult<()> {
        self.ensure_root()?;
        let entry = self.entry_path(logical_mod, version);
        fsutil::ensure_empty_dir(&entry)?;
        fsutil::copy_dir_recursive(source_dir, &entry)?;
        info!(
            "Stored {} {} in the version cache",
            logical_mod.cache_prefix(),
            version
        );
        Ok(())
    }

    /// Path of a cached copy, or `None` when the entry is absent or no
    /// longer looks like the mod it claims to be (manual edits happen).
    pub fn restore(&self, logical_mod: LogicalMod, version: &str) -> Option<PathBuf> {
        let entry = self.entry_path(logical_mod, version);
        if !entry.is_dir() {
            return None;
        }
        match scan::match_directory(&entry) {
            IdentityMatch::Found {
                logical_mod: found,
                version: found_version,
            } if found == logical_mod && found_version == version => Some(entry),
            other => {
                debug!(
                    "Cache entry {:?} failed identity re-validation: {:?}",
                    entry, other
                );
                None
            }
        }
    }

    fn ensure_root(&self) -> CompanionResult<()> {
        std::fs::create_dir_all(&self.root).map_err(|source| {
            CompanionError::DirectoryUnavailable {
                path: self.root.clone(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multiplayer_fixture(version: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("multiplayer.json"),
            format!(r#"{{"id": "Multiplayer", "version": "{version}"}}"#),
        )
        .unwrap();
        std::fs::write(dir.path().join("main.lua"), "-- entry").unwrap();
        dir
    }

    #[test]
    fn store_then_restore_round_trips() {
        let root = tempfile::tempdir().unwrap();
        let cache = VersionCache::new(root.path().join("ModVersions"));
        let source = multiplayer_fixture("1.0.0");

        cache
            .store(LogicalMod::MultiplayerMod, "1.0.0", source.path())
            .unwrap();

        let entry = cache.restore(LogicalMod::MultiplayerMod, "1.0.0").unwrap();
        assert!(entry.join("main.lua").exists());
        assert_eq!(entry, root.path().join("ModVersions").join("multiplayer-1.0.0"));
    }

    #[test]
    fn store_replaces_previous_entry_contents() {
        let root = tempfile::tempdir().unwrap();
        let cache = VersionCache::new(root.path().to_path_buf());
        let first = multiplayer_fixture("1.0.0");
        std::fs::write(first.path().join("stale.lua"), "old").unwrap();
        cache
            .store(LogicalMod::MultiplayerMod, "1.0.0", first.path())
            .unwrap();

        let second = multiplayer_fixture("1.0.0");
        cache
            .store(LogicalMod::MultiplayerMod, "1.0.0", second.path())
            .unwrap();

        let entry = cache.restore(LogicalMod::MultiplayerMod, "1.0.0").unwrap();
        assert!(!entry.join("stale.lua").exists());
        assert!(entry.join("main.lua").exists());
    }

    #[test]
    fn restore_rejects_tampered_entry() {
        let root = tempfile::tempdir().unwrap();
        let cache = VersionCache::new(root.path().to_path_buf());
        let source = multiplayer_fixture("1.0.0");
        cache
            .store(LogicalMod::MultiplayerMod, "1.0.0", source.path())
            .unwrap();

        // Identity file gone: the entry is no longer trustworthy.
        let entry = cache.entry_path(LogicalMod::MultiplayerMod, "1.0.0");
        std::fs::remove_file(entry.join("multiplayer.json")).unwrap();

        assert!(cache.restore(LogicalMod::MultiplayerMod, "1.0.0").is_none());
    }

    #[test]
    fn restore_missing_entry_is_none() {
        let root = tempfile::tempdir().unwrap();
        let cache = VersionCache::new(root.path().to_path_buf());
        assert!(cache.restore(LogicalMod::ModFramework, "1.0.0").is_none());
    }
}

// ─── Installation Orchestrator ───
// Drives the full install/switch workflow for a multiplayer release:
// resolve, restore-from-cache-or-download, extract, backup conflicting
// copies, install, then dependencies. The live mods directory is only
// touched after a payload has been fully acquired; old and new versions
// never overlap in it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};

use crate::core::archive;
use crate::core::cache::VersionCache;
use crate::core::catalog::{DependencyPins, ReleaseDescriptor, ReleaseProvider, LATEST};
use crate::core::compat::normalize_version;
use crate::core::config::{AppConfig, Platform};
use crate::core::error::{CompanionError, CompanionResult};
use crate::core::fsutil;
use crate::core::paths;
use crate::core::progress::ProgressSink;
use crate::core::scan::{self, LogicalMod, LEGACY_FRAMEWORK_DIR};

/// Terminal result of an install run. The primary mod being in place with a
/// failed dependency is a usable, degraded outcome, not an error.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InstallOutcome {
    pub version: String,
    pub dependency_error: Option<String>,
}

pub struct InstallEngine {
    config: AppConfig,
    provider: Arc<dyn ReleaseProvider>,
    progress: ProgressSink,
}

impl InstallEngine {
    pub fn new(
        config: AppConfig,
        provider: Arc<dyn ReleaseProvider>,
        progress: ProgressSink,
    ) -> Self {
        Self {
            config,
            provider,
            progress,
        }
    }

    /// Install or switch to a multiplayer release.
    ///
    /// `force` bypasses the version cache and any skip-if-current shortcut,
    /// turning the call into a repair operation with a fresh download.
    pub async fn install_multiplayer(
        &self,
        version: &str,
        force: bool,
    ) -> CompanionResult<InstallOutcome> {
        let result = self.run_install(version, force).await;
        // A listener that only watches the channel must still learn the run
        // is over; the stream ends with the error, not mid-step.
        if let Err(e) = &result {
            self.progress
                .emit(format!("Installation failed: {e}"), None);
        }
        result
    }

    async fn run_install(&self, version: &str, force: bool) -> CompanionResult<InstallOutcome> {
        self.progress
            .emit(format!("Resolving version {version}..."), Some(2));
        let releases = self.provider.list_multiplayer_releases().await?;
        let release = releases
            .iter()
            .find(|r| r.version == version)
            .cloned()
            .ok_or_else(|| CompanionError::VersionNotFound(version.to_string()))?;

        let mods_dir = self.mods_dir()?;
        let cache = self.cache();

        if !force {
            if let Some(cached) = cache.restore(LogicalMod::MultiplayerMod, version) {
                return self
                    .install_from_cache(&release, &cached, &mods_dir, &cache)
                    .await;
            }
        }

        let work_root = work_root("multiplayer");
        let result = self
            .install_fresh(&release, &work_root, &mods_dir, &cache)
            .await;
        // Partial downloads and extractions never outlive the run.
        let _ = std::fs::remove_dir_all(&work_root);
        result
    }

    async fn install_from_cache(
        &self,
        release: &ReleaseDescriptor,
        cached: &Path,
        mods_dir: &Path,
        cache: &VersionCache,
    ) -> CompanionResult<InstallOutcome> {
        self.progress.emit(
            format!("Restoring {} from the version cache...", release.version),
            Some(40),
        );

        self.backup_installed(mods_dir, cache, LogicalMod::MultiplayerMod, Some(60))?;

        let target = self.multiplayer_target(mods_dir, &release.version);
        fsutil::ensure_empty_dir(&target)?;
        fsutil::copy_dir_recursive(cached, &target)?;
        self.progress
            .emit(format!("Restored {} from cache", release.version), Some(80));

        let dependency_error = self.install_dependencies(&target, release, mods_dir, cache).await;
        self.progress.emit("Install complete", Some(100));
        Ok(InstallOutcome {
            version: release.version.clone(),
            dependency_error,
        })
    }

    async fn install_fresh(
        &self,
        release: &ReleaseDescriptor,
        work_root: &Path,
        mods_dir: &Path,
        cache: &VersionCache,
    ) -> CompanionResult<InstallOutcome> {
        self.progress
            .emit(format!("Downloading {}...", release.version), Some(10));
        let archive_path = work_root.join(format!("multiplayer-{}.zip", release.version));
        self.provider
            .download(&release.download_url, &archive_path, &self.progress, 10, 60)
            .await?;

        self.progress.emit("Extracting...", Some(62));
        let extract_dir = work_root.join("extract");
        archive::extract_archive(&archive_path, &extract_dir)?;
        let payload = archive::locate_payload(&extract_dir)?;

        self.backup_installed(mods_dir, cache, LogicalMod::MultiplayerMod, Some(70))?;

        self.progress
            .emit(format!("Installing {}...", release.version), Some(80));
        let target = self.multiplayer_target(mods_dir, &release.version);
        fsutil::ensure_empty_dir(&target)?;
        fsutil::copy_dir_recursive(&payload, &target)?;
        info!("Installed multiplayer {} at {:?}", release.version, target);

        let dependency_error = self.install_dependencies(&target, release, mods_dir, cache).await;
        self.progress.emit("Install complete", Some(100));
        Ok(InstallOutcome {
            version: release.version.clone(),
            dependency_error,
        })
    }

    /// Copy every installed copy of `logical_mod` into the cache keyed by
    /// its own version, then remove the originals. Runs to completion before
    /// any new files land in the live tree.
    fn backup_installed(
        &self,
        mods_dir: &Path,
        cache: &VersionCache,
        logical_mod: LogicalMod,
        percent: Option<u8>,
    ) -> CompanionResult<()> {
        let installed = scan::installed_versions(mods_dir, logical_mod)?;
        for record in installed {
            self.progress.emit(
                format!(
                    "Backing up {} {}...",
                    record.logical_mod.cache_prefix(),
                    record.version
                ),
                percent,
            );
            cache.store(logical_mod, &record.version, &record.path)?;
            fsutil::remove_dir_if_present(&record.path)?;
        }
        Ok(())
    }

    /// Install the frameworks the new release depends on. Failures surface
    /// in the outcome instead of rolling back the primary install: the
    /// multiplayer mod is usable on its own in degraded form.
    async fn install_dependencies(
        &self,
        installed_dir: &Path,
        release: &ReleaseDescriptor,
        mods_dir: &Path,
        cache: &VersionCache,
    ) -> Option<String> {
        let (framework_pin, loader_pin) = declared_pins(installed_dir, release);
        let mut failures = Vec::new();

        self.progress
            .emit("Installing mod framework...", Some(85));
        if let Err(e) = self
            .install_mod_framework(&framework_pin, mods_dir, cache)
            .await
        {
            error!("Mod framework install failed: {e}");
            failures.push(format!("mod framework: {e}"));
        }

        self.progress
            .emit("Installing loader framework...", Some(92));
        if let Err(e) = self.install_loader_framework(&loader_pin).await {
            error!("Loader framework install failed: {e}");
            failures.push(format!("loader framework: {e}"));
        }

        if failures.is_empty() {
            None
        } else {
            Some(failures.join("; "))
        }
    }

    async fn install_mod_framework(
        &self,
        version: &str,
        mods_dir: &Path,
        cache: &VersionCache,
    ) -> CompanionResult<()> {
        let release = self.provider.mod_framework_release(version).await?;

        let installed = scan::installed_versions(mods_dir, LogicalMod::ModFramework)?;
        let current = installed
            .iter()
            .any(|r| normalize_version(&r.version) == normalize_version(&release.version));
        if current {
            info!(
                "Mod framework {} already installed, skipping",
                release.version
            );
            return Ok(());
        }

        let work_root = work_root("smods");
        let result = async {
            let archive_path = work_root.join(format!("smods-{}.zip", release.version));
            self.provider
                .download(&release.download_url, &archive_path, &self.progress, 85, 90)
                .await?;
            let extract_dir = work_root.join("extract");
            archive::extract_archive(&archive_path, &extract_dir)?;
            let payload = archive::locate_payload(&extract_dir)?;

            for record in installed {
                cache.store(LogicalMod::ModFramework, &record.version, &record.path)?;
                fsutil::remove_dir_if_present(&record.path)?;
            }

            let target = mods_dir.join(LEGACY_FRAMEWORK_DIR);
            fsutil::ensure_empty_dir(&target)?;
            fsutil::copy_dir_recursive(&payload, &target)?;
            info!("Installed mod framework {}", release.version);
            Ok(())
        }
        .await;
        let _ = std::fs::remove_dir_all(&work_root);
        result
    }

    async fn install_loader_framework(&self, version: &str) -> CompanionResult<()> {
        let game_dir = match paths::resolve_game_dir(&self.config) {
            paths::GameDirectory::Configured(dir) => dir,
            paths::GameDirectory::Unconfigured => {
                // Not an error: the user can point us at the game later and
                // the loader can be installed then.
                warn!("Game directory not configured; skipping loader framework install");
                self.progress
                    .emit("Game directory not set, loader framework skipped", None);
                return Ok(());
            }
        };

        if scan::is_loader_framework_installed(self.config.platform, &game_dir)
            && version.eq_ignore_ascii_case(LATEST)
        {
            info!("Loader framework already installed, skipping");
            return Ok(());
        }

        let release =
            self.provider
                .loader_framework_release(version, self.config.platform, self.config.arch)?;

        let work_root = work_root("lovely");
        let result = async {
            let file_name = release
                .download_url
                .rsplit('/')
                .next()
                .unwrap_or("lovely.zip")
                .to_string();
            let archive_path = work_root.join(&file_name);
            self.provider
                .download(&release.download_url, &archive_path, &self.progress, 92, 97)
                .await?;
            let extract_dir = work_root.join("extract");
            archive::extract_archive(&archive_path, &extract_dir)?;

            self.place_loader_files(&extract_dir, &game_dir)?;
            info!("Installed loader framework {}", release.version);
            Ok(())
        }
        .await;
        let _ = std::fs::remove_dir_all(&work_root);
        result
    }

    /// Copy the loader's files from the extraction dir into the game dir.
    /// Some release archives nest their payload one directory deep.
    fn place_loader_files(&self, extract_dir: &Path, game_dir: &Path) -> CompanionResult<()> {
        match self.config.platform {
            Platform::Windows | Platform::Linux => {
                let dll = find_extracted_file(extract_dir, "version.dll").ok_or_else(|| {
                    CompanionError::ExtractionFailed(
                        "loader archive did not contain version.dll".into(),
                    )
                })?;
                copy_file(&dll, &game_dir.join("version.dll"))
            }
            Platform::MacOs => {
                let dylib =
                    find_extracted_file(extract_dir, "liblovely.dylib").ok_or_else(|| {
                        CompanionError::ExtractionFailed(
                            "loader archive did not contain liblovely.dylib".into(),
                        )
                    })?;
                let script =
                    find_extracted_file(extract_dir, "run_lovely_macos.sh").ok_or_else(|| {
                        CompanionError::ExtractionFailed(
                            "loader archive did not contain run_lovely_macos.sh".into(),
                        )
                    })?;
                copy_file(&dylib, &game_dir.join("liblovely.dylib"))?;
                let script_dest = game_dir.join("run_lovely_macos.sh");
                copy_file(&script, &script_dest)?;
                make_executable(&script_dest)
            }
        }
    }

    /// Resolve a detected multiple-copies conflict: archive every installed
    /// multiplayer copy except one of `version` into the cache.
    pub fn keep_only_version(&self, version: &str) -> CompanionResult<String> {
        let mods_dir = self.mods_dir()?;
        let cache = self.cache();

        let records = scan::installed_versions(&mods_dir, LogicalMod::MultiplayerMod)?;
        if !records.iter().any(|r| r.version == version) {
            return Err(CompanionError::VersionNotFound(version.to_string()));
        }

        let mut kept = false;
        for record in records {
            if record.version == version && !kept {
                kept = true;
                continue;
            }
            info!(
                "Archiving conflicting multiplayer {} to the version cache",
                record.version
            );
            cache.store(LogicalMod::MultiplayerMod, &record.version, &record.path)?;
            fsutil::remove_dir_if_present(&record.path)?;
        }
        Ok(version.to_string())
    }

    fn mods_dir(&self) -> CompanionResult<PathBuf> {
        let dir = paths::mods_dir(&self.config);
        std::fs::create_dir_all(&dir).map_err(|source| CompanionError::DirectoryUnavailable {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    fn cache(&self) -> VersionCache {
        VersionCache::new(paths::version_cache_dir(&self.config))
    }

    fn multiplayer_target(&self, mods_dir: &Path, version: &str) -> PathBuf {
        mods_dir.join(format!("multiplayer-{version}"))
    }
}

/// Dependency versions the freshly-installed release declares. The mod's own
/// JSON wins; catalog pins are the fallback; `"latest"` when neither pins.
fn declared_pins(installed_dir: &Path, release: &ReleaseDescriptor) -> (String, String) {
    let mut framework = None;
    let mut loader = None;

    if let Ok(entries) = fsutil::list_entries(installed_dir) {
        for entry in entries {
            if entry.extension().map(|e| e == "json").unwrap_or(false) {
                if let Ok(json) = fsutil::read_json(&entry) {
                    if json.get("id").and_then(|v| v.as_str()).is_some() {
                        framework = json
                            .get("smods_version")
                            .and_then(|v| v.as_str())
                            .map(str::to_string);
                        loader = json
                            .get("lovely_version")
                            .and_then(|v| v.as_str())
                            .map(str::to_string);
                        break;
                    }
                }
            }
        }
    }

    let framework = framework
        .or_else(|| {
            DependencyPins::effective(&release.pins.mod_framework).map(str::to_string)
        })
        .unwrap_or_else(|| LATEST.to_string());
    let loader = loader
        .or_else(|| {
            DependencyPins::effective(&release.pins.loader_framework).map(str::to_string)
        })
        .unwrap_or_else(|| LATEST.to_string());
    (framework, loader)
}

fn find_extracted_file(extract_dir: &Path, name: &str) -> Option<PathBuf> {
    let direct = extract_dir.join(name);
    if direct.exists() {
        return Some(direct);
    }
    let subdirs = fsutil::list_subdirs(extract_dir).ok()?;
    for dir in subdirs {
        let nested = dir.join(name);
        if nested.exists() {
            return Some(nested);
        }
    }
    None
}

fn copy_file(source: &Path, dest: &Path) -> CompanionResult<()> {
    std::fs::copy(source, dest)
        .map(|_| ())
        .map_err(|source_err| CompanionError::Io {
            path: dest.to_path_buf(),
            source: source_err,
        })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> CompanionResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)
        .map_err(|source| CompanionError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).map_err(|source| CompanionError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> CompanionResult<()> {
    Ok(())
}

/// Unique scratch directory for one acquisition. Uniqueness keeps parallel
/// test runs and a crashed prior run from tripping over each other.
fn work_root(kind: &str) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("mp-companion-{kind}-{}-{nonce}", std::process::id()))
}

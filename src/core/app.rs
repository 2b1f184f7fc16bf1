// ─── Boundary facade ───
// The surface a UI or CLI shell drives. Owns the shared HTTP client, the
// injected configuration, and the one-operation-at-a-time install gate.
// Scans and compatibility checks are read-only and may run while an install
// is in flight; their results are then stale by definition.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;

use crate::core::catalog::{CatalogClient, ReleaseDescriptor, ReleaseProvider};
use crate::core::compat::{self, CompatibilityResult};
use crate::core::config::AppConfig;
use crate::core::error::{CompanionError, CompanionResult};
use crate::core::http;
use crate::core::install::{InstallEngine, InstallOutcome};
use crate::core::launch;
use crate::core::paths::{self, GameDirectory};
use crate::core::progress::{InstallProgress, ProgressSink};
use crate::core::scan::{self, InstalledModRecord, LogicalMod};

pub struct Companion {
    config: AppConfig,
    provider: Arc<dyn ReleaseProvider>,
    install_gate: Mutex<()>,
}

impl Companion {
    pub fn new(config: AppConfig) -> CompanionResult<Self> {
        let client = http::build_http_client()?;
        Ok(Self::with_provider(
            config,
            Arc::new(CatalogClient::new(client)),
        ))
    }

    /// Seam for shells and tests that bring their own catalog transport.
    pub fn with_provider(config: AppConfig, provider: Arc<dyn ReleaseProvider>) -> Self {
        Self {
            config,
            provider,
            install_gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Every installed mod copy found on disk. More than one multiplayer
    /// entry means a conflict the user must resolve (`keep_only_version`).
    pub fn scan_installed(&self) -> CompanionResult<Vec<InstalledModRecord>> {
        scan::scan_installed_mods(&paths::mods_dir(&self.config))
    }

    pub async fn list_available(&self) -> CompanionResult<Vec<ReleaseDescriptor>> {
        self.provider.list_multiplayer_releases().await
    }

    /// Install or switch to a multiplayer release, streaming progress to
    /// `progress` when given. A second call while one runs is rejected.
    pub async fn install(
        &self,
        version: &str,
        force_fresh_download: bool,
        progress: Option<UnboundedSender<InstallProgress>>,
    ) -> CompanionResult<InstallOutcome> {
        let _guard = self
            .install_gate
            .try_lock()
            .map_err(|_| CompanionError::InstallInProgress)?;
        let sink = progress.map(ProgressSink::new).unwrap_or_default();
        let engine = InstallEngine::new(self.config.clone(), self.provider.clone(), sink);
        engine
            .install_multiplayer(version, force_fresh_download)
            .await
    }

    /// Resolve a multiple-copies conflict by archiving everything except
    /// one copy of `version`.
    pub async fn keep_only_version(&self, version: &str) -> CompanionResult<String> {
        let _guard = self
            .install_gate
            .try_lock()
            .map_err(|_| CompanionError::InstallInProgress)?;
        let engine = InstallEngine::new(
            self.config.clone(),
            self.provider.clone(),
            ProgressSink::disabled(),
        );
        engine.keep_only_version(version)
    }

    pub fn installed_mod_framework_version(&self) -> CompanionResult<Option<String>> {
        let records = scan::installed_versions(
            &paths::mods_dir(&self.config),
            LogicalMod::ModFramework,
        )?;
        Ok(scan::preferred_framework_record(&records).map(|r| r.version.clone()))
    }

    pub fn is_loader_framework_installed(&self) -> bool {
        match paths::resolve_game_dir(&self.config) {
            GameDirectory::Configured(dir) => {
                scan::is_loader_framework_installed(self.config.platform, &dir)
            }
            GameDirectory::Unconfigured => false,
        }
    }

    /// Compare installed multiplayer copies against the installed framework
    /// version using the remote catalog's dependency pins.
    pub async fn check_compatibility(&self) -> CompanionResult<CompatibilityResult> {
        let installed = self.scan_installed()?;
        let framework_version =
            scan::preferred_framework_record(&installed).map(|r| r.version.clone());
        let releases = self.provider.list_multiplayer_releases().await?;
        Ok(compat::check(
            &installed,
            framework_version.as_deref(),
            &releases,
        ))
    }

    /// Launch the game. Independent of install state; failures surface,
    /// never silently.
    pub async fn launch(&self) -> CompanionResult<()> {
        launch::launch_game(&self.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{Arch, Overrides, Platform};
    use async_trait::async_trait;
    use std::path::Path;

    /// Provider whose catalog fetch blocks until released; lets a test hold
    /// the install gate open.
    struct StallingProvider {
        release: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl ReleaseProvider for StallingProvider {
        async fn list_multiplayer_releases(&self) -> CompanionResult<Vec<ReleaseDescriptor>> {
            self.release.notified().await;
            Ok(Vec::new())
        }

        async fn mod_framework_release(
            &self,
            version: &str,
        ) -> CompanionResult<ReleaseDescriptor> {
            Err(CompanionError::VersionNotFound(version.to_string()))
        }

        fn loader_framework_release(
            &self,
            version: &str,
            _platform: Platform,
            _arch: Arch,
        ) -> CompanionResult<ReleaseDescriptor> {
            Err(CompanionError::VersionNotFound(version.to_string()))
        }

        async fn download(
            &self,
            url: &str,
            _dest: &Path,
            _progress: &crate::core::progress::ProgressSink,
            _percent_from: u8,
            _percent_to: u8,
        ) -> CompanionResult<()> {
            Err(CompanionError::DownloadFailed {
                url: url.to_string(),
                status: 503,
            })
        }
    }

    fn test_companion(provider: Arc<dyn ReleaseProvider>) -> (tempfile::TempDir, Arc<Companion>) {
        let home = tempfile::tempdir().unwrap();
        let mods_dir = home.path().join("Mods");
        let config = AppConfig::with_home(Platform::Linux, Arch::X86_64, home.path().to_path_buf())
            .with_overrides(Overrides {
                game_dir: None,
                linux_mods_dir: Some(mods_dir),
            });
        (home, Arc::new(Companion::with_provider(config, provider)))
    }

    #[tokio::test]
    async fn concurrent_install_is_rejected() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let provider = Arc::new(StallingProvider {
            release: gate.clone(),
        });
        let (_home, companion) = test_companion(provider);

        let first = {
            let companion = companion.clone();
            tokio::spawn(async move { companion.install("1.0.0", false, None).await })
        };
        // Let the first call take the gate and park on the catalog fetch.
        tokio::task::yield_now().await;

        let second = companion.install("1.0.0", false, None).await;
        assert!(matches!(second, Err(CompanionError::InstallInProgress)));

        gate.notify_one();
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, Err(CompanionError::VersionNotFound(_))));
    }

    #[tokio::test]
    async fn loader_is_not_installed_without_a_game_dir() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let provider = Arc::new(StallingProvider { release: gate });
        let (_home, companion) = test_companion(provider);
        assert!(!companion.is_loader_framework_installed());
    }

    #[tokio::test]
    async fn scan_on_fresh_setup_is_empty() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let provider = Arc::new(StallingProvider { release: gate });
        let (_home, companion) = test_companion(provider);
        assert!(companion.scan_installed().unwrap().is_empty());
    }
}

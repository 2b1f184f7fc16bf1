// ─── Remote Catalog Client ───
// Fetches release metadata for the multiplayer mod (product API) and the
// loader/mod frameworks (GitHub releases), producing uniform descriptors.
// No retry policy here; that belongs to the orchestrator.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::core::config::{Arch, Platform};
use crate::core::error::{CompanionError, CompanionResult};
use crate::core::progress::ProgressSink;

const PRODUCT_RELEASES_URL: &str = "https://balatromp.com/api/releases";
const MOD_FRAMEWORK_RELEASES_URL: &str =
    "https://api.github.com/repos/Steamodded/smods/releases";
const LOADER_RELEASES_BASE_URL: &str =
    "https://github.com/ethangreen-dev/lovely-injector/releases";

/// Sentinel meaning "no pin": take whatever is newest.
pub const LATEST: &str = "latest";

/// Dependency versions a multiplayer release declares. Absent or `"latest"`
/// means unpinned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyPins {
    pub loader_framework: Option<String>,
    pub mod_framework: Option<String>,
}

impl DependencyPins {
    /// A pin normalized so that the `"latest"` sentinel reads as absent.
    pub fn effective(pin: &Option<String>) -> Option<&str> {
        match pin.as_deref() {
            None => None,
            Some(p) if p.eq_ignore_ascii_case(LATEST) => None,
            Some(p) => Some(p),
        }
    }
}

/// Uniform release metadata, whichever remote it came from.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseDescriptor {
    pub version: String,
    pub download_url: String,
    pub display_name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub pins: DependencyPins,
}

/// Wire shape of the product API's release list.
#[derive(Debug, Deserialize)]
struct ApiRelease {
    version: String,
    url: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    smods_version: Option<String>,
    #[serde(default)]
    lovely_version: Option<String>,
}

impl From<ApiRelease> for ReleaseDescriptor {
    fn from(r: ApiRelease) -> Self {
        let display_name = r.name.unwrap_or_else(|| r.version.clone());
        ReleaseDescriptor {
            version: r.version,
            download_url: r.url,
            display_name,
            published_at: r.published_at,
            pins: DependencyPins {
                loader_framework: r.lovely_version,
                mod_framework: r.smods_version,
            },
        }
    }
}

/// Wire shape of a GitHub release entry.
#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    zipball_url: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

impl From<GitHubRelease> for ReleaseDescriptor {
    fn from(r: GitHubRelease) -> Self {
        let display_name = r.name.unwrap_or_else(|| r.tag_name.clone());
        ReleaseDescriptor {
            version: r.tag_name,
            download_url: r.zipball_url,
            display_name,
            published_at: r.published_at,
            pins: DependencyPins::default(),
        }
    }
}

/// Loader archive asset name for the host. Linux deliberately takes the
/// Windows build: the game runs under Proton.
pub fn loader_asset_name(platform: Platform, arch: Arch) -> &'static str {
    match (platform, arch) {
        (Platform::Windows, _) | (Platform::Linux, _) => "lovely-x86_64-pc-windows-msvc.zip",
        (Platform::MacOs, Arch::Aarch64) => "lovely-aarch64-apple-darwin.tar.gz",
        (Platform::MacOs, Arch::X86_64) => "lovely-x86_64-apple-darwin.tar.gz",
    }
}

/// Network seam the orchestrator drives. Tests swap in an in-memory
/// implementation; production uses `CatalogClient`.
#[async_trait]
pub trait ReleaseProvider: Send + Sync {
    /// Available multiplayer releases, newest first.
    async fn list_multiplayer_releases(&self) -> CompanionResult<Vec<ReleaseDescriptor>>;

    /// Mod-framework release for a tag, or the newest when the tag is
    /// `"latest"` or absent upstream (absence must be warned, not swallowed).
    async fn mod_framework_release(&self, version: &str) -> CompanionResult<ReleaseDescriptor>;

    /// Loader-framework release for a tag. URL construction only; the
    /// project publishes fixed per-target asset names.
    fn loader_framework_release(
        &self,
        version: &str,
        platform: Platform,
        arch: Arch,
    ) -> CompanionResult<ReleaseDescriptor>;

    /// Stream an archive to `dest`, reporting percent within
    /// `[percent_from, percent_to]`.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: &ProgressSink,
        percent_from: u8,
        percent_to: u8,
    ) -> CompanionResult<()>;
}

pub struct CatalogClient {
    client: reqwest::Client,
}

impl CatalogClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> CompanionResult<T> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CompanionError::RemoteStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    async fn mod_framework_releases(&self) -> CompanionResult<Vec<GitHubRelease>> {
        self.fetch_json(MOD_FRAMEWORK_RELEASES_URL).await
    }
}

#[async_trait]
impl ReleaseProvider for CatalogClient {
    async fn list_multiplayer_releases(&self) -> CompanionResult<Vec<ReleaseDescriptor>> {
        info!("Fetching multiplayer release catalog...");
        let releases: Vec<ApiRelease> = self.fetch_json(PRODUCT_RELEASES_URL).await?;
        let mut descriptors: Vec<ReleaseDescriptor> =
            releases.into_iter().map(Into::into).collect();
        sort_releases_desc(&mut descriptors);
        info!("Loaded {} multiplayer releases", descriptors.len());
        Ok(descriptors)
    }

    async fn mod_framework_release(&self, version: &str) -> CompanionResult<ReleaseDescriptor> {
        let releases = self.mod_framework_releases().await?;
        if releases.is_empty() {
            return Err(CompanionError::VersionNotFound(version.to_string()));
        }

        if !version.eq_ignore_ascii_case(LATEST) {
            if let Some(release) = releases.iter().position(|r| r.tag_name == version) {
                let mut releases = releases;
                return Ok(releases.swap_remove(release).into());
            }
            warn!("Mod framework version {version} not found upstream, falling back to latest");
        }

        let mut releases = releases;
        Ok(releases.swap_remove(0).into())
    }

    fn loader_framework_release(
        &self,
        version: &str,
        platform: Platform,
        arch: Arch,
    ) -> CompanionResult<ReleaseDescriptor> {
        Ok(loader_release(version, platform, arch))
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: &ProgressSink,
        percent_from: u8,
        percent_to: u8,
    ) -> CompanionResult<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CompanionError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CompanionError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length();
        let mut downloaded: u64 = 0;
        let mut last_percent = percent_from;
        let mut stream = response.bytes_stream();

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|source| CompanionError::Io {
                path: dest.to_path_buf(),
                source,
            })?;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|source| CompanionError::Io {
                    path: dest.to_path_buf(),
                    source,
                })?;
            downloaded += chunk.len() as u64;

            if let Some(total) = total_bytes {
                if total > 0 {
                    let span = (percent_to - percent_from) as u64;
                    let percent =
                        percent_from + ((downloaded.min(total) * span) / total) as u8;
                    if percent > last_percent {
                        last_percent = percent;
                        progress.emit("Downloading...", Some(percent));
                    }
                }
            }
        }
        file.flush()
            .await
            .map_err(|source| CompanionError::Io {
                path: dest.to_path_buf(),
                source,
            })?;

        debug!("Downloaded {url} -> {:?} ({downloaded} bytes)", dest);
        Ok(())
    }
}

/// Loader release descriptors are constructed, not fetched: the project's
/// GitHub release assets follow fixed per-target names.
fn loader_release(version: &str, platform: Platform, arch: Arch) -> ReleaseDescriptor {
    let asset = loader_asset_name(platform, arch);
    let download_url = if version.eq_ignore_ascii_case(LATEST) {
        format!("{LOADER_RELEASES_BASE_URL}/latest/download/{asset}")
    } else {
        format!("{LOADER_RELEASES_BASE_URL}/download/{version}/{asset}")
    };
    ReleaseDescriptor {
        version: version.to_string(),
        download_url,
        display_name: format!("lovely {version}"),
        published_at: None,
        pins: DependencyPins::default(),
    }
}

/// Newest-first ordering. Heuristic only: leading dotted numeric components
/// compared descending, ties broken by raw string comparison. Suffixed
/// pre-release tags may mis-order; nothing correctness-critical keys off it.
pub fn sort_releases_desc(releases: &mut [ReleaseDescriptor]) {
    releases.sort_by(|a, b| {
        version_sort_key(&b.version)
            .cmp(&version_sort_key(&a.version))
            .then_with(|| b.version.cmp(&a.version))
    });
}

fn version_sort_key(version: &str) -> Vec<u64> {
    version
        .trim_start_matches(['v', 'V'])
        .split(['.', '-', '~'])
        .map_while(|part| part.parse::<u64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_product_release() {
        let json = r#"{
            "version": "2.0.0",
            "url": "https://balatromp.com/releases/multiplayer-2.0.0.zip",
            "name": "Multiplayer 2.0.0",
            "published_at": "2025-05-30T12:00:00Z",
            "smods_version": "1.0.0~BETA-0530b",
            "lovely_version": "v0.7.1"
        }"#;
        let release: ApiRelease = serde_json::from_str(json).unwrap();
        let descriptor: ReleaseDescriptor = release.into();
        assert_eq!(descriptor.version, "2.0.0");
        assert_eq!(
            descriptor.pins.mod_framework.as_deref(),
            Some("1.0.0~BETA-0530b")
        );
        assert_eq!(descriptor.pins.loader_framework.as_deref(), Some("v0.7.1"));
    }

    #[test]
    fn deserialize_github_release() {
        let json = r#"{
            "tag_name": "1.0.0~BETA-0530b",
            "zipball_url": "https://api.github.com/repos/Steamodded/smods/zipball/1.0.0~BETA-0530b",
            "name": "Steamodded Beta",
            "published_at": "2025-05-30T08:30:00Z"
        }"#;
        let release: GitHubRelease = serde_json::from_str(json).unwrap();
        let descriptor: ReleaseDescriptor = release.into();
        assert_eq!(descriptor.version, "1.0.0~BETA-0530b");
        assert!(descriptor.pins.mod_framework.is_none());
    }

    #[test]
    fn loader_asset_matches_platform_and_arch() {
        assert_eq!(
            loader_asset_name(Platform::Windows, Arch::X86_64),
            "lovely-x86_64-pc-windows-msvc.zip"
        );
        // Proton runs the Windows build.
        assert_eq!(
            loader_asset_name(Platform::Linux, Arch::X86_64),
            "lovely-x86_64-pc-windows-msvc.zip"
        );
        assert_eq!(
            loader_asset_name(Platform::MacOs, Arch::Aarch64),
            "lovely-aarch64-apple-darwin.tar.gz"
        );
        assert_eq!(
            loader_asset_name(Platform::MacOs, Arch::X86_64),
            "lovely-x86_64-apple-darwin.tar.gz"
        );
    }

    #[test]
    fn loader_url_for_pinned_and_latest() {
        let pinned = loader_release("v0.7.1", Platform::Windows, Arch::X86_64);
        assert_eq!(
            pinned.download_url,
            "https://github.com/ethangreen-dev/lovely-injector/releases/download/v0.7.1/lovely-x86_64-pc-windows-msvc.zip"
        );
        let latest = loader_release(LATEST, Platform::MacOs, Arch::Aarch64);
        assert_eq!(
            latest.download_url,
            "https://github.com/ethangreen-dev/lovely-injector/releases/latest/download/lovely-aarch64-apple-darwin.tar.gz"
        );
    }

    #[test]
    fn releases_sort_newest_first() {
        let mut releases: Vec<ReleaseDescriptor> = ["1.9.0", "2.0.0", "1.10.0", "2.0.0-beta"]
            .iter()
            .map(|v| ReleaseDescriptor {
                version: v.to_string(),
                download_url: String::new(),
                display_name: v.to_string(),
                published_at: None,
                pins: DependencyPins::default(),
            })
            .collect();
        sort_releases_desc(&mut releases);
        let order: Vec<_> = releases.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(order, vec!["2.0.0-beta", "2.0.0", "1.10.0", "1.9.0"]);
    }

    #[test]
    fn effective_pin_treats_latest_as_unpinned() {
        assert_eq!(DependencyPins::effective(&None), None);
        assert_eq!(DependencyPins::effective(&Some("latest".into())), None);
        assert_eq!(
            DependencyPins::effective(&Some("1.0.0".into())),
            Some("1.0.0")
        );
    }
}

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

const APP_DIR_NAME: &str = "mp-companion";
const SETTINGS_FILE: &str = "settings.json";

/// Host operating system, detected once at startup and passed explicitly
/// into every path computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    pub fn current() -> Self {
        if cfg!(target_arch = "aarch64") {
            Arch::Aarch64
        } else {
            Arch::X86_64
        }
    }
}

/// User overrides consumed from the settings collaborator. The settings file
/// is a flat JSON blob read wholesale; only these two keys matter to the
/// engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Overrides {
    /// User-confirmed game installation directory.
    #[serde(default)]
    pub game_dir: Option<PathBuf>,
    /// Linux only: the mods directory under the user's Proton prefix.
    #[serde(default)]
    pub linux_mods_dir: Option<PathBuf>,
}

/// Immutable configuration injected into the resolvers and the orchestrator.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub platform: Platform,
    pub arch: Arch,
    pub home_dir: PathBuf,
    pub overrides: Overrides,
}

impl AppConfig {
    /// Detect the running host and load overrides from the settings blob.
    pub fn detect() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let overrides = load_overrides().unwrap_or_default();
        Self {
            platform: Platform::current(),
            arch: Arch::current(),
            home_dir,
            overrides,
        }
    }

    /// Synthetic configuration for tests and embedding shells that manage
    /// settings themselves.
    pub fn with_home(platform: Platform, arch: Arch, home_dir: PathBuf) -> Self {
        Self {
            platform,
            arch,
            home_dir,
            overrides: Overrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }
}

fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(SETTINGS_FILE)
}

fn load_overrides() -> Option<Overrides> {
    let path = settings_path();
    let raw = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(overrides) => Some(overrides),
        Err(e) => {
            warn!("Ignoring unreadable settings at {:?}: {}", path, e);
            None
        }
    }
}

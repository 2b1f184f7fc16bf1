// ─── Path Resolver ───
// Computes platform- and configuration-dependent filesystem locations.
// Pure functions of the injected config except for the game-directory
// search, which probes the filesystem for Steam libraries.

use std::path::{Path, PathBuf};
use std::process::Command;

use regex::Regex;
use tracing::debug;

use crate::core::config::{AppConfig, Platform};

/// Steam app id of the game; keys the Proton compatdata prefix on Linux.
pub const STEAM_APP_ID: &str = "2379780";

const GAME_DIR_NAME: &str = "Balatro";

/// Game installation directory as seen by the rest of the engine.
///
/// `Unconfigured` means "nothing valid found"; callers must treat it as an
/// incomplete setup, never as an error or an empty path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameDirectory {
    Configured(PathBuf),
    Unconfigured,
}

impl GameDirectory {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            GameDirectory::Configured(p) => Some(p),
            GameDirectory::Unconfigured => None,
        }
    }
}

/// Per-profile data root holding `Mods` and `ModVersions`.
fn game_data_root(config: &AppConfig) -> PathBuf {
    let home = &config.home_dir;
    match config.platform {
        Platform::Windows => home
            .join("AppData")
            .join("Roaming")
            .join(GAME_DIR_NAME),
        Platform::MacOs => home
            .join("Library")
            .join("Application Support")
            .join(GAME_DIR_NAME),
        // The game runs under Proton; its Windows profile lives inside the
        // compatdata prefix.
        Platform::Linux => home
            .join(".local")
            .join("share")
            .join("Steam")
            .join("steamapps")
            .join("compatdata")
            .join(STEAM_APP_ID)
            .join("pfx")
            .join("drive_c")
            .join("users")
            .join("steamuser")
            .join("AppData")
            .join("Roaming")
            .join(GAME_DIR_NAME),
    }
}

/// Live mods directory. Best effort: the directory need not exist yet.
///
/// On Linux the Proton prefix root varies by setup, so an explicit user
/// override always wins there.
pub fn mods_dir(config: &AppConfig) -> PathBuf {
    if config.platform == Platform::Linux {
        if let Some(custom) = &config.overrides.linux_mods_dir {
            return custom.clone();
        }
    }
    game_data_root(config).join("Mods")
}

/// Side directory archiving previously-installed mod versions.
pub fn version_cache_dir(config: &AppConfig) -> PathBuf {
    if config.platform == Platform::Linux {
        if let Some(custom) = &config.overrides.linux_mods_dir {
            // Keep the cache next to a custom mods dir rather than inside a
            // prefix the user has steered away from.
            if let Some(parent) = custom.parent() {
                return parent.join("ModVersions");
            }
        }
    }
    game_data_root(config).join("ModVersions")
}

/// A user-picked executable is normalized to its directory.
pub fn normalize_custom_path(selected: &Path) -> PathBuf {
    let is_exe = selected
        .extension()
        .map(|e| e.eq_ignore_ascii_case("exe"))
        .unwrap_or(false);
    if is_exe {
        if let Some(parent) = selected.parent() {
            return parent.to_path_buf();
        }
    }
    selected.to_path_buf()
}

/// Validate a candidate install directory by its platform marker files.
pub fn is_valid_game_dir(platform: Platform, dir: &Path) -> bool {
    match platform {
        Platform::Windows => {
            const MARKERS: [&str; 4] = ["love.dll", "lua51.dll", "SDL2.dll", "Balatro.exe"];
            MARKERS.iter().any(|m| dir.join(m).exists())
        }
        Platform::MacOs => dir
            .join("Balatro.app")
            .join("Contents")
            .join("Resources")
            .join("Balatro.love")
            .exists(),
        // Proton layout ships the Windows binary.
        Platform::Linux => dir.join("Balatro.exe").exists(),
    }
}

/// Resolve the game directory: validated user override first, then Steam
/// library candidates. `Unconfigured` when nothing checks out.
pub fn resolve_game_dir(config: &AppConfig) -> GameDirectory {
    if let Some(saved) = &config.overrides.game_dir {
        let normalized = normalize_custom_path(saved);
        if is_valid_game_dir(config.platform, &normalized) {
            return GameDirectory::Configured(normalized);
        }
        debug!("Saved game directory {:?} failed marker validation", saved);
    }

    for library in steam_libraries(config) {
        let candidate = library
            .join("steamapps")
            .join("common")
            .join(GAME_DIR_NAME);
        if is_valid_game_dir(config.platform, &candidate) {
            return GameDirectory::Configured(candidate);
        }
    }

    GameDirectory::Unconfigured
}

/// Known Steam library roots for the platform.
fn steam_libraries(config: &AppConfig) -> Vec<PathBuf> {
    match config.platform {
        Platform::Windows => {
            let install = steam_install_path_windows();
            let vdf = install.join("steamapps").join("libraryfolders.vdf");
            let mut libraries = vec![install];
            if let Ok(contents) = std::fs::read_to_string(&vdf) {
                libraries.extend(parse_library_folders_vdf(&contents));
            }
            dedup_case_insensitive(libraries)
        }
        Platform::MacOs => vec![config
            .home_dir
            .join("Library")
            .join("Application Support")
            .join("Steam")],
        Platform::Linux => vec![config
            .home_dir
            .join(".local")
            .join("share")
            .join("Steam")],
    }
}

/// Steam install root from the registry, falling back to the stock path.
fn steam_install_path_windows() -> PathBuf {
    let fallback = PathBuf::from("C:\\Program Files (x86)\\Steam");
    let output = Command::new("reg")
        .args([
            "query",
            "HKLM\\SOFTWARE\\WOW6432Node\\Valve\\Steam",
            "/v",
            "InstallPath",
        ])
        .output();
    let Ok(output) = output else {
        return fallback;
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        let line = line.trim();
        if line.to_ascii_lowercase().starts_with("installpath") {
            if let Some(value) = line.split("    ").last() {
                let value = value.trim();
                if !value.is_empty() {
                    return PathBuf::from(value);
                }
            }
        }
    }
    fallback
}

/// Extra library paths declared in `libraryfolders.vdf`.
fn parse_library_folders_vdf(contents: &str) -> Vec<PathBuf> {
    let re = Regex::new(r#""path"\s*"([^"]+)""#).expect("static pattern");
    re.captures_iter(contents)
        .map(|c| PathBuf::from(c[1].replace("\\\\", "\\")))
        .collect()
}

fn dedup_case_insensitive(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for path in paths {
        let key = path.to_string_lossy().to_lowercase();
        if seen.insert(key) {
            out.push(path);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{Arch, Overrides};

    fn linux_config(home: &Path) -> AppConfig {
        AppConfig::with_home(Platform::Linux, Arch::X86_64, home.to_path_buf())
    }

    #[test]
    fn linux_mods_dir_defaults_to_proton_prefix() {
        let config = linux_config(Path::new("/home/jim"));
        let dir = mods_dir(&config);
        let expected = format!(
            "/home/jim/.local/share/Steam/steamapps/compatdata/{STEAM_APP_ID}/pfx/drive_c/users/steamuser/AppData/Roaming/Balatro/Mods"
        );
        assert_eq!(dir, PathBuf::from(expected));
    }

    #[test]
    fn linux_mods_override_wins() {
        let config = linux_config(Path::new("/home/jim")).with_overrides(Overrides {
            game_dir: None,
            linux_mods_dir: Some(PathBuf::from("/mnt/games/pfx/Balatro/Mods")),
        });
        assert_eq!(mods_dir(&config), PathBuf::from("/mnt/games/pfx/Balatro/Mods"));
        assert_eq!(
            version_cache_dir(&config),
            PathBuf::from("/mnt/games/pfx/Balatro/ModVersions")
        );
    }

    #[test]
    fn windows_mods_dir_under_roaming_profile() {
        let config = AppConfig::with_home(
            Platform::Windows,
            Arch::X86_64,
            PathBuf::from("C:\\Users\\jim"),
        );
        assert_eq!(
            mods_dir(&config),
            PathBuf::from("C:\\Users\\jim")
                .join("AppData")
                .join("Roaming")
                .join("Balatro")
                .join("Mods")
        );
    }

    #[test]
    fn vdf_paths_are_extracted() {
        let vdf = r#"
"libraryfolders"
{
    "0"
    {
        "path"		"C:\\Program Files (x86)\\Steam"
    }
    "1"
    {
        "path"		"D:\\SteamLibrary"
    }
}
"#;
        let paths = parse_library_folders_vdf(vdf);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[1], PathBuf::from("D:\\SteamLibrary"));
    }

    #[test]
    fn exe_path_is_normalized_to_parent() {
        assert_eq!(
            normalize_custom_path(Path::new("/games/Balatro/Balatro.exe")),
            PathBuf::from("/games/Balatro")
        );
        assert_eq!(
            normalize_custom_path(Path::new("/games/Balatro")),
            PathBuf::from("/games/Balatro")
        );
    }

    #[test]
    fn marker_validation_accepts_proton_layout() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_valid_game_dir(Platform::Linux, dir.path()));
        std::fs::write(dir.path().join("Balatro.exe"), "mz").unwrap();
        assert!(is_valid_game_dir(Platform::Linux, dir.path()));
    }

    #[test]
    fn unconfigured_when_nothing_found() {
        let home = tempfile::tempdir().unwrap();
        let config = linux_config(home.path());
        assert_eq!(resolve_game_dir(&config), GameDirectory::Unconfigured);
    }

    #[test]
    fn valid_override_is_preferred() {
        let home = tempfile::tempdir().unwrap();
        let game = tempfile::tempdir().unwrap();
        std::fs::write(game.path().join("Balatro.exe"), "mz").unwrap();
        let config = linux_config(home.path()).with_overrides(Overrides {
            game_dir: Some(game.path().to_path_buf()),
            linux_mods_dir: None,
        });
        assert_eq!(
            resolve_game_dir(&config),
            GameDirectory::Configured(game.path().to_path_buf())
        );
    }
}

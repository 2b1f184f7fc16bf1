// ─── Installed-Mod Scanner ───
// Read-only discovery of installed mod copies. Records are always recomputed
// from disk; the game and the user both edit the mods tree behind our back.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::core::error::{CompanionError, CompanionResult};
use crate::core::fsutil;

/// Declared name the mod-loading framework uses in its manifest.
const MOD_FRAMEWORK_NAME: &str = "Steamodded";

/// Ids the multiplayer mod declares in its JSON, primary first.
const MULTIPLAYER_IDS: [&str; 2] = ["Multiplayer", "BalatroMultiplayer"];

/// Pre-manifest installs of the framework used a fixed directory name.
pub const LEGACY_FRAMEWORK_DIR: &str = "smods";

/// One of the three independently-versioned installable components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalMod {
    MultiplayerMod,
    LoaderFramework,
    ModFramework,
}

impl LogicalMod {
    /// Prefix keying this mod's entries in the version cache.
    pub fn cache_prefix(&self) -> &'static str {
        match self {
            LogicalMod::MultiplayerMod => "multiplayer",
            LogicalMod::LoaderFramework => "lovely",
            LogicalMod::ModFramework => "smods",
        }
    }
}

/// Transient identity record for one installed directory. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct InstalledModRecord {
    pub logical_mod: LogicalMod,
    pub version: String,
    pub path: PathBuf,
}

/// Outcome of probing a single directory against the identity matchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityMatch {
    Found { logical_mod: LogicalMod, version: String },
    NotFound,
}

fn version_lua_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"return\s*"([^"]+)""#).expect("static pattern"))
}

/// Probe one directory with the matcher strategies in priority order:
/// framework manifest, multiplayer JSON id, nothing. The legacy fixed-name
/// fallback is the scanner's job, not the matcher's, because it only applies
/// when no manifest matched anywhere.
pub fn match_directory(dir: &Path) -> IdentityMatch {
    if let Some(version) = match_framework_manifest(dir) {
        return IdentityMatch::Found {
            logical_mod: LogicalMod::ModFramework,
            version,
        };
    }
    if let Some(version) = match_multiplayer_json(dir) {
        return IdentityMatch::Found {
            logical_mod: LogicalMod::MultiplayerMod,
            version,
        };
    }
    IdentityMatch::NotFound
}

/// `manifest.json` with the framework's declared name. Version priority:
/// companion `version.lua`, manifest `version` field, `"unknown"`.
fn match_framework_manifest(dir: &Path) -> Option<String> {
    let manifest_path = dir.join("manifest.json");
    let manifest = fsutil::read_json(&manifest_path).ok()?;
    let name = manifest.get("name")?.as_str()?;
    if !name.eq_ignore_ascii_case(MOD_FRAMEWORK_NAME) {
        return None;
    }

    if let Some(version) = framework_lua_version(dir) {
        return Some(version);
    }
    if let Some(version) = manifest.get("version").and_then(|v| v.as_str()) {
        return Some(version.to_string());
    }
    Some("unknown".to_string())
}

/// The framework declares its version as `return "x.y.z"` in `version.lua`.
fn framework_lua_version(dir: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(dir.join("version.lua")).ok()?;
    version_lua_re()
        .captures(&raw)
        .map(|c| c[1].to_string())
}

/// Any `.json` file whose `id` is one of the multiplayer mod's known ids.
fn match_multiplayer_json(dir: &Path) -> Option<String> {
    let entries = fsutil::list_entries(dir).ok()?;
    for entry in entries {
        if entry.extension().map(|e| e == "json").unwrap_or(false) {
            let Ok(json) = fsutil::read_json(&entry) else {
                continue;
            };
            let Some(id) = json.get("id").and_then(|v| v.as_str()) else {
                continue;
            };
            if MULTIPLAYER_IDS.contains(&id) {
                let version = json
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                return Some(version);
            }
        }
    }
    None
}

/// Legacy framework install: a fixed-name directory with no manifest.
/// Version comes from any contained JSON with a `version` field.
fn legacy_framework_record(mods_dir: &Path) -> Option<InstalledModRecord> {
    let dir = mods_dir.join(LEGACY_FRAMEWORK_DIR);
    if !dir.is_dir() {
        return None;
    }
    let mut version = None;
    if let Ok(entries) = fsutil::list_entries(&dir) {
        for entry in entries {
            if entry.extension().map(|e| e == "json").unwrap_or(false) {
                if let Ok(json) = fsutil::read_json(&entry) {
                    if let Some(v) = json.get("version").and_then(|v| v.as_str()) {
                        version = Some(v.to_string());
                        break;
                    }
                }
            }
        }
    }
    Some(InstalledModRecord {
        logical_mod: LogicalMod::ModFramework,
        version: version.unwrap_or_else(|| "unknown".to_string()),
        path: dir,
    })
}

/// Walk the mods directory and report every installed copy of every logical
/// mod. More than one record per logical mod is the caller-visible conflict
/// state; the scanner never resolves it.
///
/// Fails with `DirectoryUnavailable` only when the mods directory is missing
/// and cannot be created.
pub fn scan_installed_mods(mods_dir: &Path) -> CompanionResult<Vec<InstalledModRecord>> {
    if !mods_dir.exists() {
        std::fs::create_dir_all(mods_dir).map_err(|source| {
            CompanionError::DirectoryUnavailable {
                path: mods_dir.to_path_buf(),
                source,
            }
        })?;
    }

    let mut records = Vec::new();
    for dir in fsutil::list_subdirs(mods_dir)? {
        match match_directory(&dir) {
            IdentityMatch::Found {
                logical_mod,
                version,
            } => records.push(InstalledModRecord {
                logical_mod,
                version,
                path: dir,
            }),
            IdentityMatch::NotFound => {}
        }
    }

    let has_framework = records
        .iter()
        .any(|r| r.logical_mod == LogicalMod::ModFramework);
    if !has_framework {
        if let Some(record) = legacy_framework_record(mods_dir) {
            records.push(record);
        }
    }

    let multiplayer_copies = records
        .iter()
        .filter(|r| r.logical_mod == LogicalMod::MultiplayerMod)
        .count();
    if multiplayer_copies > 1 {
        warn!(
            "{multiplayer_copies} multiplayer mod copies installed at once; the game will crash until one is kept"
        );
    }

    Ok(records)
}

/// Loader-framework presence check. The loader lives in the game directory,
/// not the mods tree, and carries no version marker on disk.
pub fn is_loader_framework_installed(platform: crate::core::config::Platform, game_dir: &Path) -> bool {
    use crate::core::config::Platform;
    match platform {
        Platform::Windows | Platform::Linux => game_dir.join("version.dll").exists(),
        Platform::MacOs => {
            game_dir.join("liblovely.dylib").exists()
                && game_dir.join("run_lovely_macos.sh").exists()
        }
    }
}

/// The framework copy compatibility checks should trust when several are
/// installed at once. Path order keeps the pick stable across scans instead
/// of depending on directory enumeration order.
pub fn preferred_framework_record(
    records: &[InstalledModRecord],
) -> Option<&InstalledModRecord> {
    let mut copies: Vec<&InstalledModRecord> = records
        .iter()
        .filter(|r| r.logical_mod == LogicalMod::ModFramework)
        .collect();
    copies.sort_by(|a, b| a.path.cmp(&b.path));
    if copies.len() > 1 {
        warn!(
            "{} mod framework copies installed; using the one at {:?}",
            copies.len(),
            copies[0].path
        );
    }
    copies.into_iter().next()
}

/// Installed versions of one logical mod, in scan order.
pub fn installed_versions(
    mods_dir: &Path,
    logical_mod: LogicalMod,
) -> CompanionResult<Vec<InstalledModRecord>> {
    Ok(scan_installed_mods(mods_dir)?
        .into_iter()
        .filter(|r| r.logical_mod == logical_mod)
        .collect())
}

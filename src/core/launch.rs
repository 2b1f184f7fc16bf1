// ─── Launch Strategy Selector ───
// Prefers a Steam-protocol launch (Steam injects the user's launch options
// and, on Linux, selects the Proton runtime); falls back to spawning the
// executable directly when Steam does not pick the request up. Launching is
// independent of installation state.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use sysinfo::System;
use tracing::{info, warn};

use crate::core::config::{AppConfig, Platform};
use crate::core::error::{CompanionError, CompanionResult};
use crate::core::paths::{self, GameDirectory, STEAM_APP_ID};
use crate::core::scan;

/// How long Steam gets to bring the game up before we fall back.
const PROTOCOL_GRACE: Duration = Duration::from_secs(10);

const GAME_PROCESS_NEEDLE: &str = "balatro";

pub async fn launch_game(config: &AppConfig) -> CompanionResult<()> {
    let game_dir = match paths::resolve_game_dir(config) {
        GameDirectory::Configured(dir) => dir,
        GameDirectory::Unconfigured => {
            return Err(CompanionError::LaunchFailed(
                "game directory not configured".into(),
            ))
        }
    };

    info!("Launching via the Steam protocol...");
    if try_steam_protocol(config).await {
        return Ok(());
    }

    warn!("Steam did not start the game, falling back to direct launch");
    launch_direct(config, &game_dir)
}

/// Hand the run request to Steam and wait a grace period for the game
/// process to appear.
async fn try_steam_protocol(config: &AppConfig) -> bool {
    let url = format!("steam://rungameid/{STEAM_APP_ID}");
    let spawned = match config.platform {
        Platform::Windows => Command::new("cmd").args(["/C", "start", "", &url]).spawn(),
        Platform::MacOs => Command::new("open").arg(&url).spawn(),
        Platform::Linux => Command::new("xdg-open").arg(&url).spawn(),
    };
    if let Err(e) = spawned {
        warn!("Steam protocol handler unavailable: {e}");
        return false;
    }

    tokio::time::sleep(PROTOCOL_GRACE).await;
    game_process_running()
}

fn game_process_running() -> bool {
    let sys = System::new_all();
    sys.processes().values().any(|p| {
        p.name()
            .to_string_lossy()
            .to_lowercase()
            .contains(GAME_PROCESS_NEEDLE)
    })
}

fn launch_direct(config: &AppConfig, game_dir: &Path) -> CompanionResult<()> {
    match config.platform {
        Platform::Windows => {
            let exe = find_executable_in_directory(game_dir).ok_or_else(|| {
                CompanionError::LaunchFailed(format!("no executable found in {game_dir:?}"))
            })?;
            Command::new(&exe)
                .current_dir(game_dir)
                .spawn()
                .map_err(|e| CompanionError::LaunchFailed(e.to_string()))?;
            info!("Launched game from {:?}", exe);
            Ok(())
        }
        Platform::MacOs => {
            let binary = game_dir
                .join("Balatro.app")
                .join("Contents")
                .join("MacOS")
                .join("love");
            let mut cmd = Command::new(&binary);
            cmd.current_dir(game_dir);
            // Inject the loader when it is installed; the game runs
            // unmodded otherwise.
            if scan::is_loader_framework_installed(Platform::MacOs, game_dir) {
                cmd.env(
                    "DYLD_INSERT_LIBRARIES",
                    game_dir.join("liblovely.dylib"),
                );
            }
            cmd.spawn()
                .map_err(|e| CompanionError::LaunchFailed(e.to_string()))?;
            info!("Launched game from {:?}", binary);
            Ok(())
        }
        // The Windows binary only runs under Proton, and only Steam can set
        // that up.
        Platform::Linux => Err(CompanionError::LaunchFailed(
            "Steam is required to launch the game under Proton".into(),
        )),
    }
}

/// Pick the game executable: any `.exe`, preferring one named after the
/// game.
fn find_executable_in_directory(dir: &Path) -> Option<PathBuf> {
    let mut executables: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|e| e.eq_ignore_ascii_case("exe"))
                    .unwrap_or(false)
        })
        .collect();
    executables.sort();

    executables
        .iter()
        .find(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_lowercase().contains(GAME_PROCESS_NEEDLE))
                .unwrap_or(false)
        })
        .cloned()
        .or_else(|| executables.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_named_executable_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("UnityCrashHandler.exe"), "mz").unwrap();
        std::fs::write(dir.path().join("Balatro.exe"), "mz").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "hi").unwrap();

        let exe = find_executable_in_directory(dir.path()).unwrap();
        assert!(exe.ends_with("Balatro.exe"));
    }

    #[test]
    fn any_executable_is_a_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("game.exe"), "mz").unwrap();
        let exe = find_executable_in_directory(dir.path()).unwrap();
        assert!(exe.ends_with("game.exe"));
    }

    #[test]
    fn empty_directory_has_no_executable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_executable_in_directory(dir.path()).is_none());
    }
}

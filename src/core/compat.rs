// ─── Compatibility Checker ───
// Compares the installed multiplayer mod's declared framework pin against
// the framework version actually on disk. Absence of a component is an
// incomplete setup, not a conflict; it is reported elsewhere.

use serde::Serialize;

use crate::core::catalog::{DependencyPins, ReleaseDescriptor};
use crate::core::scan::{InstalledModRecord, LogicalMod};

/// Derived verdict; never stored.
#[derive(Debug, Clone, Serialize)]
pub struct CompatibilityResult {
    pub compatible: bool,
    pub message: Option<String>,
    /// A multiplayer version whose pin matches the installed framework, when
    /// one exists; an escape hatch the user can install instead.
    pub remediation_version: Option<String>,
}

impl CompatibilityResult {
    fn ok() -> Self {
        Self {
            compatible: true,
            message: None,
            remediation_version: None,
        }
    }
}

/// Normalize a version string for pin comparison: case-fold, unify the
/// tilde/hyphen build-tag separators, drop the framework's descriptive
/// suffix token.
pub fn normalize_version(version: &str) -> String {
    let folded = version.to_lowercase().replace('~', "-");
    folded
        .strip_suffix("-steamodded")
        .map(|s| s.to_string())
        .unwrap_or(folded)
}

fn versions_match(a: &str, b: &str) -> bool {
    normalize_version(a) == normalize_version(b)
}

/// Check every installed multiplayer copy against the installed framework
/// version. The first pinned mismatch wins; a missing catalog entry for an
/// installed version is treated as unpinned.
pub fn check(
    installed: &[InstalledModRecord],
    framework_version: Option<&str>,
    releases: &[ReleaseDescriptor],
) -> CompatibilityResult {
    let Some(framework_version) = framework_version else {
        return CompatibilityResult::ok();
    };

    let multiplayer: Vec<_> = installed
        .iter()
        .filter(|r| r.logical_mod == LogicalMod::MultiplayerMod)
        .collect();
    if multiplayer.is_empty() {
        return CompatibilityResult::ok();
    }

    for record in multiplayer {
        let Some(release) = releases.iter().find(|r| r.version == record.version) else {
            continue;
        };
        let Some(pin) = DependencyPins::effective(&release.pins.mod_framework) else {
            continue;
        };
        if versions_match(pin, framework_version) {
            continue;
        }

        let remediation = releases
            .iter()
            .find(|r| {
                DependencyPins::effective(&r.pins.mod_framework)
                    .map(|p| versions_match(p, framework_version))
                    .unwrap_or(false)
            })
            .map(|r| r.version.clone());

        return CompatibilityResult {
            compatible: false,
            message: Some(format!(
                "Multiplayer {} expects mod framework {}, but {} is installed",
                record.version, pin, framework_version
            )),
            remediation_version: remediation,
        };
    }

    CompatibilityResult::ok()
}

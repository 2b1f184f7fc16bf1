pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::app::Companion;
pub use crate::core::catalog::{DependencyPins, ReleaseDescriptor};
pub use crate::core::compat::CompatibilityResult;
pub use crate::core::config::{AppConfig, Arch, Overrides, Platform};
pub use crate::core::error::{CompanionError, CompanionResult};
pub use crate::core::install::InstallOutcome;
pub use crate::core::progress::InstallProgress;
pub use crate::core::scan::{InstalledModRecord, LogicalMod};

/// Initialize structured logging for the embedding shell.
///
/// Call once at startup; respects `RUST_LOG` when set.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mp_companion=debug")),
        )
        .init();
}

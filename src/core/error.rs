use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the whole engine.
/// Every module returns `Result<T, CompanionError>`.
#[derive(Debug, Error)]
pub enum CompanionError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Directory unavailable at {path:?}: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote fetch failed for {url}: HTTP {status}")]
    RemoteStatus { url: String, status: u16 },

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── Catalog ─────────────────────────────────────────
    #[error("Version not found in the release catalog: {0}")]
    VersionNotFound(String),

    // ── Archive ─────────────────────────────────────────
    #[error("Corrupt archive: {0}")]
    CorruptArchive(#[from] zip::result::ZipError),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Archive contained no payload")]
    EmptyArchive,

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Orchestration ───────────────────────────────────
    #[error("Another installation is already in progress")]
    InstallInProgress,

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    // ── Launch ──────────────────────────────────────────
    #[error("Failed to launch the game: {0}")]
    LaunchFailed(String),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type CompanionResult<T> = Result<T, CompanionError>;

impl From<std::io::Error> for CompanionError {
    fn from(source: std::io::Error) -> Self {
        CompanionError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// ── Serialization for IPC surfaces ──────────────────────
// Shells ferry errors to their UI as display strings.
impl serde::Serialize for CompanionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

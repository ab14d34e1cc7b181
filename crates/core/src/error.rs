use thiserror::Error;

pub type ConsoleResult<T> = Result<T, ConsoleError>;

/// Failure taxonomy for the console core. Only `ManifestConflict` is fatal
/// to shell start-up; every other variant has a local containment strategy
/// (denied view, default fallback, broken status, buffered retry).
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Access to module '{module}' denied: missing capability '{required}'")]
    PermissionDenied { module: String, required: String },

    #[error("Unknown module: {0}")]
    ModuleNotFound(String),

    #[error("Manifest conflict: {0}")]
    ManifestConflict(String),

    #[error("Module probe failed: {0}")]
    ModuleProbe(String),

    #[error("Audit sink unavailable: {0}")]
    AuditSink(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

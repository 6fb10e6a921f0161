use sysalloc_core::SysAllocError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("allocator init failed: {0}")]
    Init(#[from] SysAllocError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

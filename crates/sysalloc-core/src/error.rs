//! Errors surfaced by [`crate::SystemAllocator`].
//!
//! Per-backend failures ([`crate::BackendFailure`]) never reach the caller
//! directly: they are absorbed by the fallback policy and only the aggregate
//! outcome is reported here.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SysAllocError {
    /// Every enabled backend failed for this request. Failure flags have
    /// already been reset when this is returned.
    #[error("out of memory: no backend could supply {size} bytes aligned to {alignment}")]
    OutOfMemory { size: usize, alignment: usize },
    /// The backend table could not be built.
    #[error("system allocator initialization failed: {0}")]
    InitializationFailure(String),
    #[error("alignment {0} is not a power of two")]
    InvalidAlignment(usize),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SysAllocError {
    /// True for the errors a C caller sees as a null return.
    #[must_use]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(
            self,
            Self::OutOfMemory { .. } | Self::InitializationFailure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_request() {
        let err = SysAllocError::OutOfMemory {
            size: 4096,
            alignment: 64,
        };
        let text = err.to_string();
        assert!(text.contains("4096"));
        assert!(text.contains("64"));
    }

    #[test]
    fn init_failure_counts_as_oom() {
        assert!(SysAllocError::InitializationFailure("no table".into()).is_out_of_memory());
        assert!(
            SysAllocError::OutOfMemory {
                size: 1,
                alignment: 16
            }
            .is_out_of_memory()
        );
        assert!(!SysAllocError::InvalidAlignment(3).is_out_of_memory());
    }
}

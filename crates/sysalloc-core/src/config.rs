//! System allocator configuration.
//!
//! Defaults come from the OS; overrides come from the environment:
//! - `SYSALLOC_SKIP_SBRK`: never grow the heap break (`1|true|yes|on`).
//! - `SYSALLOC_SKIP_MMAP`: never create anonymous mappings.
//! - `SYSALLOC_LOG_CAPACITY`: lifecycle records kept before the oldest drop.
//!
//! Unparseable values fall back to the default for that field.

use crate::error::SysAllocError;
use crate::syscall;

pub const ENV_SKIP_SBRK: &str = "SYSALLOC_SKIP_SBRK";
pub const ENV_SKIP_MMAP: &str = "SYSALLOC_SKIP_MMAP";
pub const ENV_LOG_CAPACITY: &str = "SYSALLOC_LOG_CAPACITY";

/// Lifecycle records retained by default.
pub const DEFAULT_LOG_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysAllocConfig {
    /// Leave the growth backend disabled.
    pub skip_growth: bool,
    /// Leave the mapping backend disabled.
    pub skip_mapping: bool,
    /// Page granularity for mapping and release rounding. Must equal the
    /// OS page size: mapping trims and `madvise` both work in OS pages.
    pub page_size: usize,
    /// Ring capacity for lifecycle records; 0 disables recording.
    pub log_capacity: usize,
}

impl Default for SysAllocConfig {
    fn default() -> Self {
        Self {
            skip_growth: false,
            skip_mapping: false,
            page_size: syscall::page_size(),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Parse a boolean switch (case-insensitive).
#[must_use]
pub fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

impl SysAllocConfig {
    /// Defaults overridden by the `SYSALLOC_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SysAllocConfig::from_env`] with an explicit variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(skip) = lookup(ENV_SKIP_SBRK).as_deref().and_then(parse_switch) {
            config.skip_growth = skip;
        }
        if let Some(skip) = lookup(ENV_SKIP_MMAP).as_deref().and_then(parse_switch) {
            config.skip_mapping = skip;
        }
        if let Some(capacity) = lookup(ENV_LOG_CAPACITY).and_then(|v| v.trim().parse().ok()) {
            config.log_capacity = capacity;
        }
        config
    }

    /// Reject configurations that could never serve a request.
    pub fn validate(&self) -> Result<(), SysAllocError> {
        if self.skip_growth && self.skip_mapping {
            return Err(SysAllocError::InvalidConfig(
                "both sbrk and mmap are disabled".into(),
            ));
        }
        if !self.page_size.is_power_of_two() {
            return Err(SysAllocError::InvalidConfig(format!(
                "page size {} is not a power of two",
                self.page_size
            )));
        }
        let os_page = syscall::page_size();
        if self.page_size != os_page {
            return Err(SysAllocError::InvalidConfig(format!(
                "page size {} differs from the OS page size {os_page}",
                self.page_size
            )));
        }
        Ok(())
    }
}

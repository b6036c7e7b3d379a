//! Process-wide defaults for buffer handles.
//!
//! The configuration is fixed once per process. Call [`init`] before the first
//! buffer is created; otherwise [`get`] lazily installs
//! [`BufferConfig::default`].

use crate::sync::OnceLock;

/// Default alignment for `Backend::default_aligned`.
pub const DEFAULT_ALIGNMENT: usize = 512;

/// Default CRC-32 staging chunk, in bytes.
pub const DEFAULT_CRC_CHUNK_LEN: usize = 1024;

/// Default initial commit for private heaps (one page).
pub const DEFAULT_PRIVATE_HEAP_SIZE: usize = 4096;

/// Configuration for buffer handles. All fields have sensible defaults.
/// Set at init time via [`init`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferConfig {
    /// Zero-fill fresh memory and the grown tail of a resize. Default: true.
    pub zero_on_alloc: bool,

    /// Report footprint changes through `memory::pressure`. Default: true.
    pub report_pressure: bool,

    /// Alignment used by `Backend::default_aligned`. Must be a power of two.
    /// Default: 512.
    pub default_alignment: usize,

    /// Size of the staging chunk the checksum walks the buffer with.
    /// Default: 1024.
    pub crc_chunk_len: usize,

    /// Initial size handed to `PrivateHeap::with_default_size`. Default: 4096.
    pub private_heap_initial_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            zero_on_alloc: true,
            report_pressure: true,
            default_alignment: DEFAULT_ALIGNMENT,
            crc_chunk_len: DEFAULT_CRC_CHUNK_LEN,
            private_heap_initial_size: DEFAULT_PRIVATE_HEAP_SIZE,
        }
    }
}

impl BufferConfig {
    /// Replace out-of-range values with their defaults.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if !self.default_alignment.is_power_of_two() {
            tracing::warn!(
                alignment = self.default_alignment,
                "default alignment is not a power of two, using {DEFAULT_ALIGNMENT}"
            );
            self.default_alignment = DEFAULT_ALIGNMENT;
        }
        if self.crc_chunk_len == 0 {
            self.crc_chunk_len = DEFAULT_CRC_CHUNK_LEN;
        }
        if self.private_heap_initial_size == 0 {
            self.private_heap_initial_size = DEFAULT_PRIVATE_HEAP_SIZE;
        }
        self
    }
}

static GLOBAL_CONFIG: OnceLock<BufferConfig> = OnceLock::new();

/// Install the process-wide configuration.
///
/// # Errors
///
/// Returns the rejected configuration if one is already installed, either by
/// an earlier `init` or implicitly by [`get`].
pub fn init(config: BufferConfig) -> Result<(), BufferConfig> {
    GLOBAL_CONFIG.set(config.normalized())
}

/// The process-wide configuration, installing the default on first use.
pub fn get() -> &'static BufferConfig {
    GLOBAL_CONFIG.get_or_init(BufferConfig::default)
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BufferConfig::default();
        assert!(config.zero_on_alloc);
        assert!(config.report_pressure);
        assert_eq!(config.default_alignment, 512);
        assert_eq!(config.crc_chunk_len, 1024);
        assert_eq!(config.private_heap_initial_size, 4096);
    }

    #[test]
    fn test_normalized_repairs_bad_values() {
        let config = BufferConfig {
            default_alignment: 48,
            crc_chunk_len: 0,
            private_heap_initial_size: 0,
            ..BufferConfig::default()
        }
        .normalized();
        assert_eq!(config, BufferConfig::default());
    }

    #[test]
    fn test_get_is_stable_and_init_after_get_fails() {
        let first = get();
        let second = get();
        assert!(std::ptr::eq(first, second));
        assert!(init(BufferConfig::default()).is_err());
    }
}

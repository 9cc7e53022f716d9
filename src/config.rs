//! Configuration and resource limits.

/// Resource limits that keep a hostile peer from exhausting memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum payload of a single frame in bytes.
    ///
    /// Default: 16 MB.
    pub max_frame_size: usize,

    /// Maximum size of a complete message in bytes, measured after
    /// extension processing (i.e. decompressed).
    ///
    /// Default: 64 MB.
    pub max_message_size: usize,

    /// Maximum size of the buffered handshake head in bytes.
    ///
    /// Default: 8 KB.
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            max_message_size: 64 * 1024 * 1024,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_handshake_size,
        }
    }

    /// Limits suitable for constrained deployments.
    ///
    /// - Max frame: 64 KB
    /// - Max message: 256 KB
    /// - Max handshake: 4 KB
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_frame_size: 64 * 1024,
            max_message_size: 256 * 1024,
            max_handshake_size: 4096,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,
}

impl Config {
    /// Create a configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}

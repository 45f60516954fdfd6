//! Configuration for the plugin host
//!
//! Bounds the host applies to control requests and harness mutations,
//! and how hard a transaction sink is pushed to storage after each line.

/// How a sink is flushed after each appended record line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Flush userspace buffers only; the line reaches the OS page cache
    Flush,
    /// Flush and force the line to persistent media (fdatasync and friends)
    Durable,
}

/// Host configuration with presets
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Longest sink path a control request may carry (the host's path buffer)
    pub max_sink_path_len: usize,
    /// Longest key prefix a control request may carry
    pub max_key_prefix_len: usize,
    /// Maximum key size in bytes accepted by the harness store
    pub max_key_size: usize,
    /// Maximum value size in bytes accepted by the harness store
    pub max_value_size: usize,
    /// Sink flushing policy
    pub sync_mode: SyncMode,
}

impl HostConfig {
    /// Page-cache flush per record line. Fast enough for the hot mutation path.
    pub fn fast() -> Self {
        Self {
            max_sink_path_len: 255,
            max_key_prefix_len: 250,
            max_key_size: 250,
            max_value_size: 1024 * 1024,
            sync_mode: SyncMode::Flush,
        }
    }

    /// Durable sync per record line. Every logged mutation survives power loss.
    pub fn durable() -> Self {
        Self {
            sync_mode: SyncMode::Durable,
            ..Self::fast()
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.max_sink_path_len == 0 || self.max_sink_path_len > 4096 {
            return Err("max_sink_path_len must be in [1, 4096]".into());
        }
        if self.max_key_size == 0 || self.max_key_size > 64 * 1024 {
            return Err("max_key_size must be in [1, 64KB]".into());
        }
        if self.max_key_prefix_len > self.max_key_size {
            return Err("max_key_prefix_len must not exceed max_key_size".into());
        }
        if self.max_value_size == 0 || self.max_value_size > 128 * 1024 * 1024 {
            return Err("max_value_size must be in [1, 128MB]".into());
        }
        Ok(())
    }
}

impl Default for HostConfig {
    fn default() -> Self { Self::fast() }
}

//! CRC32C attribute
//!
//! Stores the CRC32C of `key ++ value` (4 bytes, little-endian) next to every
//! record so readers can detect torn or corrupted values.

use storehook_core::{AttributePlugin, PluginError, PluginResult};

/// Version reported by the plugin
pub const VERSION: &str = concat!("crc32c/", env!("CARGO_PKG_VERSION"));

/// Attribute key the checksum is stored under
pub const KEY_NAME: &str = "crc32c";

/// Attribute plugin computing a record checksum
#[derive(Debug, Default, Clone, Copy)]
pub struct ChecksumPlugin;

impl ChecksumPlugin {
    /// Checksum of a key/value pair as stored by this plugin
    pub fn checksum(key: &[u8], value: &[u8]) -> u32 {
        crc32c::crc32c_append(crc32c::crc32c(key), value)
    }
}

impl AttributePlugin for ChecksumPlugin {
    fn version(&self) -> PluginResult<&str> {
        Ok(VERSION)
    }

    fn key_name(&self) -> PluginResult<&str> {
        Ok(KEY_NAME)
    }

    fn update(&mut self, key: &[u8], value: &[u8]) -> PluginResult<Vec<u8>> {
        if key.is_empty() || value.is_empty() {
            return Err(PluginError::RejectedInput {
                entry: "update",
                reason: "empty key or value",
            });
        }
        Ok(Self::checksum(key, value).to_le_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_covers_key_and_value() {
        let mut plugin = ChecksumPlugin;
        let a = plugin.update(b"key", b"value").unwrap();
        let b = plugin.update(b"key", b"valuf").unwrap();
        let c = plugin.update(b"kez", b"value").unwrap();
        assert_eq!(a.len(), 4);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_matches_contiguous_crc() {
        let mut plugin = ChecksumPlugin;
        let attr = plugin.update(b"user:1", b"alice").unwrap();
        assert_eq!(attr, crc32c::crc32c(b"user:1alice").to_le_bytes());
    }
}

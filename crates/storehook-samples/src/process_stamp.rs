//! Writer identity attribute
//!
//! Stamps every record with `<hostname>:<pid>:<uid>` of the process that
//! wrote it. The identity is captured once in `initialize`; `update` only
//! hands out a copy.

use storehook_core::{AttributePlugin, PluginError, PluginResult};

/// Version reported by the plugin
pub const VERSION: &str = concat!("process-stamp/", env!("CARGO_PKG_VERSION"));

/// Attribute key the stamp is stored under
pub const KEY_NAME: &str = "writer";

/// Attribute plugin recording which process wrote a record
#[derive(Debug, Default)]
pub struct ProcessStampPlugin {
    stamp: Option<Vec<u8>>,
}

impl ProcessStampPlugin {
    /// Uninitialized plugin
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp captured at initialization
    pub fn stamp(&self) -> Option<&[u8]> {
        self.stamp.as_deref()
    }
}

impl AttributePlugin for ProcessStampPlugin {
    fn initialize(&mut self) -> bool {
        let Some(host) = hostname() else {
            return false;
        };
        let stamp = format!("{}:{}:{}", host, std::process::id(), user_id());
        self.stamp = Some(stamp.into_bytes());
        true
    }

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
        self.stamp.clone().ok_or(PluginError::NotInitialized)
    }
}

#[cfg(unix)]
fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for writes of buf.len() bytes for the whole call.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Some(String::from_utf8_lossy(&buf[..end]).into_owned())
}

#[cfg(not(unix))]
fn hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok().or_else(|| Some("localhost".to_string()))
}

#[cfg(unix)]
fn user_id() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

#[cfg(not(unix))]
fn user_id() -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_contains_pid() {
        let mut plugin = ProcessStampPlugin::new();
        assert!(plugin.initialize());

        let stamp = plugin.update(b"k", b"v").unwrap();
        let text = String::from_utf8(stamp).unwrap();
        let fields: Vec<&str> = text.rsplitn(3, ':').collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[1], std::process::id().to_string());
    }

    #[test]
    fn test_stamp_is_stable() {
        let mut plugin = ProcessStampPlugin::new();
        plugin.initialize();
        assert_eq!(plugin.update(b"a", b"1").unwrap(), plugin.update(b"b", b"2").unwrap());
        let stored = plugin.stamp().map(<[u8]>::to_vec);
        assert_eq!(stored, Some(plugin.update(b"a", b"1").unwrap()));
    }

    #[test]
    fn test_update_before_initialize() {
        let mut plugin = ProcessStampPlugin::new();
        assert!(matches!(plugin.update(b"k", b"v"), Err(PluginError::NotInitialized)));
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let mut plugin = ProcessStampPlugin::new();
        plugin.initialize();
        assert!(plugin.update(b"", b"v").is_err());
        assert!(plugin.update(b"k", b"").is_err());
    }
}

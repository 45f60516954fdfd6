//! Attribute plugin contract
//!
//! An attribute plugin computes a derived value that the store attaches to
//! every record it writes, under a fixed attribute key chosen by the plugin.
//!
//! Lifecycle enforced by [`AttributeHost`]:
//!
//! ```text
//! [Loaded] --initialize() == true--> [Ready(descriptor)]
//! [Loaded] --initialize() == false--> [Inert]
//! ```
//!
//! Nothing but `initialize` is ever called on a plugin that is not `Ready`,
//! and `initialize` runs at most once per load.

use std::fmt;

use tracing::{info, warn};

use crate::error::{PluginError, PluginResult};

/// Capability set of a record-attribute extension.
///
/// Entry points other than `initialize` default to `NotOffered`, the
/// equivalent of a missing symbol in a shared library.
pub trait AttributePlugin: Send {
    /// One-time setup after load. `false` marks the plugin unusable.
    fn initialize(&mut self) -> bool {
        true
    }

    /// Stable identifying string
    fn version(&self) -> PluginResult<&str> {
        Err(PluginError::NotOffered { entry: "get_version" })
    }

    /// Attribute key the computed value is stored under. Constant per load.
    fn key_name(&self) -> PluginResult<&str> {
        Err(PluginError::NotOffered { entry: "get_key_name" })
    }

    /// Compute the attribute for a record about to be written.
    ///
    /// Must not touch store data; may read state captured in `initialize`.
    fn update(&mut self, _key: &[u8], _value: &[u8]) -> PluginResult<Vec<u8>> {
        Err(PluginError::NotOffered { entry: "update" })
    }
}

/// Version string a plugin reports, if it offers a usable one.
///
/// An empty string counts as not offered.
pub(crate) fn offered_version(result: PluginResult<&str>) -> Option<String> {
    match result {
        Ok("") => {
            warn!(entry = "get_version", "plugin reported an empty version, ignored");
            None
        }
        Ok(version) => Some(version.to_owned()),
        Err(_) => None,
    }
}

/// Identity of an initialized attribute plugin, captured once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    /// Version string, if offered
    pub version: Option<String>,
    /// Attribute key, if offered. Without one the plugin contributes nothing.
    pub key_name: Option<String>,
}

enum AttributeState {
    Loaded,
    Ready(AttributeDescriptor),
    Inert,
}

/// Host-side owner of one loaded attribute plugin
pub struct AttributeHost {
    plugin: Box<dyn AttributePlugin>,
    state: AttributeState,
}

impl AttributeHost {
    /// Take ownership of a freshly loaded, not yet initialized plugin
    pub fn new(plugin: Box<dyn AttributePlugin>) -> Self {
        Self { plugin, state: AttributeState::Loaded }
    }

    /// Run `initialize` and capture the descriptor.
    ///
    /// Re-initialization is refused with `AlreadyInitialized`; a plugin whose
    /// initialization failed stays inert.
    pub fn initialize(&mut self) -> PluginResult<&AttributeDescriptor> {
        match self.state {
            AttributeState::Loaded => {}
            AttributeState::Ready(_) => return Err(PluginError::AlreadyInitialized),
            AttributeState::Inert => return Err(PluginError::InitializationFailure),
        }

        if !self.plugin.initialize() {
            warn!(entry = "initialize", "attribute plugin initialization failed, plugin inert");
            self.state = AttributeState::Inert;
            return Err(PluginError::InitializationFailure);
        }

        let descriptor = AttributeDescriptor {
            version: offered_version(self.plugin.version()),
            key_name: self.plugin.key_name().ok().map(str::to_owned),
        };
        info!(
            version = descriptor.version.as_deref().unwrap_or("-"),
            key = descriptor.key_name.as_deref().unwrap_or("-"),
            "attribute plugin ready"
        );
        self.state = AttributeState::Ready(descriptor);
        self.descriptor()
    }

    /// Whether `initialize` succeeded
    pub fn is_ready(&self) -> bool {
        matches!(self.state, AttributeState::Ready(_))
    }

    /// Descriptor captured at initialization
    pub fn descriptor(&self) -> PluginResult<&AttributeDescriptor> {
        match &self.state {
            AttributeState::Ready(descriptor) => Ok(descriptor),
            AttributeState::Loaded => Err(PluginError::NotInitialized),
            AttributeState::Inert => Err(PluginError::InitializationFailure),
        }
    }

    /// Version string captured at initialization
    pub fn version(&self) -> PluginResult<&str> {
        self.descriptor()?
            .version
            .as_deref()
            .ok_or(PluginError::NotOffered { entry: "get_version" })
    }

    /// Query the plugin's attribute key
    pub fn key_name(&self) -> PluginResult<&str> {
        self.descriptor()?;
        self.plugin.key_name()
    }

    /// Compute the attribute for `key`/`value`.
    ///
    /// Empty key or value is rejected without reaching the plugin. The
    /// returned bytes belong to the caller.
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> PluginResult<Vec<u8>> {
        self.descriptor()?;
        if key.is_empty() {
            return Err(PluginError::RejectedInput { entry: "update", reason: "empty key" });
        }
        if value.is_empty() {
            return Err(PluginError::RejectedInput { entry: "update", reason: "empty value" });
        }
        self.plugin.update(key, value)
    }
}

impl fmt::Debug for AttributeHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            AttributeState::Loaded => "loaded",
            AttributeState::Ready(_) => "ready",
            AttributeState::Inert => "inert",
        };
        f.debug_struct("AttributeHost").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo {
        init_ok: bool,
    }

    impl AttributePlugin for Echo {
        fn initialize(&mut self) -> bool {
            self.init_ok
        }

        fn version(&self) -> PluginResult<&str> {
            Ok("echo-1")
        }

        fn key_name(&self) -> PluginResult<&str> {
            Ok("echo")
        }

        fn update(&mut self, key: &[u8], value: &[u8]) -> PluginResult<Vec<u8>> {
            Ok([key, value].concat())
        }
    }

    struct EmptyVersion;
    impl AttributePlugin for EmptyVersion {
        fn version(&self) -> PluginResult<&str> {
            Ok("")
        }
        fn key_name(&self) -> PluginResult<&str> {
            Ok("empty")
        }
    }

    struct VersionOnly;
    impl AttributePlugin for VersionOnly {
        fn version(&self) -> PluginResult<&str> {
            Ok("v")
        }
    }

    fn echo(init_ok: bool) -> AttributeHost {
        AttributeHost::new(Box::new(Echo { init_ok }))
    }

    #[test]
    fn test_initialize_captures_descriptor() {
        let mut host = echo(true);
        let descriptor = host.initialize().unwrap().clone();
        assert_eq!(descriptor.version.as_deref(), Some("echo-1"));
        assert_eq!(descriptor.key_name.as_deref(), Some("echo"));
        assert!(host.is_ready());
    }

    #[test]
    fn test_calls_before_initialize_refused() {
        let mut host = echo(true);
        assert!(matches!(host.key_name(), Err(PluginError::NotInitialized)));
        assert!(matches!(host.update(b"k", b"v"), Err(PluginError::NotInitialized)));
    }

    #[test]
    fn test_failed_initialize_is_inert() {
        let mut host = echo(false);
        assert!(matches!(host.initialize(), Err(PluginError::InitializationFailure)));
        assert!(!host.is_ready());
        assert!(matches!(host.version(), Err(PluginError::InitializationFailure)));
        assert!(matches!(host.update(b"k", b"v"), Err(PluginError::InitializationFailure)));
        assert!(matches!(host.initialize(), Err(PluginError::InitializationFailure)));
    }

    #[test]
    fn test_reinitialize_refused() {
        let mut host = echo(true);
        host.initialize().unwrap();
        assert!(matches!(host.initialize(), Err(PluginError::AlreadyInitialized)));
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let mut host = echo(true);
        host.initialize().unwrap();
        let cases: [(&[u8], &[u8]); 3] = [(b"", b"v"), (b"k", b""), (b"", b"")];
        for (key, value) in cases {
            assert!(matches!(host.update(key, value), Err(PluginError::RejectedInput { .. })));
        }
        assert_eq!(host.update(b"k", b"v").unwrap(), b"kv");
    }

    #[test]
    fn test_key_name_stable() {
        let mut host = echo(true);
        host.initialize().unwrap();
        assert_eq!(host.key_name().unwrap(), host.key_name().unwrap());
    }

    #[test]
    fn test_omitted_entry_points() {
        let mut host = AttributeHost::new(Box::new(VersionOnly));
        let descriptor = host.initialize().unwrap();
        assert_eq!(descriptor.key_name, None);
        assert!(matches!(
            host.update(b"k", b"v"),
            Err(PluginError::NotOffered { entry: "update" })
        ));
    }

    #[test]
    fn test_empty_version_not_offered() {
        let mut host = AttributeHost::new(Box::new(EmptyVersion));
        let descriptor = host.initialize().unwrap();
        assert_eq!(descriptor.version, None);
        assert!(matches!(host.version(), Err(PluginError::NotOffered { entry: "get_version" })));
        assert_eq!(host.key_name().unwrap(), "empty");
    }
}

//! Plugin resolution
//!
//! The store names extensions by filesystem path. [`PluginLoader`] maps paths
//! to factories registered in-process; every load builds a fresh plugin
//! instance with its own state, so two loads of the same path never share a
//! capture flag or sink. With the `dynamic-plugins` feature,
//! [`dynamic::DynamicPluginLoader`] resolves the same capabilities from shared
//! libraries instead.

use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::attribute::{AttributeHost, AttributePlugin};
use crate::config::HostConfig;
use crate::error::{PluginError, PluginResult};
use crate::transaction::{TransactionHost, TransactionPlugin};

type AttributeFactory = Box<dyn Fn() -> Box<dyn AttributePlugin> + Send + Sync>;
type TransactionFactory = Box<dyn Fn(&HostConfig) -> Box<dyn TransactionPlugin> + Send + Sync>;

/// Registry of plugin factories keyed by path
pub struct PluginLoader {
    attributes: RwLock<HashMap<PathBuf, AttributeFactory>>,
    transactions: RwLock<HashMap<PathBuf, TransactionFactory>>,
    config: HostConfig,
}

impl PluginLoader {
    /// Empty registry. `config` is handed to every transaction plugin it builds.
    pub fn new(config: HostConfig) -> Self {
        Self {
            attributes: RwLock::new(HashMap::new()),
            transactions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Register an attribute plugin under `path`
    pub fn register_attribute<P, F>(&self, path: P, factory: F) -> PluginResult<()>
    where
        P: AsRef<Path>,
        F: Fn() -> Box<dyn AttributePlugin> + Send + Sync + 'static,
    {
        let path = path.as_ref().to_path_buf();
        let mut attributes = self.attributes.write();
        if attributes.contains_key(&path) {
            return Err(PluginError::Load {
                message: format!("attribute plugin '{}' already registered", path.display()),
            });
        }
        attributes.insert(path, Box::new(factory));
        Ok(())
    }

    /// Register a transaction plugin under `path`
    pub fn register_transaction<P, F>(&self, path: P, factory: F) -> PluginResult<()>
    where
        P: AsRef<Path>,
        F: Fn(&HostConfig) -> Box<dyn TransactionPlugin> + Send + Sync + 'static,
    {
        let path = path.as_ref().to_path_buf();
        let mut transactions = self.transactions.write();
        if transactions.contains_key(&path) {
            return Err(PluginError::Load {
                message: format!("transaction plugin '{}' already registered", path.display()),
            });
        }
        transactions.insert(path, Box::new(factory));
        Ok(())
    }

    /// Load and initialize a fresh attribute plugin.
    ///
    /// A plugin whose `initialize` fails is still returned, inert; check
    /// [`AttributeHost::is_ready`].
    pub fn load_attribute<P: AsRef<Path>>(&self, path: P) -> PluginResult<AttributeHost> {
        let path = path.as_ref();
        let attributes = self.attributes.read();
        let factory = attributes
            .get(path)
            .ok_or_else(|| PluginError::NotFound { path: path.to_path_buf() })?;

        let mut host = AttributeHost::new(factory());
        match host.initialize() {
            Ok(_) => info!(path = %path.display(), "attribute plugin loaded"),
            Err(e) => warn!(path = %path.display(), error = %e, "attribute plugin loaded inert"),
        }
        Ok(host)
    }

    /// Load a fresh transaction plugin, capture disabled
    pub fn load_transaction<P: AsRef<Path>>(&self, path: P) -> PluginResult<TransactionHost> {
        let path = path.as_ref();
        let transactions = self.transactions.read();
        let factory = transactions
            .get(path)
            .ok_or_else(|| PluginError::NotFound { path: path.to_path_buf() })?;

        let host = TransactionHost::new(factory(&self.config));
        info!(
            path = %path.display(),
            version = host.version().unwrap_or("-"),
            "transaction plugin loaded"
        );
        Ok(host)
    }

    /// All registered paths, sorted
    pub fn registered(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .attributes
            .read()
            .keys()
            .chain(self.transactions.read().keys())
            .cloned()
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

#[cfg(feature = "dynamic-plugins")]
pub mod dynamic {
    //! Shared-library plugin loading
    //!
    //! A plugin library exports Rust-ABI entry functions:
    //! ```ignore
    //! #[no_mangle]
    //! pub fn storehook_attribute_plugin() -> Box<dyn AttributePlugin>;
    //! #[no_mangle]
    //! pub fn storehook_transaction_plugin(config: &HostConfig) -> Box<dyn TransactionPlugin>;
    //! ```
    //! A library lacking one of them does not offer that capability.

    use super::*;
    use libloading::Library;

    /// Entry symbol of the attribute capability
    pub const ATTRIBUTE_SYMBOL: &str = "storehook_attribute_plugin";
    /// Entry symbol of the transaction capability
    pub const TRANSACTION_SYMBOL: &str = "storehook_transaction_plugin";

    type AttributeEntry = fn() -> Box<dyn AttributePlugin>;
    type TransactionEntry = fn(&HostConfig) -> Box<dyn TransactionPlugin>;

    /// Loads plugins from shared libraries and keeps the libraries mapped
    /// for as long as the loader lives.
    pub struct DynamicPluginLoader {
        libraries: Vec<Library>,
        config: HostConfig,
    }

    impl DynamicPluginLoader {
        /// Create a loader
        pub fn new(config: HostConfig) -> Self {
            Self { libraries: Vec::new(), config }
        }

        /// Load and initialize the attribute plugin exported by `path`.
        ///
        /// # Safety
        /// Runs the library's initializers and trusts its entry symbol to have
        /// the documented signature. The library must be built by the same
        /// compiler against the same `storehook-core`. The returned host runs
        /// code from the library and must be dropped before this loader.
        pub unsafe fn load_attribute(&mut self, path: &Path) -> PluginResult<AttributeHost> {
            let lib = open(path)?;
            let entry: AttributeEntry = *lib
                .get::<AttributeEntry>(ATTRIBUTE_SYMBOL.as_bytes())
                .map_err(|_| PluginError::NotOffered { entry: ATTRIBUTE_SYMBOL })?;

            let mut host = AttributeHost::new(entry());
            self.libraries.push(lib);
            if let Err(e) = host.initialize() {
                warn!(path = %path.display(), error = %e, "attribute plugin loaded inert");
            }
            Ok(host)
        }

        /// Load the transaction plugin exported by `path`.
        ///
        /// # Safety
        /// Same requirements as [`DynamicPluginLoader::load_attribute`],
        /// including dropping the returned host before this loader.
        pub unsafe fn load_transaction(&mut self, path: &Path) -> PluginResult<TransactionHost> {
            let lib = open(path)?;
            let entry: TransactionEntry = *lib
                .get::<TransactionEntry>(TRANSACTION_SYMBOL.as_bytes())
                .map_err(|_| PluginError::NotOffered { entry: TRANSACTION_SYMBOL })?;

            let host = TransactionHost::new(entry(&self.config));
            self.libraries.push(lib);
            info!(path = %path.display(), "transaction plugin loaded");
            Ok(host)
        }
    }

    unsafe fn open(path: &Path) -> PluginResult<Library> {
        Library::new(path).map_err(|e| PluginError::Load {
            message: format!("failed to load {}: {}", path.display(), e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ControlOptions;
    use crate::transaction::StoreHandle;

    struct Fixed;
    impl AttributePlugin for Fixed {
        fn key_name(&self) -> PluginResult<&str> {
            Ok("fixed")
        }
    }

    struct Refusing;
    impl AttributePlugin for Refusing {
        fn initialize(&mut self) -> bool {
            false
        }
    }

    struct Accepting;
    impl TransactionPlugin for Accepting {
        fn control(&self, _handle: StoreHandle, _opt: Option<&ControlOptions>) -> PluginResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_unknown_path() {
        let loader = PluginLoader::default();
        let err = loader.load_attribute("/plugins/missing.so").unwrap_err();
        assert!(matches!(err, PluginError::NotFound { .. }));
        assert!(loader.load_transaction("/plugins/missing.so").is_err());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let loader = PluginLoader::default();
        loader.register_attribute("/plugins/fixed.so", || Box::new(Fixed)).unwrap();
        let err = loader.register_attribute("/plugins/fixed.so", || Box::new(Fixed)).unwrap_err();
        assert!(matches!(err, PluginError::Load { .. }));
    }

    #[test]
    fn test_load_initializes() {
        let loader = PluginLoader::default();
        loader.register_attribute("/plugins/fixed.so", || Box::new(Fixed)).unwrap();
        loader.register_attribute("/plugins/refusing.so", || Box::new(Refusing)).unwrap();

        let fixed = loader.load_attribute("/plugins/fixed.so").unwrap();
        assert!(fixed.is_ready());
        assert_eq!(fixed.key_name().unwrap(), "fixed");

        let refusing = loader.load_attribute("/plugins/refusing.so").unwrap();
        assert!(!refusing.is_ready());
    }

    #[test]
    fn test_loads_are_independent() {
        let loader = PluginLoader::default();
        loader.register_transaction("/plugins/trans.so", |_| Box::new(Accepting)).unwrap();

        let a = loader.load_transaction("/plugins/trans.so").unwrap();
        let b = loader.load_transaction("/plugins/trans.so").unwrap();
        a.control(StoreHandle(1), Some(&ControlOptions::enable_default_sink())).unwrap();

        assert!(a.is_capturing());
        assert!(!b.is_capturing());
    }

    #[test]
    fn test_registered_paths() {
        let loader = PluginLoader::default();
        loader.register_transaction("/plugins/b.so", |_| Box::new(Accepting)).unwrap();
        loader.register_attribute("/plugins/a.so", || Box::new(Fixed)).unwrap();
        assert_eq!(
            loader.registered(),
            vec![PathBuf::from("/plugins/a.so"), PathBuf::from("/plugins/b.so")]
        );
    }
}

//! Reference host: an in-memory store that drives loaded plugins
//!
//! `HarnessStore` stands in for the external storage engine so the plugin
//! contracts can be exercised end to end. It follows the engine's invocation
//! policy:
//!
//! **Attribute plugins**: `update` runs synchronously inside the mutating call,
//! before it returns, at most once per call and only for calls that write a value.
//! **Transaction plugins**: `trans` runs synchronously after the mutation has
//! taken effect, at most once per call, and only while capture is enabled.
//! **Failures**: a plugin failure is logged as one line naming the entry point
//! and store handle. It never undoes or fails the committed mutation.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::attribute::AttributeHost;
use crate::capture::ControlOptions;
use crate::config::HostConfig;
use crate::error::{PluginResult, StoreError, StoreResult};
use crate::record::{encode, OperationKind};
use crate::transaction::{StoreHandle, TransactionHost};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// One stored record with the attributes computed for its last write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredEntry {
    /// Current value
    pub value: Vec<u8>,
    /// Attribute bytes by attribute key name
    pub attributes: HashMap<String, Vec<u8>>,
}

type EntryKey = (Vec<u8>, Vec<u8>);

/// In-memory store with attached attribute and transaction plugins.
///
/// Records are addressed by (key, subkey); top-level records use an empty subkey.
pub struct HarnessStore {
    handle: StoreHandle,
    data: RwLock<HashMap<EntryKey, StoredEntry>>,
    attributes: Vec<Mutex<AttributeHost>>,
    transactions: Vec<TransactionHost>,
    config: HostConfig,
}

impl HarnessStore {
    /// Attach a fresh store with its own handle
    pub fn attach(config: HostConfig) -> StoreResult<Self> {
        config.validate().map_err(StoreError::InvalidConfig)?;
        Ok(Self::build(config))
    }

    fn build(config: HostConfig) -> Self {
        Self {
            handle: StoreHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)),
            data: RwLock::new(HashMap::new()),
            attributes: Vec::new(),
            transactions: Vec::new(),
            config,
        }
    }

    /// Handle identifying this store to plugins
    pub fn handle(&self) -> StoreHandle {
        self.handle
    }

    /// Attach a loaded attribute plugin. Inert plugins are kept but never called.
    pub fn add_attribute_plugin(&mut self, host: AttributeHost) {
        self.attributes.push(Mutex::new(host));
    }

    /// Attach a loaded transaction plugin
    pub fn add_transaction_plugin(&mut self, host: TransactionHost) {
        self.transactions.push(host);
    }

    /// Attached transaction plugins
    pub fn transaction_plugins(&self) -> &[TransactionHost] {
        &self.transactions
    }

    /// Forward a control request to every transaction plugin.
    ///
    /// All plugins see the request; the first failure is returned.
    pub fn control(&self, opt: Option<&ControlOptions>) -> PluginResult<()> {
        let mut first_err = None;
        for host in &self.transactions {
            if let Err(e) = host.control(self.handle, opt) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Insert or overwrite
    pub fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.mutate(OperationKind::Set, key, None, value)
    }

    /// Insert or overwrite a layered record under `key`
    pub fn set_layered(&self, key: &[u8], subkey: &[u8], value: &[u8]) -> StoreResult<()> {
        self.mutate(OperationKind::Set, key, Some(subkey), value)
    }

    /// Insert only if absent
    pub fn add(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.mutate(OperationKind::Add, key, None, value)
    }

    /// Overwrite only if present
    pub fn replace(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.mutate(OperationKind::Replace, key, None, value)
    }

    /// Extend an existing value
    pub fn append(&self, key: &[u8], tail: &[u8]) -> StoreResult<()> {
        self.mutate(OperationKind::Append, key, None, tail)
    }

    /// Delete
    pub fn remove(&self, key: &[u8]) -> StoreResult<()> {
        self.mutate(OperationKind::Remove, key, None, &[])
    }

    /// Delete a layered record
    pub fn remove_layered(&self, key: &[u8], subkey: &[u8]) -> StoreResult<()> {
        self.mutate(OperationKind::Remove, key, Some(subkey), &[])
    }

    /// Current value of a top-level record
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.get_layered(key, &[])
    }

    /// Current value of a layered record
    pub fn get_layered(&self, key: &[u8], subkey: &[u8]) -> Option<Vec<u8>> {
        let data = self.data.read();
        data.get(&(key.to_vec(), subkey.to_vec())).map(|e| e.value.clone())
    }

    /// Attribute stored for a top-level record under attribute key `name`
    pub fn attribute(&self, key: &[u8], name: &str) -> Option<Vec<u8>> {
        let data = self.data.read();
        data.get(&(key.to_vec(), Vec::new()))
            .and_then(|e| e.attributes.get(name).cloned())
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn mutate(
        &self,
        kind: OperationKind,
        key: &[u8],
        subkey: Option<&[u8]>,
        value: &[u8],
    ) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        if key.len() > self.config.max_key_size {
            return Err(StoreError::OversizedEntry {
                entry_size: key.len() as u64,
                max_size: self.config.max_key_size as u64,
                component: "key",
            });
        }

        let entry_key: EntryKey = (key.to_vec(), subkey.unwrap_or(&[]).to_vec());
        let written = {
            let mut data = self.data.write();
            let existing = data.get(&entry_key);

            let new_value = match kind {
                OperationKind::Set => Some(value.to_vec()),
                OperationKind::Add if existing.is_some() => return Err(StoreError::KeyExists),
                OperationKind::Add => Some(value.to_vec()),
                OperationKind::Replace | OperationKind::Append | OperationKind::Remove
                    if existing.is_none() =>
                {
                    return Err(StoreError::KeyNotFound)
                }
                OperationKind::Replace => Some(value.to_vec()),
                OperationKind::Append => existing.map(|e| [e.value.as_slice(), value].concat()),
                OperationKind::Remove => None,
            };

            match new_value {
                Some(new_value) => {
                    if new_value.len() > self.config.max_value_size {
                        return Err(StoreError::OversizedEntry {
                            entry_size: new_value.len() as u64,
                            max_size: self.config.max_value_size as u64,
                            component: "value",
                        });
                    }
                    let attributes = self.compute_attributes(key, &new_value);
                    data.insert(entry_key, StoredEntry { value: new_value, attributes });
                    true
                }
                None => {
                    data.remove(&entry_key);
                    false
                }
            }
        };

        // Mutation committed; observers run after it.
        if self.transactions.iter().any(TransactionHost::is_capturing) {
            let record_value = written.then_some(value);
            let record = encode(kind, kind.label(), key, record_value, subkey)?;
            for host in &self.transactions {
                // Failures were logged by the host; the mutation stands.
                let _ = host.deliver(self.handle, &record);
            }
        }
        Ok(())
    }

    fn compute_attributes(&self, key: &[u8], value: &[u8]) -> HashMap<String, Vec<u8>> {
        let mut attributes = HashMap::new();
        for slot in &self.attributes {
            let mut plugin = slot.lock();
            let Some(name) = plugin.descriptor().ok().and_then(|d| d.key_name.clone()) else {
                continue;
            };
            match plugin.update(key, value) {
                Ok(bytes) => {
                    attributes.insert(name, bytes);
                }
                Err(e) => {
                    warn!(
                        entry = "update",
                        handle = %self.handle,
                        error = %e,
                        "plugin call failed"
                    );
                }
            }
        }
        attributes
    }
}

impl Default for HarnessStore {
    fn default() -> Self {
        Self::build(HostConfig::default())
    }
}

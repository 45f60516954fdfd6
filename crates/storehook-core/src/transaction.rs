//! Transaction plugin contract
//!
//! A transaction plugin observes every mutating store call as an encoded
//! [`CommandRecord`](crate::record::CommandRecord) and accepts runtime control
//! requests that arm, re-arm or disarm capture.
//!
//! The host only calls `trans` while it believes capture is enabled. It
//! learns that from its own successful `trans_cntl` calls, so the host-side
//! [`TransactionHost`] mirrors the flag instead of asking the plugin.

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::attribute::offered_version;
use crate::capture::ControlOptions;
use crate::error::{PluginError, PluginResult};
use crate::record::CommandRecord;

/// Opaque identity of one attached store instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreHandle(pub u64);

impl fmt::Display for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Capability set of a transaction-observing extension.
///
/// Every entry point defaults to `NotOffered`, the equivalent of a missing
/// symbol in a shared library.
pub trait TransactionPlugin: Send + Sync {
    /// Observe one mutation. `record` is an encoded command record.
    fn trans(&self, _handle: StoreHandle, _record: &[u8]) -> PluginResult<()> {
        Err(PluginError::NotOffered { entry: "trans" })
    }

    /// Stable identifying string
    fn version(&self) -> PluginResult<&str> {
        Err(PluginError::NotOffered { entry: "trans_version" })
    }

    /// Change capture state. `None` is a host-side programming error.
    fn control(&self, _handle: StoreHandle, _opt: Option<&ControlOptions>) -> PluginResult<()> {
        Err(PluginError::NotOffered { entry: "trans_cntl" })
    }
}

/// Render the compatibility log line for a record:
/// `<label>(<kind>): handle=<handle>,key=<key>,val=<value>,skey=<subkey>\n`
///
/// Key, value and subkey bytes are copied verbatim.
pub fn format_log_line(handle: StoreHandle, record: &CommandRecord<'_>) -> Vec<u8> {
    let payload = record.key.len() + record.value.len() + record.subkey.len();
    let mut line = Vec::with_capacity(64 + payload);
    // Writes into a Vec cannot fail
    let _ = write!(line, "{}({}): handle={},key=", record.label, record.kind.code(), handle);
    line.extend_from_slice(record.key);
    line.extend_from_slice(b",val=");
    line.extend_from_slice(record.value);
    line.extend_from_slice(b",skey=");
    line.extend_from_slice(record.subkey);
    line.push(b'\n');
    line
}

/// Outcome of offering a record to a transaction host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// `trans` was called and succeeded
    Delivered,
    /// Capture is off; `trans` was not called
    Skipped,
}

/// Host-side owner of one loaded transaction plugin.
///
/// Calls into the plugin are single-flight: one at a time per instance.
pub struct TransactionHost {
    plugin: Box<dyn TransactionPlugin>,
    flight: Mutex<()>,
    capture_enabled: AtomicBool,
    version: Option<String>,
}

impl TransactionHost {
    /// Take ownership of a freshly loaded plugin. Capture starts disabled.
    pub fn new(plugin: Box<dyn TransactionPlugin>) -> Self {
        let version = offered_version(plugin.version());
        Self {
            plugin,
            flight: Mutex::new(()),
            capture_enabled: AtomicBool::new(false),
            version,
        }
    }

    /// Version reported at load time, if the plugin offers one
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Host-side view of the capture flag
    pub fn is_capturing(&self) -> bool {
        self.capture_enabled.load(Ordering::Acquire)
    }

    /// Forward a control request. The host's capture flag follows it only on success.
    pub fn control(&self, handle: StoreHandle, opt: Option<&ControlOptions>) -> PluginResult<()> {
        let _flight = self.flight.lock();
        match self.plugin.control(handle, opt) {
            Ok(()) => {
                let enable = opt.map(|o| o.enable).unwrap_or(false);
                self.capture_enabled.store(enable, Ordering::Release);
                debug!(%handle, enable, "trans_cntl applied");
                Ok(())
            }
            Err(e) => {
                warn!(entry = "trans_cntl", %handle, error = %e, "plugin call failed");
                Err(e)
            }
        }
    }

    /// Offer an encoded record. Failures are logged and returned; capture stays armed.
    pub fn deliver(&self, handle: StoreHandle, record: &[u8]) -> PluginResult<Delivery> {
        if !self.is_capturing() {
            return Ok(Delivery::Skipped);
        }
        let _flight = self.flight.lock();
        match self.plugin.trans(handle, record) {
            Ok(()) => Ok(Delivery::Delivered),
            Err(e) => {
                warn!(entry = "trans", %handle, error = %e, "plugin call failed");
                Err(e)
            }
        }
    }
}

impl fmt::Debug for TransactionHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHost")
            .field("version", &self.version)
            .field("capture_enabled", &self.is_capturing())
            .finish()
    }
}

//! Transaction log plugin
//!
//! Appends one line per observed mutation to the armed sink:
//!
//! ```text
//! set(1): handle=0x1,key=user:1,val=alice,skey=
//! ```
//!
//! Capture starts disabled. `trans_cntl` arms it (optionally with a key prefix;
//! records on other keys are skipped here, inside the plugin), re-arms it to a
//! new sink, or disarms it. A record that fails to decode is refused and
//! nothing is written.

use storehook_core::{
    decode, format_log_line, CaptureState, ControlOptions, HostConfig, PluginResult, StoreHandle,
    TransactionPlugin,
};
use tracing::debug;

/// Version reported by the plugin
pub const VERSION: &str = concat!("trans-log/", env!("CARGO_PKG_VERSION"));

/// Transaction plugin writing the compatibility log line format
#[derive(Debug)]
pub struct TransactionLogger {
    capture: CaptureState,
}

impl TransactionLogger {
    /// Fresh logger, capture disabled
    pub fn new(config: HostConfig) -> Self {
        Self { capture: CaptureState::new(config) }
    }

    /// Control state of this instance
    pub fn capture(&self) -> &CaptureState {
        &self.capture
    }
}

impl Default for TransactionLogger {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl TransactionPlugin for TransactionLogger {
    fn trans(&self, handle: StoreHandle, record: &[u8]) -> PluginResult<()> {
        let record = decode(record)?;
        let outcome = self
            .capture
            .append_record(record.key, || format_log_line(handle, &record))?;
        debug!(%handle, kind = %record.kind, ?outcome, "trans");
        Ok(())
    }

    fn version(&self) -> PluginResult<&str> {
        Ok(VERSION)
    }

    fn control(&self, handle: StoreHandle, opt: Option<&ControlOptions>) -> PluginResult<()> {
        self.capture.apply(opt)?;
        debug!(%handle, enabled = self.capture.is_enabled(), "trans_cntl");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storehook_core::{encode, OperationKind, PluginError};
    use tempfile::TempDir;

    #[test]
    fn test_disabled_trans_refused() {
        let logger = TransactionLogger::default();
        let record = encode(OperationKind::Set, "set", b"k", Some(b"v"), None).unwrap();
        let err = logger.trans(StoreHandle(1), &record).unwrap_err();
        assert!(matches!(err, PluginError::CaptureDisabled));
    }

    #[test]
    fn test_malformed_record_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("x.log");
        let logger = TransactionLogger::default();
        logger.control(StoreHandle(1), Some(&ControlOptions::enable(&path))).unwrap();

        let mut record = encode(OperationKind::Set, "set", b"k", Some(b"v"), None).unwrap();
        record.truncate(record.len() - 1);
        let err = logger.trans(StoreHandle(1), &record).unwrap_err();
        assert!(matches!(err, PluginError::MalformedRecord(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_subkey_written() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("x.log");
        let logger = TransactionLogger::default();
        logger.control(StoreHandle(7), Some(&ControlOptions::enable(&path))).unwrap();

        let record =
            encode(OperationKind::Remove, "remove", b"parent", None, Some(b"child")).unwrap();
        logger.trans(StoreHandle(7), &record).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "remove(5): handle=0x7,key=parent,val=,skey=child\n");
    }

    #[test]
    fn test_version() {
        assert!(TransactionLogger::default().version().unwrap().starts_with("trans-log/"));
    }
}

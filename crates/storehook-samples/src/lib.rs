//! Sample storehook extensions
//!
//! - [`ProcessStampPlugin`]: attribute recording the writing process
//! - [`ChecksumPlugin`]: attribute holding a CRC32C of key and value
//! - [`TransactionLogger`]: transaction plugin appending one log line per mutation
//!
//! Built as a `cdylib` the crate exports the shared-library entry symbols the
//! core's dynamic loader resolves. In-process hosts call [`register_all`].

pub mod checksum;
pub mod logger;
pub mod process_stamp;

pub use checksum::ChecksumPlugin;
pub use logger::TransactionLogger;
pub use process_stamp::ProcessStampPlugin;

use storehook_core::{AttributePlugin, HostConfig, PluginLoader, PluginResult, TransactionPlugin};

/// Registry path of the writer identity plugin
pub const PROCESS_STAMP_PATH: &str = "plugins/libstorehook_process_stamp.so";
/// Registry path of the checksum plugin
pub const CHECKSUM_PATH: &str = "plugins/libstorehook_checksum.so";
/// Registry path of the transaction log plugin
pub const TRANSACTION_LOG_PATH: &str = "plugins/libstorehook_trans_log.so";

/// Register every sample plugin with an in-process loader
pub fn register_all(loader: &PluginLoader) -> PluginResult<()> {
    loader.register_attribute(PROCESS_STAMP_PATH, || Box::new(ProcessStampPlugin::new()))?;
    loader.register_attribute(CHECKSUM_PATH, || Box::new(ChecksumPlugin))?;
    loader.register_transaction(TRANSACTION_LOG_PATH, |config| {
        Box::new(TransactionLogger::new(config.clone()))
    })?;
    Ok(())
}

/// Shared-library entry for the attribute capability
#[no_mangle]
pub fn storehook_attribute_plugin() -> Box<dyn AttributePlugin> {
    Box::new(ProcessStampPlugin::new())
}

/// Shared-library entry for the transaction capability
#[no_mangle]
pub fn storehook_transaction_plugin(config: &HostConfig) -> Box<dyn TransactionPlugin> {
    Box::new(TransactionLogger::new(config.clone()))
}

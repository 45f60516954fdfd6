//! Transaction capture control state
//!
//! Every loaded transaction plugin owns one [`CaptureState`]. The enabled flag,
//! the armed sink and the key prefix live behind a single mutex, and "enabled"
//! is not stored separately: capture is on exactly when a sink is armed. A
//! `trans` call can therefore never observe a closed sink paired with an
//! enabled flag.
//!
//! ```text
//! [Disabled] --apply(enable)--> [Enabled(sink)]
//! [Enabled(sink)] --apply(enable, new sink)--> [Enabled(new sink)]
//! [Enabled(sink)] --apply(disable)--> [Disabled]
//! [Enabled(sink)] --append_record--> [Enabled(sink)]
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::config::HostConfig;
use crate::error::{PluginError, PluginResult};
use crate::sink::Sink;

/// Runtime control request for a transaction plugin
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ControlOptions {
    /// Turn capture on (true) or off (false)
    pub enable: bool,
    /// Destination file; `None` or empty selects the default output channel
    pub sink_path: Option<PathBuf>,
    /// Restrict capture to keys starting with these bytes; empty means all keys
    pub key_prefix: Vec<u8>,
}

impl ControlOptions {
    /// Enable capture into `path`
    pub fn enable<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            enable: true,
            sink_path: Some(path.into()),
            key_prefix: Vec::new(),
        }
    }

    /// Enable capture into the default output channel
    pub fn enable_default_sink() -> Self {
        Self { enable: true, ..Self::default() }
    }

    /// Disable capture
    pub fn disable() -> Self {
        Self::default()
    }

    /// Attach a key prefix filter
    pub fn with_key_prefix<B: Into<Vec<u8>>>(mut self, prefix: B) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Length of the key prefix in bytes
    pub fn key_prefix_len(&self) -> usize {
        self.key_prefix.len()
    }

    fn file_sink_path(&self) -> Option<&Path> {
        self.sink_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// Result of handing one record to an enabled capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    /// Line appended to the sink
    Written,
    /// Key did not match the configured prefix; nothing written
    Filtered,
}

/// Counters for one capture instance
#[derive(Debug, Default)]
pub struct CaptureStats {
    records_written: AtomicU64,
    records_filtered: AtomicU64,
    write_failures: AtomicU64,
}

impl CaptureStats {
    /// Lines appended since load
    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    /// Records skipped by the key prefix filter
    pub fn records_filtered(&self) -> u64 {
        self.records_filtered.load(Ordering::Relaxed)
    }

    /// Appends that failed
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct CaptureInner {
    sink: Option<Sink>,
    key_prefix: Vec<u8>,
}

/// Mutable control state of one loaded transaction plugin
#[derive(Debug)]
pub struct CaptureState {
    inner: Mutex<CaptureInner>,
    config: HostConfig,
    stats: CaptureStats,
}

impl CaptureState {
    /// Fresh state, capture disabled
    pub fn new(config: HostConfig) -> Self {
        Self {
            inner: Mutex::new(CaptureInner::default()),
            config,
            stats: CaptureStats::default(),
        }
    }

    /// Apply a control request. On error the state is left unchanged.
    pub fn apply(&self, opt: Option<&ControlOptions>) -> PluginResult<()> {
        let opt = opt.ok_or_else(|| PluginError::invalid_control("control options absent"))?;

        if !opt.enable {
            let mut inner = self.inner.lock();
            if let Some(mut old) = inner.sink.take() {
                old.close();
                debug!(sink = ?old.path(), "capture disabled");
            }
            inner.key_prefix.clear();
            return Ok(());
        }

        if let Some(path) = opt.file_sink_path() {
            let len = path.as_os_str().len();
            if len > self.config.max_sink_path_len {
                return Err(PluginError::invalid_control(format!(
                    "sink path is {} bytes, limit {}",
                    len, self.config.max_sink_path_len
                )));
            }
        }
        if opt.key_prefix_len() > self.config.max_key_prefix_len {
            return Err(PluginError::invalid_control(format!(
                "key prefix is {} bytes, limit {}",
                opt.key_prefix_len(),
                self.config.max_key_prefix_len
            )));
        }

        let sink = match opt.file_sink_path() {
            Some(path) => Sink::file(path, self.config.sync_mode),
            None => Sink::stdout(self.config.sync_mode),
        };

        let mut inner = self.inner.lock();
        debug!(sink = ?sink.path(), prefix_len = opt.key_prefix_len(), "capture enabled");
        if let Some(mut old) = inner.sink.replace(sink) {
            old.close();
        }
        inner.key_prefix = opt.key_prefix.clone();
        Ok(())
    }

    /// Whether capture is on
    pub fn is_enabled(&self) -> bool {
        self.inner.lock().sink.is_some()
    }

    /// Active sink file, `None` when disabled or writing to stdout
    pub fn sink_path(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .sink
            .as_ref()
            .and_then(|s| s.path().map(Path::to_path_buf))
    }

    /// Active key prefix, empty when none is set
    pub fn key_prefix(&self) -> Vec<u8> {
        self.inner.lock().key_prefix.clone()
    }

    /// Counters
    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    /// Append the line produced by `render` for a record on `key`.
    ///
    /// The prefix check, rendering and append all happen under the state lock,
    /// so lines from concurrent callers never interleave and a concurrent
    /// re-arm lands either entirely before or entirely after this record.
    pub fn append_record<F>(&self, key: &[u8], render: F) -> PluginResult<Appended>
    where
        F: FnOnce() -> Vec<u8>,
    {
        let mut inner = self.inner.lock();
        let CaptureInner { sink, key_prefix } = &mut *inner;

        let Some(sink) = sink.as_mut() else {
            return Err(PluginError::CaptureDisabled);
        };
        if !key.starts_with(key_prefix.as_slice()) {
            self.stats.records_filtered.fetch_add(1, Ordering::Relaxed);
            return Ok(Appended::Filtered);
        }

        match sink.append(&render()) {
            Ok(()) => {
                self.stats.records_written.fetch_add(1, Ordering::Relaxed);
                Ok(Appended::Written)
            }
            Err(e) => {
                self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

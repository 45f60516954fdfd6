//! storehook core: extension protocol for memory-mapped key-value stores
//!
//! A store engine loads extension code at runtime to do two things:
//!
//! - **Attribute plugins** compute a derived value attached to every record
//!   the store writes (writer identity, checksums, ...).
//! - **Transaction plugins** observe every mutating call as a binary command
//!   record and can be armed, re-armed to a new sink, or disarmed at runtime.
//!
//! # Architecture
//!
//! - **Codec** (`record`): one flat buffer per mutation, fields addressed by
//!   (offset, length) and decoded as borrowed slices
//! - **Contracts** (`attribute`, `transaction`): capability traits plus the
//!   host-side owners that enforce call ordering and lifecycle
//! - **Capture** (`capture`, `sink`): per-instance control state, never global
//! - **Loader** (`loader`): path-keyed resolution, shared libraries optional
//! - **Harness** (`host`): in-memory stand-in for the engine that follows its
//!   invocation policy
//!
//! The engine itself is not part of this crate.

pub mod attribute;
pub mod capture;
pub mod config;
pub mod error;
pub mod host;
pub mod loader;
pub mod record;
pub mod sink;
pub mod transaction;

// Re-export key types for convenience
pub use attribute::{AttributeDescriptor, AttributeHost, AttributePlugin};
pub use capture::{Appended, CaptureState, CaptureStats, ControlOptions};
pub use config::{HostConfig, SyncMode};
pub use error::{PluginError, PluginResult, RecordError, RecordResult, StoreError, StoreResult};
pub use host::{HarnessStore, StoredEntry};
pub use loader::PluginLoader;
pub use record::{decode, encode, CommandRecord, OperationKind};
pub use transaction::{format_log_line, Delivery, StoreHandle, TransactionHost, TransactionPlugin};

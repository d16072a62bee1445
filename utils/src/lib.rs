//! Shared infrastructure utilities for Kiln.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`security`**: Credential redaction for error text that reaches logs or the screen

pub mod atomic_write;
pub mod security;

pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, ParentDirSyncPolicy, PersistMode,
    atomic_write_with_options, recover_bak_file,
};
pub use security::{redact_api_keys, redact_known_secrets, sanitize_stream_error};

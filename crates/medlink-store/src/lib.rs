//! SQLite persistence for medlink pairing records.
//!
//! [`SqliteStore`] implements [`medlink_types::KeyValueStore`] on a single
//! `kv` table, so the pairing store in `medlink-core` can keep its records
//! across restarts.
//!
//! # Example
//!
//! ```no_run
//! use medlink_store::SqliteStore;
//! use medlink_types::KeyValueStore;
//!
//! let store = SqliteStore::open_default()?;
//! store.set("auto_connect", "true")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod schema;
mod store;

pub use error::{Error, Result};
pub use schema::SCHEMA_VERSION;
pub use store::SqliteStore;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/medlink/pairing.db`
/// - macOS: `~/Library/Application Support/medlink/pairing.db`
/// - Windows: `C:\Users\<user>\AppData\Local\medlink\pairing.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("medlink")
        .join("pairing.db")
}

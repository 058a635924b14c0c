//! Runtime read-only guard for SQL connections
//!
//! Every statement executed through a [`Connection`] passes through the
//! connection's execution wrappers. [`app::ready`] installs one process-wide
//! [`Blocker`] on each connection; while read-only mode is on, the blocker
//! rejects any statement that is not an allowlisted read with
//! [`DatabaseError::ReadOnly`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), sql_read_only::DatabaseError> {
//! use sql_read_only::{ConnectionHandler, Settings, app, disable_writes, temp_writes};
//!
//! let settings = Settings::new();
//! let connections = ConnectionHandler::from_settings(&settings)?;
//! app::ready(&settings, &connections);
//!
//! disable_writes();
//! let db = connections.get("default")?;
//! db.execute("SELECT 1", Vec::new()).await?;
//! assert!(db.execute("CREATE TABLE t (id INTEGER)", Vec::new()).await.is_err());
//!
//! let _writes = temp_writes();
//! db.execute("CREATE TABLE t (id INTEGER)", Vec::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod types;

pub mod readonly;
pub mod mode;
pub mod settings;
pub mod signals;

pub mod wrapper;
pub mod blocker;
pub mod row_converter;
pub mod connection;

pub mod app;
pub mod shell;

// Re-export secrecy types for consumers
pub use secrecy::{ExposeSecret, SecretString};

// Re-exports
pub use blocker::{Blocker, blocker, install_hook, is_blocker};
pub use connection::{
    Connection, ConnectionHandler, DEFAULT_DB_ALIAS, ExecuteWrapperGuard,
};
pub use error::DatabaseError;
pub use mode::{
    TempWrites, disable_writes, enable_writes, is_read_only, temp_writes, with_temp_writes,
    with_temp_writes_async,
};
pub use readonly::{should_block, should_block_statement};
pub use settings::{ConfigValue, Settings, SettingsOverride};
pub use types::{DatabaseType, QueryResult, SqlFragment, SqlValue, Statement};
pub use wrapper::{ExecuteWrapper, ExecutionContext, Next, Params, StatementRecord};

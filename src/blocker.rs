//! The read-only blocker and its installation
//!
//! There is exactly one blocker value per process. Installation looks for
//! that value by pointer identity, so installing again, on reconnect or from
//! several threads, never adds a second copy, and an unrelated wrapper in the
//! same list is never mistaken for it.

use async_trait::async_trait;
use std::sync::{Arc, LazyLock};

use crate::connection::Connection;
use crate::error::DatabaseError;
use crate::mode::is_read_only;
use crate::readonly::should_block_statement;
use crate::types::QueryResult;
use crate::wrapper::{ExecuteWrapper, Next, StatementRecord};

/// Rejects write statements while read-only mode is on
#[derive(Debug)]
pub struct Blocker;

#[async_trait]
impl ExecuteWrapper for Blocker {
    async fn call(
        &self,
        record: StatementRecord,
        next: Next<'_>,
    ) -> Result<QueryResult, DatabaseError> {
        if is_read_only() && should_block_statement(&record.statement) {
            log::warn!(
                "Blocked write query on '{}' while read-only mode is on",
                record.context.alias
            );
            return Err(DatabaseError::ReadOnly);
        }
        next.run(record).await
    }
}

static BLOCKER: LazyLock<Arc<dyn ExecuteWrapper>> = LazyLock::new(|| Arc::new(Blocker));

/// The process-wide blocker; every call returns the same allocation
pub fn blocker() -> Arc<dyn ExecuteWrapper> {
    Arc::clone(&BLOCKER)
}

/// True when `wrapper` is the process-wide blocker
pub fn is_blocker(wrapper: &Arc<dyn ExecuteWrapper>) -> bool {
    Arc::ptr_eq(wrapper, &BLOCKER)
}

/// Append the blocker to the connection's wrapper list unless already there
///
/// This appends directly rather than going through
/// [`Connection::execute_wrapper`], which removes its wrapper when the guard
/// drops; the blocker must stay installed for the life of the connection.
/// Returns `true` when the blocker was added.
pub fn install_hook(connection: &Connection) -> bool {
    let installed = connection.with_execute_wrappers(|wrappers| {
        if wrappers.iter().any(is_blocker) {
            return false;
        }
        wrappers.push(blocker());
        true
    });
    if installed {
        log::debug!("Installed read-only blocker on '{}'", connection.alias());
    }
    installed
}

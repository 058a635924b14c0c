//! Execution wrapper chain
//!
//! Every statement a [`Connection`](crate::connection::Connection) executes
//! passes through the connection's ordered list of [`ExecuteWrapper`]s,
//! outermost first, before reaching the [`Driver`]. Each wrapper gets the
//! statement record and a [`Next`] handle; it may inspect the record, forward
//! it, or return an error without forwarding.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::DatabaseError;
use crate::types::{QueryResult, SqlValue, Statement};

/// Bound parameters; the variant doubles as the batch flag
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// One execution
    Single(Vec<SqlValue>),
    /// One execution per parameter set
    Many(Vec<Vec<SqlValue>>),
}

impl Params {
    pub fn is_many(&self) -> bool {
        matches!(self, Self::Many(_))
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::Single(Vec::new())
    }
}

/// Where a statement is being executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Alias of the connection running the statement
    pub alias: String,
}

/// One intercepted call: lives only for the duration of the execution
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRecord {
    pub statement: Statement,
    pub params: Params,
    pub context: ExecutionContext,
}

/// A link in the execution chain
#[async_trait]
pub trait ExecuteWrapper: Send + Sync {
    /// Handle `record`, usually by forwarding it with `next.run(record)`
    async fn call(
        &self,
        record: StatementRecord,
        next: Next<'_>,
    ) -> Result<QueryResult, DatabaseError>;
}

/// The end of the chain: actually runs the statement
#[async_trait]
pub trait Driver: Send {
    async fn execute(&mut self, record: StatementRecord) -> Result<QueryResult, DatabaseError>;
}

/// Downstream part of the chain, handed to each wrapper
pub struct Next<'a> {
    wrappers: &'a [Arc<dyn ExecuteWrapper>],
    driver: &'a mut dyn Driver,
}

impl<'a> Next<'a> {
    pub fn new(wrappers: &'a [Arc<dyn ExecuteWrapper>], driver: &'a mut dyn Driver) -> Self {
        Self { wrappers, driver }
    }

    /// Pass `record` to the next wrapper, or to the driver when none is left
    pub async fn run(self, record: StatementRecord) -> Result<QueryResult, DatabaseError> {
        match self.wrappers.split_first() {
            Some((wrapper, rest)) => {
                wrapper
                    .call(
                        record,
                        Next {
                            wrappers: rest,
                            driver: self.driver,
                        },
                    )
                    .await
            }
            None => self.driver.execute(record).await,
        }
    }
}

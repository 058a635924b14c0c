//! Database connections and the connection registry
//!
//! A [`Connection`] is a named handle that opens its sqlx connection lazily
//! on first use and can be closed and reopened. Each open fires the
//! registry's "connection created" signal. Every statement goes through the
//! handle's execution wrapper list before it reaches the database.

use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use sqlx::AnyConnection;
use sqlx::any::{Any, AnyArguments};
use sqlx::query::Query;
use sqlx::{Connection as _, Execute as _};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::DatabaseError;
use crate::row_converter::rows_to_result;
use crate::settings::{ConfigValue, Settings};
use crate::signals::{ConnectionReceiver, Signal};
use crate::types::{DatabaseType, QueryResult, SqlValue, Statement};
use crate::wrapper::{Driver, ExecuteWrapper, ExecutionContext, Next, Params, StatementRecord};

/// Alias used when no alias is given
pub const DEFAULT_DB_ALIAS: &str = "default";

/// Settings key holding `{alias: url}`
pub const DATABASES_SETTING: &str = "DATABASES";

/// Environment variable read when `DATABASES` is not set
pub const DATABASE_URL_ENV_VAR: &str = "DATABASE_URL";

/// Settings key for the per-statement timeout, in seconds
pub const QUERY_TIMEOUT_SETTING: &str = "db_query_timeout_secs";

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

type ExecuteWrappers = Vec<Arc<dyn ExecuteWrapper>>;

/// A named database connection
pub struct Connection {
    alias: String,
    url: SecretString,
    query_timeout: Duration,
    execute_wrappers: Mutex<ExecuteWrappers>,
    raw: tokio::sync::Mutex<Option<AnyConnection>>,
    connection_created: Arc<Signal<ConnectionReceiver>>,
}

impl Connection {
    fn new(
        alias: &str,
        url: SecretString,
        query_timeout: Duration,
        connection_created: Arc<Signal<ConnectionReceiver>>,
    ) -> Self {
        Self {
            alias: alias.to_string(),
            url,
            query_timeout,
            execute_wrappers: Mutex::new(Vec::new()),
            raw: tokio::sync::Mutex::new(None),
            connection_created,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Snapshot of the installed wrappers, outermost first
    pub fn execute_wrappers(&self) -> Vec<Arc<dyn ExecuteWrapper>> {
        self.execute_wrappers.lock().clone()
    }

    /// Run `f` with exclusive access to the wrapper list
    ///
    /// `f` must not execute statements on this connection.
    pub fn with_execute_wrappers<R>(&self, f: impl FnOnce(&mut ExecuteWrappers) -> R) -> R {
        f(&mut self.execute_wrappers.lock())
    }

    /// Install `wrapper` until the returned guard drops
    pub fn execute_wrapper(&self, wrapper: Arc<dyn ExecuteWrapper>) -> ExecuteWrapperGuard<'_> {
        self.execute_wrappers.lock().push(Arc::clone(&wrapper));
        ExecuteWrapperGuard {
            connection: self,
            wrapper,
        }
    }

    /// Whether the underlying database connection is currently open
    pub async fn is_open(&self) -> bool {
        self.raw.lock().await.is_some()
    }

    /// Open the underlying connection if it is not open yet
    pub async fn ensure_connection(&self) -> Result<(), DatabaseError> {
        let mut raw = self.raw.lock().await;
        self.open_if_closed(&mut raw).await
    }

    async fn open_if_closed(&self, raw: &mut Option<AnyConnection>) -> Result<(), DatabaseError> {
        if raw.is_some() {
            return Ok(());
        }

        let db_type = DatabaseType::from_url(self.url.expose_secret())?;

        // Registers the compiled-in drivers for sqlx::any; repeated calls are no-ops
        sqlx::any::install_default_drivers();

        let conn = AnyConnection::connect(self.url.expose_secret())
            .await
            .map_err(|e| {
                DatabaseError::ConnectionError(format!(
                    "Failed to connect '{}' ({}): {}",
                    self.alias, db_type, e
                ))
            })?;
        *raw = Some(conn);
        log::info!("✓ Database connected: '{}' ({})", self.alias, db_type);

        for receiver in self.connection_created.receivers() {
            receiver(self);
        }
        Ok(())
    }

    /// Close the underlying connection; the next statement reopens it
    pub async fn close(&self) -> Result<(), DatabaseError> {
        let conn = self.raw.lock().await.take();
        if let Some(conn) = conn {
            conn.close().await?;
            log::debug!("Closed database connection '{}'", self.alias);
        }
        Ok(())
    }

    /// Execute one statement with positional parameters
    pub async fn execute(
        &self,
        statement: impl Into<Statement>,
        params: Vec<SqlValue>,
    ) -> Result<QueryResult, DatabaseError> {
        self.execute_record(self.record(statement.into(), Params::Single(params)))
            .await
    }

    /// Execute one statement once per parameter set
    pub async fn execute_many(
        &self,
        statement: impl Into<Statement>,
        param_sets: Vec<Vec<SqlValue>>,
    ) -> Result<QueryResult, DatabaseError> {
        self.execute_record(self.record(statement.into(), Params::Many(param_sets)))
            .await
    }

    fn record(&self, statement: Statement, params: Params) -> StatementRecord {
        StatementRecord {
            statement,
            params,
            context: ExecutionContext {
                alias: self.alias.clone(),
            },
        }
    }

    /// Run `record` through the wrapper chain and then the database
    pub async fn execute_record(
        &self,
        record: StatementRecord,
    ) -> Result<QueryResult, DatabaseError> {
        let mut raw = self.raw.lock().await;
        // Opening fires "connection created", which may install wrappers;
        // take the snapshot afterwards so they apply to this statement.
        self.open_if_closed(&mut raw).await?;
        let wrappers = self.execute_wrappers();

        let conn = raw.as_mut().ok_or_else(|| {
            DatabaseError::ConnectionError(format!("Connection '{}' is not open", self.alias))
        })?;
        let mut driver = SqlxDriver {
            conn,
            timeout: self.query_timeout,
        };

        Next::new(&wrappers, &mut driver).run(record).await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("alias", &self.alias)
            .field("execute_wrappers", &self.execute_wrappers.lock().len())
            .finish()
    }
}

/// Guard returned by [`Connection::execute_wrapper`]
#[must_use = "the wrapper is removed as soon as the guard is dropped"]
pub struct ExecuteWrapperGuard<'c> {
    connection: &'c Connection,
    wrapper: Arc<dyn ExecuteWrapper>,
}

impl std::ops::Deref for ExecuteWrapperGuard<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection
    }
}

impl Drop for ExecuteWrapperGuard<'_> {
    fn drop(&mut self) {
        let mut wrappers = self.connection.execute_wrappers.lock();
        if let Some(pos) = wrappers
            .iter()
            .rposition(|w| Arc::ptr_eq(w, &self.wrapper))
        {
            wrappers.remove(pos);
        }
    }
}

/// Runs statements on an open sqlx connection
struct SqlxDriver<'c> {
    conn: &'c mut AnyConnection,
    timeout: Duration,
}

#[async_trait::async_trait]
impl<'c> Driver for SqlxDriver<'c> {
    async fn execute(&mut self, record: StatementRecord) -> Result<QueryResult, DatabaseError> {
        let sql = record
            .statement
            .as_sql()
            .ok_or_else(|| {
                DatabaseError::QueryError("Statement has no SQL text representation".to_string())
            })?
            .into_owned();

        match record.params {
            Params::Single(values) => {
                let query = bind_params(sqlx::query(&sql), values);
                log::trace!("Executing SQL: {}", query.sql());
                let rows = with_timeout(self.timeout, query.fetch_all(&mut *self.conn)).await?;
                rows_to_result(&rows)
            }
            Params::Many(param_sets) => {
                let mut rows_affected = 0;
                for values in param_sets {
                    let query = bind_params(sqlx::query(&sql), values);
                    let done = with_timeout(self.timeout, query.execute(&mut *self.conn)).await?;
                    rows_affected += done.rows_affected();
                }
                Ok(QueryResult {
                    rows_affected,
                    ..QueryResult::default()
                })
            }
        }
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    values: Vec<SqlValue>,
) -> Query<'q, Any, AnyArguments<'q>> {
    for value in values {
        query = match value {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Bool(b) => query.bind(b),
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Float(v) => query.bind(v),
            SqlValue::Text(s) => query.bind(s),
            SqlValue::Blob(bytes) => query.bind(bytes),
        };
    }
    query
}

async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, DatabaseError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(DatabaseError::from),
        Err(_) => Err(DatabaseError::QueryError(format!(
            "Query timed out after {:?} (configure with {})",
            limit, QUERY_TIMEOUT_SETTING
        ))),
    }
}

/// Registry of named connections
///
/// Hands out one shared [`Connection`] per configured alias and owns the
/// "connection created" signal those connections fire.
pub struct ConnectionHandler {
    databases: BTreeMap<String, SecretString>,
    query_timeout: Duration,
    connections: Mutex<BTreeMap<String, Arc<Connection>>>,
    connection_created: Arc<Signal<ConnectionReceiver>>,
}

impl ConnectionHandler {
    /// Registry over `(alias, url)` pairs
    pub fn new<A, U>(databases: impl IntoIterator<Item = (A, U)>) -> Self
    where
        A: Into<String>,
        U: Into<String>,
    {
        Self {
            databases: databases
                .into_iter()
                .map(|(alias, url)| (alias.into(), SecretString::from(url.into())))
                .collect(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            connections: Mutex::new(BTreeMap::new()),
            connection_created: Arc::new(Signal::new()),
        }
    }

    /// Registry configured from settings
    ///
    /// Reads `DATABASES` (`{alias: url}`), else `DATABASE_URL` as the
    /// `default` alias, else an in-memory SQLite database.
    pub fn from_settings(settings: &Settings) -> Result<Self, DatabaseError> {
        let databases: Vec<(String, String)> = match settings.get_value(DATABASES_SETTING) {
            Some(ConfigValue::Map(map)) => map
                .iter()
                .map(|(alias, url)| match url.as_str() {
                    Some(url) => Ok((alias.clone(), url.to_string())),
                    None => Err(DatabaseError::ConfigError(format!(
                        "{}['{}'] must be a URL string",
                        DATABASES_SETTING, alias
                    ))),
                })
                .collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(DatabaseError::ConfigError(format!(
                    "{} must map aliases to URLs",
                    DATABASES_SETTING
                )));
            }
            None => {
                let url = std::env::var(DATABASE_URL_ENV_VAR).unwrap_or_else(|_| {
                    log::info!(
                        "{} not set, defaulting to sqlite::memory:",
                        DATABASE_URL_ENV_VAR
                    );
                    "sqlite::memory:".to_string()
                });
                vec![(DEFAULT_DB_ALIAS.to_string(), url)]
            }
        };

        let query_timeout = match settings.get_value(QUERY_TIMEOUT_SETTING) {
            None => DEFAULT_QUERY_TIMEOUT,
            Some(value) => value
                .as_number()
                .filter(|secs| *secs > 0.0)
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .ok_or_else(|| {
                    DatabaseError::ConfigError(format!(
                        "{} must be a positive number of seconds",
                        QUERY_TIMEOUT_SETTING
                    ))
                })?,
        };

        Ok(Self::new(databases).with_query_timeout(query_timeout))
    }

    /// Per-statement timeout for connections handed out from now on
    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    /// Configured aliases, sorted
    pub fn aliases(&self) -> Vec<String> {
        self.databases.keys().cloned().collect()
    }

    /// The connection for `alias`, created on first request
    pub fn get(&self, alias: &str) -> Result<Arc<Connection>, DatabaseError> {
        let url = self.databases.get(alias).ok_or_else(|| {
            DatabaseError::ConnectionError(format!("The connection '{}' doesn't exist", alias))
        })?;

        let mut connections = self.connections.lock();
        let connection = connections.entry(alias.to_string()).or_insert_with(|| {
            Arc::new(Connection::new(
                alias,
                url.clone(),
                self.query_timeout,
                Arc::clone(&self.connection_created),
            ))
        });
        Ok(Arc::clone(connection))
    }

    /// Every configured connection
    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.databases
            .keys()
            .filter_map(|alias| self.get(alias).ok())
            .collect()
    }

    /// The "connection created" signal
    pub fn connection_created(&self) -> &Signal<ConnectionReceiver> {
        &self.connection_created
    }

    /// Close every connection handed out so far
    pub async fn close_all(&self) -> Result<(), DatabaseError> {
        let connections: Vec<Arc<Connection>> =
            self.connections.lock().values().cloned().collect();
        for connection in connections {
            connection.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn memory_handler() -> ConnectionHandler {
        ConnectionHandler::new([("default", "sqlite::memory:"), ("other", "sqlite::memory:")])
    }

    #[tokio::test]
    async fn test_round_trip_without_wrappers() -> Result<(), DatabaseError> {
        let connections = memory_handler();
        let connection = connections.get(DEFAULT_DB_ALIAS)?;

        connection
            .execute("CREATE TABLE site (id INTEGER PRIMARY KEY, domain TEXT)", Vec::new())
            .await?;
        connection
            .execute(
                "INSERT INTO site (domain) VALUES (?)",
                vec![SqlValue::from("example.org")],
            )
            .await?;
        let result = connection
            .execute("SELECT id, domain FROM site", Vec::new())
            .await?;

        assert_eq!(result.columns, vec!["id", "domain"]);
        assert_eq!(
            result.rows,
            vec![vec![SqlValue::Int(1), SqlValue::from("example.org")]]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_many_sums_rows_affected() -> Result<(), DatabaseError> {
        let connections = memory_handler();
        let connection = connections.get(DEFAULT_DB_ALIAS)?;
        connection
            .execute("CREATE TABLE t (v INTEGER)", Vec::new())
            .await?;

        let result = connection
            .execute_many(
                "INSERT INTO t (v) VALUES (?)",
                vec![
                    vec![SqlValue::Int(1)],
                    vec![SqlValue::Int(2)],
                    vec![SqlValue::Null],
                ],
            )
            .await?;

        assert_eq!(result.rows_affected, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_connection_created_fires_on_each_open() -> Result<(), DatabaseError> {
        let connections = memory_handler();
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opened);
        connections.connection_created().connect(
            "test.count_opens",
            Arc::new(move |_: &Connection| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let connection = connections.get(DEFAULT_DB_ALIAS)?;
        assert!(!connection.is_open().await);
        connection.execute("SELECT 1", Vec::new()).await?;
        connection.execute("SELECT 2", Vec::new()).await?;
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        connection.close().await?;
        assert!(!connection.is_open().await);
        connection.ensure_connection().await?;
        assert_eq!(opened.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn test_get_returns_shared_handle_per_alias() -> Result<(), DatabaseError> {
        let connections = memory_handler();
        let a = connections.get("default")?;
        let b = connections.get("default")?;
        let other = connections.get("other")?;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
        assert!(connections.get("missing").is_err());
        assert_eq!(connections.all().len(), 2);
        Ok(())
    }

    #[test]
    fn test_from_settings_reads_databases_map() -> Result<(), DatabaseError> {
        let settings = Settings::from_json_str(
            r#"{"DATABASES": {"default": "sqlite::memory:", "replica": "sqlite::memory:"},
                "db_query_timeout_secs": 5}"#,
        )?;
        let connections = ConnectionHandler::from_settings(&settings)?;
        assert_eq!(connections.aliases(), vec!["default", "replica"]);
        assert_eq!(connections.query_timeout, Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn test_from_settings_rejects_non_string_url() -> Result<(), DatabaseError> {
        let settings = Settings::from_json_str(r#"{"DATABASES": {"default": 3}}"#)?;
        assert!(matches!(
            ConnectionHandler::from_settings(&settings),
            Err(DatabaseError::ConfigError(_))
        ));
        Ok(())
    }

    #[test]
    fn test_from_settings_rejects_unusable_timeout() -> Result<(), DatabaseError> {
        for json in [
            r#"{"db_query_timeout_secs": 1e30}"#,
            r#"{"db_query_timeout_secs": -5}"#,
            r#"{"db_query_timeout_secs": "soon"}"#,
        ] {
            let settings = Settings::from_json_str(json)?;
            assert!(matches!(
                ConnectionHandler::from_settings(&settings),
                Err(DatabaseError::ConfigError(_))
            ));
        }
        Ok(())
    }

    #[test]
    fn test_from_settings_reads_timeout() -> Result<(), DatabaseError> {
        let settings = Settings::from_json_str(r#"{"db_query_timeout_secs": 2.5}"#)?;
        let connections = ConnectionHandler::from_settings(&settings)?;
        assert_eq!(connections.query_timeout, Duration::from_millis(2500));
        Ok(())
    }

    #[tokio::test]
    async fn test_scoped_wrapper_is_removed_on_drop() -> Result<(), DatabaseError> {
        struct Passthrough;

        #[async_trait::async_trait]
        impl ExecuteWrapper for Passthrough {
            async fn call(
                &self,
                record: StatementRecord,
                next: Next<'_>,
            ) -> Result<QueryResult, DatabaseError> {
                next.run(record).await
            }
        }

        let connections = memory_handler();
        let connection = connections.get(DEFAULT_DB_ALIAS)?;
        {
            let scoped = connection.execute_wrapper(Arc::new(Passthrough));
            assert_eq!(scoped.execute_wrappers().len(), 1);
            scoped.execute("SELECT 1", Vec::new()).await?;
        }
        assert!(connection.execute_wrappers().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_scheme_fails_to_open() {
        let connections = ConnectionHandler::new([("default", "redis://localhost")]);
        let result = match connections.get(DEFAULT_DB_ALIAS) {
            Ok(connection) => connection.ensure_connection().await,
            Err(e) => Err(e),
        };
        assert!(matches!(result, Err(DatabaseError::UnsupportedDatabase(_))));
    }
}

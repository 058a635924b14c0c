//! Read-only statement classification
//!
//! Decides from the statement text alone whether a statement counts as a
//! write. There is no parsing: a statement is allowed only when it starts
//! with a known read or transaction-control keyword, and everything else is
//! blocked, including any statement kind not listed here.

use crate::types::Statement;

/// Leading text of statements that never write.
///
/// Matching is case-sensitive and includes the trailing space.
// SECURITY: This is an allowlist. Adding or removing an entry changes what
// runs while writes are disabled.
const ALLOWED_PREFIXES: [&str; 7] = [
    "EXPLAIN ",
    "PRAGMA ",
    "ROLLBACK TO SAVEPOINT ",
    "RELEASE SAVEPOINT ",
    "SAVEPOINT ",
    "SELECT ",
    "SET ",
];

/// Bare transaction-control statements, matched against the whole text
const ALLOWED_STATEMENTS: [&str; 3] = ["BEGIN", "COMMIT", "ROLLBACK"];

/// Characters skipped before prefix matching
const LEADING_CHARS: [char; 3] = [' ', '\n', '('];

/// Check whether SQL text must be blocked in read-only mode
///
/// # Examples
/// ```
/// # use sql_read_only::readonly::should_block;
/// assert!(!should_block("SELECT * FROM users"));
/// assert!(!should_block("(SELECT 1) UNION (SELECT 2)"));
/// assert!(!should_block("COMMIT"));
///
/// assert!(should_block("UPDATE users SET active = 0"));
/// assert!(should_block("select 1"));
/// ```
pub fn should_block(sql: &str) -> bool {
    let stripped = sql.trim_start_matches(LEADING_CHARS);
    let allowed = ALLOWED_PREFIXES
        .iter()
        .any(|prefix| stripped.starts_with(prefix))
        || ALLOWED_STATEMENTS.contains(&sql);
    !allowed
}

/// Check whether a statement must be blocked in read-only mode
///
/// Statements without a textual form are blocked.
pub fn should_block_statement(statement: &Statement) -> bool {
    match statement.as_sql() {
        Some(sql) => should_block(&sql),
        None => true,
    }
}

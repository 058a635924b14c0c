//! `%read_only` command layer for interactive sessions

use crate::error::DatabaseError;
use crate::mode::{disable_writes, enable_writes};

/// Prefix that routes a shell line to [`run_read_only_command`]
pub const COMMAND_PREFIX: &str = "%read_only";

/// Parsed argument of `%read_only`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOnlyCommand {
    On,
    Off,
    Unknown(String),
}

impl ReadOnlyCommand {
    pub fn parse(arg: &str) -> Self {
        match arg.trim() {
            "on" => Self::On,
            "off" => Self::Off,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Apply a `%read_only` argument and return the message to show the user
pub fn run_read_only_command(arg: &str) -> String {
    match ReadOnlyCommand::parse(arg) {
        ReadOnlyCommand::On => {
            disable_writes();
            "Write queries disabled.".to_string()
        }
        ReadOnlyCommand::Off => {
            enable_writes();
            "Write queries enabled.".to_string()
        }
        ReadOnlyCommand::Unknown(value) => {
            format!("Unknown value '{value}', pass 'on' or 'off'.")
        }
    }
}

/// If `line` is a `%read_only` command, run it and return its message
pub fn handle_line(line: &str) -> Option<String> {
    let rest = line.trim_start().strip_prefix(COMMAND_PREFIX)?;
    // "%read_onlyx" is not the command
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(run_read_only_command(rest))
}

/// Render an error for the shell, pointing read-only failures at the command
pub fn describe_error(error: &DatabaseError) -> String {
    if error.is_read_only() {
        "Write queries are currently disabled. Enable with '%read_only off' or \
         sql_read_only::enable_writes()."
            .to_string()
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{is_read_only, test_lock};

    #[test]
    fn test_parse() {
        assert_eq!(ReadOnlyCommand::parse("on"), ReadOnlyCommand::On);
        assert_eq!(ReadOnlyCommand::parse(" off "), ReadOnlyCommand::Off);
        assert_eq!(
            ReadOnlyCommand::parse("ON"),
            ReadOnlyCommand::Unknown("ON".to_string())
        );
        assert_eq!(
            ReadOnlyCommand::parse(""),
            ReadOnlyCommand::Unknown(String::new())
        );
    }

    #[test]
    fn test_commands_toggle_flag() {
        let _lock = test_lock();

        assert_eq!(run_read_only_command("on"), "Write queries disabled.");
        assert!(is_read_only());

        assert_eq!(run_read_only_command("off"), "Write queries enabled.");
        assert!(!is_read_only());
    }

    #[test]
    fn test_unknown_value_leaves_flag() {
        let _lock = test_lock();
        enable_writes();

        assert_eq!(
            run_read_only_command("maybe"),
            "Unknown value 'maybe', pass 'on' or 'off'."
        );
        assert!(!is_read_only());
    }

    #[test]
    fn test_handle_line() {
        let _lock = test_lock();

        assert_eq!(
            handle_line("%read_only on").as_deref(),
            Some("Write queries disabled.")
        );
        assert_eq!(
            handle_line("  %read_only off").as_deref(),
            Some("Write queries enabled.")
        );
        assert_eq!(handle_line("SELECT 1"), None);
        assert_eq!(handle_line("%read_onlyx on"), None);
        assert!(!is_read_only());
    }

    #[test]
    fn test_describe_error() {
        assert_eq!(
            describe_error(&DatabaseError::ReadOnly),
            "Write queries are currently disabled. Enable with '%read_only off' or \
             sql_read_only::enable_writes()."
        );
        let other = DatabaseError::QueryError("boom".to_string());
        assert_eq!(describe_error(&other), other.to_string());
    }
}

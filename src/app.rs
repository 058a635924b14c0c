//! Startup wiring for read-only mode

use std::sync::Arc;

use crate::blocker::install_hook;
use crate::connection::{Connection, ConnectionHandler};
use crate::mode::{is_read_only, on_setting_changed, set_from_config_and_environment};
use crate::settings::Settings;

/// Dispatch uid of the "connection created" receiver
pub const INSTALL_HOOK_UID: &str = "sql_read_only.install_hook";

/// Dispatch uid of the "setting changed" receiver
pub const RESET_READ_ONLY_UID: &str = "sql_read_only.reset_read_only";

/// Turn on read-only support for a settings store and connection registry
///
/// 1. derives the flag from settings and environment;
/// 2. installs the blocker on every configured connection;
/// 3. re-installs on every connection opened later (a no-op once present);
/// 4. re-derives the flag whenever the read-only setting changes.
///
/// The subscriptions live as long as `settings` and `connections`. Calling
/// this again re-derives the flag but never adds a second receiver.
pub fn ready(settings: &Settings, connections: &ConnectionHandler) {
    set_from_config_and_environment(settings);

    for connection in connections.all() {
        install_hook(&connection);
    }
    connections
        .connection_created()
        .connect(
            INSTALL_HOOK_UID,
            Arc::new(|connection: &Connection| {
                install_hook(connection);
            }),
        );

    settings
        .changed()
        .connect(RESET_READ_ONLY_UID, Arc::new(on_setting_changed));

    log::info!(
        "Read-only support ready for {} connection(s), writes {}",
        connections.aliases().len(),
        if is_read_only() { "disabled" } else { "enabled" }
    );
}

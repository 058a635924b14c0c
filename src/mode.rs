//! Process-wide read-only switch
//!
//! One flag for the whole process, read on every intercepted statement. It
//! is a best-effort guard against accidental writes, not an isolation
//! mechanism: reads and writes are relaxed atomics, concurrent toggles are
//! last-write-wins, and a statement may race a toggle between the check and
//! the forward.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::settings::{ConfigValue, Settings};

/// Settings key that pins read-only mode when explicitly set
pub const READ_ONLY_SETTING: &str = "DJANGO_READ_ONLY";

/// Environment variable consulted when the setting is not explicitly set;
/// any non-empty value turns read-only mode on
pub const READ_ONLY_ENV_VAR: &str = "DJANGO_READ_ONLY";

static READ_ONLY: AtomicBool = AtomicBool::new(false);

/// Whether write statements are currently blocked
pub fn is_read_only() -> bool {
    READ_ONLY.load(Ordering::Relaxed)
}

fn store(read_only: bool) {
    let was = READ_ONLY.swap(read_only, Ordering::Relaxed);
    if was != read_only {
        log::debug!(
            "Write queries {}",
            if read_only { "disabled" } else { "enabled" }
        );
    }
}

/// Allow write statements
pub fn enable_writes() {
    store(false);
}

/// Block write statements
pub fn disable_writes() {
    store(true);
}

/// Derive the flag from an explicit setting and the environment value
///
/// An explicit setting always wins, even when it is false. Without one, any
/// non-empty environment value means read-only.
///
/// # Examples
/// ```
/// # use sql_read_only::mode::resolve_read_only;
/// # use sql_read_only::settings::ConfigValue;
/// assert!(!resolve_read_only(Some(&ConfigValue::Boolean(false)), Some("1")));
/// assert!(resolve_read_only(None, Some("anything")));
/// assert!(!resolve_read_only(None, Some("")));
/// assert!(!resolve_read_only(None, None));
/// ```
pub fn resolve_read_only(configured: Option<&ConfigValue>, env_value: Option<&str>) -> bool {
    match configured {
        Some(value) => value.is_truthy(),
        None => env_value.is_some_and(|v| !v.is_empty()),
    }
}

/// Set the flag from the settings store and the process environment
pub fn set_from_config_and_environment(settings: &Settings) {
    let configured = if settings.is_overridden(READ_ONLY_SETTING) {
        settings.get_value(READ_ONLY_SETTING)
    } else {
        None
    };
    let env_value = std::env::var_os(READ_ONLY_ENV_VAR);
    let env_value = env_value.as_ref().map(|v| v.to_string_lossy());

    let read_only = resolve_read_only(configured.as_ref(), env_value.as_deref());
    log::debug!(
        "Read-only mode {} (source: {})",
        if read_only { "on" } else { "off" },
        if configured.is_some() { "setting" } else { "environment" }
    );
    store(read_only);
}

/// Settings receiver: re-derive the flag when the read-only key changes
pub fn on_setting_changed(settings: &Settings, setting: &str) {
    if setting == READ_ONLY_SETTING {
        set_from_config_and_environment(settings);
    }
}

/// Guard returned by [`temp_writes`]
///
/// Writes are allowed while the guard is alive. Dropping it disables writes
/// again on every exit path, unwinding included.
#[must_use = "writes are disabled again as soon as the guard is dropped"]
#[derive(Debug)]
pub struct TempWrites {
    _private: (),
}

impl Drop for TempWrites {
    fn drop(&mut self) {
        disable_writes();
    }
}

/// Allow writes until the returned guard is dropped
///
/// On exit writes are always disabled, not restored to the prior state.
///
/// # Examples
/// ```
/// # use sql_read_only::{disable_writes, is_read_only, temp_writes};
/// disable_writes();
/// {
///     let _writes = temp_writes();
///     assert!(!is_read_only());
/// }
/// assert!(is_read_only());
/// # sql_read_only::enable_writes();
/// ```
pub fn temp_writes() -> TempWrites {
    enable_writes();
    TempWrites { _private: () }
}

/// Run `f` with writes allowed
pub fn with_temp_writes<T>(f: impl FnOnce() -> T) -> T {
    let _writes = temp_writes();
    f()
}

/// Await `fut` with writes allowed
pub async fn with_temp_writes_async<F: Future>(fut: F) -> F::Output {
    let _writes = temp_writes();
    fut.await
}

/// Serializes unit tests that touch the process-wide flag
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// Interactive SQL shell with read-only support.
//
// Reads statements from stdin, one per line, and runs them against the
// `default` database. `%read_only on|off` toggles write blocking.
//
// OPTIONAL: SQL_READ_ONLY_SETTINGS names a JSON settings file.
// OPTIONAL: DATABASE_URL when the settings define no DATABASES.
// OPTIONAL: DJANGO_READ_ONLY to start with writes disabled.

use anyhow::{Context, Result};
use sql_read_only::{ConnectionHandler, DEFAULT_DB_ALIAS, Settings, app, shell};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const SETTINGS_FILE_ENV_VAR: &str = "SQL_READ_ONLY_SETTINGS";

fn load_settings() -> Result<Settings> {
    match std::env::var_os(SETTINGS_FILE_ENV_VAR) {
        Some(path) => Settings::from_json_file(&path)
            .with_context(|| format!("Failed to load settings from {}", path.to_string_lossy())),
        None => {
            log::info!("{SETTINGS_FILE_ENV_VAR} not set, using default settings");
            Ok(Settings::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let settings = load_settings()?;
    let connections =
        ConnectionHandler::from_settings(&settings).context("Invalid database configuration")?;
    app::ready(&settings, &connections);

    let db = connections
        .get(DEFAULT_DB_ALIAS)
        .context("No 'default' database configured")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let output = match shell::handle_line(line) {
            Some(message) => message,
            None => match db.execute(line, Vec::new()).await {
                Ok(result) => serde_json::to_string(&result)?,
                Err(e) => shell::describe_error(&e),
            },
        };

        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    connections
        .close_all()
        .await
        .context("Failed to close database connections")?;
    Ok(())
}

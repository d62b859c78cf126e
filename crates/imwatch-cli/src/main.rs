use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::info;

use imwatch_db::MessagesDb;
use imwatch_listener::{FixedEncoding, Listener, ListenerConfig, MacosVersion};
use imwatch_types::events::ListenerEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "imwatch=info,imwatch_listener=info,imwatch_db=info".into()
            }),
        )
        .init();

    // Config
    let db_path: PathBuf = match std::env::var_os("IMWATCH_DB_PATH") {
        Some(path) => path.into(),
        None => MessagesDb::default_path()
            .context("HOME is unset; set IMWATCH_DB_PATH to the chat.db location")?,
    };

    let defaults = ListenerConfig::default();
    let config = ListenerConfig {
        poll_interval: env_parse::<u64>("IMWATCH_POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval),
        startup_margin: env_parse::<u64>("IMWATCH_STARTUP_MARGIN_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.startup_margin),
        query_timeout: env_parse::<u64>("IMWATCH_QUERY_TIMEOUT_MS")?.map(Duration::from_millis),
    };

    let db = MessagesDb::new(db_path);
    info!("Watching {} for new messages", db.path().display());
    let listener = match env_parse::<bool>("IMWATCH_PACKED_TIMESTAMPS")? {
        Some(packed) => Listener::new(db, FixedEncoding(packed), config),
        None => Listener::new(db, MacosVersion::new(), config),
    };

    let mut rx = listener.events().subscribe();
    listener.start();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                return Ok(());
            }
        };

        match event {
            Some(ListenerEvent::Message(message)) => {
                let mut stdout = std::io::stdout().lock();
                serde_json::to_writer(&mut stdout, &message)?;
                writeln!(stdout)?;
                stdout.flush()?;
            }
            Some(ListenerEvent::Error { message }) => {
                bail!("listener halted: {}", message);
            }
            None => return Ok(()),
        }
    }
}

/// Parses an optional environment variable. Unset or empty yields `None`.
fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid {}={:?}", key, value)),
        Err(_) => Ok(None),
    }
}

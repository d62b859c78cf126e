pub mod models;
pub mod queries;

use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

pub use models::MessageRow;
pub use queries::ChangeQuery;

/// How long a read waits on the host application's write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("failed to open message store at {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("sqlite error")]
    Sqlite(#[from] rusqlite::Error),

    #[error("message store connection lock poisoned")]
    Poisoned,
}

/// A source of message rows the listener can poll.
///
/// Implementations must never write to the underlying store.
pub trait MessageStore: Send + Sync + 'static {
    fn fetch_since(&self, query: &ChangeQuery) -> Result<Vec<MessageRow>, QueryError>;
}

/// Read-only handle to the Messages database.
///
/// The connection is opened on first use and cached; it is closed when the
/// handle is dropped.
pub struct MessagesDb {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl MessagesDb {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: Mutex::new(None),
        }
    }

    /// `$HOME/Library/Messages/chat.db`, or `None` when `HOME` is unset.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join("Library")
                .join("Messages")
                .join("chat.db")
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the connection if it is not open yet. Repeated calls are no-ops.
    pub fn open(&self) -> Result<(), QueryError> {
        self.with_conn(|_| Ok(()))
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, QueryError>
    where
        F: FnOnce(&Connection) -> Result<T, QueryError>,
    {
        let mut guard = self.conn.lock().map_err(|_| QueryError::Poisoned)?;
        if guard.is_none() {
            *guard = Some(open_read_only(&self.path)?);
        }
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(QueryError::Poisoned),
        }
    }
}

impl MessageStore for MessagesDb {
    fn fetch_since(&self, query: &ChangeQuery) -> Result<Vec<MessageRow>, QueryError> {
        self.with_conn(|conn| query.run(conn))
    }
}

fn open_read_only(path: &Path) -> Result<Connection, QueryError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|source| QueryError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    info!("Messages DB opened read-only at {}", path.display());
    Ok(conn)
}

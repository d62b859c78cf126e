use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinError;
use tracing::{debug, error, info};

use imwatch_db::{ChangeQuery, MessageRow, MessageStore, QueryError};
use imwatch_types::models::ChangeEvent;

use crate::config::ListenerConfig;
use crate::dispatcher::EventSource;
use crate::ledger::SeenLedger;
use crate::platform::TimestampEncoding;
use crate::time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Running,
    /// A poll failed. Terminal: the listener never polls again.
    Halted,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("change query failed")]
    Query(#[from] QueryError),

    #[error("change query timed out after {0:?}")]
    Timeout(Duration),

    #[error("query worker failed")]
    Worker(#[from] JoinError),
}

/// Polls a message store and publishes each new row exactly once.
///
/// Polls run one at a time: the next round is scheduled `poll_interval` after
/// the previous one completes. Each round reads every row at or after the
/// watermark, so rounds overlap and a [`SeenLedger`] drops the repeats.
pub struct Listener<S: MessageStore> {
    inner: Arc<ListenerInner<S>>,
}

struct ListenerInner<S> {
    store: Arc<S>,
    encoding: Arc<dyn TimestampEncoding>,
    config: ListenerConfig,
    events: EventSource,
    state: Mutex<ListenerState>,
}

impl<S: MessageStore> Listener<S> {
    pub fn new(store: S, encoding: impl TimestampEncoding, config: ListenerConfig) -> Self {
        let events = EventSource::new();
        Self {
            inner: Arc::new(ListenerInner {
                store: Arc::new(store),
                encoding: Arc::new(encoding),
                config,
                events,
                state: Mutex::new(ListenerState::Idle),
            }),
        }
    }

    /// The listener's event source. Subscribe here before [`Listener::start`]
    /// to be sure of seeing the first poll's events.
    pub fn events(&self) -> EventSource {
        self.inner.events.clone()
    }

    pub fn state(&self) -> ListenerState {
        *self.inner.lock_state()
    }

    /// Starts polling and returns the event source.
    ///
    /// Only the first call starts anything. Later calls, including after the
    /// listener halted, return the same event source and do not restart it.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> EventSource {
        let mut state = self.inner.lock_state();
        if *state == ListenerState::Idle {
            *state = ListenerState::Running;

            info!(
                interval_ms = millis(self.inner.config.poll_interval),
                margin_secs = self.inner.config.startup_margin.as_secs(),
                "Listener started"
            );
            tokio::spawn(run(Arc::clone(&self.inner), Utc::now()));
        }
        self.inner.events.clone()
    }
}

impl<S: MessageStore> ListenerInner<S> {
    fn lock_state(&self) -> MutexGuard<'_, ListenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Asks the encoding collaborator off the runtime threads, since detection
    /// may spawn a process.
    async fn packed(&self) -> Result<bool, PollError> {
        let encoding = Arc::clone(&self.encoding);
        Ok(tokio::task::spawn_blocking(move || encoding.uses_packed_timestamps()).await?)
    }

    async fn fetch(&self, query: ChangeQuery) -> Result<Vec<MessageRow>, PollError> {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || store.fetch_since(&query));

        // A timed-out query keeps running on the blocking pool; its result is
        // discarded.
        let joined = match self.config.query_timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| PollError::Timeout(limit))?,
            None => task.await,
        };
        Ok(joined??)
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn initial_watermark(activated: DateTime<Utc>, margin: Duration, packed: bool) -> i64 {
    let margin = i64::try_from(margin.as_secs()).unwrap_or(i64::MAX);
    let seconds = time::encode(activated).saturating_sub(margin);
    if packed { time::pack(seconds) } else { seconds }
}

async fn run<S: MessageStore>(inner: Arc<ListenerInner<S>>, activated: DateTime<Utc>) {
    let mut ledger = SeenLedger::new();
    let mut round: u64 = 0;
    let mut watermark: Option<i64> = None;

    loop {
        round += 1;
        let issued = Utc::now();

        let outcome = match inner.packed().await {
            Ok(packed) => {
                let since = watermark.unwrap_or_else(|| {
                    let initial =
                        initial_watermark(activated, inner.config.startup_margin, packed);
                    debug!(watermark = initial, packed, "Initial watermark");
                    initial
                });
                let query = ChangeQuery::since(since);

                // Advance before the query completes so the next lower bound
                // is the issuance time. Never move backwards if the wall
                // clock does.
                watermark = Some(since.max(time::now_native_at(issued, packed)));

                inner.fetch(query).await.map(|rows| (since, rows))
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok((since, rows)) => {
                let fetched = rows.len();
                let mut emitted = 0usize;
                for row in rows {
                    if !ledger.mark_seen(&row.guid) {
                        continue;
                    }
                    inner.events.publish(decode_row(row));
                    emitted += 1;
                }
                debug!(
                    round,
                    since,
                    fetched,
                    emitted,
                    seen = ledger.len(),
                    "Poll complete"
                );
            }
            Err(e) => {
                *inner.lock_state() = ListenerState::Halted;
                let message = format!("{:#}", anyhow::Error::from(e));
                error!(
                    round,
                    error = %message,
                    "sqlite returned an error while polling for new messages; \
                     polling stopped and new messages will not be detected"
                );
                inner.events.fail(message);
                return;
            }
        }

        tokio::time::sleep(inner.config.poll_interval).await;
    }
}

fn decode_row(row: MessageRow) -> ChangeEvent {
    ChangeEvent {
        guid: row.guid,
        text: row.text,
        handle: row.handle,
        group: row.cache_roomnames,
        from_me: row.is_from_me,
        date: time::decode(row.date),
        date_read: time::decode(row.date_read),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn initial_watermark_looks_back_by_margin() {
        let before = time::encode(Utc::now());
        let watermark = initial_watermark(Utc::now(), Duration::from_secs(5), false);
        let after = time::encode(Utc::now());

        assert!(watermark >= before - 5 && watermark <= after - 5);
    }

    #[test]
    fn initial_watermark_packs_after_subtracting_margin() {
        let watermark = initial_watermark(Utc::now(), Duration::from_secs(5), true);
        assert_eq!(watermark % time::NANOS_PER_SECOND, 0);

        let seconds = time::unpack(watermark);
        let now = time::encode(Utc::now());
        assert!(seconds <= now - 5 && seconds >= now - 6);
    }

    #[test]
    fn millis_saturates_instead_of_truncating() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn decode_row_maps_fields() {
        let sent = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let row = MessageRow {
            guid: "g".into(),
            handle: Some("bob@example.com".into()),
            text: Some("hello".into()),
            date: time::now_native_at(sent, true),
            date_read: 0,
            is_from_me: true,
            cache_roomnames: Some("chat99".into()),
        };

        let event = decode_row(row);
        assert_eq!(event.guid, "g");
        assert_eq!(event.text.as_deref(), Some("hello"));
        assert_eq!(event.handle.as_deref(), Some("bob@example.com"));
        assert_eq!(event.group.as_deref(), Some("chat99"));
        assert!(event.from_me);
        assert_eq!(event.date, Some(sent));
        assert_eq!(event.date_read, None);
    }
}

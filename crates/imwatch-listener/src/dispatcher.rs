use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use imwatch_types::events::ListenerEvent;
use imwatch_types::models::ChangeEvent;

/// Publish point for listener events. Clones share the same subscribers.
///
/// Every subscriber gets its own unbounded queue, so a slow consumer never
/// loses events; it only buffers them.
#[derive(Clone)]
pub struct EventSource {
    inner: Arc<EventSourceInner>,
}

struct EventSourceInner {
    /// Per-subscriber send channels, in subscription order
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ListenerEvent>>>,
}

impl Default for EventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EventSourceInner {
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Subscribe to listener events. Only events published after this call
    /// are received. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ListenerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock_subscribers().push(tx);
        rx
    }

    /// Subscribers whose receiver is still alive.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    /// Run `handler` for every message event on a background task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn on_message<F>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let ListenerEvent::Message(event) = event {
                    handler(event);
                }
            }
        })
    }

    /// Run `handler` once, when the listener halts.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn on_error<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: FnOnce(String) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let ListenerEvent::Error { message } = event {
                    handler(message);
                    break;
                }
            }
        })
    }

    pub(crate) fn publish(&self, event: ChangeEvent) {
        self.send(ListenerEvent::Message(event));
    }

    pub(crate) fn fail(&self, message: String) {
        self.send(ListenerEvent::Error { message });
    }

    fn send(&self, event: ListenerEvent) {
        self.lock_subscribers()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<ListenerEvent>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(guid: &str) -> ChangeEvent {
        ChangeEvent {
            guid: guid.into(),
            text: None,
            handle: None,
            group: None,
            from_me: false,
            date: None,
            date_read: None,
        }
    }

    #[tokio::test]
    async fn subscribers_see_events_in_publish_order() {
        let source = EventSource::new();
        let mut a = source.subscribe();
        let mut b = source.subscribe();

        source.publish(event("1"));
        source.publish(event("2"));

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await.unwrap().as_message().unwrap().guid, "1");
            assert_eq!(rx.recv().await.unwrap().as_message().unwrap().guid, "2");
        }
    }

    #[tokio::test]
    async fn handlers_split_messages_and_errors() {
        let source = EventSource::new();
        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();

        source.on_message(move |event| {
            let _ = msg_tx.send(event.guid);
        });
        let error_task = source.on_error(move |message| {
            let _ = err_tx.send(message);
        });

        source.publish(event("a"));
        source.fail("boom".into());

        let guid = tokio::time::timeout(Duration::from_secs(1), msg_rx.recv()).await.unwrap();
        assert_eq!(guid.as_deref(), Some("a"));

        let message = tokio::time::timeout(Duration::from_secs(1), err_rx.recv()).await.unwrap();
        assert_eq!(message.as_deref(), Some("boom"));

        error_task.await.unwrap();
        assert!(err_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_subscriber_buffers_instead_of_dropping() {
        let source = EventSource::new();
        let mut rx = source.subscribe();

        for i in 0..5000 {
            source.publish(event(&i.to_string()));
        }

        for i in 0..5000 {
            let received = rx.recv().await.unwrap();
            assert_eq!(received.as_message().unwrap().guid, i.to_string());
        }
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let source = EventSource::new();
        let kept = source.subscribe();
        drop(source.subscribe());
        assert_eq!(source.subscriber_count(), 1);

        source.publish(event("x"));
        drop(kept);
        source.fail("nobody listening".into());
        assert_eq!(source.subscriber_count(), 0);
    }
}

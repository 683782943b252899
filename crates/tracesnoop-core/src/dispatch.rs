//! Delivery of snoop events to the rendering panel.

use crate::SessionEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracesnoop_types::SnoopEvent;
use tracing::{debug, info, warn};

/// Default delay before the single delivery retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// The surface events are rendered on.
pub trait PanelHost: Send + Sync {
    /// Whether a panel is ready to receive events.
    fn is_available(&self) -> bool;

    /// Ask for a panel to be created. Must not block.
    fn request_open(&self);

    /// Hand an event to the panel. Returns false if nobody received it.
    fn post(&self, event: &SnoopEvent) -> bool;
}

/// Outcome of [`PanelDispatcher::deliver`].
#[derive(Debug)]
pub enum Delivery {
    /// Posted right away.
    Sent,
    /// The panel was missing; a retry is scheduled. Resolves to whether the
    /// retry delivered the event.
    Deferred(JoinHandle<bool>),
}

/// Posts events to a [`PanelHost`], retrying once when no panel is around.
#[derive(Clone)]
pub struct PanelDispatcher {
    host: Arc<dyn PanelHost>,
    retry_delay: Duration,
}

impl PanelDispatcher {
    pub fn new(host: Arc<dyn PanelHost>, retry_delay: Duration) -> Self {
        Self { host, retry_delay }
    }

    /// Deliver one event. Never blocks: when no panel is available a panel is
    /// requested and the event is retried once after the retry delay, then
    /// dropped.
    pub fn deliver(&self, event: SnoopEvent) -> Delivery {
        if self.host.is_available() && self.host.post(&event) {
            debug!(target: "tracesnoop::panel", "Delivered {} event", event.kind());
            return Delivery::Sent;
        }

        info!(target: "tracesnoop::panel", "No panel for {} event, requesting one", event.kind());
        self.host.request_open();

        let host = self.host.clone();
        let delay = self.retry_delay;
        Delivery::Deferred(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if host.is_available() && host.post(&event) {
                debug!(target: "tracesnoop::panel", "Delivered {} event on retry", event.kind());
                true
            } else {
                debug!(target: "tracesnoop::panel", "Panel still unavailable, dropping {} event", event.kind());
                false
            }
        }))
    }

    /// Forward every snoop event from `events` until the channel closes.
    pub fn spawn(self, mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Snoop { event, .. }) => {
                        self.deliver(event);
                    }
                    Ok(SessionEvent::Exited { .. }) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(target: "tracesnoop::panel", "Dispatcher lagged, skipped {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(target: "tracesnoop::panel", "Dispatcher stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakePanel {
        available: AtomicBool,
        open_on_request: bool,
        requests: AtomicUsize,
        posted: Mutex<Vec<SnoopEvent>>,
    }

    impl PanelHost for FakePanel {
        fn is_available(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }

        fn request_open(&self) {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.open_on_request {
                self.available.store(true, Ordering::SeqCst);
            }
        }

        fn post(&self, event: &SnoopEvent) -> bool {
            self.posted.lock().unwrap().push(event.clone());
            true
        }
    }

    fn dispatcher(panel: &Arc<FakePanel>) -> PanelDispatcher {
        PanelDispatcher::new(panel.clone(), Duration::from_millis(10))
    }

    fn event() -> SnoopEvent {
        SnoopEvent::traceback("Traceback (most recent call last):")
    }

    #[tokio::test]
    async fn test_available_panel_gets_event_immediately() {
        let panel = Arc::new(FakePanel::default());
        panel.available.store(true, Ordering::SeqCst);

        assert!(matches!(dispatcher(&panel).deliver(event()), Delivery::Sent));
        assert_eq!(*panel.posted.lock().unwrap(), vec![event()]);
        assert_eq!(panel.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_panel_is_requested_and_retried_once() {
        let panel = Arc::new(FakePanel {
            open_on_request: true,
            ..Default::default()
        });

        let Delivery::Deferred(retry) = dispatcher(&panel).deliver(event()) else {
            panic!("expected a deferred delivery");
        };
        assert!(panel.posted.lock().unwrap().is_empty());

        assert!(retry.await.unwrap());
        assert_eq!(panel.requests.load(Ordering::SeqCst), 1);
        assert_eq!(panel.posted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_event_dropped_when_panel_never_appears() {
        let panel = Arc::new(FakePanel::default());

        let Delivery::Deferred(retry) = dispatcher(&panel).deliver(event()) else {
            panic!("expected a deferred delivery");
        };

        assert!(!retry.await.unwrap());
        assert_eq!(panel.requests.load(Ordering::SeqCst), 1);
        assert!(panel.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_forwards_snoop_events_only() {
        let panel = Arc::new(FakePanel::default());
        panel.available.store(true, Ordering::SeqCst);
        let (tx, rx) = broadcast::channel(8);
        let task = dispatcher(&panel).spawn(rx);

        let session_id = Uuid::new_v4();
        tx.send(SessionEvent::Snoop {
            session_id,
            event: event(),
        })
        .unwrap();
        tx.send(SessionEvent::Exited {
            session_id,
            exit_code: Some(1),
        })
        .unwrap();
        drop(tx);

        task.await.unwrap();
        assert_eq!(*panel.posted.lock().unwrap(), vec![event()]);
    }
}

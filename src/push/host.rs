//! Event loop hosting the push worker.
//!
//! Each incoming event runs as its own task in a `JoinSet`; the loop keeps the
//! set alive until every handler finishes, so shutting down never cuts a
//! delivery short.

use super::worker::{Delivery, NotificationClick, PushWorker};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

const EVENT_QUEUE_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Push { payload: Option<Vec<u8>> },
    NotificationClick(NotificationClick),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Displayed { title: String },
    Relayed(Delivery),
}

/// Handle to a running worker. Cloneable senders come from `events()`.
pub struct WorkerHost {
    events: mpsc::Sender<WorkerEvent>,
    handle: JoinHandle<()>,
}

impl WorkerHost {
    pub fn spawn(worker: Arc<PushWorker>) -> Self {
        Self::spawn_inner(worker, None)
    }

    /// Like `spawn`, also reporting each finished event on `outcomes`.
    pub fn spawn_with_outcomes(
        worker: Arc<PushWorker>,
        outcomes: mpsc::UnboundedSender<EventOutcome>,
    ) -> Self {
        Self::spawn_inner(worker, Some(outcomes))
    }

    fn spawn_inner(
        worker: Arc<PushWorker>,
        outcomes: Option<mpsc::UnboundedSender<EventOutcome>>,
    ) -> Self {
        let (events, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let handle = tokio::spawn(run_event_loop(worker, rx, outcomes));
        Self { events, handle }
    }

    pub fn events(&self) -> mpsc::Sender<WorkerEvent> {
        self.events.clone()
    }

    pub async fn dispatch(&self, event: WorkerEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Stops accepting events and waits for in-flight handlers.
    /// Senders obtained from `events()` must be dropped as well.
    pub async fn shutdown(self) {
        drop(self.events);
        if let Err(e) = self.handle.await {
            log::error!("[push] worker loop ended abnormally: {}", e);
        }
    }
}

async fn run_event_loop(
    worker: Arc<PushWorker>,
    mut rx: mpsc::Receiver<WorkerEvent>,
    outcomes: Option<mpsc::UnboundedSender<EventOutcome>>,
) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    in_flight.spawn(handle_event(worker.clone(), event));
                }
                None => break,
            },
            Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                report(done, outcomes.as_ref());
            }
        }
    }

    while let Some(done) = in_flight.join_next().await {
        report(done, outcomes.as_ref());
    }
    log::info!("[push] worker stopped");
}

async fn handle_event(worker: Arc<PushWorker>, event: WorkerEvent) -> EventOutcome {
    match event {
        WorkerEvent::Push { payload } => {
            let notification = worker.handle_push(payload.as_deref()).await;
            EventOutcome::Displayed {
                title: notification.title,
            }
        }
        WorkerEvent::NotificationClick(click) => {
            EventOutcome::Relayed(worker.handle_notification_click(click).await)
        }
    }
}

fn report(
    done: Result<EventOutcome, tokio::task::JoinError>,
    outcomes: Option<&mpsc::UnboundedSender<EventOutcome>>,
) {
    match done {
        Ok(outcome) => {
            if let Some(tx) = outcomes {
                let _ = tx.send(outcome);
            }
        }
        Err(e) => log::error!("[push] event handler panicked: {}", e),
    }
}

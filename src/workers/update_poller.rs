use crate::handlers::Dispatcher;
use crate::messaging::{InboundEvent, UpdateSource};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct UpdatePollerConfig {
    /// First pause after a failed poll; doubles up to `max_backoff`.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// A user's lane task exits after this long without events.
    pub lane_idle: Duration,
}

impl Default for UpdatePollerConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            lane_idle: Duration::from_secs(60),
        }
    }
}

/// Per-user queue. Events of one user are handled in arrival order; users
/// never wait on each other.
struct Lane {
    tx: mpsc::UnboundedSender<InboundEvent>,
    handle: JoinHandle<()>,
}

/// Long-polls the chat transport and hands each event to its user's lane.
pub struct UpdatePoller {
    source: Arc<dyn UpdateSource>,
    dispatcher: Arc<Dispatcher>,
    config: UpdatePollerConfig,
}

impl UpdatePoller {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        dispatcher: Arc<Dispatcher>,
        config: UpdatePollerConfig,
    ) -> Self {
        Self {
            source,
            dispatcher,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("update poller started");

        let mut offset: Option<i64> = None;
        let mut backoff = self.config.initial_backoff;
        let mut lanes: HashMap<i64, Lane> = HashMap::new();

        loop {
            let polled = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
                polled = self.source.poll_updates(offset) => polled,
            };

            match polled {
                Ok(updates) => {
                    backoff = self.config.initial_backoff;
                    if !updates.is_empty() {
                        debug!(count = updates.len(), "updates received");
                    }
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        match update.event {
                            Some(event) => self.route(&mut lanes, event),
                            None => debug!(update_id = update.update_id, "update ignored"),
                        }
                    }
                    lanes.retain(|_, lane| !lane.handle.is_finished());
                }
                Err(e) => {
                    warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "update poll failed");
                    tokio::select! {
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
            }
        }

        // Closing every queue lets in-flight handlers finish.
        let handles: Vec<_> = lanes.into_values().map(|lane| lane.handle).collect();
        debug!(lanes = handles.len(), "draining user lanes");
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "user lane ended abnormally");
            }
        }

        info!("update poller stopped");
    }

    fn route(&self, lanes: &mut HashMap<i64, Lane>, event: InboundEvent) {
        let user_id = event.user.id;
        let event = match lanes.get(&user_id) {
            Some(lane) => match lane.tx.send(event) {
                Ok(()) => return,
                // Lane closed itself; a new one picks up after it.
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let previous = lanes.remove(&user_id).map(|lane| lane.handle);
        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(event).is_err() {
            return;
        }
        let handle = tokio::spawn(run_lane(
            self.dispatcher.clone(),
            rx,
            previous,
            self.config.lane_idle,
        ));
        lanes.insert(user_id, Lane { tx, handle });
    }
}

async fn run_lane(
    dispatcher: Arc<Dispatcher>,
    mut rx: mpsc::UnboundedReceiver<InboundEvent>,
    previous: Option<JoinHandle<()>>,
    idle: Duration,
) {
    // Events still queued in the previous lane go first.
    if let Some(previous) = previous {
        if let Err(e) = previous.await {
            warn!(error = %e, "previous user lane ended abnormally");
        }
    }

    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(event)) => dispatcher.dispatch(event).await,
            Ok(None) => break,
            Err(_) => {
                rx.close();
                while let Some(event) = rx.recv().await {
                    dispatcher.dispatch(event).await;
                }
                break;
            }
        }
    }
}

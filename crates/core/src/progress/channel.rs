//! History-replaying broadcast channel for one run.

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::types::ProgressEvent;

/// Boxed stream of one run's events.
pub type ProgressStream = BoxStream<'static, ProgressEvent>;

struct ChannelState {
    history: Vec<ProgressEvent>,
    finished: bool,
}

/// Progress channel scoped to a single run.
pub struct ProgressChannel {
    run_id: Uuid,
    sender: broadcast::Sender<ProgressEvent>,
    state: Mutex<ChannelState>,
}

impl ProgressChannel {
    /// Create a channel with the given live-buffer capacity.
    pub fn new(run_id: Uuid, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            run_id,
            sender,
            state: Mutex::new(ChannelState {
                history: Vec::new(),
                finished: false,
            }),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Records and broadcasts an event.
    ///
    /// Events after the terminal one are dropped. Consecutive progress
    /// events are collapsed in the history so a late subscriber replays
    /// only the latest percentage.
    pub fn publish(&self, event: ProgressEvent) {
        debug_assert_eq!(event.run_id(), self.run_id);
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if state.finished {
            debug!("Run {} already finished, dropping {} event", self.run_id, event.kind());
            return;
        }

        let collapse = matches!(
            (state.history.last(), &event),
            (Some(ProgressEvent::Progress { .. }), ProgressEvent::Progress { .. })
        );
        if collapse {
            state.history.pop();
        }

        state.finished = event.is_terminal();
        state.history.push(event.clone());

        // Sent under the lock so a concurrent subscribe sees each event
        // either in its snapshot or on its receiver, never both.
        let _ = self.sender.send(event);
    }

    /// Stream of this run's events: history first, then live events.
    ///
    /// The stream ends after a terminal event.
    pub fn subscribe(&self) -> ProgressStream {
        let (history, receiver) = {
            let state = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let receiver = (!state.finished).then(|| self.sender.subscribe());
            (state.history.clone(), receiver)
        };

        let run_id = self.run_id;
        let live = stream::unfold(receiver, move |receiver| async move {
            let mut receiver = receiver?;
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let next = (!event.is_terminal()).then_some(receiver);
                        return Some((event, next));
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Subscriber of run {} lagged, skipped {} events", run_id, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        stream::iter(history).chain(live).boxed()
    }

    /// Events recorded so far.
    pub fn history(&self) -> Vec<ProgressEvent> {
        match self.state.lock() {
            Ok(state) => state.history.clone(),
            Err(poisoned) => poisoned.into_inner().history.clone(),
        }
    }

    /// The most recent event, if any.
    pub fn latest(&self) -> Option<ProgressEvent> {
        match self.state.lock() {
            Ok(state) => state.history.last().cloned(),
            Err(poisoned) => poisoned.into_inner().history.last().cloned(),
        }
    }

    pub fn is_finished(&self) -> bool {
        match self.state.lock() {
            Ok(state) => state.finished,
            Err(poisoned) => poisoned.into_inner().finished,
        }
    }
}

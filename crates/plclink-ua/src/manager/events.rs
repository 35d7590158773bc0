// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session event listener.
//!
//! One task per connection drains the session's event channel. Value
//! changes are applied to the subscription registry; lifecycle failures
//! fault the connection that produced them.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::session::{ProtocolSession, SessionEvent};

use super::Inner;

/// How long teardown waits for the listener before aborting it.
const LISTENER_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// A running listener task.
pub(crate) struct ListenerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<S: ProtocolSession> Inner<S> {
    /// Starts the listener for the connection of `generation`.
    pub(crate) async fn start_listener(
        this: &Arc<Self>,
        events: mpsc::Receiver<SessionEvent>,
        generation: u64,
    ) {
        let (stop, stopped) = watch::channel(false);
        let task = tokio::spawn(run_listener(Arc::downgrade(this), events, stopped, generation));

        let previous = this.listener.lock().await.replace(ListenerHandle { stop, task });
        if let Some(previous) = previous {
            previous.task.abort();
        }
    }

    /// Stops the listener, if any.
    pub(crate) async fn stop_listener(&self) {
        let Some(mut listener) = self.listener.lock().await.take() else {
            return;
        };

        let _ = listener.stop.send(true);
        if tokio::time::timeout(LISTENER_STOP_TIMEOUT, &mut listener.task)
            .await
            .is_err()
        {
            warn!("Event listener did not stop in time, aborting");
            listener.task.abort();
        }
    }
}

async fn run_listener<S: ProtocolSession>(
    inner: Weak<Inner<S>>,
    mut events: mpsc::Receiver<SessionEvent>,
    mut stopped: watch::Receiver<bool>,
    generation: u64,
) {
    debug!(generation, "Event listener started");

    loop {
        let event = tokio::select! {
            _ = stopped.changed() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => {
                    debug!(generation, "Event channel closed");
                    break;
                }
            },
        };

        let Some(inner) = inner.upgrade() else {
            break;
        };

        trace!(generation, kind = event.kind(), "Session event");

        match event {
            SessionEvent::ValueChanged(change) => {
                inner
                    .apply_value_change(change.subscription_id, change.value)
                    .await;
            }
            failure => {
                let reason = format!(
                    "{}: {}",
                    failure.kind(),
                    failure.failure_reason().unwrap_or_default()
                );
                Inner::begin_fault(&inner, generation, reason);
                break;
            }
        }
    }

    debug!(generation, "Event listener stopped");
}

//! A minimal channel-backed subscriber.
//!
//! Each [`EventHandler`] owns the receiving end of a bounded channel and runs its handler for every event it
//! receives, one task per event. Handlers only see the event itself and have no access to engine state.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{
    sync::{mpsc, mpsc::error::TrySendError},
    task::JoinSet,
};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every producer has been dropped, then waits for in-flight handlers to finish.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // Without our own sender, the channel closes when the last producer goes away
        drop(self.sender);
        let mut jobs = JoinSet::new();
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling event");
            let handler = Arc::clone(&self.handler);
            jobs.spawn(async move { (handler)(ev).await });
            // reap whatever has already finished so the set doesn't grow without bound
            while let Some(done) = jobs.try_join_next() {
                log_join_result(done);
            }
        }
        debug!("📬️ All producers have gone. Waiting for {} handlers to complete", jobs.len());
        while let Some(done) = jobs.join_next().await {
            log_join_result(done);
        }
        debug!("📬️ Event handler has shut down");
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => trace!("📬️ Event handled"),
        Err(e) => warn!("📬️ An event handler task failed: {e}"),
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Publishes the event, waiting for room in the channel if the subscriber is behind. Failures are logged and
    /// otherwise ignored.
    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }

    /// Publishes the event without waiting. If the channel is full, or its handler is not running, the event is
    /// dropped with a warning. Returns whether the event was queued.
    pub fn try_publish_event(&self, event: E) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("📬️ Event channel is full. Its handler is behind or was never started. Dropping the event.");
                false
            },
            Err(TrySendError::Closed(_)) => {
                warn!("📬️ Event handler has shut down. Dropping the event.");
                false
            },
        }
    }
}

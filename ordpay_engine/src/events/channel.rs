//! Stateless pub-sub for engine events
//!
//! Each [`EventHandler`] owns the receiving end of a bounded channel and runs a user-supplied async callback for
//! every event it receives. Callbacks see the event and nothing else; they cannot reach back into the engine.
//!
//! Producers are cheap to clone. Once every producer has been dropped, the handler drains the in-flight callbacks and
//! shuts down.
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use log::*;
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    receiver: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        Self { receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // Only subscribers keep the channel open from here on
        drop(self.sender);
        let in_flight = Arc::new(AtomicUsize::new(0));
        while let Some(event) = self.receiver.recv().await {
            let handler = Arc::clone(&self.handler);
            let counter = Arc::clone(&in_flight);
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                (handler)(event).await;
                counter.fetch_sub(1, Ordering::SeqCst);
                trace!("📬️ Event handled");
            });
        }
        while in_flight.load(Ordering::SeqCst) > 0 {
            debug!("📬️ Waiting for {} event callbacks to complete", in_flight.load(Ordering::SeqCst));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        debug!("📬️ Event handler has shut down");
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

    /// Waits for space in the channel if it is full.
    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }

    /// Never waits. If the channel is full or closed, the event is dropped and a warning logged.
    pub fn try_publish_event(&self, event: E) {
        match self.sender.try_send(event) {
            Ok(()) => {},
            Err(mpsc::error::TrySendError::Full(_)) => warn!("📬️ Event channel is full. Event dropped."),
            Err(mpsc::error::TrySendError::Closed(_)) => warn!("📬️ Event channel is closed. Event dropped."),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicU64;

    use super::*;

    fn summing_handler(total: Arc<AtomicU64>) -> Handler<u64> {
        Arc::new(move |v| -> Pin<Box<dyn Future<Output = ()> + Send>> {
            let total = total.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                total.fetch_add(v, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn handler_drains_all_producers_before_shutting_down() {
        let _ = env_logger::try_init();
        let total = Arc::new(AtomicU64::new(0));
        let event_handler = EventHandler::new(1, summing_handler(total.clone()));
        let odd = event_handler.subscribe();
        let even = event_handler.subscribe();
        tokio::spawn(async move {
            for i in 0..5 {
                odd.publish_event(i * 2 + 1).await;
            }
        });
        tokio::spawn(async move {
            for i in 0..5 {
                even.publish_event(i * 2).await;
            }
        });
        event_handler.start_handler().await;
        assert_eq!(total.load(Ordering::SeqCst), 45);
    }

    #[tokio::test]
    async fn try_publish_drops_events_when_the_buffer_is_full() {
        let total = Arc::new(AtomicU64::new(0));
        let event_handler = EventHandler::new(2, summing_handler(total.clone()));
        let producer = event_handler.subscribe();
        // Nothing is consuming yet, so only the first two fit
        producer.try_publish_event(1);
        producer.try_publish_event(10);
        producer.try_publish_event(100);
        drop(producer);
        event_handler.start_handler().await;
        assert_eq!(total.load(Ordering::SeqCst), 11);
    }
}

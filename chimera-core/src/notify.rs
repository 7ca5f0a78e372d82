//! Process-wide notification bus, organized by named pipe. Publishers push updates onto a pipe
//! by name and subscribers attach independently; nobody needs to know who else is listening.

use std::collections::HashMap;
use std::sync::Mutex;

use log::trace;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// How a published message changes the state of the thing it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Changed,
    Removed,
}

/// One message delivered on a named pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub pipe: String,
    pub change_type: ChangeType,
    pub payload: String,
}

/// Bounded per-subscriber buffer; a subscriber that falls this far behind silently drops the
/// oldest messages rather than stalling the publisher.
const CHANNEL_CAPACITY: usize = 256;

/// A process-wide bus of named pipes. Publishers push without knowing who, if anyone, is
/// listening; subscribers attach to a pipe by name and optionally filter by change type.
pub struct NotificationBus {
    pipes: Mutex<HashMap<String, broadcast::Sender<Message>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        NotificationBus { pipes: Mutex::new(HashMap::new()) }
    }

    fn sender(&self, pipe: &str) -> broadcast::Sender<Message> {
        let mut pipes = self.pipes.lock().expect("notification bus mutex poisoned");
        pipes
            .entry(pipe.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish a message on `pipe`. A no-op, not an error, if nobody is currently subscribed
    /// (publishers do not know subscriber identity).
    pub fn publish(&self, pipe: &str, change_type: ChangeType, payload: impl Into<String>) {
        let sender = self.sender(pipe);
        let message = Message { pipe: pipe.to_owned(), change_type, payload: payload.into() };
        if sender.send(message).is_err() {
            trace!("published to {pipe} with no subscribers");
        }
    }

    /// Subscribe to `pipe`, optionally keeping only messages matching `filter`. Delivery is
    /// best-effort: a slow subscriber observes gaps rather than blocking the publisher.
    pub fn listen_changes(
        &self,
        pipe: &str,
        filter: Option<ChangeType>,
    ) -> impl Stream<Item = Message> {
        let receiver = self.sender(pipe).subscribe();
        BroadcastStream::new(receiver).filter_map(move |result| match result {
            Ok(message) => match filter {
                Some(wanted) if wanted != message.change_type => None,
                _ => Some(message),
            },
            Err(_lagged) => None,
        })
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt as _;

    #[tokio::test]
    async fn subscriber_receives_published_messages() {
        let bus = NotificationBus::new();
        let mut stream = Box::pin(bus.listen_changes("resources", None));
        bus.publish("resources", ChangeType::Changed, "port/0 reserved");
        let message = stream.next().await.unwrap();
        assert_eq!(message.pipe, "resources");
        assert_eq!(message.change_type, ChangeType::Changed);
        assert_eq!(message.payload, "port/0 reserved");
    }

    #[tokio::test]
    async fn filter_drops_non_matching_change_types() {
        let bus = NotificationBus::new();
        let mut stream = Box::pin(bus.listen_changes("resources", Some(ChangeType::Removed)));
        bus.publish("resources", ChangeType::Changed, "ignored");
        bus.publish("resources", ChangeType::Removed, "port/0 removed");
        let message = stream.next().await.unwrap();
        assert_eq!(message.change_type, ChangeType::Removed);
        assert_eq!(message.payload, "port/0 removed");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = NotificationBus::new();
        bus.publish("statistics", ChangeType::Changed, "noop");
    }

    #[tokio::test]
    async fn independent_pipes_do_not_cross_talk() {
        let bus = NotificationBus::new();
        let mut resources = Box::pin(bus.listen_changes("resources", None));
        let mut statistics = Box::pin(bus.listen_changes("statistics", None));
        bus.publish("resources", ChangeType::Changed, "r");
        bus.publish("statistics", ChangeType::Changed, "s");
        assert_eq!(resources.next().await.unwrap().payload, "r");
        assert_eq!(statistics.next().await.unwrap().payload, "s");
    }
}

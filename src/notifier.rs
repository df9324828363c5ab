//! Short user-facing messages
//!
//! Background tasks never display anything themselves; they hand messages to
//! a `Notifier`, which is free to marshal them to the foreground.

use tokio::sync::mpsc;
use tracing::info;

/// Fire-and-forget message sink
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Logs messages and forwards them over a channel to the foreground task
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, message: &str) {
        info!("{}", message);
        // A closed receiver means the foreground has gone away
        let _ = self.tx.send(message.to_string());
    }
}

/// Keeps every message, for assertions
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    messages: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_notifier_forwards_in_order() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify("first");
        notifier.notify("second");
        assert_eq!(rx.recv().await.as_deref(), Some("first"));
        assert_eq!(rx.recv().await.as_deref(), Some("second"));
    }

    #[test]
    fn test_send_after_receiver_dropped_is_ignored() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.notify("nobody listening");
    }
}

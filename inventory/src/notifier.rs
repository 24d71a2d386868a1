use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

/// Advisory change-notification bus.
///
/// Delivery is at-least-once; listeners poll on a timer as a fallback and
/// must tolerate a wake observing either the old or the new state.
pub trait Notifier: Send + Sync {
    /// Subscribe to a named channel. Dropping the receiver unsubscribes.
    fn listen(&self, name: &str) -> broadcast::Receiver<()>;
}

/// Process-local notifier fanning out over broadcast channels. Cross-cluster
/// deployments plug a distributed implementation into the same seam.
#[derive(Default)]
pub struct BroadcastNotifier {
    channels: Mutex<HashMap<String, broadcast::Sender<()>>>,
}

impl BroadcastNotifier {
    /// Wake all current listeners of the named channel.
    pub fn notify(&self, name: &str) {
        if let Some(tx) = self.channels.lock().unwrap().get(name) {
            let _ = tx.send(());
        }
    }
}

impl Notifier for BroadcastNotifier {
    fn listen(&self, name: &str) -> broadcast::Receiver<()> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(16).0)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::{BroadcastNotifier, Notifier};

    #[tokio::test]
    async fn listeners_receive_notifications() {
        let notifier = BroadcastNotifier::default();

        let mut rx = notifier.listen("Server.Internal.Inventory");
        notifier.notify("Server.Internal.Inventory");
        rx.recv().await.expect("notification must arrive");

        // A different channel does not wake this listener.
        notifier.notify("Server.Internal.Other");
        assert!(rx.try_recv().is_err());
    }
}

//! Broadcast hub
//!
//! Fan-out of server events to every attached listener. Delivery to a
//! closed listener silently removes it; nothing is retried or buffered.
//! A newly attached listener gets a catch-up snapshot (connection status
//! and current segment listing) pushed before any live events.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::ServerEvent;

/// Receiving side handed to an attached listener
pub type ListenerReceiver = mpsc::UnboundedReceiver<ServerEvent>;

/// Registry of currently attached listeners
#[derive(Default)]
pub struct BroadcastHub {
    listeners: Vec<(Uuid, mpsc::UnboundedSender<ServerEvent>)>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener, pushing the catch-up snapshot first.
    ///
    /// The snapshot is a push of current state, not a replay of historical
    /// events.
    pub fn attach(&mut self, snapshot: Vec<ServerEvent>) -> (Uuid, ListenerReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        for event in snapshot {
            let _ = tx.send(event);
        }

        self.listeners.push((id, tx));
        tracing::debug!(%id, total = self.listeners.len(), "listener attached");
        (id, rx)
    }

    /// Detach a listener by id
    pub fn detach(&mut self, id: Uuid) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }

    /// Deliver an event to every open listener, pruning closed ones
    pub fn broadcast(&mut self, event: &ServerEvent) {
        self.listeners.retain(|(id, tx)| {
            let open = tx.send(event.clone()).is_ok();
            if !open {
                tracing::debug!(%id, "dropping closed listener");
            }
            open
        });
    }

    /// Number of currently attached listeners
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(connected: bool) -> ServerEvent {
        ServerEvent::ObsStatus {
            connected,
            error: None,
        }
    }

    #[test]
    fn test_snapshot_delivered_before_live_events() {
        let mut hub = BroadcastHub::new();
        let (_, mut rx) = hub.attach(vec![status(true)]);
        hub.broadcast(&ServerEvent::Error {
            message: "later".into(),
        });

        assert_eq!(rx.try_recv().unwrap(), status(true));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerEvent::Error { .. }
        ));
    }

    #[test]
    fn test_closed_listeners_are_pruned_silently() {
        let mut hub = BroadcastHub::new();
        let (_, rx_dead) = hub.attach(vec![]);
        let (_, mut rx_live) = hub.attach(vec![]);
        drop(rx_dead);

        hub.broadcast(&status(false));
        assert_eq!(hub.len(), 1);
        assert_eq!(rx_live.try_recv().unwrap(), status(false));
    }

    #[test]
    fn test_detach_stops_delivery() {
        let mut hub = BroadcastHub::new();
        let (id, mut rx) = hub.attach(vec![]);
        hub.detach(id);
        hub.broadcast(&status(true));
        assert!(rx.try_recv().is_err());
        assert!(hub.is_empty());
    }
}

// src/event_bridge.rs
//
// Bridges the engine's own OS thread to the façade's tokio runtime: a
// crossbeam_channel carries commands into the engine thread, a
// tokio::sync::broadcast channel fans engine events out to however many
// façade clients are subscribed. Store entries are already Arc-backed
// (TagHandle/DeviceHandle), so cloning the Arc before it crosses the
// channel is enough to keep a tag/device alive across the hop.

use crossbeam_channel::{Receiver, Sender};
use tokio::sync::broadcast;

use crate::types::{EngineCommand, EngineEvent};

// A slow façade client that falls this far behind starts lagging instead
// of growing the channel unbounded.
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub type CommandSender = Sender<EngineCommand>;
pub type CommandReceiver = Receiver<EngineCommand>;

pub type EventSender = broadcast::Sender<EngineEvent>;
pub type EventReceiver = broadcast::Receiver<EngineEvent>;

pub struct EngineBridge {
    pub command_tx: CommandSender,
    pub command_rx: CommandReceiver,
    pub event_tx: EventSender,
}

impl EngineBridge {
    pub fn new() -> Self {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EngineBridge {
            command_tx,
            command_rx,
            event_tx,
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }
}

impl Default for EngineBridge {
    fn default() -> Self {
        Self::new()
    }
}

// A SendError here just means nobody is currently listening.
pub fn publish(event_tx: &EventSender, event: EngineEvent) {
    let _ = event_tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NfcMode;

    #[test]
    fn commands_flow_through_the_crossbeam_side() {
        let bridge = EngineBridge::new();
        bridge
            .command_tx
            .send(EngineCommand::StartPoll(NfcMode::Dual))
            .unwrap();
        assert!(matches!(
            bridge.command_rx.recv().unwrap(),
            EngineCommand::StartPoll(NfcMode::Dual)
        ));
    }

    #[test]
    fn events_fan_out_to_every_subscriber() {
        let bridge = EngineBridge::new();
        let mut sub_a = bridge.subscribe();
        let mut sub_b = bridge.subscribe();
        publish(&bridge.event_tx, EngineEvent::TagDetected { id: 3 });
        assert!(matches!(
            sub_a.try_recv().unwrap(),
            EngineEvent::TagDetected { id: 3 }
        ));
        assert!(matches!(
            sub_b.try_recv().unwrap(),
            EngineEvent::TagDetected { id: 3 }
        ));
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bridge = EngineBridge::new();
        publish(&bridge.event_tx, EngineEvent::PollingChanged { polling: true });
    }
}

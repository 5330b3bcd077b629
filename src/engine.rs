// src/engine.rs
//
// Polling/session engine: the state machine that owns the radio driver,
// drains commands, and emits lifecycle events. Outer loop keeps the engine
// alive across driver hiccups; inner loop waits on the next thing to
// happen, a discovery iteration, a presence check, or a queued command.

use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use log::{error, info, warn};

use crate::config::EngineConfig;
use crate::device_store::DeviceStore;
use crate::driver::{DiscoveryOutcome, RadioDriver};
use crate::event_bridge::{publish, CommandReceiver, EventSender};
use crate::error::{DriverError, EngineError};
use crate::llcp;
use crate::tag_store::TagStore;
use crate::types::{EngineCommand, EngineEvent, NfcMode, Role, TagStatus};

/// Poll interval used while in [`EngineState::Polling`] and while idle.
/// Distinct from the presence-check interval, which only applies once a
/// tag/device is present.
const POLL_LOOP_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Idle,
    Polling(NfcMode),
    TagPresent(u32),
    DevicePresent(u32),
}

/// Owns the radio driver and the tag/device registries; runs on its own
/// OS thread.
pub struct Engine {
    driver: Box<dyn RadioDriver>,
    config: EngineConfig,
    tags: TagStore,
    devices: DeviceStore,
    state: EngineState,
}

impl Engine {
    pub fn new(driver: Box<dyn RadioDriver>, config: EngineConfig) -> Self {
        Engine {
            driver,
            config,
            tags: TagStore::new(),
            devices: DeviceStore::new(),
            state: EngineState::Idle,
        }
    }

    pub fn tags(&self) -> &TagStore {
        &self.tags
    }

    pub fn devices(&self) -> &DeviceStore {
        &self.devices
    }

    // Mirrors whatever ModeChanged was last published.
    pub fn get_mode(&self) -> NfcMode {
        match self.state {
            EngineState::Idle => NfcMode::Idle,
            EngineState::Polling(mode) => mode,
            EngineState::TagPresent(_) => NfcMode::Initiator,
            EngineState::DevicePresent(id) => match self.devices.get(id) {
                Some(handle) if handle.lock().role == Role::Target => NfcMode::Target,
                _ => NfcMode::Initiator,
            },
        }
    }

    pub fn is_polling(&self) -> bool {
        matches!(self.state, EngineState::Polling(_))
    }

    /// Runs until an [`EngineCommand::Join`] is received. Intended to be
    /// the body of the engine's dedicated thread.
    pub fn run(&mut self, command_rx: &CommandReceiver, event_tx: &EventSender) {
        if let Err(e) = self.driver.init() {
            error!("driver init failed, engine cannot start: {e}");
            return;
        }

        loop {
            match self.recv_next_command(command_rx) {
                Some(EngineCommand::Join) => break,
                Some(cmd) => self.handle_command(cmd, event_tx),
                None => {}
            }
            self.tick(event_tx);
        }

        self.driver.close();
        info!("engine stopped");
    }

    fn recv_next_command(&self, command_rx: &CommandReceiver) -> Option<EngineCommand> {
        let timeout = match self.state {
            EngineState::Idle => POLL_LOOP_INTERVAL,
            EngineState::Polling(_) => POLL_LOOP_INTERVAL,
            EngineState::TagPresent(_) | EngineState::DevicePresent(_) => {
                self.config.presence_check_interval()
            }
        };
        match command_rx.recv_timeout(timeout) {
            Ok(cmd) => Some(cmd),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(EngineCommand::Join),
        }
    }

    fn handle_command(&mut self, cmd: EngineCommand, event_tx: &EventSender) {
        match cmd {
            EngineCommand::Join => unreachable!("handled by caller"),
            EngineCommand::StartPoll(mode) => {
                if let Err(e) = self.driver.configure_discovery(mode) {
                    warn!("configure_discovery failed: {e}");
                    return;
                }
                self.state = EngineState::Polling(mode);
                publish(event_tx, EngineEvent::ModeChanged { mode });
                publish(event_tx, EngineEvent::PollingChanged { polling: true });
            }
            EngineCommand::StopPoll => {
                let _ = self.driver.field_off();
                self.state = EngineState::Idle;
                publish(event_tx, EngineEvent::PollingChanged { polling: false });
            }
            EngineCommand::WriteTag { id, bytes } => self.handle_write_tag(id, bytes),
            EngineCommand::PushDevice { id, bytes } => self.handle_push_device(id, bytes),
        }
    }

    fn handle_write_tag(&mut self, id: u32, bytes: Vec<u8>) {
        let Some(handle) = self.tags.get(id) else {
            warn!("{}", EngineError::UnknownTag(id));
            return;
        };
        if !handle.lock().connected {
            warn!("{}", EngineError::TagDisconnected(id));
            return;
        }
        let needs_format = matches!(handle.lock().status, TagStatus::Formattable);
        if needs_format {
            if let Err(e) = self.driver.format_ndef() {
                warn!("format failed for tag {id}: {e}");
                return;
            }
            handle.lock().status = TagStatus::ReadWrite;
        }
        match self.driver.write_ndef(&bytes) {
            Ok(()) => handle.lock().ndef = bytes,
            Err(e) => warn!("write failed for tag {id}: {e}"),
        }
    }

    fn handle_push_device(&mut self, id: u32, bytes: Vec<u8>) {
        let Some(handle) = self.devices.get(id) else {
            warn!("{}", EngineError::UnknownDevice(id));
            return;
        };
        if !handle.lock().connected {
            warn!("{}", EngineError::DeviceDisconnected(id));
            return;
        }
        if let Err(e) = llcp::snep_push(self.driver.as_mut(), &bytes) {
            warn!("SNEP push failed for device {id}: {e}");
        }
    }

    fn tick(&mut self, event_tx: &EventSender) {
        match self.state {
            EngineState::Idle => {}
            EngineState::Polling(mode) => self.tick_polling(mode, event_tx),
            EngineState::TagPresent(id) => self.tick_tag_present(id, event_tx),
            EngineState::DevicePresent(id) => self.tick_device_present(id, event_tx),
        }
    }

    fn tick_polling(&mut self, mode: NfcMode, event_tx: &EventSender) {
        match self.driver.poll() {
            Ok(DiscoveryOutcome::NoTech) | Ok(DiscoveryOutcome::Collision) => {}
            Ok(DiscoveryOutcome::ExternalFieldOn) | Ok(DiscoveryOutcome::ExternalFieldOff) => {}
            Ok(DiscoveryOutcome::Tag {
                tech,
                iso14443a,
                felica,
            }) => {
                let handle = self.tags.insert(tech);
                let id = {
                    let mut entry = handle.lock();
                    entry.iso14443a = iso14443a;
                    let _ = felica; // Tag3 has no felica-specific fields beyond tech
                    entry.status = match self.driver.read_ndef() {
                        Ok(bytes) if !bytes.is_empty() => {
                            entry.ndef = bytes;
                            TagStatus::ReadWrite
                        }
                        Ok(_) => TagStatus::Formattable,
                        Err(_) => TagStatus::Invalid,
                    };
                    entry.id
                };
                self.state = EngineState::TagPresent(id);
                publish(event_tx, EngineEvent::ModeChanged { mode: NfcMode::Initiator });
                publish(event_tx, EngineEvent::PollingChanged { polling: false });
                publish(event_tx, EngineEvent::TagDetected { id });
            }
            Ok(DiscoveryOutcome::Device {
                tech,
                role,
                general_bytes,
            }) => {
                if llcp::parse_general_bytes(&general_bytes).is_none() {
                    warn!("activated peer is not an LLCP node, returning to polling");
                    return;
                }
                let handle = self.devices.insert(tech, role);
                let id = handle.lock().id;
                self.state = EngineState::DevicePresent(id);
                let mode = if role == Role::Initiator {
                    NfcMode::Initiator
                } else {
                    NfcMode::Target
                };
                publish(event_tx, EngineEvent::ModeChanged { mode });
                publish(event_tx, EngineEvent::PollingChanged { polling: false });
                publish(event_tx, EngineEvent::DeviceDetected { id });
            }
            Err(e) => self.log_poll_error(mode, e),
        }
    }

    fn log_poll_error(&self, mode: NfcMode, e: DriverError) {
        match e {
            DriverError::InitFailed(_) => error!("fatal driver error while polling: {e}"),
            _ => warn!("transient error while polling in {mode:?}: {e}"),
        }
    }

    fn tick_tag_present(&mut self, id: u32, event_tx: &EventSender) {
        let present = self.driver.presence_check().unwrap_or(false);
        if present {
            return;
        }
        self.tags.release(id);
        publish(event_tx, EngineEvent::TagLost { id });
        self.return_to_idle_or_poll(event_tx);
    }

    fn tick_device_present(&mut self, id: u32, event_tx: &EventSender) {
        match llcp::snep_serve_once(self.driver.as_mut(), self.config.snep_put_ceiling) {
            Ok(Some(ndef)) => {
                if let Some(handle) = self.devices.get(id) {
                    handle.lock().ndef = ndef;
                }
                publish(event_tx, EngineEvent::DeviceNdefReceived { id });
            }
            Ok(None) => {}
            Err(e) => warn!("SNEP serve error for device {id}: {e}"),
        }

        let present = self.driver.presence_check().unwrap_or(false);
        if present {
            return;
        }
        self.devices.release(id);
        publish(event_tx, EngineEvent::DeviceLost { id });
        self.return_to_idle_or_poll(event_tx);
    }

    fn return_to_idle_or_poll(&mut self, event_tx: &EventSender) {
        if self.config.constant_poll {
            let mode = NfcMode::Dual;
            let _ = self.driver.configure_discovery(mode);
            self.state = EngineState::Polling(mode);
            publish(event_tx, EngineEvent::ModeChanged { mode });
            publish(event_tx, EngineEvent::PollingChanged { polling: true });
        } else {
            let _ = self.driver.field_off();
            self.state = EngineState::Idle;
            publish(event_tx, EngineEvent::PollingChanged { polling: false });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::simulated::{ScriptStep, SimulatedDriver};

    fn bridge() -> crate::event_bridge::EngineBridge {
        crate::event_bridge::EngineBridge::new()
    }

    #[test]
    fn start_poll_then_tag_detected_transitions_state() {
        let driver = SimulatedDriver::new().script([ScriptStep::Outcome(
            DiscoveryOutcome::Tag {
                tech: crate::types::TechClass::Tag2,
                iso14443a: None,
                felica: None,
            },
        )]);
        let mut engine = Engine::new(Box::new(driver), EngineConfig::default());
        let bridge = bridge();
        let mut events = bridge.subscribe();

        bridge
            .command_tx
            .send(EngineCommand::StartPoll(NfcMode::Dual))
            .unwrap();
        engine.handle_command(
            bridge.command_rx.recv().unwrap(),
            &bridge.event_tx,
        );
        engine.tick(&bridge.event_tx);

        assert!(matches!(engine.state, EngineState::TagPresent(0)));
        assert!(!engine.is_polling());
        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::ModeChanged { mode: NfcMode::Dual }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::PollingChanged { polling: true }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::ModeChanged { mode: NfcMode::Initiator }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::PollingChanged { polling: false }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::TagDetected { id: 0 }
        ));
    }

    #[test]
    fn tag_lost_releases_and_resumes_polling_when_constant_poll() {
        let driver = SimulatedDriver::new();
        let mut engine = Engine::new(Box::new(driver), EngineConfig::default());
        engine.tags.insert(crate::types::TechClass::Tag1);
        engine.state = EngineState::TagPresent(0);
        engine
            .driver
            .as_simulated()
            .expect("engine built with a SimulatedDriver")
            .set_present(false);

        let bridge = bridge();
        let mut events = bridge.subscribe();
        engine.tick_tag_present(0, &bridge.event_tx);

        assert!(matches!(engine.state, EngineState::Polling(NfcMode::Dual)));
        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::TagLost { id: 0 }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::ModeChanged { mode: NfcMode::Dual }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::PollingChanged { polling: true }
        ));
        assert!(engine.tags.get(0).is_none());
        assert!(engine.is_polling());
    }

    #[test]
    fn write_on_unknown_tag_is_dropped_without_panicking() {
        let mut engine = Engine::new(Box::new(SimulatedDriver::new()), EngineConfig::default());
        engine.handle_write_tag(99, vec![1, 2, 3]);
    }

    #[test]
    fn write_on_disconnected_tag_is_dropped_and_leaves_buffer_untouched() {
        let mut engine = Engine::new(Box::new(SimulatedDriver::new()), EngineConfig::default());
        let handle = engine.tags.insert(crate::types::TechClass::Tag2);
        handle.lock().connected = false;
        let id = handle.lock().id;

        engine.handle_write_tag(id, vec![9, 9, 9]);

        assert!(handle.lock().ndef.is_empty());
    }

    #[test]
    fn device_ndef_received_updates_store_and_emits_event() {
        let mut driver = SimulatedDriver::new();
        driver.push_inbound_llcp(llcp::snep_encode_put(b"hello"));
        let mut engine = Engine::new(Box::new(driver), EngineConfig::default());
        let handle = engine.devices.insert(
            crate::types::TechClass::DevNfcDepA(Role::Target),
            Role::Target,
        );
        let id = handle.lock().id;
        engine.state = EngineState::DevicePresent(id);

        let bridge = bridge();
        let mut events = bridge.subscribe();
        engine.tick_device_present(id, &bridge.event_tx);

        assert_eq!(handle.lock().ndef, b"hello");
        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::DeviceNdefReceived { id: received } if received == id
        ));
    }
}

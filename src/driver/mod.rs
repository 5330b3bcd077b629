// src/driver/mod.rs
//
// Radio driver façade. PcscDriver drives real PC/SC-attached readers,
// SimulatedDriver drives a scriptable in-memory fake for tests. Both speak
// the same discovery-iteration vocabulary.

pub mod pcsc;
pub mod simulated;

use crate::error::DriverError;
use crate::types::{FelicaParams, Iso14443AParams, NfcMode, Role, TechClass};

#[derive(Debug, Clone)]
pub enum DiscoveryOutcome {
    NoTech,
    // More than one technology/device responded; back off and retry.
    Collision,
    ExternalFieldOn,
    ExternalFieldOff,
    Tag {
        tech: TechClass,
        iso14443a: Option<Iso14443AParams>,
        felica: Option<FelicaParams>,
    },
    Device {
        tech: TechClass,
        role: Role,
        general_bytes: Vec<u8>,
    },
}

// One blocking call per operation: the engine thread owns the one
// implementation in use and calls these synchronously.
pub trait RadioDriver: Send {
    fn init(&mut self) -> Result<(), DriverError>;

    fn close(&mut self);

    fn configure_discovery(&mut self, mode: NfcMode) -> Result<(), DriverError>;

    fn field_off(&mut self) -> Result<(), DriverError>;

    fn poll(&mut self) -> Result<DiscoveryOutcome, DriverError>;

    fn presence_check(&mut self) -> Result<bool, DriverError>;

    fn read_ndef(&mut self) -> Result<Vec<u8>, DriverError>;

    fn write_ndef(&mut self, bytes: &[u8]) -> Result<(), DriverError>;

    fn format_ndef(&mut self) -> Result<(), DriverError>;

    fn atr_exchange(&mut self, our_general_bytes: &[u8]) -> Result<Vec<u8>, DriverError>;

    fn llcp_send(&mut self, pdu: &[u8]) -> Result<(), DriverError>;

    // Ok(None) means nothing arrived within the driver's internal timeout,
    // not an error.
    fn llcp_recv(&mut self) -> Result<Option<Vec<u8>>, DriverError>;

    // Lets engine tests reach into a SimulatedDriver (e.g. to flip presence
    // mid-session). None for any real backend.
    fn as_simulated(&mut self) -> Option<&mut simulated::SimulatedDriver> {
        None
    }
}

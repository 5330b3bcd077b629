// src/types.rs
//
// Core data model shared by the store, driver, and engine modules.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Initiator,
    Target,
}

// What a discovery iteration classified the field as holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TechClass {
    Tag1,
    Tag2,
    Tag3,
    Tag4A,
    DevNfcDepA(Role),
    DevNfcDepF(Role),
}

impl TechClass {
    pub fn is_tag(self) -> bool {
        matches!(self, TechClass::Tag1 | TechClass::Tag2 | TechClass::Tag3 | TechClass::Tag4A)
    }

    pub fn is_felica_tag(self) -> bool {
        matches!(self, TechClass::Tag3)
    }

    pub fn is_iso14443a_tag(self) -> bool {
        matches!(self, TechClass::Tag1 | TechClass::Tag2 | TechClass::Tag4A)
    }

    pub fn is_device_initiator(self) -> bool {
        matches!(
            self,
            TechClass::DevNfcDepA(Role::Initiator) | TechClass::DevNfcDepF(Role::Initiator)
        )
    }

    pub fn is_device(self) -> bool {
        matches!(self, TechClass::DevNfcDepA(_) | TechClass::DevNfcDepF(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagStatus {
    ReadWrite,
    ReadOnly,
    Formattable,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NfcMode {
    Initiator,
    Target,
    Dual,
    Idle,
}

/// ISO14443A-specific parameters captured at discovery time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Iso14443AParams {
    pub atqa: [u8; 2],
    pub sak: u8,
    pub uid: Vec<u8>, // at most 10 bytes, enforced by the driver
}

/// Felica-specific parameters captured at discovery time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FelicaParams {
    pub manufacturer: [u8; 2],
    pub cid: [u8; 6],
    pub ic: [u8; 2],
    pub max_resp_times: [u8; 6],
}

/// Events the engine publishes to the façade.
///
/// For any one id, `*Detected` precedes `*NdefReceived` precedes `*Lost`,
/// and `*Lost` is always the last event for that id.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    ModeChanged { mode: NfcMode },
    PollingChanged { polling: bool },
    TagDetected { id: u32 },
    TagLost { id: u32 },
    DeviceDetected { id: u32 },
    DeviceNdefReceived { id: u32 },
    DeviceLost { id: u32 },
}

#[derive(Debug, Clone)]
pub enum EngineCommand {
    StartPoll(NfcMode),
    StopPoll,
    WriteTag { id: u32, bytes: Vec<u8> },
    PushDevice { id: u32, bytes: Vec<u8> },
    Join,
}

// Radio listen parameters advertised during passive-target activation.
pub mod listen_params {
    pub const SENS_RES: [u8; 2] = [0x04, 0x00];
    pub const NFCID1_USER: [u8; 3] = [0xA1, 0xA2, 0xA3];
    pub const SEL_RES: u8 = 0x40;
    pub const NFCID3: u8 = 0xFA;
    pub const FELICA_POLL_RES: [u8; 18] = [
        0x01, 0xFE, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xC0, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6,
        0xC7, 0x23, 0x45,
    ];

    pub const LLCP_MIU_INDEX: u8 = 0; // 128-byte units
    pub const LLCP_WKS: u8 = 0x11; // SNEP + LLCP well-known service bits
    pub const LLCP_LTO: u8 = 100;
    pub const LLCP_OPT: u8 = 0x02;

    pub const ATR_BST: u8 = 0x00;
    pub const ATR_BRT: u8 = 0x00;
    pub const ATR_TO: u8 = 8;
    pub const ATR_LRT: u8 = 3;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tech_class_predicates() {
        assert!(TechClass::Tag1.is_tag());
        assert!(TechClass::Tag3.is_felica_tag());
        assert!(!TechClass::Tag3.is_iso14443a_tag());
        assert!(TechClass::Tag4A.is_iso14443a_tag());
        assert!(TechClass::DevNfcDepA(Role::Initiator).is_device_initiator());
        assert!(!TechClass::DevNfcDepF(Role::Target).is_device_initiator());
        assert!(TechClass::DevNfcDepF(Role::Target).is_device());
        assert!(!TechClass::Tag2.is_device());
    }
}

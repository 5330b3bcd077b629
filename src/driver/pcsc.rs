// src/driver/pcsc.rs
//
// PC/SC-backed RadioDriver. Card I/O is plain READ BINARY/UPDATE BINARY
// APDUs over a connected pcsc::Card. Tag classification reads the SAK byte
// a contactless reader reports in the card's historical bytes (PC/SC Part 3
// storage-card descriptor) rather than a raw RF response.

use std::ffi::CString;
use std::time::Duration;

use log::{debug, warn};
use pcsc::{Card, Context, Protocols, ShareMode, State};

use super::{DiscoveryOutcome, RadioDriver};
use crate::error::DriverError;
use crate::types::{Iso14443AParams, NfcMode, TechClass};

const READ_BINARY_MAX_CHUNK: usize = 240;
const NDEF_TLV_TAG: u8 = 0x03;
const NDEF_TLV_TERMINATOR: u8 = 0xFE;
const NDEF_DATA_START_OFFSET: usize = 4; // page 4, first user-memory block

pub struct PcscDriver {
    ctx: Option<Context>,
    reader_name_filter: Vec<String>,
    reader_name: Option<CString>,
    card: Option<Card>,
    mode: NfcMode,
}

impl PcscDriver {
    pub fn new(reader_name_filter: Vec<String>) -> Self {
        PcscDriver {
            ctx: None,
            reader_name_filter,
            reader_name: None,
            card: None,
            mode: NfcMode::Idle,
        }
    }

    fn ctx(&self) -> Result<&Context, DriverError> {
        self.ctx
            .as_ref()
            .ok_or_else(|| DriverError::InitFailed("driver not initialized".into()))
    }

    fn list_matching_readers(&self) -> Result<Vec<CString>, DriverError> {
        let ctx = self.ctx()?;
        let mut buf = Vec::new();
        let readers = ctx
            .list_readers(&mut buf)
            .map_err(|e| DriverError::Transient(e.to_string()))?;
        let matching: Vec<CString> = readers
            .filter(|name| {
                self.reader_name_filter.is_empty()
                    || self.reader_name_filter.iter().any(|f| {
                        name.to_string_lossy().contains(f.as_str())
                    })
            })
            .map(|n| n.to_owned())
            .collect();
        Ok(matching)
    }

    fn connected_card(&mut self) -> Result<&mut Card, DriverError> {
        self.card
            .as_mut()
            .ok_or(DriverError::PresenceLost)
    }

    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, DriverError> {
        let card = self.connected_card()?;
        let mut resp = vec![0u8; 262];
        let resp = card
            .transmit(apdu, &mut resp)
            .map_err(|e| DriverError::Nak(e.to_string()))?;
        Ok(resp.to_vec())
    }

    fn read_binary(&mut self, offset: u16, len: u8) -> Result<Vec<u8>, DriverError> {
        let apdu = [0x00, 0xB0, (offset >> 8) as u8, offset as u8, len];
        let resp = self.transmit(&apdu)?;
        check_sw(&resp)
    }

    fn update_binary(&mut self, offset: u16, data: &[u8]) -> Result<(), DriverError> {
        let mut apdu = vec![0x00, 0xD6, (offset >> 8) as u8, offset as u8, data.len() as u8];
        apdu.extend_from_slice(data);
        let resp = self.transmit(&apdu)?;
        check_sw(&resp).map(|_| ())
    }

    fn read_tag_memory(&mut self) -> Result<Vec<u8>, DriverError> {
        let mut memory = Vec::new();
        let mut offset = NDEF_DATA_START_OFFSET as u16;
        while memory.len() < READ_BINARY_MAX_CHUNK {
            match self.read_binary(offset, 16) {
                Ok(chunk) if !chunk.is_empty() => {
                    let done = chunk.len() < 16;
                    memory.extend(chunk);
                    offset += 16;
                    if done {
                        break;
                    }
                }
                _ => break,
            }
        }
        Ok(memory)
    }
}

impl RadioDriver for PcscDriver {
    fn init(&mut self) -> Result<(), DriverError> {
        let ctx = Context::establish(pcsc::Scope::User)
            .map_err(|e| DriverError::InitFailed(e.to_string()))?;
        self.ctx = Some(ctx);
        Ok(())
    }

    fn close(&mut self) {
        self.card = None;
        self.reader_name = None;
        self.ctx = None;
    }

    fn configure_discovery(&mut self, mode: NfcMode) -> Result<(), DriverError> {
        self.mode = mode;
        Ok(())
    }

    fn field_off(&mut self) -> Result<(), DriverError> {
        self.card = None;
        Ok(())
    }

    fn poll(&mut self) -> Result<DiscoveryOutcome, DriverError> {
        let readers = self.list_matching_readers()?;
        if readers.is_empty() {
            return Ok(DiscoveryOutcome::NoTech);
        }

        let ctx = self.ctx.take().unwrap();
        let mut states: Vec<pcsc::ReaderState> = readers
            .iter()
            .map(|name| pcsc::ReaderState::new(name.clone(), State::UNAWARE))
            .collect();

        let changed = ctx.get_status_change(Duration::from_millis(250), &mut states);
        self.ctx = Some(ctx);

        let changed = match changed {
            Ok(()) => true,
            Err(pcsc::Error::Timeout) => false,
            Err(e) => return Err(DriverError::Transient(e.to_string())),
        };
        if !changed {
            return Ok(DiscoveryOutcome::NoTech);
        }

        for state in &states {
            if !state.event_state().contains(State::PRESENT) {
                continue;
            }
            let reader_name = state.name().to_owned();
            let ctx = self.ctx()?;
            let card = match ctx.connect(&reader_name, ShareMode::Shared, Protocols::ANY) {
                Ok(card) => card,
                Err(e) => {
                    warn!("card connect failed on {:?}: {e}", reader_name);
                    continue;
                }
            };
            let atr = state.atr().to_vec();
            self.card = Some(card);
            self.reader_name = Some(reader_name);

            return Ok(classify_atr(&atr));
        }

        Ok(DiscoveryOutcome::NoTech)
    }

    fn presence_check(&mut self) -> Result<bool, DriverError> {
        let card = self.connected_card()?;
        let mut atr_buf = [0u8; 33];
        let mut reader_buf = [0u8; 256];
        match card.status2(&mut reader_buf, &mut atr_buf) {
            Ok(status) => Ok(status.state().contains(pcsc::State::PRESENT)),
            Err(_) => Ok(false),
        }
    }

    fn read_ndef(&mut self) -> Result<Vec<u8>, DriverError> {
        let memory = self.read_tag_memory()?;
        extract_ndef_from_tlv(&memory)
    }

    fn write_ndef(&mut self, bytes: &[u8]) -> Result<(), DriverError> {
        let mut tlv = Vec::with_capacity(bytes.len() + 3);
        tlv.push(NDEF_TLV_TAG);
        if bytes.len() <= 0xFE {
            tlv.push(bytes.len() as u8);
        } else {
            tlv.push(0xFF);
            tlv.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        }
        tlv.extend_from_slice(bytes);
        tlv.push(NDEF_TLV_TERMINATOR);

        let mut offset = NDEF_DATA_START_OFFSET as u16;
        for chunk in tlv.chunks(4) {
            let mut page = chunk.to_vec();
            page.resize(4, 0);
            self.update_binary(offset, &page)?;
            offset += 4;
        }
        Ok(())
    }

    fn format_ndef(&mut self) -> Result<(), DriverError> {
        self.write_ndef(&[])
    }

    fn atr_exchange(&mut self, _our_general_bytes: &[u8]) -> Result<Vec<u8>, DriverError> {
        // NFC-DEP ATR exchange is not reachable over a PC/SC contact
        // reader; P2P devices are only ever discovered through
        // SimulatedDriver in this build.
        Err(DriverError::Transient(
            "NFC-DEP ATR exchange unsupported on PcscDriver".into(),
        ))
    }

    fn llcp_send(&mut self, _pdu: &[u8]) -> Result<(), DriverError> {
        Err(DriverError::Transient("LLCP unsupported on PcscDriver".into()))
    }

    fn llcp_recv(&mut self) -> Result<Option<Vec<u8>>, DriverError> {
        Err(DriverError::Transient("LLCP unsupported on PcscDriver".into()))
    }
}

fn check_sw(resp: &[u8]) -> Result<Vec<u8>, DriverError> {
    if resp.len() < 2 {
        return Err(DriverError::Nak("short APDU response".into()));
    }
    let (data, sw) = resp.split_at(resp.len() - 2);
    if sw != [0x90, 0x00] {
        return Err(DriverError::Nak(format!("SW={:02X}{:02X}", sw[0], sw[1])));
    }
    Ok(data.to_vec())
}

/// Classifies a connected card from its ATR historical bytes:
/// `(sak & !0xFB) == 0` gates storage-card handling, then `(sak & 0x60) >> 5`
/// selects Type 2 vs Type 4A.
fn classify_atr(atr: &[u8]) -> DiscoveryOutcome {
    let Some(sak) = extract_sak(atr) else {
        debug!("ATR without a recognizable storage-card descriptor: {atr:?}");
        return DiscoveryOutcome::NoTech;
    };

    if sak & !0xFB != 0 {
        return DiscoveryOutcome::NoTech;
    }
    let tech = match (sak & 0x60) >> 5 {
        0 => TechClass::Tag2,
        3 => TechClass::Tag4A,
        _ => return DiscoveryOutcome::NoTech, // NFC-DEP-capable, not a plain tag
    };

    DiscoveryOutcome::Tag {
        tech,
        iso14443a: Some(Iso14443AParams {
            atqa: [0, 0],
            sak,
            uid: Vec::new(),
        }),
        felica: None,
    }
}

/// PC/SC Part 3 storage-card historical bytes carry a compact-TLV
/// descriptor; tag `0xA1` ("card name") is where contactless readers place
/// the 14443A SAK as the descriptor's last byte.
fn extract_sak(atr: &[u8]) -> Option<u8> {
    let pos = atr.iter().position(|&b| b == 0xA1)?;
    atr.get(atr.len().min(pos + 1)..).and_then(|rest| rest.last().copied())
}

fn extract_ndef_from_tlv(memory: &[u8]) -> Result<Vec<u8>, DriverError> {
    let mut i = 0usize;
    while i < memory.len() {
        match memory[i] {
            0x00 => {
                i += 1;
            }
            NDEF_TLV_TERMINATOR => break,
            NDEF_TLV_TAG => {
                if i + 1 >= memory.len() {
                    break;
                }
                let (len, data_start) = if memory[i + 1] == 0xFF {
                    if i + 4 > memory.len() {
                        break;
                    }
                    let len = u16::from_be_bytes([memory[i + 2], memory[i + 3]]) as usize;
                    (len, i + 4)
                } else {
                    (memory[i + 1] as usize, i + 2)
                };
                let end = (data_start + len).min(memory.len());
                return Ok(memory[data_start..end].to_vec());
            }
            _ => {
                // Unknown TLV: skip tag + length-prefixed payload.
                if i + 1 >= memory.len() {
                    break;
                }
                let len = memory[i + 1] as usize;
                i += 2 + len;
            }
        }
    }
    Ok(Vec::new())
}

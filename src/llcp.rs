// src/llcp.rs
//
// LLCP/SNEP peer-to-peer session manager. PDU transport rides on whatever
// RadioDriver is active (llcp_send/llcp_recv/atr_exchange) rather than a
// separate transport trait, since it's the same radio link either way.

use log::{debug, info, warn};

use crate::driver::RadioDriver;
use crate::error::DriverError;
use crate::types::listen_params::{LLCP_LTO, LLCP_MIU_INDEX, LLCP_OPT, LLCP_WKS};

const LLCP_MAGIC: [u8; 3] = [0x46, 0x66, 0x6d];
const TLV_VERSION: u8 = 0x01;
const TLV_MIUX: u8 = 0x02;
const TLV_WKS: u8 = 0x03;
const TLV_LTO: u8 = 0x04;
const TLV_OPT: u8 = 0x05;
const LLCP_VERSION: u8 = 0x11; // major 1, minor 1

#[derive(Debug, Clone, Default)]
pub struct PeerLlcpParams {
    pub version: Option<u8>,
    pub miux: Option<u16>,
    pub wks: Option<u16>,
    pub lto: Option<u8>,
}

// Builds this side's LLCP general bytes to hand to atr_exchange.
pub fn build_general_bytes() -> Vec<u8> {
    let mut bytes = LLCP_MAGIC.to_vec();
    bytes.extend(tlv(TLV_VERSION, &[LLCP_VERSION]));
    bytes.extend(tlv(TLV_MIUX, &[0x00, LLCP_MIU_INDEX]));
    bytes.extend(tlv(TLV_WKS, &[0x00, LLCP_WKS]));
    bytes.extend(tlv(TLV_LTO, &[LLCP_LTO]));
    bytes.extend(tlv(TLV_OPT, &[LLCP_OPT]));
    bytes
}

fn tlv(kind: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![kind, value.len() as u8];
    out.extend_from_slice(value);
    out
}

// Returns None if the LLCP magic number is absent (the peer isn't an LLCP
// node).
pub fn parse_general_bytes(bytes: &[u8]) -> Option<PeerLlcpParams> {
    if bytes.len() < 3 || bytes[0..3] != LLCP_MAGIC {
        return None;
    }
    let mut params = PeerLlcpParams::default();
    let mut i = 3usize;
    while i + 2 <= bytes.len() {
        let kind = bytes[i];
        let len = bytes[i + 1] as usize;
        let value_start = i + 2;
        if value_start + len > bytes.len() {
            break;
        }
        let value = &bytes[value_start..value_start + len];
        match kind {
            TLV_VERSION if len == 1 => params.version = Some(value[0]),
            TLV_MIUX if len == 2 => params.miux = Some(u16::from_be_bytes([value[0], value[1]])),
            TLV_WKS if len == 2 => params.wks = Some(u16::from_be_bytes([value[0], value[1]])),
            TLV_LTO if len == 1 => params.lto = Some(value[0]),
            _ => {}
        }
        i = value_start + len;
    }
    Some(params)
}

const SNEP_VERSION: u8 = 0x10;
const SNEP_REQUEST_GET: u8 = 0x01;
const SNEP_REQUEST_PUT: u8 = 0x02;
const SNEP_RESPONSE_SUCCESS: u8 = 0x81;
const SNEP_RESPONSE_EXCESS_DATA: u8 = 0xC1;
const SNEP_RESPONSE_BAD_REQUEST: u8 = 0xC2;

#[derive(Debug, Clone)]
pub struct SnepMessage {
    pub code: u8,
    pub info: Vec<u8>,
}

pub fn snep_encode_put(ndef: &[u8]) -> Vec<u8> {
    encode_snep(SNEP_REQUEST_PUT, ndef)
}

fn encode_snep(code: u8, info: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(6 + info.len());
    out.push(SNEP_VERSION);
    out.push(code);
    out.extend_from_slice(&(info.len() as u32).to_be_bytes());
    out.extend_from_slice(info);
    out
}

fn encode_snep_response(code: u8) -> Vec<u8> {
    encode_snep(code, &[])
}

// Returns None if bytes is too short to contain a full header.
pub fn snep_decode(bytes: &[u8]) -> Option<SnepMessage> {
    if bytes.len() < 6 {
        return None;
    }
    let len = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]) as usize;
    let info = bytes.get(6..6 + len)?.to_vec();
    Some(SnepMessage {
        code: bytes[1],
        info,
    })
}

// Validates against put_ceiling and returns the accepted NDEF payload plus
// the response PDU to send back.
pub fn handle_snep_request(pdu: &[u8], put_ceiling: usize) -> (Option<Vec<u8>>, Vec<u8>) {
    let Some(msg) = snep_decode(pdu) else {
        return (None, encode_snep_response(SNEP_RESPONSE_BAD_REQUEST));
    };
    match msg.code {
        SNEP_REQUEST_PUT => {
            if msg.info.len() > put_ceiling {
                (None, encode_snep_response(SNEP_RESPONSE_EXCESS_DATA))
            } else {
                (Some(msg.info), encode_snep_response(SNEP_RESPONSE_SUCCESS))
            }
        }
        SNEP_REQUEST_GET => (None, encode_snep_response(SNEP_RESPONSE_BAD_REQUEST)),
        _ => (None, encode_snep_response(SNEP_RESPONSE_BAD_REQUEST)),
    }
}

pub fn snep_push(driver: &mut dyn RadioDriver, ndef: &[u8]) -> Result<(), DriverError> {
    driver.llcp_send(&snep_encode_put(ndef))?;
    match driver.llcp_recv()? {
        Some(resp) => match snep_decode(&resp) {
            Some(msg) if msg.code == SNEP_RESPONSE_SUCCESS => Ok(()),
            Some(msg) => Err(DriverError::Nak(format!("SNEP response code {:#x}", msg.code))),
            None => Err(DriverError::Nak("malformed SNEP response".into())),
        },
        None => Err(DriverError::Transient("no SNEP response within timeout".into())),
    }
}

// Receives at most one PDU from the driver and, if it is a PUT, returns the
// delivered NDEF bytes.
pub fn snep_serve_once(
    driver: &mut dyn RadioDriver,
    put_ceiling: usize,
) -> Result<Option<Vec<u8>>, DriverError> {
    let Some(pdu) = driver.llcp_recv()? else {
        return Ok(None);
    };
    let (delivered, response) = handle_snep_request(&pdu, put_ceiling);
    driver.llcp_send(&response)?;
    match &delivered {
        Some(ndef) => debug!("SNEP PUT accepted ({} bytes)", ndef.len()),
        None => warn!("SNEP request rejected"),
    }
    Ok(delivered)
}

pub fn activate_llcp(driver: &mut dyn RadioDriver) -> Result<PeerLlcpParams, DriverError> {
    let our_bytes = build_general_bytes();
    let peer_bytes = driver.atr_exchange(&our_bytes)?;
    match parse_general_bytes(&peer_bytes) {
        Some(params) => {
            info!("LLCP session activated, peer version {:?}", params.version);
            Ok(params)
        }
        None => Err(DriverError::Nak("peer is not an LLCP node".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::simulated::SimulatedDriver;

    #[test]
    fn general_bytes_round_trip_through_parse() {
        let bytes = build_general_bytes();
        let parsed = parse_general_bytes(&bytes).unwrap();
        assert_eq!(parsed.version, Some(LLCP_VERSION));
        assert_eq!(parsed.lto, Some(LLCP_LTO));
    }

    #[test]
    fn non_llcp_general_bytes_rejected() {
        assert!(parse_general_bytes(&[0, 1, 2]).is_none());
    }

    #[test]
    fn snep_put_round_trips_through_decode() {
        let pdu = snep_encode_put(b"hello");
        let msg = snep_decode(&pdu).unwrap();
        assert_eq!(msg.code, SNEP_REQUEST_PUT);
        assert_eq!(msg.info, b"hello");
    }

    #[test]
    fn oversized_put_is_rejected_by_ceiling() {
        let pdu = snep_encode_put(&vec![0u8; 100]);
        let (delivered, response) = handle_snep_request(&pdu, 10);
        assert!(delivered.is_none());
        let resp = snep_decode(&response).unwrap();
        assert_eq!(resp.code, SNEP_RESPONSE_EXCESS_DATA);
    }

    #[test]
    fn snep_push_succeeds_against_simulated_driver() {
        let mut driver = SimulatedDriver::new();
        driver.push_inbound_llcp(encode_snep_response(SNEP_RESPONSE_SUCCESS));
        snep_push(&mut driver, b"payload").unwrap();
        assert_eq!(driver.sent_llcp().len(), 1);
    }

    #[test]
    fn snep_serve_once_delivers_put_payload() {
        let mut driver = SimulatedDriver::new();
        driver.push_inbound_llcp(snep_encode_put(b"from peer"));
        let delivered = snep_serve_once(&mut driver, 1024).unwrap();
        assert_eq!(delivered, Some(b"from peer".to_vec()));
    }
}

// src/facade/wire.rs
//
// JSON wire shapes for the thin façade.

use serde::Deserialize;

use crate::types::{EngineCommand, NfcMode};

/// Messages a façade client may send over the wire. Maps 1:1 onto
/// [`EngineCommand`]; `Join` is intentionally not exposed here since a WS
/// client disconnecting is not the same thing as asking the engine to shut
/// down.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    StartPoll { mode: NfcMode },
    StopPoll,
    WriteTag { id: u32, bytes: Vec<u8> },
    PushDevice { id: u32, bytes: Vec<u8> },
}

impl From<IncomingMessage> for EngineCommand {
    fn from(msg: IncomingMessage) -> Self {
        match msg {
            IncomingMessage::StartPoll { mode } => EngineCommand::StartPoll(mode),
            IncomingMessage::StopPoll => EngineCommand::StopPoll,
            IncomingMessage::WriteTag { id, bytes } => EngineCommand::WriteTag { id, bytes },
            IncomingMessage::PushDevice { id, bytes } => EngineCommand::PushDevice { id, bytes },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_poll_round_trips_into_a_command() {
        let json = r#"{"type":"StartPoll","mode":"Dual"}"#;
        let msg: IncomingMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(
            EngineCommand::from(msg),
            EngineCommand::StartPoll(NfcMode::Dual)
        ));
    }

    #[test]
    fn write_tag_carries_bytes_through() {
        let json = r#"{"type":"WriteTag","id":3,"bytes":[1,2,3]}"#;
        let msg: IncomingMessage = serde_json::from_str(json).unwrap();
        match EngineCommand::from(msg) {
            EngineCommand::WriteTag { id, bytes } => {
                assert_eq!(id, 3);
                assert_eq!(bytes, vec![1, 2, 3]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

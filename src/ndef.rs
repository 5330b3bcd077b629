// src/ndef.rs
//
// NDEF record parsing/synthesis: header bits, TNF dispatch, Smart Poster
// nesting, URI abbreviation table.

use crate::error::NdefError;

const HEADER_MB: u8 = 1 << 7;
const HEADER_ME: u8 = 1 << 6;
const HEADER_CF: u8 = 1 << 5;
const HEADER_SR: u8 = 1 << 4;
const HEADER_IL: u8 = 1 << 3;
const HEADER_TNF_MASK: u8 = 0x07;

const TNF_EMPTY: u8 = 0;
const TNF_WELL_KNOWN: u8 = 1;
const TNF_MEDIA: u8 = 2;
const TNF_ABSOLUTE_URI: u8 = 3;
const TNF_EXTERNAL: u8 = 4;
const TNF_UNKNOWN: u8 = 5;
const TNF_UNCHANGED: u8 = 6;

const RTD_SMART_POSTER: &[u8] = b"Sp";
const RTD_TEXT: &[u8] = b"T";
const RTD_URI: &[u8] = b"U";
const RTD_SP_LOCAL_ACTION: &[u8] = b"act";
const RTD_SP_LOCAL_SIZE: &[u8] = b"s";
const RTD_SP_LOCAL_TYPE: &[u8] = b"t";
const RTD_EXT_AAR: &[u8] = b"android.com:pkg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf16,
}

// Smart Poster "act" local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpAction {
    Do,
    Save,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpText {
    pub language: String,
    pub representation: String,
    pub encoding: Encoding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdefRecord {
    SmartPoster {
        uri: String,
        text: Option<SpText>,
        action: Option<SpAction>,
        size: Option<u32>,
        mime_type: Option<String>,
    },
    Text {
        language: String,
        representation: String,
        encoding: Encoding,
    },
    Uri {
        uri: String,
    },
    HandoverRequest,
    HandoverSelect,
    HandoverCarrier,
    Aar {
        android_package: String,
    },
    Mime {
        mime_type: String,
        payload: Vec<u8>,
    },
    // Inner-only: produced while unpacking a Smart Poster payload, never
    // returned from top-level parse/generate.
    SpLocalAction(SpAction),
    SpLocalSize(u32),
    SpLocalType(String),
}

// Loosely-typed record description the façade builds a write/push payload
// from before it's validated into an NdefRecord.
#[derive(Debug, Clone, Default)]
pub struct NdefRecordSpec {
    pub kind: RecordKind,
    pub language: Option<String>,
    pub encoding: Option<Encoding>,
    pub representation: Option<String>,
    pub uri: Option<String>,
    pub mime_type: Option<String>,
    pub mime_payload: Option<Vec<u8>>,
    pub size: Option<u32>,
    pub action: Option<SpAction>,
    pub android_package: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordKind {
    #[default]
    SmartPoster,
    Text,
    Uri,
    HandoverRequest,
    HandoverSelect,
    HandoverCarrier,
    Aar,
    Mime,
}

impl NdefRecordSpec {
    pub fn build(self) -> Result<NdefRecord, NdefError> {
        match self.kind {
            RecordKind::SmartPoster => {
                let uri = self.uri.ok_or(NdefError::MissingField("uri"))?;
                let text = match self.representation {
                    Some(representation) => {
                        let language = self.language.ok_or(NdefError::MissingField("language"))?;
                        Some(SpText {
                            language,
                            representation,
                            encoding: self.encoding.unwrap_or(Encoding::Utf8),
                        })
                    }
                    None => None,
                };
                Ok(NdefRecord::SmartPoster {
                    uri,
                    text,
                    action: self.action,
                    size: self.size,
                    mime_type: self.mime_type,
                })
            }
            RecordKind::Text => Ok(NdefRecord::Text {
                language: self.language.ok_or(NdefError::MissingField("language"))?,
                representation: self
                    .representation
                    .ok_or(NdefError::MissingField("representation"))?,
                encoding: self.encoding.unwrap_or(Encoding::Utf8),
            }),
            RecordKind::Uri => Ok(NdefRecord::Uri {
                uri: self.uri.ok_or(NdefError::MissingField("uri"))?,
            }),
            RecordKind::HandoverRequest => Ok(NdefRecord::HandoverRequest),
            RecordKind::HandoverSelect => Ok(NdefRecord::HandoverSelect),
            RecordKind::HandoverCarrier => Ok(NdefRecord::HandoverCarrier),
            RecordKind::Aar => Ok(NdefRecord::Aar {
                android_package: self
                    .android_package
                    .ok_or(NdefError::MissingField("android_package"))?,
            }),
            RecordKind::Mime => Ok(NdefRecord::Mime {
                mime_type: self.mime_type.ok_or(NdefError::MissingField("mime_type"))?,
                payload: self.mime_payload.unwrap_or_default(),
            }),
        }
    }
}

// Entry 0 is the empty prefix.
pub const URI_ABBREVIATIONS: [&str; 36] = [
    "",
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "tel:",
    "mailto:",
    "ftp://anonymous:anonymous@",
    "ftp://ftp.",
    "ftps://",
    "sftp://",
    "smb://",
    "nfs://",
    "ftp://",
    "dav://",
    "news:",
    "telnet://",
    "imap:",
    "rtsp://",
    "urn:",
    "pop:",
    "sip:",
    "sips:",
    "tftp:",
    "btspp://",
    "btl2cap://",
    "btgoep://",
    "tcpobex://",
    "irdaobex://",
    "file://",
    "urn:epc:id:",
    "urn:epc:tag:",
    "urn:epc:pat:",
    "urn:epc:raw:",
    "urn:epc:",
    "urn:nfc:",
];

// Returns whatever well-formed records were accepted before a truncated or
// malformed record; never fails the whole message.
pub fn parse_message(data: &[u8]) -> Vec<NdefRecord> {
    parse_internal(data, false)
}

fn parse_internal(mut data: &[u8], inner: bool) -> Vec<NdefRecord> {
    let mut out = Vec::new();
    let mut message_started = false;
    let mut message_ended = false;

    while !message_ended && data.len() > 1 {
        let header = data[0];

        if !message_started {
            if header & HEADER_MB == 0 {
                break; // not the message's start
            }
            message_started = true;
        }
        if header & HEADER_ME != 0 {
            message_ended = true;
        }
        if header & HEADER_CF != 0 {
            break; // chunked records are not supported
        }

        let short_record = header & HEADER_SR != 0;
        let id_present = header & HEADER_IL != 0;
        let tnf = header & HEADER_TNF_MASK;

        let mut min_len = 2usize; // header + type length byte
        if !short_record {
            min_len += 3; // 4-byte length, one already counted above
        }
        if id_present {
            min_len += 1;
        }
        if data.len() < min_len {
            break;
        }

        let mut pos = 1usize;
        let type_len = data[pos] as usize;
        pos += 1;

        let payload_len: usize = if short_record {
            let len = data[pos] as usize;
            pos += 1;
            len
        } else {
            let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
                as usize;
            pos += 4;
            len
        };

        let id_len = if id_present {
            let len = data[pos] as usize;
            pos += 1;
            len
        } else {
            0
        };

        let remaining_needed = type_len + id_len + payload_len;
        if data.len() < pos + remaining_needed {
            break; // truncated buffer
        }

        let type_bytes = &data[pos..pos + type_len];
        let payload_start = pos + type_len + id_len;
        let payload = &data[payload_start..payload_start + payload_len];

        let record = dispatch_record(tnf, type_bytes, payload, inner);
        if let Some(record) = record {
            out.push(record);
        }

        let consumed = 1 + (pos - 1) + remaining_needed;
        if consumed >= data.len() {
            break;
        }
        data = &data[consumed..];
    }

    out
}

fn dispatch_record(tnf: u8, type_bytes: &[u8], payload: &[u8], inner: bool) -> Option<NdefRecord> {
    match tnf {
        TNF_WELL_KNOWN => {
            if !inner && type_bytes == RTD_SMART_POSTER {
                parse_smart_poster(payload)
            } else if type_bytes == RTD_TEXT {
                parse_text(payload)
            } else if type_bytes == RTD_URI {
                parse_uri(payload)
            } else if inner && type_bytes == RTD_SP_LOCAL_ACTION {
                parse_sp_local_action(payload)
            } else if inner && type_bytes == RTD_SP_LOCAL_SIZE {
                parse_sp_local_size(payload)
            } else if inner && type_bytes == RTD_SP_LOCAL_TYPE {
                parse_sp_local_type(payload)
            } else {
                None
            }
        }
        TNF_MEDIA => Some(NdefRecord::Mime {
            mime_type: String::from_utf8_lossy(type_bytes).into_owned(),
            payload: payload.to_vec(),
        }),
        TNF_EXTERNAL => {
            if type_bytes == RTD_EXT_AAR {
                parse_aar(payload)
            } else {
                None
            }
        }
        TNF_EMPTY | TNF_ABSOLUTE_URI | TNF_UNKNOWN | TNF_UNCHANGED => None,
        _ => None,
    }
}

fn parse_smart_poster(payload: &[u8]) -> Option<NdefRecord> {
    let children = parse_internal(payload, true);
    if children.is_empty() {
        return None;
    }

    let mut uri = None;
    let mut text = None;
    let mut action = None;
    let mut size = None;
    let mut mime_type = None;

    for child in children {
        match child {
            NdefRecord::Uri { uri: u } if uri.is_none() => uri = Some(u),
            NdefRecord::Text {
                language,
                representation,
                encoding,
            } if text.is_none() => {
                text = Some(SpText {
                    language,
                    representation,
                    encoding,
                })
            }
            NdefRecord::SpLocalAction(a) if action.is_none() => action = Some(a),
            NdefRecord::SpLocalSize(s) if size.is_none() => size = Some(s),
            NdefRecord::SpLocalType(t) if mime_type.is_none() => mime_type = Some(t),
            _ => {}
        }
    }

    let uri = uri?; // Smart Poster without a Uri child is dropped
    Some(NdefRecord::SmartPoster {
        uri,
        text,
        action,
        size,
        mime_type,
    })
}

fn parse_text(payload: &[u8]) -> Option<NdefRecord> {
    if payload.is_empty() {
        return None;
    }
    let status = payload[0];
    let encoding = if status & 0x80 != 0 {
        Encoding::Utf16
    } else {
        Encoding::Utf8
    };
    let lang_len = (status & 0x3F) as usize;
    if payload.len() < 1 + lang_len {
        return None;
    }
    let language = String::from_utf8_lossy(&payload[1..1 + lang_len]).into_owned();
    let representation = String::from_utf8_lossy(&payload[1 + lang_len..]).into_owned();
    Some(NdefRecord::Text {
        language,
        representation,
        encoding,
    })
}

fn parse_uri(payload: &[u8]) -> Option<NdefRecord> {
    if payload.is_empty() {
        return None;
    }
    let code = payload[0] as usize;
    if code >= URI_ABBREVIATIONS.len() {
        return None;
    }
    let mut uri = String::from(URI_ABBREVIATIONS[code]);
    uri.push_str(&String::from_utf8_lossy(&payload[1..]));
    Some(NdefRecord::Uri { uri })
}

fn parse_aar(payload: &[u8]) -> Option<NdefRecord> {
    if payload.is_empty() {
        return None;
    }
    Some(NdefRecord::Aar {
        android_package: String::from_utf8_lossy(payload).into_owned(),
    })
}

fn parse_sp_local_action(payload: &[u8]) -> Option<NdefRecord> {
    if payload.len() != 1 || payload[0] > 2 {
        return None;
    }
    let action = match payload[0] {
        0 => SpAction::Do,
        1 => SpAction::Save,
        _ => SpAction::Edit,
    };
    Some(NdefRecord::SpLocalAction(action))
}

fn parse_sp_local_size(payload: &[u8]) -> Option<NdefRecord> {
    if payload.len() != 4 {
        return None;
    }
    let size = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    Some(NdefRecord::SpLocalSize(size))
}

fn parse_sp_local_type(payload: &[u8]) -> Option<NdefRecord> {
    Some(NdefRecord::SpLocalType(
        String::from_utf8_lossy(payload).into_owned(),
    ))
}

// --- Synthesis -------------------------------------------------------

// A record that fails to encode (missing required field) is emitted as an
// Empty record in its slot rather than failing the whole message.
pub fn generate_message(records: &[NdefRecord]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let mb = i == 0;
        let me = i == records.len() - 1;
        out.extend(generate_record(record, mb, me));
    }
    out
}

fn generate_record(record: &NdefRecord, mb: bool, me: bool) -> Vec<u8> {
    let encoded = match record {
        NdefRecord::SmartPoster { .. } => generate_smart_poster(record),
        NdefRecord::Text {
            language,
            representation,
            encoding,
        } => generate_text(language, representation, *encoding),
        NdefRecord::Uri { uri } => Some(generate_uri(uri)),
        NdefRecord::HandoverRequest | NdefRecord::HandoverSelect | NdefRecord::HandoverCarrier => {
            None // handover records are accepted as a type but never generated
        }
        NdefRecord::Aar { android_package } => Some((
            TNF_EXTERNAL,
            RTD_EXT_AAR.to_vec(),
            android_package.as_bytes().to_vec(),
        )),
        NdefRecord::Mime { mime_type, payload } => {
            Some((TNF_MEDIA, mime_type.as_bytes().to_vec(), payload.clone()))
        }
        NdefRecord::SpLocalAction(action) => Some(generate_sp_local_action(*action)),
        NdefRecord::SpLocalSize(size) => Some(generate_sp_local_size(*size)),
        NdefRecord::SpLocalType(t) => Some((
            TNF_WELL_KNOWN,
            RTD_SP_LOCAL_TYPE.to_vec(),
            t.as_bytes().to_vec(),
        )),
    };

    match encoded {
        Some((tnf, type_bytes, payload)) => make_record(tnf, &type_bytes, &payload, mb, me),
        None => make_record(TNF_EMPTY, &[], &[], mb, me),
    }
}

fn generate_smart_poster(record: &NdefRecord) -> Option<(u8, Vec<u8>, Vec<u8>)> {
    let NdefRecord::SmartPoster {
        uri,
        text,
        action,
        size,
        mime_type,
    } = record
    else {
        return None;
    };

    let mut children = vec![NdefRecord::Uri { uri: uri.clone() }];
    if let Some(t) = text {
        children.push(NdefRecord::Text {
            language: t.language.clone(),
            representation: t.representation.clone(),
            encoding: t.encoding,
        });
    }
    if let Some(a) = action {
        children.push(NdefRecord::SpLocalAction(*a));
    }
    if let Some(s) = size {
        children.push(NdefRecord::SpLocalSize(*s));
    }
    if let Some(m) = mime_type {
        children.push(NdefRecord::SpLocalType(m.clone()));
    }

    let payload = generate_message(&children);
    Some((TNF_WELL_KNOWN, RTD_SMART_POSTER.to_vec(), payload))
}

fn generate_text(
    language: &str,
    representation: &str,
    encoding: Encoding,
) -> Option<(u8, Vec<u8>, Vec<u8>)> {
    if language.len() > 0x1F {
        return None; // language code too long
    }
    let mut payload = Vec::with_capacity(1 + language.len() + representation.len());
    let status = match encoding {
        Encoding::Utf16 => 0x80,
        Encoding::Utf8 => 0x00,
    } | (language.len() as u8 & 0x3F);
    payload.push(status);
    payload.extend_from_slice(language.as_bytes());
    payload.extend_from_slice(representation.as_bytes());
    Some((TNF_WELL_KNOWN, RTD_TEXT.to_vec(), payload))
}

fn generate_uri(uri: &str) -> (u8, Vec<u8>, Vec<u8>) {
    let mut code = 0usize;
    let mut best_len = 0usize;
    for (i, abbr) in URI_ABBREVIATIONS.iter().enumerate().skip(1) {
        if abbr.len() > best_len && uri.len() >= abbr.len() && uri.as_bytes().starts_with(abbr.as_bytes())
        {
            code = i;
            best_len = abbr.len();
        }
    }

    let mut payload = Vec::with_capacity(1 + uri.len() - best_len);
    payload.push(code as u8);
    payload.extend_from_slice(&uri.as_bytes()[best_len..]);
    (TNF_WELL_KNOWN, RTD_URI.to_vec(), payload)
}

fn generate_sp_local_action(action: SpAction) -> (u8, Vec<u8>, Vec<u8>) {
    let code = match action {
        SpAction::Do => 0,
        SpAction::Save => 1,
        SpAction::Edit => 2,
    };
    (TNF_WELL_KNOWN, RTD_SP_LOCAL_ACTION.to_vec(), vec![code])
}

fn generate_sp_local_size(size: u32) -> (u8, Vec<u8>, Vec<u8>) {
    (
        TNF_WELL_KNOWN,
        RTD_SP_LOCAL_SIZE.to_vec(),
        size.to_be_bytes().to_vec(),
    )
}

fn make_record(tnf: u8, type_bytes: &[u8], payload: &[u8], mb: bool, me: bool) -> Vec<u8> {
    let short = payload.len() <= 0xFF;

    let mut header = tnf & HEADER_TNF_MASK;
    if short {
        header |= HEADER_SR;
    }
    if mb {
        header |= HEADER_MB;
    }
    if me {
        header |= HEADER_ME;
    }

    let mut out = Vec::with_capacity(2 + type_bytes.len() + payload.len() + 4);
    out.push(header);
    out.push(type_bytes.len() as u8);
    if short {
        out.push(payload.len() as u8);
    } else {
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    }
    out.extend_from_slice(type_bytes);
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_records() {
        assert!(parse_message(&[]).is_empty());
    }

    #[test]
    fn single_byte_input_yields_no_records() {
        assert!(parse_message(&[0xD1]).is_empty());
    }

    #[test]
    fn text_record_round_trips() {
        let original = NdefRecord::Text {
            language: "en".into(),
            representation: "hello".into(),
            encoding: Encoding::Utf8,
        };
        let bytes = generate_message(&[original.clone()]);
        let parsed = parse_message(&bytes);
        assert_eq!(parsed, vec![original]);
    }

    #[test]
    fn utf16_text_decodes_with_status_bit_set() {
        let bytes = generate_message(&[NdefRecord::Text {
            language: "en".into(),
            representation: "hi".into(),
            encoding: Encoding::Utf16,
        }]);
        let parsed = parse_message(&bytes);
        match &parsed[0] {
            NdefRecord::Text { encoding, .. } => assert_eq!(*encoding, Encoding::Utf16),
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn uri_record_uses_abbreviation_and_round_trips() {
        let uri = "https://www.example.org/x";
        let bytes = generate_message(&[NdefRecord::Uri { uri: uri.into() }]);
        // header, type len, payload len, 'U', code byte, tail...
        assert_eq!(bytes[3], b'U');
        assert_eq!(bytes[4], 2); // "https://www." abbreviation index
        let tail = &bytes[5..];
        assert_eq!(String::from_utf8_lossy(tail), "example.org/x");

        let parsed = parse_message(&bytes);
        assert_eq!(parsed, vec![NdefRecord::Uri { uri: uri.into() }]);
    }

    #[test]
    fn smart_poster_round_trips_all_fields() {
        let sp = NdefRecord::SmartPoster {
            uri: "tel:+1".into(),
            text: Some(SpText {
                language: "en".into(),
                representation: "call".into(),
                encoding: Encoding::Utf8,
            }),
            action: Some(SpAction::Save),
            size: Some(42),
            mime_type: Some("text/x".into()),
        };
        let bytes = generate_message(&[sp.clone()]);
        let parsed = parse_message(&bytes);
        assert_eq!(parsed, vec![sp]);
    }

    #[test]
    fn smart_poster_missing_uri_child_is_dropped() {
        // Hand-build a Smart Poster payload containing only a Text child.
        let text_record = generate_message(&[NdefRecord::Text {
            language: "en".into(),
            representation: "no uri here".into(),
            encoding: Encoding::Utf8,
        }]);
        let outer = make_record(TNF_WELL_KNOWN, RTD_SMART_POSTER, &text_record, true, true);
        assert!(parse_message(&outer).is_empty());
    }

    #[test]
    fn aar_round_trips() {
        let rec = NdefRecord::Aar {
            android_package: "com.example.app".into(),
        };
        let bytes = generate_message(&[rec.clone()]);
        assert_eq!(bytes[0] & HEADER_TNF_MASK, TNF_EXTERNAL);
        let parsed = parse_message(&bytes);
        assert_eq!(parsed, vec![rec]);
    }

    #[test]
    fn short_form_boundary_at_255_bytes() {
        let payload = vec![b'x'; 255];
        let rec = NdefRecord::Mime {
            mime_type: "application/octet-stream".into(),
            payload,
        };
        let bytes = generate_message(&[rec.clone()]);
        assert_ne!(bytes[0] & HEADER_SR, 0, "255-byte payload must use short form");
        let parsed = parse_message(&bytes);
        assert_eq!(parsed, vec![rec]);
    }

    #[test]
    fn long_form_boundary_at_256_bytes() {
        let payload = vec![b'x'; 256];
        let rec = NdefRecord::Mime {
            mime_type: "application/octet-stream".into(),
            payload,
        };
        let bytes = generate_message(&[rec.clone()]);
        assert_eq!(bytes[0] & HEADER_SR, 0, "256-byte payload must use long form");
        let parsed = parse_message(&bytes);
        assert_eq!(parsed, vec![rec]);
    }

    #[test]
    fn multi_record_message_has_mb_only_on_first_me_only_on_last() {
        let records = vec![
            NdefRecord::Uri {
                uri: "http://a".into(),
            },
            NdefRecord::Text {
                language: "en".into(),
                representation: "middle".into(),
                encoding: Encoding::Utf8,
            },
            NdefRecord::Aar {
                android_package: "com.example".into(),
            },
        ];
        let bytes = generate_message(&records);
        let parsed = parse_message(&bytes);
        assert_eq!(parsed, records);
    }

    #[test]
    fn smart_poster_requires_language_when_representation_present() {
        let spec = NdefRecordSpec {
            kind: RecordKind::SmartPoster,
            uri: Some("http://x".into()),
            representation: Some("text".into()),
            language: None,
            ..Default::default()
        };
        assert!(spec.build().is_err());
    }

    #[test]
    fn smart_poster_with_uri_only_builds_ok() {
        let spec = NdefRecordSpec {
            kind: RecordKind::SmartPoster,
            uri: Some("http://x".into()),
            ..Default::default()
        };
        assert!(spec.build().is_ok());
    }

    #[test]
    fn handover_records_produce_empty_payload() {
        let bytes = generate_message(&[NdefRecord::HandoverRequest]);
        assert_eq!(bytes[0] & HEADER_TNF_MASK, TNF_EMPTY);
    }
}

//! Whole-message decoding.
//!
//! Encoding is performed layer by layer by the sender (the client library
//! stages headers and payload separately so it can scatter-gather them onto
//! the wire); decoding is needed by receivers, file readers, and tests, and
//! lives here.

use crate::header::{
    extra_size, ExtendedHeader, HeaderExtra, StandardHeader, StorageHeader, EXTENDED_HEADER_SIZE,
    SERIAL_PATTERN, STANDARD_HEADER_SIZE, STORAGE_HEADER_SIZE, STORAGE_PATTERN,
};
use crate::{Error, Result};
use memchr::memmem;

/// A decoded wire message.
#[derive(Clone, Debug, PartialEq)]
pub struct WireMessage {
    /// Storage header, present only when reading on-disk files.
    pub storage: Option<StorageHeader>,
    /// The standard header.
    pub standard: StandardHeader,
    /// Extra fields selected by `htyp`.
    pub extra: HeaderExtra,
    /// Extended header, present when `UEH` is set.
    pub extended: Option<ExtendedHeader>,
    /// The argument payload.
    pub payload: Vec<u8>,
}

impl WireMessage {
    /// Decodes one message from the front of `bytes`.
    ///
    /// With `with_storage`, a storage header is expected first. Returns the
    /// message and the bytes consumed, `None` when the buffer does not yet
    /// hold the whole message, or [`Error::InvalidContent`] when the
    /// declared lengths are inconsistent (the caller should resync on the
    /// appropriate pattern).
    pub fn parse(bytes: &[u8], with_storage: bool) -> Result<Option<(WireMessage, usize)>> {
        let mut at = 0;
        let storage = if with_storage {
            if bytes.len() < STORAGE_HEADER_SIZE {
                return Ok(None);
            }
            let header = StorageHeader::parse(bytes)?;
            at += STORAGE_HEADER_SIZE;
            Some(header)
        } else {
            None
        };

        if bytes.len() < at + STANDARD_HEADER_SIZE {
            return Ok(None);
        }
        let standard = StandardHeader::parse(&bytes[at..])?;

        let mut header_len = STANDARD_HEADER_SIZE + extra_size(standard.htyp);
        if standard.has_extended() {
            header_len += EXTENDED_HEADER_SIZE;
        }
        let total = standard.len as usize;
        if total < header_len {
            return Err(Error::InvalidContent);
        }
        if bytes.len() < at + total {
            return Ok(None);
        }

        let mut offset = at + STANDARD_HEADER_SIZE;
        let extra = HeaderExtra::parse(&bytes[offset..], standard.htyp)?;
        offset += extra_size(standard.htyp);
        let extended = if standard.has_extended() {
            let header = ExtendedHeader::parse(&bytes[offset..])?;
            offset += EXTENDED_HEADER_SIZE;
            Some(header)
        } else {
            None
        };

        let payload = bytes[offset..at + total].to_vec();
        Ok(Some((
            WireMessage {
                storage,
                standard,
                extra,
                extended,
                payload,
            },
            at + total,
        )))
    }
}

/// Locates the next storage-header pattern, for file readers resyncing
/// after corruption.
pub fn find_storage_pattern(buf: &[u8]) -> Option<usize> {
    memmem::find(buf, &STORAGE_PATTERN)
}

/// Locates the next serial-header pattern, for byte-stream links that need
/// resync framing.
pub fn find_serial_pattern(buf: &[u8]) -> Option<usize> {
    memmem::find(buf, &SERIAL_PATTERN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{htyp, pack_msin, MessageType};
    use crate::ident::Id4;
    use crate::level::LogLevel;
    use crate::payload::{ArgWriter, Value};

    fn encode_sample(with_storage: bool) -> Vec<u8> {
        let mut payload = Vec::new();
        ArgWriter::new(&mut payload, 1400, false, true)
            .write_i32(-1)
            .unwrap();

        let htyp_byte = htyp::PROTOCOL_VERSION1 | htyp::UEH | htyp::WEID | htyp::WSID | htyp::WTMS;
        let mut header = Vec::new();
        StandardHeader {
            htyp: htyp_byte,
            mcnt: 0,
            len: 0,
        }
        .write_to(&mut header);
        HeaderExtra {
            ecu: Some(Id4::new("DEMO")),
            session_id: Some(4242),
            timestamp: Some(100_000),
        }
        .write_to(&mut header, htyp_byte)
        .unwrap();
        ExtendedHeader {
            msin: pack_msin(MessageType::Log, LogLevel::Info.as_raw() as u8, true),
            noar: 1,
            apid: Id4::new("DEMO"),
            ctid: Id4::new("MAIN"),
        }
        .write_to(&mut header);

        let len = (header.len() + payload.len()) as u16;
        header[2..4].copy_from_slice(&len.to_be_bytes());

        let mut buf = Vec::new();
        if with_storage {
            StorageHeader {
                seconds: 1,
                microseconds: 2,
                ecu: Id4::new("DEMO"),
            }
            .write_to(&mut buf);
        }
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&payload);
        buf
    }

    #[test]
    fn scenario_verbose_i32_little_endian() {
        let buf = encode_sample(false);
        // htyp = UEH|WEID|WSID|WTMS|PV1, len covers everything after the
        // storage header
        assert_eq!(buf[0], 0x3d);
        assert_eq!(buf[1], 0x00);
        // 4 standard + 12 extras + 10 extended + 8 payload
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 0x22);
        assert_eq!(buf.len(), 0x22);

        let (message, consumed) = WireMessage::parse(&buf, false).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        let extended = message.extended.unwrap();
        assert_eq!(extended.msin, 0x41);
        assert_eq!(extended.noar, 1);
        assert_eq!(extended.apid, Id4::new("DEMO"));
        assert_eq!(extended.ctid, Id4::new("MAIN"));
        let args = crate::payload::parse_args(&message.payload, false).unwrap();
        assert_eq!(args[0].value, Value::Signed(-1));
    }

    #[test]
    fn incomplete_message_waits() {
        let buf = encode_sample(true);
        for cut in 0..buf.len() {
            assert_eq!(WireMessage::parse(&buf[..cut], true).unwrap(), None);
        }
    }

    #[test]
    fn storage_file_resync_recovers() {
        let mut file = vec![0xa5u8; 7];
        file.extend_from_slice(&encode_sample(true));
        assert!(WireMessage::parse(&file, true).is_err());
        let at = find_storage_pattern(&file).unwrap();
        assert_eq!(at, 7);
        let (message, _) = WireMessage::parse(&file[at..], true).unwrap().unwrap();
        assert!(message.storage.is_some());
    }

    #[test]
    fn declared_length_below_headers_is_rejected() {
        let mut buf = encode_sample(false);
        buf[2..4].copy_from_slice(&4u16.to_be_bytes());
        assert_eq!(WireMessage::parse(&buf, false), Err(Error::InvalidContent));
    }
}

//! Message header layers.
//!
//! A wire message carries up to four header layers. The [`StorageHeader`]
//! exists only in on-disk files and is never sent to the daemon. The
//! [`StandardHeader`] opens every message; its `htyp` byte selects which
//! [extra fields](HeaderExtra) and whether an [`ExtendedHeader`] follow.

use crate::ident::{Id4, ID_SIZE};
use crate::level::LogLevel;
use crate::{Error, Result};

/// Bit definitions of the `htyp` byte in the standard header.
pub mod htyp {
    /// Use extended header.
    pub const UEH: u8 = 0x01;
    /// Payload and header fields are most-significant-byte first.
    pub const MSBF: u8 = 0x02;
    /// With ECU id.
    pub const WEID: u8 = 0x04;
    /// With session id.
    pub const WSID: u8 = 0x08;
    /// With timestamp.
    pub const WTMS: u8 = 0x10;
    /// Mask of the protocol version field.
    pub const VERSION_MASK: u8 = 0xe0;
    /// Protocol version 1.
    pub const PROTOCOL_VERSION1: u8 = 1 << 5;
}

/// The pattern opening a storage header: `"DLT\x01"`.
pub const STORAGE_PATTERN: [u8; 4] = *b"DLT\x01";

/// The serial-link resync pattern: `"DLS\x01"`.
pub const SERIAL_PATTERN: [u8; 4] = *b"DLS\x01";

/// Size in bytes of an encoded storage header.
pub const STORAGE_HEADER_SIZE: usize = 16;

/// Size in bytes of an encoded standard header.
pub const STANDARD_HEADER_SIZE: usize = 4;

/// Size in bytes of an encoded extended header.
pub const EXTENDED_HEADER_SIZE: usize = 10;

/// Returns the encoded size of the extra fields selected by `htyp`.
pub fn extra_size(htyp_byte: u8) -> usize {
    let mut size = 0;
    if htyp_byte & htyp::WEID != 0 {
        size += ID_SIZE;
    }
    if htyp_byte & htyp::WSID != 0 {
        size += 4;
    }
    if htyp_byte & htyp::WTMS != 0 {
        size += 4;
    }
    size
}

/// The kind of message announced in the extended header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Log message.
    Log = 0x00,
    /// Application trace message.
    AppTrace = 0x01,
    /// Network trace message.
    NwTrace = 0x02,
    /// Control message.
    Control = 0x03,
}

impl MessageType {
    /// Converts the `mstp` field value into a message type.
    pub fn from_raw(raw: u8) -> Option<MessageType> {
        match raw {
            0x00 => Some(MessageType::Log),
            0x01 => Some(MessageType::AppTrace),
            0x02 => Some(MessageType::NwTrace),
            0x03 => Some(MessageType::Control),
            _ => None,
        }
    }
}

/// Bit layout of the `msin` byte in the extended header.
pub mod msin {
    /// Verbose flag.
    pub const VERB: u8 = 0x01;
    /// Message type mask.
    pub const MSTP_MASK: u8 = 0x0e;
    /// Message type shift.
    pub const MSTP_SHIFT: u8 = 1;
    /// Message type info mask.
    pub const MTIN_MASK: u8 = 0xf0;
    /// Message type info shift.
    pub const MTIN_SHIFT: u8 = 4;
}

/// Packs message type, type info, and the verbose flag into an `msin` byte.
pub fn pack_msin(mstp: MessageType, mtin: u8, verbose: bool) -> u8 {
    let mut value = ((mstp as u8) << msin::MSTP_SHIFT) | ((mtin << msin::MTIN_SHIFT) & msin::MTIN_MASK);
    if verbose {
        value |= msin::VERB;
    }
    value
}

/// The storage header written before each message in an on-disk file.
///
/// The timestamp fields record wall-clock time in little-endian byte order
/// regardless of the message's `MSBF` bit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StorageHeader {
    /// Seconds since the Unix epoch.
    pub seconds: u32,
    /// Sub-second microseconds.
    pub microseconds: i32,
    /// ECU id the message was captured on.
    pub ecu: Id4,
}

impl StorageHeader {
    /// Builds a storage header stamped with the current wall-clock time.
    pub fn now(ecu: Id4) -> StorageHeader {
        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        StorageHeader {
            seconds: elapsed.as_secs() as u32,
            microseconds: elapsed.subsec_micros() as i32,
            ecu,
        }
    }

    /// Appends the encoded header to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&STORAGE_PATTERN);
        buf.extend_from_slice(&self.seconds.to_le_bytes());
        buf.extend_from_slice(&self.microseconds.to_le_bytes());
        buf.extend_from_slice(self.ecu.as_bytes());
    }

    /// Returns `true` if `bytes` starts with the storage pattern.
    pub fn check_pattern(bytes: &[u8]) -> bool {
        bytes.len() >= STORAGE_PATTERN.len() && bytes[..STORAGE_PATTERN.len()] == STORAGE_PATTERN
    }

    /// Decodes a storage header from the front of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<StorageHeader> {
        if bytes.len() < STORAGE_HEADER_SIZE {
            return Err(Error::InvalidContent);
        }
        if !Self::check_pattern(bytes) {
            return Err(Error::InvalidContent);
        }
        Ok(StorageHeader {
            seconds: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            microseconds: i32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            ecu: Id4::from_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        })
    }
}

/// The standard header opening every message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StandardHeader {
    /// Header type bitmask, see [`htyp`].
    pub htyp: u8,
    /// Wrap-around per-context message counter.
    pub mcnt: u8,
    /// Length of the complete message excluding the storage header.
    pub len: u16,
}

impl StandardHeader {
    /// Appends the encoded header to `buf`. `len` is always big-endian.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(self.htyp);
        buf.push(self.mcnt);
        buf.extend_from_slice(&self.len.to_be_bytes());
    }

    /// Decodes a standard header from the front of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<StandardHeader> {
        if bytes.len() < STANDARD_HEADER_SIZE {
            return Err(Error::InvalidContent);
        }
        Ok(StandardHeader {
            htyp: bytes[0],
            mcnt: bytes[1],
            len: u16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }

    /// Returns `true` if the extended header follows.
    pub fn has_extended(&self) -> bool {
        self.htyp & htyp::UEH != 0
    }

    /// Returns `true` if multi-byte fields are big-endian.
    pub fn is_msbf(&self) -> bool {
        self.htyp & htyp::MSBF != 0
    }
}

/// The optional extra fields between standard and extended headers.
///
/// Presence of each field is controlled by the `WEID`, `WSID`, and `WTMS`
/// bits of `htyp`. The session id and timestamp are big-endian on the wire
/// regardless of the `MSBF` bit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderExtra {
    /// ECU id, present with `WEID`.
    pub ecu: Option<Id4>,
    /// Session id, present with `WSID`. The library always sends its pid.
    pub session_id: Option<u32>,
    /// Monotonic uptime in units of 0.1 ms, present with `WTMS`.
    pub timestamp: Option<u32>,
}

impl HeaderExtra {
    /// Appends the fields selected by `htyp_byte` to `buf`.
    ///
    /// Fields required by `htyp_byte` but absent here are an error; the
    /// header layers must agree before anything is committed to the wire.
    pub fn write_to(&self, buf: &mut Vec<u8>, htyp_byte: u8) -> Result<()> {
        if htyp_byte & htyp::WEID != 0 {
            let ecu = self.ecu.ok_or(Error::WrongParameter)?;
            buf.extend_from_slice(ecu.as_bytes());
        }
        if htyp_byte & htyp::WSID != 0 {
            let seid = self.session_id.ok_or(Error::WrongParameter)?;
            buf.extend_from_slice(&seid.to_be_bytes());
        }
        if htyp_byte & htyp::WTMS != 0 {
            let tmsp = self.timestamp.ok_or(Error::WrongParameter)?;
            buf.extend_from_slice(&tmsp.to_be_bytes());
        }
        Ok(())
    }

    /// Decodes the extra fields selected by `htyp_byte`.
    pub fn parse(bytes: &[u8], htyp_byte: u8) -> Result<HeaderExtra> {
        if bytes.len() < extra_size(htyp_byte) {
            return Err(Error::InvalidContent);
        }
        let mut at = 0;
        let mut extra = HeaderExtra::default();
        if htyp_byte & htyp::WEID != 0 {
            extra.ecu = Some(Id4::from_bytes([
                bytes[at],
                bytes[at + 1],
                bytes[at + 2],
                bytes[at + 3],
            ]));
            at += ID_SIZE;
        }
        if htyp_byte & htyp::WSID != 0 {
            extra.session_id = Some(u32::from_be_bytes([
                bytes[at],
                bytes[at + 1],
                bytes[at + 2],
                bytes[at + 3],
            ]));
            at += 4;
        }
        if htyp_byte & htyp::WTMS != 0 {
            extra.timestamp = Some(u32::from_be_bytes([
                bytes[at],
                bytes[at + 1],
                bytes[at + 2],
                bytes[at + 3],
            ]));
        }
        Ok(extra)
    }
}

/// The extended header carrying message info and addressing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExtendedHeader {
    /// Message info byte, see [`msin`] and [`pack_msin`].
    pub msin: u8,
    /// Number of arguments in a verbose payload.
    pub noar: u8,
    /// Application id.
    pub apid: Id4,
    /// Context id.
    pub ctid: Id4,
}

impl ExtendedHeader {
    /// Appends the encoded header to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(self.msin);
        buf.push(self.noar);
        buf.extend_from_slice(self.apid.as_bytes());
        buf.extend_from_slice(self.ctid.as_bytes());
    }

    /// Decodes an extended header from the front of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<ExtendedHeader> {
        if bytes.len() < EXTENDED_HEADER_SIZE {
            return Err(Error::InvalidContent);
        }
        Ok(ExtendedHeader {
            msin: bytes[0],
            noar: bytes[1],
            apid: Id4::from_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
            ctid: Id4::from_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
        })
    }

    /// Returns `true` if the verbose flag is set.
    pub fn is_verbose(&self) -> bool {
        self.msin & msin::VERB != 0
    }

    /// Returns the message type encoded in `msin`.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_raw((self.msin & msin::MSTP_MASK) >> msin::MSTP_SHIFT)
    }

    /// Returns the message type info field (log level or trace type).
    pub fn type_info(&self) -> u8 {
        (self.msin & msin::MTIN_MASK) >> msin::MTIN_SHIFT
    }

    /// Returns the log level of a log message.
    pub fn log_level(&self) -> Option<LogLevel> {
        match self.message_type() {
            Some(MessageType::Log) => LogLevel::from_raw(self.type_info() as i8),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_header_len_is_big_endian() {
        let mut buf = Vec::new();
        StandardHeader {
            htyp: htyp::PROTOCOL_VERSION1,
            mcnt: 7,
            len: 0x011c,
        }
        .write_to(&mut buf);
        assert_eq!(buf, [0x20, 7, 0x01, 0x1c]);
        let parsed = StandardHeader::parse(&buf).unwrap();
        assert_eq!(parsed.len, 0x011c);
        assert!(!parsed.is_msbf());
    }

    #[test]
    fn extras_follow_htyp_selection() {
        let htyp_byte = htyp::WEID | htyp::WTMS;
        let extra = HeaderExtra {
            ecu: Some(Id4::new("ECU1")),
            session_id: None,
            timestamp: Some(0x0102_0304),
        };
        let mut buf = Vec::new();
        extra.write_to(&mut buf, htyp_byte).unwrap();
        assert_eq!(buf.len(), extra_size(htyp_byte));
        assert_eq!(&buf[..4], b"ECU1");
        // timestamp is big-endian independent of MSBF
        assert_eq!(&buf[4..], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(HeaderExtra::parse(&buf, htyp_byte).unwrap(), extra);
    }

    #[test]
    fn missing_extra_field_is_rejected() {
        let extra = HeaderExtra::default();
        let mut buf = Vec::new();
        assert_eq!(
            extra.write_to(&mut buf, htyp::WSID),
            Err(Error::WrongParameter)
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn msin_packs_level_and_verbose() {
        let value = pack_msin(MessageType::Log, LogLevel::Info.as_raw() as u8, true);
        assert_eq!(value, 0x41);
        let ext = ExtendedHeader {
            msin: value,
            noar: 1,
            apid: Id4::new("DEMO"),
            ctid: Id4::new("MAIN"),
        };
        assert!(ext.is_verbose());
        assert_eq!(ext.message_type(), Some(MessageType::Log));
        assert_eq!(ext.log_level(), Some(LogLevel::Info));
    }

    #[test]
    fn storage_header_round_trip() {
        let header = StorageHeader {
            seconds: 1_700_000_000,
            microseconds: 123_456,
            ecu: Id4::new("ECU1"),
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf);
        assert_eq!(buf.len(), STORAGE_HEADER_SIZE);
        assert!(StorageHeader::check_pattern(&buf));
        assert_eq!(StorageHeader::parse(&buf).unwrap(), header);
    }
}

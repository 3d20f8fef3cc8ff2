//! Byte-order helpers keyed on the `MSBF` bit of `htyp`.
//!
//! Every multi-byte field whose byte order depends on the header type byte
//! goes through these helpers, so host endianness never leaks onto the wire.

pub(crate) fn put_u16(buf: &mut Vec<u8>, value: u16, msbf: bool) {
    if msbf {
        buf.extend_from_slice(&value.to_be_bytes());
    } else {
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

pub(crate) fn put_u32(buf: &mut Vec<u8>, value: u32, msbf: bool) {
    if msbf {
        buf.extend_from_slice(&value.to_be_bytes());
    } else {
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

pub(crate) fn put_u64(buf: &mut Vec<u8>, value: u64, msbf: bool) {
    if msbf {
        buf.extend_from_slice(&value.to_be_bytes());
    } else {
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

pub(crate) fn get_u16(bytes: &[u8], msbf: bool) -> u16 {
    let raw = [bytes[0], bytes[1]];
    if msbf {
        u16::from_be_bytes(raw)
    } else {
        u16::from_le_bytes(raw)
    }
}

pub(crate) fn get_u32(bytes: &[u8], msbf: bool) -> u32 {
    let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if msbf {
        u32::from_be_bytes(raw)
    } else {
        u32::from_le_bytes(raw)
    }
}

pub(crate) fn get_u64(bytes: &[u8], msbf: bool) -> u64 {
    let raw = [
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ];
    if msbf {
        u64::from_be_bytes(raw)
    } else {
        u64::from_le_bytes(raw)
    }
}

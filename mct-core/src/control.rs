//! Control frames exchanged between a logging process and the daemon.
//!
//! Every frame opens with the eight-byte user header: the pattern
//! `"DUH\x01"` followed by a 32-bit frame type. Bodies are packed with no
//! padding and use native byte order, as this protocol never leaves the
//! host. A receiver that loses framing scans byte-by-byte for the pattern
//! before interpreting anything else; [`find_user_header`] implements that
//! scan.

use crate::ident::{Id4, ID_SIZE};
use crate::{Error, Result};
use memchr::memmem;

/// The pattern opening every control frame: `"DUH\x01"`.
pub const USER_HEADER_PATTERN: [u8; 4] = *b"DUH\x01";

/// Size in bytes of the encoded user header.
pub const USER_HEADER_SIZE: usize = 8;

/// Frame type tags of the control protocol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum FrameType {
    /// A wire log message follows the user header.
    Log = 1,
    /// Application registration.
    RegisterApp = 2,
    /// Application removal.
    UnregisterApp = 3,
    /// Context registration.
    RegisterContext = 4,
    /// Context removal.
    UnregisterContext = 5,
    /// Daemon updates a context's log level and trace status.
    LogLevel = 6,
    /// Daemon delivers an injection for a context callback.
    Injection = 7,
    /// Library reports discarded-message count.
    Overflow = 8,
    /// Library sets app-wide default level and trace status.
    AppLogLevelTraceStatus = 9,
    /// Logging mode change (off/external/internal/both).
    LogMode = 11,
    /// Daemon announces whether an external client listens.
    LogState = 12,
    /// Timestamped marker.
    Marker = 13,
    /// Daemon switches the process-wide block mode.
    SetBlockMode = 14,
    /// Daemon queries the block mode.
    GetBlockMode = 15,
}

impl FrameType {
    /// Converts a raw tag into a frame type.
    pub fn from_raw(raw: u32) -> Option<FrameType> {
        match raw {
            1 => Some(FrameType::Log),
            2 => Some(FrameType::RegisterApp),
            3 => Some(FrameType::UnregisterApp),
            4 => Some(FrameType::RegisterContext),
            5 => Some(FrameType::UnregisterContext),
            6 => Some(FrameType::LogLevel),
            7 => Some(FrameType::Injection),
            8 => Some(FrameType::Overflow),
            9 => Some(FrameType::AppLogLevelTraceStatus),
            11 => Some(FrameType::LogMode),
            12 => Some(FrameType::LogState),
            13 => Some(FrameType::Marker),
            14 => Some(FrameType::SetBlockMode),
            15 => Some(FrameType::GetBlockMode),
            _ => None,
        }
    }
}

/// Returns the encoded user header for `frame_type`.
pub fn user_header(frame_type: FrameType) -> [u8; USER_HEADER_SIZE] {
    let mut header = [0u8; USER_HEADER_SIZE];
    header[..4].copy_from_slice(&USER_HEADER_PATTERN);
    header[4..].copy_from_slice(&(frame_type as u32).to_ne_bytes());
    header
}

/// Locates the next user-header pattern in `buf`.
pub fn find_user_header(buf: &[u8]) -> Option<usize> {
    memmem::find(buf, &USER_HEADER_PATTERN)
}

fn put_id(buf: &mut Vec<u8>, id: Id4) {
    buf.extend_from_slice(id.as_bytes());
}

fn get_id(bytes: &[u8]) -> Id4 {
    Id4::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn get_i32(bytes: &[u8]) -> i32 {
    i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn get_u32(bytes: &[u8]) -> u32 {
    u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Body of [`FrameType::RegisterApp`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterApp {
    /// Application id.
    pub apid: Id4,
    /// Process id of the registering application.
    pub pid: i32,
    /// Human-readable description, sent without terminator.
    pub description: String,
}

/// Body of [`FrameType::UnregisterApp`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnregisterApp {
    /// Application id.
    pub apid: Id4,
    /// Process id.
    pub pid: i32,
}

/// Body of [`FrameType::RegisterContext`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterContext {
    /// Application id, may be empty when buffered before `register_app`.
    pub apid: Id4,
    /// Context id.
    pub ctid: Id4,
    /// Index of the context in the library's registry.
    pub log_level_pos: i32,
    /// Initial log level.
    pub log_level: i8,
    /// Initial trace status.
    pub trace_status: i8,
    /// Process id.
    pub pid: i32,
    /// Human-readable description.
    pub description: String,
}

/// Body of [`FrameType::UnregisterContext`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnregisterContext {
    /// Application id.
    pub apid: Id4,
    /// Context id.
    pub ctid: Id4,
    /// Process id.
    pub pid: i32,
}

/// Body of [`FrameType::LogLevel`] (daemon to library).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LogLevelUpdate {
    /// New log level.
    pub log_level: u8,
    /// New trace status.
    pub trace_status: u8,
    /// Registry position of the addressed context.
    pub log_level_pos: i32,
}

/// Body of [`FrameType::Injection`] (daemon to library).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Injection {
    /// Registry position of the addressed context.
    pub log_level_pos: i32,
    /// Service id selecting the callback.
    pub service_id: u32,
    /// Opaque payload handed to the callback.
    pub payload: Vec<u8>,
}

/// Body of [`FrameType::AppLogLevelTraceStatus`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AppDefaults {
    /// Application id.
    pub apid: Id4,
    /// Default log level for all contexts of the application.
    pub log_level: u8,
    /// Default trace status for all contexts of the application.
    pub trace_status: u8,
}

/// Body of [`FrameType::Overflow`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Overflow {
    /// Messages discarded since the last successful report.
    pub overflow_counter: u32,
    /// Application that lost messages.
    pub apid: Id4,
}

/// A parsed control frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// A log frame; the wire message follows and is not parsed here.
    Log,
    /// Application registration.
    RegisterApp(RegisterApp),
    /// Application removal.
    UnregisterApp(UnregisterApp),
    /// Context registration.
    RegisterContext(RegisterContext),
    /// Context removal.
    UnregisterContext(UnregisterContext),
    /// Log-level update.
    LogLevel(LogLevelUpdate),
    /// Injection dispatch.
    Injection(Injection),
    /// Discarded-message report.
    Overflow(Overflow),
    /// Application-wide defaults.
    AppDefaults(AppDefaults),
    /// Logging mode change.
    LogMode(i8),
    /// Client-connected indicator.
    LogState(i8),
    /// Timestamped marker, header only.
    Marker,
    /// Block-mode switch.
    SetBlockMode(i8),
    /// Block-mode query.
    GetBlockMode,
    /// A frame whose tag this library does not understand.
    ///
    /// Consumes only the user header; the receiver resyncs afterwards.
    Unsupported(u32),
}

impl Frame {
    /// Appends the complete encoded frame (header and body) to `buf`.
    ///
    /// [`Frame::Log`] encodes only the user header; the caller appends the
    /// wire message itself.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Frame::Log => buf.extend_from_slice(&user_header(FrameType::Log)),
            Frame::RegisterApp(body) => {
                buf.extend_from_slice(&user_header(FrameType::RegisterApp));
                put_id(buf, body.apid);
                buf.extend_from_slice(&body.pid.to_ne_bytes());
                buf.extend_from_slice(&(body.description.len() as u32).to_ne_bytes());
                buf.extend_from_slice(body.description.as_bytes());
            }
            Frame::UnregisterApp(body) => {
                buf.extend_from_slice(&user_header(FrameType::UnregisterApp));
                put_id(buf, body.apid);
                buf.extend_from_slice(&body.pid.to_ne_bytes());
            }
            Frame::RegisterContext(body) => {
                buf.extend_from_slice(&user_header(FrameType::RegisterContext));
                put_id(buf, body.apid);
                put_id(buf, body.ctid);
                buf.extend_from_slice(&body.log_level_pos.to_ne_bytes());
                buf.push(body.log_level as u8);
                buf.push(body.trace_status as u8);
                buf.extend_from_slice(&body.pid.to_ne_bytes());
                buf.extend_from_slice(&(body.description.len() as u32).to_ne_bytes());
                buf.extend_from_slice(body.description.as_bytes());
            }
            Frame::UnregisterContext(body) => {
                buf.extend_from_slice(&user_header(FrameType::UnregisterContext));
                put_id(buf, body.apid);
                put_id(buf, body.ctid);
                buf.extend_from_slice(&body.pid.to_ne_bytes());
            }
            Frame::LogLevel(body) => {
                buf.extend_from_slice(&user_header(FrameType::LogLevel));
                buf.push(body.log_level);
                buf.push(body.trace_status);
                buf.extend_from_slice(&body.log_level_pos.to_ne_bytes());
            }
            Frame::Injection(body) => {
                buf.extend_from_slice(&user_header(FrameType::Injection));
                buf.extend_from_slice(&body.log_level_pos.to_ne_bytes());
                buf.extend_from_slice(&body.service_id.to_ne_bytes());
                buf.extend_from_slice(&(body.payload.len() as u32).to_ne_bytes());
                buf.extend_from_slice(&body.payload);
            }
            Frame::Overflow(body) => {
                buf.extend_from_slice(&user_header(FrameType::Overflow));
                buf.extend_from_slice(&body.overflow_counter.to_ne_bytes());
                put_id(buf, body.apid);
            }
            Frame::AppDefaults(body) => {
                buf.extend_from_slice(&user_header(FrameType::AppLogLevelTraceStatus));
                put_id(buf, body.apid);
                buf.push(body.log_level);
                buf.push(body.trace_status);
            }
            Frame::LogMode(mode) => {
                buf.extend_from_slice(&user_header(FrameType::LogMode));
                buf.push(*mode as u8);
            }
            Frame::LogState(state) => {
                buf.extend_from_slice(&user_header(FrameType::LogState));
                buf.push(*state as u8);
            }
            Frame::Marker => buf.extend_from_slice(&user_header(FrameType::Marker)),
            Frame::SetBlockMode(mode) => {
                buf.extend_from_slice(&user_header(FrameType::SetBlockMode));
                buf.push(*mode as u8);
            }
            Frame::GetBlockMode => buf.extend_from_slice(&user_header(FrameType::GetBlockMode)),
            Frame::Unsupported(tag) => {
                buf.extend_from_slice(&USER_HEADER_PATTERN);
                buf.extend_from_slice(&tag.to_ne_bytes());
            }
        }
    }

    /// Decodes one frame from the front of `buf`.
    ///
    /// `buf` must start at a user-header pattern (see [`find_user_header`]).
    /// Returns the frame and the number of bytes it consumed, or `None`
    /// when the frame is not yet complete and more bytes must arrive first.
    /// [`Frame::Log`] consumes only its user header, leaving the wire
    /// message for the caller, and [`Frame::Unsupported`] likewise consumes
    /// only the header so the receiver can resync.
    pub fn parse(buf: &[u8]) -> Result<Option<(Frame, usize)>> {
        if buf.len() < USER_HEADER_SIZE {
            return Ok(None);
        }
        if buf[..4] != USER_HEADER_PATTERN {
            return Err(Error::InvalidContent);
        }
        let tag = get_u32(&buf[4..8]);
        let body = &buf[USER_HEADER_SIZE..];
        let frame_type = match FrameType::from_raw(tag) {
            Some(frame_type) => frame_type,
            None => return Ok(Some((Frame::Unsupported(tag), USER_HEADER_SIZE))),
        };

        macro_rules! need {
            ($n:expr) => {
                if body.len() < $n {
                    return Ok(None);
                }
            };
        }

        let (frame, body_len) = match frame_type {
            FrameType::Log => (Frame::Log, 0),
            FrameType::RegisterApp => {
                need!(12);
                let desc_len = get_u32(&body[8..12]) as usize;
                need!(12 + desc_len);
                (
                    Frame::RegisterApp(RegisterApp {
                        apid: get_id(body),
                        pid: get_i32(&body[4..8]),
                        description: String::from_utf8_lossy(&body[12..12 + desc_len]).into_owned(),
                    }),
                    12 + desc_len,
                )
            }
            FrameType::UnregisterApp => {
                need!(8);
                (
                    Frame::UnregisterApp(UnregisterApp {
                        apid: get_id(body),
                        pid: get_i32(&body[4..8]),
                    }),
                    8,
                )
            }
            FrameType::RegisterContext => {
                need!(22);
                let desc_len = get_u32(&body[18..22]) as usize;
                need!(22 + desc_len);
                (
                    Frame::RegisterContext(RegisterContext {
                        apid: get_id(body),
                        ctid: get_id(&body[ID_SIZE..]),
                        log_level_pos: get_i32(&body[8..12]),
                        log_level: body[12] as i8,
                        trace_status: body[13] as i8,
                        pid: get_i32(&body[14..18]),
                        description: String::from_utf8_lossy(&body[22..22 + desc_len]).into_owned(),
                    }),
                    22 + desc_len,
                )
            }
            FrameType::UnregisterContext => {
                need!(12);
                (
                    Frame::UnregisterContext(UnregisterContext {
                        apid: get_id(body),
                        ctid: get_id(&body[ID_SIZE..]),
                        pid: get_i32(&body[8..12]),
                    }),
                    12,
                )
            }
            FrameType::LogLevel => {
                need!(6);
                (
                    Frame::LogLevel(LogLevelUpdate {
                        log_level: body[0],
                        trace_status: body[1],
                        log_level_pos: get_i32(&body[2..6]),
                    }),
                    6,
                )
            }
            FrameType::Injection => {
                need!(12);
                let payload_len = get_u32(&body[8..12]) as usize;
                need!(12 + payload_len);
                (
                    Frame::Injection(Injection {
                        log_level_pos: get_i32(body),
                        service_id: get_u32(&body[4..8]),
                        payload: body[12..12 + payload_len].to_vec(),
                    }),
                    12 + payload_len,
                )
            }
            FrameType::Overflow => {
                need!(8);
                (
                    Frame::Overflow(Overflow {
                        overflow_counter: get_u32(body),
                        apid: get_id(&body[4..]),
                    }),
                    8,
                )
            }
            FrameType::AppLogLevelTraceStatus => {
                need!(6);
                (
                    Frame::AppDefaults(AppDefaults {
                        apid: get_id(body),
                        log_level: body[4],
                        trace_status: body[5],
                    }),
                    6,
                )
            }
            FrameType::LogMode => {
                need!(1);
                (Frame::LogMode(body[0] as i8), 1)
            }
            FrameType::LogState => {
                need!(1);
                (Frame::LogState(body[0] as i8), 1)
            }
            FrameType::Marker => (Frame::Marker, 0),
            FrameType::SetBlockMode => {
                need!(1);
                (Frame::SetBlockMode(body[0] as i8), 1)
            }
            FrameType::GetBlockMode => (Frame::GetBlockMode, 0),
        };
        Ok(Some((frame, USER_HEADER_SIZE + body_len)))
    }
}

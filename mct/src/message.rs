//! The per-call message builder.
//!
//! A builder is a staging buffer plus the context it belongs to. Typed
//! appends go through the wire codec; `finish` lays down the headers and
//! hands the bytes to the dispatch path (daemon, overflow ring, or file).

use mct_core::payload::{ArgWriter, IntFormat, StringCoding};
use mct_core::LogLevel;

use crate::config::DEFAULT_MESSAGE_ID;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::user::USER;

/// An in-flight log message.
///
/// Created by [`Context::log`] or [`Context::log_id`]; dropped without
/// [`finish`](MessageBuilder::finish), the message is discarded silently.
pub struct MessageBuilder<'a> {
    ctx: &'a Context,
    level: LogLevel,
    payload: Vec<u8>,
    noar: u8,
    cap: usize,
    msbf: bool,
    verbose: bool,
}

impl<'a> MessageBuilder<'a> {
    pub(crate) fn new(
        ctx: &'a Context,
        level: LogLevel,
        message_id: Option<u32>,
    ) -> MessageBuilder<'a> {
        let cap = USER.log_buf_len() as usize;
        let verbose = USER.is_verbose();
        let msbf = cfg!(target_endian = "big");
        let mut payload = Vec::with_capacity(cap.min(512));
        if !verbose {
            let id = message_id.unwrap_or(DEFAULT_MESSAGE_ID);
            if msbf {
                payload.extend_from_slice(&id.to_be_bytes());
            } else {
                payload.extend_from_slice(&id.to_le_bytes());
            }
        }
        MessageBuilder {
            ctx,
            level,
            payload,
            noar: 0,
            cap,
            msbf,
            verbose,
        }
    }

    /// The number of arguments appended so far.
    pub fn arg_count(&self) -> u8 {
        self.noar
    }

    fn append<F>(&mut self, append: F) -> Result<()>
    where
        F: FnOnce(&mut ArgWriter<'_>) -> mct_core::Result<()>,
    {
        let mut writer = ArgWriter::new(&mut self.payload, self.cap, self.msbf, self.verbose);
        let result = append(&mut writer);
        // truncated strings are appended and still count as an argument,
        // so trust the writer's tally rather than the result
        self.noar = self.noar.wrapping_add(writer.count());
        result.map_err(Error::from)
    }

    /// Appends a boolean argument.
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.append(|w| w.write_bool(value))
    }

    /// Appends a boolean argument with a name attribute.
    pub fn write_bool_attr(&mut self, value: bool, name: &str) -> Result<()> {
        self.append(|w| w.write_bool_attr(value, Some(name)))
    }

    /// Appends an ASCII string argument, truncating an oversized value as
    /// described in [`mct_core::payload::TRUNCATION_TAIL`].
    pub fn write_string(&mut self, text: &str) -> Result<()> {
        self.append(|w| w.write_string(text, StringCoding::Ascii))
    }

    /// Appends an ASCII string argument with a name attribute.
    pub fn write_string_attr(&mut self, text: &str, name: &str) -> Result<()> {
        self.append(|w| w.write_string_attr(text, StringCoding::Ascii, Some(name)))
    }

    /// Appends a UTF-8 string argument.
    pub fn write_utf8_string(&mut self, text: &str) -> Result<()> {
        self.append(|w| w.write_string(text, StringCoding::Utf8))
    }

    /// Appends a UTF-8 string argument with a name attribute.
    pub fn write_utf8_string_attr(&mut self, text: &str, name: &str) -> Result<()> {
        self.append(|w| w.write_string_attr(text, StringCoding::Utf8, Some(name)))
    }

    /// Appends the first `length` bytes of `text` as an ASCII string.
    pub fn write_sized_string(&mut self, text: &str, length: usize) -> Result<()> {
        let cut = text.get(..length).ok_or(Error::WrongParameter)?;
        self.append(|w| w.write_string(cut, StringCoding::Ascii))
    }

    /// Appends a constant string.
    ///
    /// Constant strings document the call site; in non-verbose mode they
    /// are omitted from the wire entirely.
    pub fn write_constant_string(&mut self, text: &str) -> Result<()> {
        if !self.verbose {
            return Ok(());
        }
        self.write_string(text)
    }

    /// Appends a constant UTF-8 string, omitted in non-verbose mode.
    pub fn write_constant_utf8_string(&mut self, text: &str) -> Result<()> {
        if !self.verbose {
            return Ok(());
        }
        self.write_utf8_string(text)
    }

    /// Appends a raw-data argument.
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.append(|w| w.write_raw(data))
    }

    /// Appends a raw-data argument with a name attribute.
    pub fn write_raw_attr(&mut self, data: &[u8], name: &str) -> Result<()> {
        self.append(|w| w.write_raw_attr(data, Some(name)))
    }

    /// Appends a single-precision float argument.
    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.append(|w| w.write_f32(value))
    }

    /// Appends a single-precision float with name and unit attributes.
    pub fn write_f32_attr(&mut self, value: f32, name: &str, unit: &str) -> Result<()> {
        self.append(|w| w.write_f32_attr(value, Some(name), Some(unit)))
    }

    /// Appends a double-precision float argument.
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.append(|w| w.write_f64(value))
    }

    /// Appends a double-precision float with name and unit attributes.
    pub fn write_f64_attr(&mut self, value: f64, name: &str, unit: &str) -> Result<()> {
        self.append(|w| w.write_f64_attr(value, Some(name), Some(unit)))
    }

    /// Finalizes the message and dispatches it.
    ///
    /// Lays down the standard, extra, and (when selected) extended
    /// headers, patches the length field, and hands the bytes to the
    /// transport; on backpressure the message moves to the overflow ring.
    /// See [`Error`] for the disposition of each error kind.
    pub fn finish(self) -> Result<()> {
        USER.finish_message(self.ctx, self.level, &self.payload, self.noar, self.verbose)
    }
}

macro_rules! int_builder_methods {
    ($($write:ident, $write_attr:ident, $write_fmt:ident, $ty:ty;)+) => {
        impl<'a> MessageBuilder<'a> {
            $(
                /// Appends an integer argument.
                pub fn $write(&mut self, value: $ty) -> Result<()> {
                    self.append(|w| w.$write(value))
                }

                /// Appends an integer argument with name and unit
                /// attributes.
                pub fn $write_attr(&mut self, value: $ty, name: &str, unit: &str) -> Result<()> {
                    self.append(|w| w.$write_attr(value, Some(name), Some(unit)))
                }

                /// Appends an integer argument with a hex or binary
                /// display format.
                pub fn $write_fmt(&mut self, value: $ty, format: IntFormat) -> Result<()> {
                    self.append(|w| w.$write_fmt(value, format))
                }
            )+
        }
    };
}

int_builder_methods! {
    write_i8, write_i8_attr, write_i8_formatted, i8;
    write_i16, write_i16_attr, write_i16_formatted, i16;
    write_i32, write_i32_attr, write_i32_formatted, i32;
    write_i64, write_i64_attr, write_i64_formatted, i64;
    write_u8, write_u8_attr, write_u8_formatted, u8;
    write_u16, write_u16_attr, write_u16_formatted, u16;
    write_u32, write_u32_attr, write_u32_formatted, u32;
    write_u64, write_u64_attr, write_u64_formatted, u64;
}

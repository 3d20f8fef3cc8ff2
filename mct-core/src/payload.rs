//! Typed argument payload encoding and decoding.
//!
//! In verbose mode every argument is prefixed with a 32-bit `type_info`
//! word describing its kind, width, string coding, and whether name/unit
//! attributes precede the value. In non-verbose mode the `type_info` prefix
//! (and with it the attribute machinery) is omitted entirely and the
//! decoder needs external knowledge of the message layout.
//!
//! Byte order of `type_info`, length prefixes, and values follows the
//! `MSBF` bit of the message's standard header.

use crate::endian;
use crate::{Error, Result};

/// Bit definitions of the `type_info` word.
pub mod type_info {
    /// Mask of the width field for numeric kinds.
    pub const TYLE_MASK: u32 = 0x0000_000f;
    /// 8-bit width.
    pub const TYLE_8BIT: u32 = 0x0000_0001;
    /// 16-bit width.
    pub const TYLE_16BIT: u32 = 0x0000_0002;
    /// 32-bit width.
    pub const TYLE_32BIT: u32 = 0x0000_0003;
    /// 64-bit width.
    pub const TYLE_64BIT: u32 = 0x0000_0004;
    /// 128-bit width.
    pub const TYLE_128BIT: u32 = 0x0000_0005;
    /// Boolean data.
    pub const BOOL: u32 = 0x0000_0010;
    /// Signed integer data.
    pub const SINT: u32 = 0x0000_0020;
    /// Unsigned integer data.
    pub const UINT: u32 = 0x0000_0040;
    /// Float data.
    pub const FLOA: u32 = 0x0000_0080;
    /// Array of standard types.
    pub const ARAY: u32 = 0x0000_0100;
    /// String.
    pub const STRG: u32 = 0x0000_0200;
    /// Raw data.
    pub const RAWD: u32 = 0x0000_0400;
    /// Name/unit attributes precede the value.
    pub const VARI: u32 = 0x0000_0800;
    /// Quantization and offset are added.
    pub const FIXP: u32 = 0x0000_1000;
    /// Additional trace information.
    pub const TRAI: u32 = 0x0000_2000;
    /// Struct.
    pub const STRU: u32 = 0x0000_4000;
    /// Mask of the string-coding field.
    pub const SCOD_MASK: u32 = 0x0003_8000;
    /// ASCII string coding.
    pub const SCOD_ASCII: u32 = 0x0000_0000;
    /// UTF-8 string coding.
    pub const SCOD_UTF8: u32 = 0x0000_8000;
    /// Hexadecimal display coding for integers.
    pub const SCOD_HEX: u32 = 0x0001_0000;
    /// Binary display coding for integers.
    pub const SCOD_BIN: u32 = 0x0001_8000;
}

/// The fixed tail appended to truncated string arguments (a terminating NUL
/// follows it on the wire).
pub const TRUNCATION_TAIL: &str = "... <<Message truncated, too long>>";

/// String coding of a string argument.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StringCoding {
    /// Plain ASCII.
    Ascii,
    /// UTF-8. Truncation never splits a multi-byte sequence.
    Utf8,
}

impl StringCoding {
    fn bits(self) -> u32 {
        match self {
            StringCoding::Ascii => type_info::SCOD_ASCII,
            StringCoding::Utf8 => type_info::SCOD_UTF8,
        }
    }
}

/// Display coding of an integer argument.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum IntFormat {
    /// Decimal, the default.
    #[default]
    Default,
    /// Hexadecimal.
    Hex,
    /// Binary.
    Bin,
}

impl IntFormat {
    fn bits(self) -> u32 {
        match self {
            IntFormat::Default => 0,
            IntFormat::Hex => type_info::SCOD_HEX,
            IntFormat::Bin => type_info::SCOD_BIN,
        }
    }
}

/// Optional name/unit attributes of an argument (`VARI`).
///
/// A zero-length name or unit is legal; numeric kinds carry both fields,
/// strings, booleans, and raw data carry only the name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VarInfo<'a> {
    /// Attribute name.
    pub name: Option<&'a str>,
    /// Measurement unit, numeric kinds only.
    pub unit: Option<&'a str>,
}

impl<'a> VarInfo<'a> {
    /// An attribute set carrying only a name.
    pub fn named(name: &'a str) -> Self {
        VarInfo {
            name: Some(name),
            unit: None,
        }
    }
}

fn attr_len(text: Option<&str>) -> usize {
    // length on the wire includes the terminating NUL; absent writes as 0
    text.map(|t| t.len() + 1).unwrap_or(0)
}

/// Appends typed arguments to a bounded staging buffer.
///
/// The writer never grows the buffer past `cap`: an append that would not
/// fit fails with [`Error::BufferFull`] and leaves the buffer unchanged,
/// except for string arguments, which are truncated according to
/// [`TRUNCATION_TAIL`] (see [`ArgWriter::write_string`]).
#[derive(Debug)]
pub struct ArgWriter<'a> {
    buf: &'a mut Vec<u8>,
    cap: usize,
    msbf: bool,
    verbose: bool,
    count: u8,
}

impl<'a> ArgWriter<'a> {
    /// Creates a writer appending to `buf`, bounded by `cap` total bytes.
    ///
    /// `verbose` selects whether `type_info` prefixes are emitted; `msbf`
    /// must match the `MSBF` bit that will be set in the standard header.
    pub fn new(buf: &'a mut Vec<u8>, cap: usize, msbf: bool, verbose: bool) -> ArgWriter<'a> {
        ArgWriter {
            buf,
            cap,
            msbf,
            verbose,
            count: 0,
        }
    }

    /// The number of arguments appended so far (`noar`).
    pub fn count(&self) -> u8 {
        self.count
    }

    /// The number of payload bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if no payload bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn room(&self, needed: usize) -> Result<()> {
        if self.buf.len() + needed > self.cap {
            Err(Error::BufferFull)
        } else {
            Ok(())
        }
    }

    fn put_type_info(&mut self, value: u32) {
        endian::put_u32(self.buf, value, self.msbf);
    }

    fn put_len(&mut self, value: u16) {
        endian::put_u16(self.buf, value, self.msbf);
    }

    fn put_attr_string(&mut self, text: Option<&str>) {
        if let Some(text) = text {
            self.buf.extend_from_slice(text.as_bytes());
            self.buf.push(0);
        }
    }

    /// Appends a numeric or boolean value, `data` already in wire order.
    fn numeric(&mut self, data: &[u8], mut bits: u32, var: Option<&VarInfo<'_>>, with_unit: bool) -> Result<()> {
        let mut needed = data.len();
        if self.verbose {
            needed += 4;
            if let Some(var) = var {
                bits |= type_info::VARI;
                needed += 2 + attr_len(var.name);
                if with_unit {
                    needed += 2 + attr_len(var.unit);
                }
            }
        }
        self.room(needed)?;

        if self.verbose {
            self.put_type_info(bits);
            if let Some(var) = var {
                self.put_len(attr_len(var.name) as u16);
                if with_unit {
                    self.put_len(attr_len(var.unit) as u16);
                }
                self.put_attr_string(var.name);
                if with_unit {
                    self.put_attr_string(var.unit);
                }
            }
        }
        self.buf.extend_from_slice(data);
        self.count = self.count.wrapping_add(1);
        Ok(())
    }

    /// Appends a boolean argument.
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_bool_attr(value, None)
    }

    /// Appends a boolean argument with an optional name attribute.
    pub fn write_bool_attr(&mut self, value: bool, name: Option<&str>) -> Result<()> {
        let var = name.map(VarInfo::named);
        self.numeric(
            &[value as u8],
            type_info::BOOL | type_info::TYLE_8BIT,
            var.as_ref(),
            false,
        )
    }

    /// Appends a raw-data argument.
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.write_raw_attr(data, None)
    }

    /// Appends a raw-data argument with an optional name attribute.
    pub fn write_raw_attr(&mut self, data: &[u8], name: Option<&str>) -> Result<()> {
        if data.len() > u16::MAX as usize {
            return Err(Error::WrongParameter);
        }
        let mut bits = type_info::RAWD;
        let mut needed = data.len() + 2;
        if self.verbose {
            needed += 4;
            if name.is_some() {
                bits |= type_info::VARI;
                needed += 2 + attr_len(name);
            }
        }
        self.room(needed)?;

        if self.verbose {
            self.put_type_info(bits);
        }
        self.put_len(data.len() as u16);
        if self.verbose && name.is_some() {
            self.put_len(attr_len(name) as u16);
            self.put_attr_string(name);
        }
        self.buf.extend_from_slice(data);
        self.count = self.count.wrapping_add(1);
        Ok(())
    }

    /// Appends a string argument, truncating if it cannot fit.
    ///
    /// When the whole string does not fit in the remaining staging space,
    /// the longest coding-safe prefix that still leaves room for
    /// [`TRUNCATION_TAIL`] and the terminating NUL is written instead, the
    /// argument is still counted, and `Err(BufferFull)` reports the
    /// truncation to the caller. For UTF-8 strings the cut never splits a
    /// multi-byte sequence.
    pub fn write_string(&mut self, text: &str, coding: StringCoding) -> Result<()> {
        self.write_string_attr(text, coding, None)
    }

    /// Appends a string argument with an optional name attribute.
    pub fn write_string_attr(
        &mut self,
        text: &str,
        coding: StringCoding,
        name: Option<&str>,
    ) -> Result<()> {
        if text.len() >= u16::MAX as usize {
            return Err(Error::WrongParameter);
        }
        let name_size = attr_len(name);
        let mut arg_size = text.len() + 1;
        let mut needed = arg_size + 2;
        let mut bits = coding.bits() | type_info::STRG;
        if self.verbose {
            needed += 4;
            if name.is_some() {
                needed += 2 + name_size;
                bits |= type_info::VARI;
            }
        }

        let mut truncate_at = None;
        if self.buf.len() + needed > self.cap {
            // Fixed overhead of the truncated rendition: length field, the
            // tail with its NUL, and in verbose mode the type info and
            // attribute prefix.
            let mut overhead = 2 + TRUNCATION_TAIL.len() + 1;
            if self.verbose {
                overhead += 4;
                if name.is_some() {
                    overhead += 2 + name_size;
                }
            }
            let floor = self.buf.len() + overhead;
            if floor > self.cap {
                return Err(Error::BufferFull);
            }
            let mut keep = self.cap - floor;
            if coding == StringCoding::Utf8 {
                while keep > 0 && !text.is_char_boundary(keep) {
                    keep -= 1;
                }
            }
            arg_size = keep + TRUNCATION_TAIL.len() + 1;
            truncate_at = Some(keep);
        }

        if self.verbose {
            self.put_type_info(bits);
        }
        self.put_len(arg_size as u16);
        if self.verbose && name.is_some() {
            self.put_len(name_size as u16);
            self.put_attr_string(name);
        }
        match truncate_at {
            None => {
                self.buf.extend_from_slice(text.as_bytes());
                self.buf.push(0);
                self.count = self.count.wrapping_add(1);
                Ok(())
            }
            Some(keep) => {
                self.buf.extend_from_slice(&text.as_bytes()[..keep]);
                self.buf.extend_from_slice(TRUNCATION_TAIL.as_bytes());
                self.buf.push(0);
                self.count = self.count.wrapping_add(1);
                Err(Error::BufferFull)
            }
        }
    }

    /// Appends a float argument.
    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_f32_attr(value, None, None)
    }

    /// Appends a float argument with optional name and unit attributes.
    pub fn write_f32_attr(&mut self, value: f32, name: Option<&str>, unit: Option<&str>) -> Result<()> {
        let data = if self.msbf {
            value.to_bits().to_be_bytes()
        } else {
            value.to_bits().to_le_bytes()
        };
        let var = Self::float_var(name, unit);
        self.numeric(
            &data,
            type_info::FLOA | type_info::TYLE_32BIT,
            var.as_ref(),
            true,
        )
    }

    /// Appends a double-precision float argument.
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_f64_attr(value, None, None)
    }

    /// Appends a double-precision float with optional name and unit.
    pub fn write_f64_attr(&mut self, value: f64, name: Option<&str>, unit: Option<&str>) -> Result<()> {
        let data = if self.msbf {
            value.to_bits().to_be_bytes()
        } else {
            value.to_bits().to_le_bytes()
        };
        let var = Self::float_var(name, unit);
        self.numeric(
            &data,
            type_info::FLOA | type_info::TYLE_64BIT,
            var.as_ref(),
            true,
        )
    }

    fn float_var<'v>(name: Option<&'v str>, unit: Option<&'v str>) -> Option<VarInfo<'v>> {
        if name.is_none() && unit.is_none() {
            None
        } else {
            Some(VarInfo { name, unit })
        }
    }
}

macro_rules! int_writers {
    ($($write:ident, $write_attr:ident, $write_fmt:ident, $ty:ty, $kind:ident, $tyle:ident;)+) => {
        impl<'a> ArgWriter<'a> {
            $(
                /// Appends an integer argument.
                pub fn $write(&mut self, value: $ty) -> Result<()> {
                    self.$write_fmt(value, IntFormat::Default)
                }

                /// Appends an integer argument with optional name and unit
                /// attributes.
                pub fn $write_attr(
                    &mut self,
                    value: $ty,
                    name: Option<&str>,
                    unit: Option<&str>,
                ) -> Result<()> {
                    let data = if self.msbf {
                        value.to_be_bytes()
                    } else {
                        value.to_le_bytes()
                    };
                    let var = if name.is_none() && unit.is_none() {
                        None
                    } else {
                        Some(VarInfo { name, unit })
                    };
                    self.numeric(
                        &data,
                        type_info::$kind | type_info::$tyle,
                        var.as_ref(),
                        true,
                    )
                }

                /// Appends an integer argument with a display format.
                pub fn $write_fmt(&mut self, value: $ty, format: IntFormat) -> Result<()> {
                    let data = if self.msbf {
                        value.to_be_bytes()
                    } else {
                        value.to_le_bytes()
                    };
                    self.numeric(
                        &data,
                        type_info::$kind | type_info::$tyle | format.bits(),
                        None,
                        true,
                    )
                }
            )+
        }
    };
}

int_writers! {
    write_i8, write_i8_attr, write_i8_formatted, i8, SINT, TYLE_8BIT;
    write_i16, write_i16_attr, write_i16_formatted, i16, SINT, TYLE_16BIT;
    write_i32, write_i32_attr, write_i32_formatted, i32, SINT, TYLE_32BIT;
    write_i64, write_i64_attr, write_i64_formatted, i64, SINT, TYLE_64BIT;
    write_u8, write_u8_attr, write_u8_formatted, u8, UINT, TYLE_8BIT;
    write_u16, write_u16_attr, write_u16_formatted, u16, UINT, TYLE_16BIT;
    write_u32, write_u32_attr, write_u32_formatted, u32, UINT, TYLE_32BIT;
    write_u64, write_u64_attr, write_u64_formatted, u64, UINT, TYLE_64BIT;
}

/// A decoded argument value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Signed integer of any width up to 64 bits.
    Signed(i64),
    /// Unsigned integer of any width up to 64 bits.
    Unsigned(u64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// String payload including its coding.
    String(String),
    /// Raw bytes.
    Raw(Vec<u8>),
}

/// A decoded verbose-mode argument.
#[derive(Clone, Debug, PartialEq)]
pub struct Arg {
    /// The raw `type_info` word.
    pub type_info: u32,
    /// Name attribute, when `VARI` was set.
    pub name: Option<String>,
    /// Unit attribute, when `VARI` was set on a numeric kind.
    pub unit: Option<String>,
    /// The decoded value.
    pub value: Value,
}

struct Reader<'b> {
    bytes: &'b [u8],
    at: usize,
    msbf: bool,
}

impl<'b> Reader<'b> {
    fn take(&mut self, n: usize) -> Result<&'b [u8]> {
        if self.at + n > self.bytes.len() {
            return Err(Error::InvalidContent);
        }
        let slice = &self.bytes[self.at..self.at + n];
        self.at += n;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(endian::get_u16(self.take(2)?, self.msbf))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(endian::get_u32(self.take(4)?, self.msbf))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(endian::get_u64(self.take(8)?, self.msbf))
    }

    fn attr_string(&mut self, len: u16) -> Result<Option<String>> {
        if len == 0 {
            return Ok(None);
        }
        let raw = self.take(len as usize)?;
        let trimmed = raw.strip_suffix(&[0]).unwrap_or(raw);
        Ok(Some(String::from_utf8_lossy(trimmed).into_owned()))
    }
}

/// Decodes the verbose-mode arguments of a payload.
///
/// Fails with [`Error::InvalidContent`] on an unknown `type_info` or when a
/// declared length runs past the end of the payload.
pub fn parse_args(payload: &[u8], msbf: bool) -> Result<Vec<Arg>> {
    let mut reader = Reader {
        bytes: payload,
        at: 0,
        msbf,
    };
    let mut args = Vec::new();
    while reader.at < payload.len() {
        args.push(parse_one(&mut reader)?);
    }
    Ok(args)
}

fn parse_one(reader: &mut Reader<'_>) -> Result<Arg> {
    use self::type_info as ti;

    let info = reader.u32()?;
    let vari = info & ti::VARI != 0;
    let mut name = None;
    let mut unit = None;

    let value = if info & ti::STRG != 0 {
        let len = reader.u16()?;
        if vari {
            let name_len = reader.u16()?;
            name = reader.attr_string(name_len)?;
        }
        let raw = reader.take(len as usize)?;
        let trimmed = raw.strip_suffix(&[0]).unwrap_or(raw);
        Value::String(String::from_utf8_lossy(trimmed).into_owned())
    } else if info & ti::RAWD != 0 {
        let len = reader.u16()?;
        if vari {
            let name_len = reader.u16()?;
            name = reader.attr_string(name_len)?;
        }
        Value::Raw(reader.take(len as usize)?.to_vec())
    } else if info & ti::BOOL != 0 {
        if vari {
            let name_len = reader.u16()?;
            name = reader.attr_string(name_len)?;
        }
        Value::Bool(reader.take(1)?[0] != 0)
    } else if info & (ti::SINT | ti::UINT | ti::FLOA) != 0 {
        if vari {
            let name_len = reader.u16()?;
            let unit_len = reader.u16()?;
            name = reader.attr_string(name_len)?;
            unit = reader.attr_string(unit_len)?;
        }
        let width = info & ti::TYLE_MASK;
        if info & ti::FLOA != 0 {
            match width {
                ti::TYLE_32BIT => Value::F32(f32::from_bits(reader.u32()?)),
                ti::TYLE_64BIT => Value::F64(f64::from_bits(reader.u64()?)),
                _ => return Err(Error::InvalidContent),
            }
        } else {
            let raw = match width {
                ti::TYLE_8BIT => reader.take(1)?[0] as u64,
                ti::TYLE_16BIT => reader.u16()? as u64,
                ti::TYLE_32BIT => reader.u32()? as u64,
                ti::TYLE_64BIT => reader.u64()?,
                _ => return Err(Error::InvalidContent),
            };
            if info & ti::SINT != 0 {
                let signed = match width {
                    ti::TYLE_8BIT => raw as u8 as i8 as i64,
                    ti::TYLE_16BIT => raw as u16 as i16 as i64,
                    ti::TYLE_32BIT => raw as u32 as i32 as i64,
                    _ => raw as i64,
                };
                Value::Signed(signed)
            } else {
                Value::Unsigned(raw)
            }
        }
    } else {
        return Err(Error::InvalidContent);
    };

    Ok(Arg {
        type_info: info,
        name,
        unit,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer(buf: &mut Vec<u8>, cap: usize) -> ArgWriter<'_> {
        ArgWriter::new(buf, cap, false, true)
    }

    #[test]
    fn i32_little_endian_layout() {
        let mut buf = Vec::new();
        writer(&mut buf, 128).write_i32(-1).unwrap();
        assert_eq!(buf, [0x23, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn msbf_flips_value_and_type_info() {
        let mut buf = Vec::new();
        ArgWriter::new(&mut buf, 128, true, true)
            .write_u16(0x0102)
            .unwrap();
        assert_eq!(buf, [0x00, 0x00, 0x00, 0x42, 0x01, 0x02]);
    }

    #[test]
    fn string_has_length_including_nul() {
        let mut buf = Vec::new();
        writer(&mut buf, 128)
            .write_string("hi", StringCoding::Utf8)
            .unwrap();
        // STRG | SCOD_UTF8, len 3, "hi\0"
        assert_eq!(buf, [0x00, 0x82, 0x00, 0x00, 0x03, 0x00, b'h', b'i', 0x00]);
    }

    #[test]
    fn numeric_attrs_carry_name_and_unit() {
        let mut buf = Vec::new();
        writer(&mut buf, 128)
            .write_u8_attr(7, Some("speed"), Some("km/h"))
            .unwrap();
        let args = parse_args(&buf, false).unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].name.as_deref(), Some("speed"));
        assert_eq!(args[0].unit.as_deref(), Some("km/h"));
        assert_eq!(args[0].value, Value::Unsigned(7));
        assert!(args[0].type_info & type_info::VARI != 0);
    }

    #[test]
    fn zero_length_name_is_legal() {
        let mut buf = Vec::new();
        writer(&mut buf, 128)
            .write_bool_attr(true, Some(""))
            .unwrap();
        let args = parse_args(&buf, false).unwrap();
        // a present-but-empty name decodes as an empty attribute
        assert_eq!(args[0].name.as_deref(), Some(""));
        assert_eq!(args[0].value, Value::Bool(true));
    }

    #[test]
    fn hex_format_sets_scod() {
        let mut buf = Vec::new();
        writer(&mut buf, 128)
            .write_u32_formatted(0xdead, IntFormat::Hex)
            .unwrap();
        let args = parse_args(&buf, false).unwrap();
        assert_eq!(
            args[0].type_info & type_info::SCOD_MASK,
            type_info::SCOD_HEX
        );
    }

    #[test]
    fn numeric_overflow_leaves_buffer_untouched() {
        let mut buf = Vec::new();
        let mut writer = writer(&mut buf, 10);
        writer.write_u32(1).unwrap();
        assert_eq!(writer.write_u32(2), Err(Error::BufferFull));
        assert_eq!(writer.count(), 1);
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn string_truncation_appends_tail_once() {
        let cap = 256;
        let long = "x".repeat(10_000);
        let mut buf = Vec::new();
        let mut writer = ArgWriter::new(&mut buf, cap, false, true);
        assert_eq!(
            writer.write_string(&long, StringCoding::Ascii),
            Err(Error::BufferFull)
        );
        assert_eq!(writer.count(), 1);
        assert!(buf.len() <= cap);
        let args = parse_args(&buf, false).unwrap();
        match &args[0].value {
            Value::String(s) => {
                assert!(s.ends_with(TRUNCATION_TAIL));
                assert_eq!(s.matches("<<Message truncated").count(), 1);
            }
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn utf8_truncation_respects_char_boundary() {
        // fill so that the cut lands inside the multi-byte character
        let text = format!("{}\u{1F600}{}", "a".repeat(40), "b".repeat(100));
        let cap = 2 + 4 + TRUNCATION_TAIL.len() + 1 + 42;
        let mut buf = Vec::new();
        let mut writer = ArgWriter::new(&mut buf, cap, false, true);
        assert_eq!(
            writer.write_string(&text, StringCoding::Utf8),
            Err(Error::BufferFull)
        );
        let args = parse_args(&buf, false).unwrap();
        match &args[0].value {
            Value::String(s) => {
                // the emoji would straddle the cut, so it is dropped whole
                assert_eq!(&s[..40], "a".repeat(40).as_str());
                assert!(s.ends_with(TRUNCATION_TAIL));
            }
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn exact_fit_string_is_not_truncated() {
        // overhead in verbose mode: type info (4) + length field (2) + NUL
        let cap = 64;
        let fits = "y".repeat(cap - 4 - 2 - 1);
        let mut buf = Vec::new();
        let mut writer = ArgWriter::new(&mut buf, cap, false, true);
        writer.write_string(&fits, StringCoding::Ascii).unwrap();
        assert_eq!(buf.len(), cap);

        let mut buf2 = Vec::new();
        let mut writer2 = ArgWriter::new(&mut buf2, cap, false, true);
        let over = "y".repeat(cap - 4 - 2);
        assert_eq!(
            writer2.write_string(&over, StringCoding::Ascii),
            Err(Error::BufferFull)
        );
    }

    #[test]
    fn nonverbose_omits_type_info() {
        let mut buf = Vec::new();
        let mut writer = ArgWriter::new(&mut buf, 128, false, false);
        writer.write_u32(5).unwrap();
        writer.write_string("ok", StringCoding::Ascii).unwrap();
        // u32 value, then length-prefixed string, no type info words
        assert_eq!(buf, [5, 0, 0, 0, 0x03, 0x00, b'o', b'k', 0x00]);
    }

    #[test]
    fn unknown_type_info_is_rejected() {
        let payload = [0u8, 0, 0, 0, 1, 2, 3, 4];
        assert_eq!(parse_args(&payload, false), Err(Error::InvalidContent));
    }

    #[test]
    fn float_round_trip() {
        let mut buf = Vec::new();
        let mut writer = writer(&mut buf, 128);
        writer.write_f32(1.5).unwrap();
        writer.write_f64(-2.25).unwrap();
        let args = parse_args(&buf, false).unwrap();
        assert_eq!(args[0].value, Value::F32(1.5));
        assert_eq!(args[1].value, Value::F64(-2.25));
    }
}

//! Four-byte identifiers.

use std::fmt;
use std::str::FromStr;

/// The size in bytes of an MCT identifier.
pub const ID_SIZE: usize = 4;

/// A four-byte fixed-length identifier.
///
/// Used for application ids (APID), context ids (CTID), ECU ids, and the
/// communication interface tag. Names shorter than four bytes are padded
/// with trailing zeros; an `Id4` is *not* a C string and is compared
/// byte-wise.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Id4([u8; ID_SIZE]);

impl Id4 {
    /// The all-zero identifier.
    pub const EMPTY: Id4 = Id4([0; ID_SIZE]);

    /// Builds an identifier from up to four bytes of `name`.
    ///
    /// Longer names are silently cut at four bytes, matching the wire
    /// format's fixed field width.
    pub fn new(name: &str) -> Self {
        let mut id = [0u8; ID_SIZE];
        for (dst, src) in id.iter_mut().zip(name.bytes()) {
            *dst = src;
        }
        Id4(id)
    }

    /// Builds an identifier from a raw four-byte field.
    pub const fn from_bytes(bytes: [u8; ID_SIZE]) -> Self {
        Id4(bytes)
    }

    /// Returns the raw four-byte field.
    pub const fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    /// Returns `true` if all four bytes are zero.
    pub fn is_empty(&self) -> bool {
        self.0 == [0; ID_SIZE]
    }
}

impl From<&str> for Id4 {
    fn from(name: &str) -> Self {
        Id4::new(name)
    }
}

impl FromStr for Id4 {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Id4::new(s))
    }
}

impl fmt::Display for Id4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.0.iter().take_while(|&&b| b != 0) {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Id4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id4(\"{}\")", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_are_zero_padded() {
        let id = Id4::new("AB");
        assert_eq!(id.as_bytes(), b"AB\0\0");
    }

    #[test]
    fn long_names_are_cut() {
        let id = Id4::new("LONGNAME");
        assert_eq!(id.as_bytes(), b"LONG");
    }

    #[test]
    fn display_trims_padding() {
        assert_eq!(Id4::new("AB").to_string(), "AB");
        assert_eq!(Id4::new("DEMO").to_string(), "DEMO");
        assert_eq!(Id4::EMPTY.to_string(), "");
    }

    #[test]
    fn comparison_is_byte_wise() {
        assert_eq!(Id4::new("MAIN"), Id4::from_bytes(*b"MAIN"));
        assert_ne!(Id4::new("MAIN"), Id4::new("MAI"));
    }
}

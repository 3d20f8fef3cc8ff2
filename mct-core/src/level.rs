//! Log levels and trace status.

use std::fmt;
use std::str::FromStr;

/// Describes the severity of a log message, or a context's threshold.
///
/// A message is emitted when its level is at most the context's effective
/// level, so `Fatal` passes the narrowest set of thresholds and `Verbose`
/// the widest. The two pseudo-levels are used only as thresholds:
/// [`LogLevel::Off`] suppresses everything and [`LogLevel::Default`] defers
/// to the daemon-configured default.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i8)]
pub enum LogLevel {
    /// Defer to the configured default. Only valid as a threshold.
    Default = -1,
    /// Logging disabled. Only valid as a threshold.
    Off = 0,
    /// Unrecoverable errors.
    Fatal = 1,
    /// Errors with impact.
    Error = 2,
    /// Incorrect behavior that can be handled.
    Warn = 3,
    /// High-level information.
    Info = 4,
    /// Detailed debugging information.
    Debug = 5,
    /// Highest-volume debugging information.
    Verbose = 6,
}

impl LogLevel {
    /// Converts a raw wire value into a level.
    pub fn from_raw(raw: i8) -> Option<LogLevel> {
        match raw {
            -1 => Some(LogLevel::Default),
            0 => Some(LogLevel::Off),
            1 => Some(LogLevel::Fatal),
            2 => Some(LogLevel::Error),
            3 => Some(LogLevel::Warn),
            4 => Some(LogLevel::Info),
            5 => Some(LogLevel::Debug),
            6 => Some(LogLevel::Verbose),
            _ => None,
        }
    }

    /// Returns the raw wire value of this level.
    pub const fn as_raw(self) -> i8 {
        self as i8
    }

    /// Returns `true` if a message at this level passes `threshold`.
    ///
    /// `threshold` must already be resolved; `Default` never passes
    /// anything.
    pub fn passes(self, threshold: LogLevel) -> bool {
        let msg = self.as_raw();
        let limit = threshold.as_raw();
        msg > 0 && limit > 0 && msg <= limit
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Default => "default",
            LogLevel::Off => "off",
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "verbose",
        };
        f.pad(name)
    }
}

/// Indicates that a string could not be parsed as a level or trace status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseLevelError(());

impl fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("not a valid log level or trace status")
    }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(raw) = s.parse::<i8>() {
            return LogLevel::from_raw(raw).ok_or(ParseLevelError(()));
        }
        match s {
            s if s.eq_ignore_ascii_case("default") => Ok(LogLevel::Default),
            s if s.eq_ignore_ascii_case("off") => Ok(LogLevel::Off),
            s if s.eq_ignore_ascii_case("fatal") => Ok(LogLevel::Fatal),
            s if s.eq_ignore_ascii_case("error") => Ok(LogLevel::Error),
            s if s.eq_ignore_ascii_case("warn") || s.eq_ignore_ascii_case("warning") => {
                Ok(LogLevel::Warn)
            }
            s if s.eq_ignore_ascii_case("info") => Ok(LogLevel::Info),
            s if s.eq_ignore_ascii_case("debug") => Ok(LogLevel::Debug),
            s if s.eq_ignore_ascii_case("verbose") => Ok(LogLevel::Verbose),
            _ => Err(ParseLevelError(())),
        }
    }
}

/// Whether trace messages of a context are forwarded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum TraceStatus {
    /// Defer to the configured default.
    Default = -1,
    /// Trace messages are dropped.
    Off = 0,
    /// Trace messages are forwarded.
    On = 1,
}

impl TraceStatus {
    /// Converts a raw wire value into a trace status.
    pub fn from_raw(raw: i8) -> Option<TraceStatus> {
        match raw {
            -1 => Some(TraceStatus::Default),
            0 => Some(TraceStatus::Off),
            1 => Some(TraceStatus::On),
            _ => None,
        }
    }

    /// Returns the raw wire value of this status.
    pub const fn as_raw(self) -> i8 {
        self as i8
    }
}

impl FromStr for TraceStatus {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(raw) = s.parse::<i8>() {
            return TraceStatus::from_raw(raw).ok_or(ParseLevelError(()));
        }
        match s {
            s if s.eq_ignore_ascii_case("default") => Ok(TraceStatus::Default),
            s if s.eq_ignore_ascii_case("off") => Ok(TraceStatus::Off),
            s if s.eq_ignore_ascii_case("on") => Ok(TraceStatus::On),
            _ => Err(ParseLevelError(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(LogLevel::Fatal < LogLevel::Verbose);
        assert!(LogLevel::Warn.passes(LogLevel::Info));
        assert!(!LogLevel::Debug.passes(LogLevel::Info));
        assert!(!LogLevel::Info.passes(LogLevel::Off));
        assert!(!LogLevel::Info.passes(LogLevel::Default));
    }

    #[test]
    fn parse_names_and_numbers() {
        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("6".parse::<LogLevel>(), Ok(LogLevel::Verbose));
        assert_eq!("-1".parse::<LogLevel>(), Ok(LogLevel::Default));
        assert!("chatty".parse::<LogLevel>().is_err());
        assert_eq!("on".parse::<TraceStatus>(), Ok(TraceStatus::On));
    }

    #[test]
    fn raw_round_trip() {
        for raw in -1..=6 {
            let level = LogLevel::from_raw(raw).unwrap();
            assert_eq!(level.as_raw(), raw);
        }
        assert_eq!(LogLevel::from_raw(7), None);
    }
}

//! Library configuration.
//!
//! Every environment variable is read exactly once, when the library
//! initializes; later changes to the process environment have no effect.

use std::path::PathBuf;
use std::str::FromStr;

use mct_core::{Id4, LogLevel, TraceStatus};

/// Default total size of the overflow ring.
pub(crate) const DEFAULT_BUFFER_MIN: u32 = 50_000;
/// Default maximum total size of the overflow ring.
pub(crate) const DEFAULT_BUFFER_MAX: u32 = 500_000;
/// Default growth step of the overflow ring.
pub(crate) const DEFAULT_BUFFER_STEP: u32 = 50_000;
/// Default staging buffer length.
pub(crate) const DEFAULT_LOG_BUF_LEN: u16 = 1400;
/// Hard cap of the staging buffer length.
pub(crate) const MAX_LOG_BUF_LEN: u16 = u16::MAX;
/// ECU id used for direct-to-file mode.
pub(crate) const DEFAULT_ECU_ID: &str = "ECU1";
/// Message id used in non-verbose mode when the caller supplies none.
pub(crate) const DEFAULT_MESSAGE_ID: u32 = 0xffff;
/// Housekeeper loop delay.
pub(crate) const HOUSEKEEPER_DELAY_MS: u64 = 500;
/// Sleep between at-exit drain attempts.
pub(crate) const ATEXIT_DRAIN_SLEEP_MS: u64 = 100;
/// Size of the daemon-to-library receive buffer.
pub(crate) const RECEIVE_BUFFER_SIZE: usize = 10_024;
/// Context table growth chunk.
pub(crate) const CONTEXT_ALLOC_CHUNK: usize = 500;
/// Initial log level when neither environment nor caller provide one.
pub(crate) const INITIAL_LOG_LEVEL: LogLevel = LogLevel::Info;
/// Initial trace status when the caller provides none.
pub(crate) const INITIAL_TRACE_STATUS: TraceStatus = TraceStatus::Off;

/// Mirroring of finalized messages to stdout.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum LocalPrintMode {
    /// No local printing unless enabled programmatically.
    #[default]
    Unset,
    /// Print while the daemon connection is down.
    Automatic,
    /// Always print.
    ForceOn,
    /// Never print, even if enabled programmatically.
    ForceOff,
}

/// Destination for the library's own diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum DiagTarget {
    /// Print to stderr.
    #[default]
    Stderr,
    /// Print to stdout.
    Stdout,
    /// Append to a file.
    File(PathBuf),
    /// Discard everything.
    Off,
}

/// One entry of the `MCT_INITIAL_LOG_LEVEL` list.
///
/// An empty application or context id acts as a wildcard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LevelDirective {
    pub(crate) apid: Option<Id4>,
    pub(crate) ctid: Option<Id4>,
    pub(crate) level: LogLevel,
}

impl FromStr for LevelDirective {
    type Err = ();

    /// Parses one `apid:ctid:level` item.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split(':');
        let apid = fields.next().ok_or(())?;
        let ctid = fields.next().ok_or(())?;
        let level = fields.next().ok_or(())?;
        if fields.next().is_some() {
            return Err(());
        }
        let parse_id = |raw: &str| {
            if raw.is_empty() {
                None
            } else {
                Some(Id4::new(raw))
            }
        };
        Ok(LevelDirective {
            apid: parse_id(apid),
            ctid: parse_id(ctid),
            level: level.trim().parse().map_err(|_| ())?,
        })
    }
}

/// Parses the semicolon-separated directive list, skipping bad items.
pub(crate) fn parse_level_directives(raw: &str) -> Vec<LevelDirective> {
    raw.split(';')
        .filter(|item| !item.is_empty())
        .filter_map(|item| match item.parse() {
            Ok(directive) => Some(directive),
            Err(()) => {
                tracing::warn!(item, "ignoring malformed initial log level directive");
                None
            }
        })
        .collect()
}

/// The one-shot environment snapshot.
#[derive(Clone, Debug)]
pub(crate) struct Config {
    pub(crate) app_id_override: Option<Id4>,
    pub(crate) initial_levels: Vec<LevelDirective>,
    pub(crate) local_print_mode: LocalPrintMode,
    pub(crate) force_blocking: bool,
    pub(crate) buffer_min: u32,
    pub(crate) buffer_max: u32,
    pub(crate) buffer_step: u32,
    pub(crate) log_buf_len: u16,
    pub(crate) extended_header_for_nonverbose: bool,
    pub(crate) disable_injection_poll: bool,
    pub(crate) ipc_dir: PathBuf,
    pub(crate) pipe_dir: PathBuf,
    pub(crate) diag_target: Option<DiagTarget>,
    pub(crate) diag_level: Option<tracing::Level>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app_id_override: None,
            initial_levels: Vec::new(),
            local_print_mode: LocalPrintMode::Unset,
            force_blocking: false,
            buffer_min: DEFAULT_BUFFER_MIN,
            buffer_max: DEFAULT_BUFFER_MAX,
            buffer_step: DEFAULT_BUFFER_STEP,
            log_buf_len: DEFAULT_LOG_BUF_LEN,
            extended_header_for_nonverbose: true,
            disable_injection_poll: false,
            ipc_dir: PathBuf::from("/tmp"),
            pipe_dir: PathBuf::from("/tmp"),
            diag_target: None,
            diag_level: None,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub(crate) fn from_env() -> Config {
        let mut config = Config::default();

        if let Ok(app_id) = std::env::var("MCT_APP_ID") {
            if !app_id.is_empty() {
                config.app_id_override = Some(Id4::new(&app_id));
            }
        }
        if let Ok(raw) = std::env::var("MCT_INITIAL_LOG_LEVEL") {
            config.initial_levels = parse_level_directives(&raw);
        }
        if let Ok(raw) = std::env::var("MCT_LOCAL_PRINT_MODE") {
            config.local_print_mode = match raw.as_str() {
                "AUTOMATIC" => LocalPrintMode::Automatic,
                "FORCE_ON" => LocalPrintMode::ForceOn,
                "FORCE_OFF" => LocalPrintMode::ForceOff,
                _ => LocalPrintMode::Unset,
            };
        }
        config.force_blocking = std::env::var_os("MCT_FORCE_BLOCKING").is_some();

        config.buffer_min = env_u32("MCT_USER_BUFFER_MIN", DEFAULT_BUFFER_MIN);
        config.buffer_max = env_u32("MCT_USER_BUFFER_MAX", DEFAULT_BUFFER_MAX);
        config.buffer_step = env_u32("MCT_USER_BUFFER_STEP", DEFAULT_BUFFER_STEP);

        if let Ok(raw) = std::env::var("MCT_LOG_MSG_BUF_LEN") {
            match raw.parse::<u32>() {
                Ok(len) if len > MAX_LOG_BUF_LEN as u32 => {
                    tracing::warn!(
                        configured = len,
                        "configured staging size exceeds the maximum, restricting to 65535 bytes"
                    );
                    config.log_buf_len = MAX_LOG_BUF_LEN;
                }
                Ok(len) if len > 0 => config.log_buf_len = len as u16,
                _ => {}
            }
        }

        if let Ok(raw) = std::env::var("MCT_DISABLE_EXTENDED_HEADER_FOR_NONVERBOSE") {
            if raw == "1" {
                config.extended_header_for_nonverbose = false;
            }
        }
        config.disable_injection_poll =
            std::env::var_os("MCT_DISABLE_INJECTION_MSG_AT_USER").is_some();

        if let Ok(dir) = std::env::var("MCT_IPC_PATH") {
            if !dir.is_empty() {
                config.ipc_dir = PathBuf::from(dir);
            }
        }
        if let Ok(dir) = std::env::var("MCT_PIPE_DIR") {
            if !dir.is_empty() {
                config.pipe_dir = PathBuf::from(dir);
            }
        }

        if let Ok(raw) = std::env::var("MCT_LOG_MODE") {
            config.diag_target = Some(match raw.as_str() {
                "0" | "console" => DiagTarget::Stdout,
                "2" | "file" => match std::env::var("MCT_LOG_FILENAME") {
                    Ok(name) if !name.is_empty() => DiagTarget::File(PathBuf::from(name)),
                    _ => DiagTarget::Stderr,
                },
                "4" | "off" => DiagTarget::Off,
                // syslog destinations degrade to stderr
                _ => DiagTarget::Stderr,
            });
        }
        if let Ok(raw) = std::env::var("MCT_LOG_LEVEL") {
            config.diag_level = parse_diag_level(&raw);
        }

        config
    }

    /// Resolves the initial level of a context from the environment list.
    ///
    /// The most specific matching directive wins: an exact `apid:ctid`
    /// match over an apid-only match over a global one.
    pub(crate) fn initial_level_for(&self, apid: Id4, ctid: Id4) -> Option<LogLevel> {
        let mut best: Option<(u8, LogLevel)> = None;
        for directive in &self.initial_levels {
            if directive.apid.map_or(false, |want| want != apid) {
                continue;
            }
            if directive.ctid.map_or(false, |want| want != ctid) {
                continue;
            }
            let specificity =
                directive.apid.is_some() as u8 * 2 + directive.ctid.is_some() as u8;
            if best.map_or(true, |(seen, _)| specificity >= seen) {
                best = Some((specificity, directive.level));
            }
        }
        best.map(|(_, level)| level)
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::error!(name, value = %raw, default, "invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Maps the syslog-style `MCT_LOG_LEVEL` number onto a tracing level.
fn parse_diag_level(raw: &str) -> Option<tracing::Level> {
    let number: u8 = raw.parse().ok()?;
    Some(match number {
        0..=3 => tracing::Level::ERROR,
        4 => tracing::Level::WARN,
        5 | 6 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_directive_list() {
        let directives = parse_level_directives("APP:CTX:5;:CTX2:warn;APP::off;");
        assert_eq!(directives.len(), 3);
        assert_eq!(directives[0].apid, Some(Id4::new("APP")));
        assert_eq!(directives[0].ctid, Some(Id4::new("CTX")));
        assert_eq!(directives[0].level, LogLevel::Debug);
        assert_eq!(directives[1].apid, None);
        assert_eq!(directives[1].level, LogLevel::Warn);
        assert_eq!(directives[2].ctid, None);
        assert_eq!(directives[2].level, LogLevel::Off);
    }

    #[test]
    fn malformed_items_are_skipped() {
        let directives = parse_level_directives("nonsense;A:B;APP:CTX:verbose");
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].level, LogLevel::Verbose);
    }

    #[test]
    fn most_specific_directive_wins() {
        let mut config = Config::default();
        config.initial_levels = parse_level_directives("::error;APP::warn;APP:CTX:debug");
        assert_eq!(
            config.initial_level_for(Id4::new("APP"), Id4::new("CTX")),
            Some(LogLevel::Debug)
        );
        assert_eq!(
            config.initial_level_for(Id4::new("APP"), Id4::new("ELSE")),
            Some(LogLevel::Warn)
        );
        assert_eq!(
            config.initial_level_for(Id4::new("OTHR"), Id4::new("X")),
            Some(LogLevel::Error)
        );
        assert_eq!(
            Config::default().initial_level_for(Id4::new("A"), Id4::new("B")),
            None
        );
    }
}

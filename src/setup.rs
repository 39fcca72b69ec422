use std::{ffi::OsString, path::PathBuf, process};

use clap::{
    error::{ContextKind, ContextValue, ErrorKind},
    CommandFactory, Parser,
};
use thiserror::Error;

const PROGRAM: &str = "ioseqw";

pub(crate) const DEFAULT_FILENAME: &str = "ioseqw.out";

#[cfg(target_os = "macos")]
const SYNC_TYPE_HELP: &str =
    "sync option to use for writing: sync, dsync, fsync, ffsync. repeatable, options are cumulative";
#[cfg(not(target_os = "macos"))]
const SYNC_TYPE_HELP: &str =
    "sync option to use for writing: sync, dsync, fsync. repeatable, options are cumulative";

#[derive(Debug, Parser)]
#[command(
    name = PROGRAM,
    about = "measure sequential write throughput with configurable durability barriers"
)]
struct Opt {
    #[clap(short, long, default_value = DEFAULT_FILENAME, help = "name of the file to write to")]
    filename: PathBuf,

    #[clap(
        short = 's',
        long,
        value_parser = parse_record_size,
        help = "size of records to write, in bytes"
    )]
    record_size: Option<u32>,

    #[clap(
        short = 'c',
        long,
        value_parser = parse_record_count,
        help = "number of records to write"
    )]
    record_count: Option<u64>,

    #[clap(short = 't', long = "sync-type", value_parser = parse_sync_type, help = SYNC_TYPE_HELP)]
    sync_type: Vec<SyncType>,

    #[clap(short = 'v', long, help = "print version and exit")]
    version: bool,

    #[clap(hide = true)]
    unexpected: Vec<OsString>,
}

/// How writes are synchronized to storage. Mirrors the `-t` tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncType {
    /// request synchronized i/o completion on every write (O_SYNC at open)
    Sync,
    /// request synchronized data-only completion on every write (O_DSYNC at open)
    Dsync,
    /// fsync(2) after every write
    Fsync,
    /// fcntl F_FULLFSYNC after every write, asking the drive itself to commit
    #[cfg(target_os = "macos")]
    Ffsync,
}

/// Validated run configuration. Built once by [`resolve`], read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Config {
    pub(crate) filename: PathBuf,
    pub(crate) record_size: u32,
    pub(crate) record_count: u64,
    pub(crate) sync_on_open: bool,
    pub(crate) data_sync_on_open: bool,
    pub(crate) sync_after_write: bool,
    pub(crate) full_sync_after_write: bool,
}

impl Config {
    pub(crate) fn sync_summary(&self) -> String {
        let mut options = Vec::new();
        if self.sync_on_open {
            options.push("sync");
        }
        if self.data_sync_on_open {
            options.push("dsync");
        }
        if self.sync_after_write {
            options.push("fsync");
        }
        if self.full_sync_after_write {
            options.push("ffsync");
        }
        if options.is_empty() {
            "none".to_string()
        } else {
            options.join("+")
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum ValidationError {
    #[error("invalid {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("invalid sync type: {0}")]
    InvalidSyncType(String),
    #[error("unknown option: {0}")]
    InvalidOption(String),
    #[error("too many arguments")]
    UnexpectedArgument,
    #[error("missing parameter: {0}")]
    MissingMandatory(&'static str),
}

/// Parse and validate command line arguments into a [`Config`].
///
/// `-h` and `-v` short-circuit: the text is printed to stdout and the
/// process exits before any further validation.
pub(crate) fn resolve<I, T>(args: I) -> Result<Config, ValidationError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let opt = match Opt::try_parse_from(args) {
        Ok(opt) => opt,
        Err(err) => return Err(classify(err)),
    };

    if opt.version {
        println!("{} {}", PROGRAM, env!("CARGO_PKG_VERSION"));
        process::exit(0);
    }
    if !opt.unexpected.is_empty() {
        return Err(ValidationError::UnexpectedArgument);
    }
    let record_size = opt
        .record_size
        .ok_or(ValidationError::MissingMandatory("record size"))?;
    let record_count = opt
        .record_count
        .ok_or(ValidationError::MissingMandatory("record count"))?;

    let mut config = Config {
        filename: opt.filename,
        record_size,
        record_count,
        sync_on_open: false,
        data_sync_on_open: false,
        sync_after_write: false,
        full_sync_after_write: false,
    };
    for sync_type in opt.sync_type {
        match sync_type {
            SyncType::Sync => config.sync_on_open = true,
            SyncType::Dsync => config.data_sync_on_open = true,
            SyncType::Fsync => config.sync_after_write = true,
            #[cfg(target_os = "macos")]
            SyncType::Ffsync => config.full_sync_after_write = true,
        }
    }
    Ok(config)
}

/// Usage text printed to stderr after a validation warning.
pub(crate) fn usage() -> String {
    Opt::command().render_help().to_string()
}

// help is not an error: print it and stop. everything else maps onto
// the validation taxonomy.
fn classify(err: clap::Error) -> ValidationError {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = err.print();
            process::exit(0);
        }
        ErrorKind::ValueValidation | ErrorKind::InvalidValue => {
            let arg = context_string(&err, ContextKind::InvalidArg);
            let value = context_string(&err, ContextKind::InvalidValue);
            if arg.contains("--sync-type") {
                ValidationError::InvalidSyncType(value)
            } else if arg.contains("--record-size") {
                ValidationError::InvalidNumber {
                    field: "record size",
                    value,
                }
            } else if arg.contains("--record-count") {
                ValidationError::InvalidNumber {
                    field: "record count",
                    value,
                }
            } else {
                ValidationError::InvalidOption(first_line(&err))
            }
        }
        ErrorKind::UnknownArgument => {
            ValidationError::InvalidOption(context_string(&err, ContextKind::InvalidArg))
        }
        _ => ValidationError::InvalidOption(first_line(&err)),
    }
}

fn context_string(err: &clap::Error, kind: ContextKind) -> String {
    match err.get(kind) {
        Some(ContextValue::String(value)) => value.clone(),
        _ => String::new(),
    }
}

fn first_line(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .next()
        .unwrap_or_default()
        .trim_start_matches("error: ")
        .to_string()
}

// one bounded base-10 parser for both sized fields. u64 parsing already
// rejects empty input, signs, junk and partial consumption.
fn parse_bounded(value: &str, min: u64, max: u64) -> Result<u64, String> {
    let parsed: u64 = value
        .parse()
        .map_err(|_| format!("expected a base-10 integer in [{}, {}]", min, max))?;
    if parsed < min || parsed > max {
        return Err(format!("expected a value in [{}, {}]", min, max));
    }
    Ok(parsed)
}

fn parse_record_size(value: &str) -> Result<u32, String> {
    parse_bounded(value, 1, u32::MAX as u64).map(|parsed| parsed as u32)
}

fn parse_record_count(value: &str) -> Result<u64, String> {
    parse_bounded(value, 1, u64::MAX)
}

// ffsync exists only where F_FULLFSYNC does
fn parse_sync_type(value: &str) -> Result<SyncType, String> {
    match value {
        "sync" => Ok(SyncType::Sync),
        "dsync" => Ok(SyncType::Dsync),
        "fsync" => Ok(SyncType::Fsync),
        #[cfg(target_os = "macos")]
        "ffsync" => Ok(SyncType::Ffsync),
        other => Err(format!("unknown sync type '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_args(args: &[&str]) -> Result<Config, ValidationError> {
        resolve(std::iter::once("ioseqw").chain(args.iter().copied()))
    }

    #[test]
    fn resolves_mandatory_fields() {
        let config = resolve_args(&["-s", "512", "-c", "10", "-f", "out.bin"]).unwrap();
        assert_eq!(config.record_size, 512);
        assert_eq!(config.record_count, 10);
        assert_eq!(config.filename, PathBuf::from("out.bin"));
        assert!(!config.sync_on_open);
        assert!(!config.data_sync_on_open);
        assert!(!config.sync_after_write);
        assert!(!config.full_sync_after_write);
    }

    #[test]
    fn long_forms_match_short_forms() {
        let short = resolve_args(&["-s", "8", "-c", "2", "-f", "x", "-t", "fsync"]).unwrap();
        let long = resolve_args(&[
            "--record-size",
            "8",
            "--record-count",
            "2",
            "--filename",
            "x",
            "--sync-type",
            "fsync",
        ])
        .unwrap();
        assert_eq!(short, long);
    }

    #[test]
    fn default_filename_when_not_given() {
        let config = resolve_args(&["-s", "1", "-c", "1"]).unwrap();
        assert_eq!(config.filename, PathBuf::from(DEFAULT_FILENAME));
    }

    #[test]
    fn sync_types_are_cumulative() {
        let config = resolve_args(&["-s", "1", "-c", "1", "-t", "sync", "-t", "fsync"]).unwrap();
        assert!(config.sync_on_open);
        assert!(config.sync_after_write);
        assert!(!config.data_sync_on_open);
        assert!(!config.full_sync_after_write);
    }

    #[test]
    fn dsync_sets_the_data_only_flag() {
        let config = resolve_args(&["-s", "1", "-c", "1", "-t", "dsync"]).unwrap();
        assert!(config.data_sync_on_open);
        assert!(!config.sync_on_open);
    }

    #[test]
    fn rejects_zero_record_size() {
        assert_eq!(
            resolve_args(&["-s", "0", "-c", "1"]),
            Err(ValidationError::InvalidNumber {
                field: "record size",
                value: "0".to_string(),
            })
        );
    }

    #[test]
    fn rejects_zero_record_count() {
        assert_eq!(
            resolve_args(&["-s", "1", "-c", "0"]),
            Err(ValidationError::InvalidNumber {
                field: "record count",
                value: "0".to_string(),
            })
        );
    }

    #[test]
    fn rejects_non_numeric_record_size() {
        assert_eq!(
            resolve_args(&["-s", "abc", "-c", "1"]),
            Err(ValidationError::InvalidNumber {
                field: "record size",
                value: "abc".to_string(),
            })
        );
    }

    #[test]
    fn rejects_trailing_junk_in_numbers() {
        assert!(resolve_args(&["-s", "512k", "-c", "1"]).is_err());
    }

    #[test]
    fn rejects_record_size_above_u32() {
        assert_eq!(
            resolve_args(&["-s", "4294967296", "-c", "1"]),
            Err(ValidationError::InvalidNumber {
                field: "record size",
                value: "4294967296".to_string(),
            })
        );
    }

    #[test]
    fn accepts_record_size_at_u32_max() {
        let config = resolve_args(&["-s", "4294967295", "-c", "1"]).unwrap();
        assert_eq!(config.record_size, u32::MAX);
    }

    #[test]
    fn rejects_record_count_above_u64() {
        assert_eq!(
            resolve_args(&["-s", "1", "-c", "99999999999999999999"]),
            Err(ValidationError::InvalidNumber {
                field: "record count",
                value: "99999999999999999999".to_string(),
            })
        );
    }

    #[test]
    fn rejects_negative_record_size() {
        assert!(resolve_args(&["-s", "-1", "-c", "1"]).is_err());
    }

    #[test]
    fn rejects_unknown_sync_type() {
        assert_eq!(
            resolve_args(&["-s", "1", "-c", "1", "-t", "badtype"]),
            Err(ValidationError::InvalidSyncType("badtype".to_string()))
        );
    }

    #[test]
    fn rejects_unknown_option() {
        assert!(matches!(
            resolve_args(&["-s", "1", "-c", "1", "--bogus"]),
            Err(ValidationError::InvalidOption(_))
        ));
    }

    #[test]
    fn rejects_leftover_positionals() {
        assert_eq!(
            resolve_args(&["-s", "1", "-c", "1", "extra"]),
            Err(ValidationError::UnexpectedArgument)
        );
    }

    #[test]
    fn missing_record_size_is_reported() {
        let err = resolve_args(&["-c", "1"]).unwrap_err();
        assert_eq!(err, ValidationError::MissingMandatory("record size"));
        assert_eq!(err.to_string(), "missing parameter: record size");
    }

    #[test]
    fn missing_record_count_is_reported() {
        let err = resolve_args(&["-s", "1"]).unwrap_err();
        assert_eq!(err, ValidationError::MissingMandatory("record count"));
        assert_eq!(err.to_string(), "missing parameter: record count");
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn ffsync_sets_the_full_sync_flag() {
        let config = resolve_args(&["-s", "1", "-c", "1", "-t", "ffsync"]).unwrap();
        assert!(config.full_sync_after_write);
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn ffsync_is_rejected_off_macos() {
        assert_eq!(
            resolve_args(&["-s", "1", "-c", "1", "-t", "ffsync"]),
            Err(ValidationError::InvalidSyncType("ffsync".to_string()))
        );
    }
}

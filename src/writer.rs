use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    os::unix::fs::OpenOptionsExt,
    path::PathBuf,
};

use thiserror::Error;
use tracing::debug;

use crate::{durability::Durability, setup::Config};

// every record byte is the same fill value, the content is never read back
const FILL_BYTE: u8 = b'1';

const FILE_MODE: u32 = 0o644;

#[derive(Debug, Error)]
pub(crate) enum WriteError {
    #[error("failed to create record buffer of {size} bytes")]
    BufferAllocation { size: u32 },
    #[error("failed to open '{}': {}", .path.display(), .source)]
    OpenFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write to '{}' after {} records: {}", .path.display(), .written, .source)]
    WriteFailure {
        path: PathBuf,
        written: u64,
        #[source]
        source: io::Error,
    },
}

/// Write `config.record_count` copies of the record buffer to
/// `config.filename`.
///
/// Any write error or short write is fatal: no retry, no resume. The
/// error reports how many records were fully written before the fault.
/// Post-write barriers go through `durability` and never fail the run.
pub(crate) fn write_records(
    config: Config,
    durability: &mut impl Durability,
) -> Result<(), WriteError> {
    let record = make_record(config.record_size)?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true).mode(FILE_MODE);
    let flags = open_flags(&config);
    if flags != 0 {
        options.custom_flags(flags);
    }
    let mut file = options
        .open(&config.filename)
        .map_err(|source| WriteError::OpenFailure {
            path: config.filename.clone(),
            source,
        })?;

    for written in 0..config.record_count {
        write_record(&mut file, &record).map_err(|source| WriteError::WriteFailure {
            path: config.filename.clone(),
            written,
            source,
        })?;
        if config.sync_after_write {
            durability.flush(&file);
        }
        if config.full_sync_after_write {
            durability.full_flush(&file);
        }
    }
    debug!(
        "wrote {} records to {}",
        config.record_count,
        config.filename.display()
    );
    Ok(())
}

// a short write is an error, not a request to write the remaining bytes
fn write_record(file: &mut File, record: &[u8]) -> io::Result<()> {
    let n = file.write(record)?;
    if n != record.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short write of {} of {} bytes", n, record.len()),
        ));
    }
    Ok(())
}

// allocation failure is a reported error, not an abort
fn make_record(size: u32) -> Result<Vec<u8>, WriteError> {
    let mut record = Vec::new();
    if record.try_reserve_exact(size as usize).is_err() {
        return Err(WriteError::BufferAllocation { size });
    }
    record.resize(size as usize, FILL_BYTE);
    Ok(record)
}

fn open_flags(config: &Config) -> i32 {
    let mut flags = 0;
    if config.sync_on_open {
        flags |= libc::O_SYNC;
    }
    if config.data_sync_on_open {
        flags |= libc::O_DSYNC;
    }
    flags
}

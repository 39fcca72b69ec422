use std::{env, process};

use tracing::{error, info, level_filters::LevelFilter, warn};

use crate::writer::WriteError;

mod durability;
mod setup;
mod writer;

// exit statuses follow sysexits(3) where one applies
const EX_OK: i32 = 0;
const EX_USAGE: i32 = 64;
const EX_OSERR: i32 = 71;
const EX_CANTCREAT: i32 = 73;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = match setup::resolve(env::args_os()) {
        Ok(config) => config,
        Err(err) => {
            warn!("{}", err);
            eprint!("{}", setup::usage());
            process::exit(EX_USAGE);
        }
    };

    info!(
        "writing {} records of {} bytes to {} (sync: {})",
        config.record_count,
        config.record_size,
        config.filename.display(),
        config.sync_summary()
    );

    match writer::write_records(config, &mut durability::OsDurability) {
        Ok(()) => process::exit(EX_OK),
        Err(err) => {
            error!("{}", err);
            let status = match err {
                WriteError::BufferAllocation { .. } => EX_OSERR,
                WriteError::OpenFailure { .. } => EX_CANTCREAT,
                WriteError::WriteFailure { .. } => 1,
            };
            process::exit(status);
        }
    }
}

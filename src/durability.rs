use std::fs::File;
#[cfg(target_os = "macos")]
use std::os::fd::AsRawFd;

/// Post-write durability barriers.
///
/// Barriers are a best-effort hint layered on top of an already
/// successful write: failures are discarded, which is why both methods
/// return nothing.
pub(crate) trait Durability {
    /// flush file content and metadata to storage (fsync)
    fn flush(&mut self, file: &File);

    /// ask the storage hardware itself to commit data. stronger than
    /// [`Durability::flush`], only available on macos, no-op elsewhere
    fn full_flush(&mut self, file: &File);
}

/// Barriers backed by the real syscalls.
pub(crate) struct OsDurability;

impl Durability for OsDurability {
    fn flush(&mut self, file: &File) {
        let _ = file.sync_all();
    }

    #[cfg(target_os = "macos")]
    fn full_flush(&mut self, file: &File) {
        unsafe {
            libc::fcntl(file.as_raw_fd(), libc::F_FULLFSYNC);
        }
    }

    #[cfg(not(target_os = "macos"))]
    fn full_flush(&mut self, _file: &File) {}
}

//! Exclusive claim on the EC ports across processes.
//!
//! `ioperm` only grants access, it does not keep a second process off the
//! ports. Every hardware attach therefore takes a non-blocking `flock` on a
//! well-known lock file first and holds it as long as the ports.

use std::path::{Path, PathBuf};

use log::debug;

use crate::ec::PortIo;
use crate::errors::FanControlError;

pub const DEFAULT_LOCK_PATH: &str = "/run/gpdfan.lock";

/// An exclusive advisory lock, released when dropped.
pub struct PortLock {
    #[cfg(unix)]
    _file: std::fs::File,
    path: PathBuf,
}

impl PortLock {
    #[cfg(unix)]
    pub fn acquire(path: &Path) -> Result<Self, FanControlError> {
        use std::fs::OpenOptions;
        use std::io;
        use std::os::fd::AsRawFd;

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|error| match error.kind() {
                io::ErrorKind::PermissionDenied => {
                    FanControlError::PermissionDenied(format!("{}: {}", path.display(), error))
                }
                _ => FanControlError::Io(error),
            })?;

        let res = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if res != 0 {
            let os_error = io::Error::last_os_error();
            return Err(match os_error.kind() {
                io::ErrorKind::WouldBlock => FanControlError::ResourceUnavailable(format!(
                    "EC ports are held by another instance ({})",
                    path.display()
                )),
                _ => FanControlError::Io(os_error),
            });
        }
        debug!("locked {}", path.display());

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    #[cfg(not(unix))]
    pub fn acquire(path: &Path) -> Result<Self, FanControlError> {
        Err(FanControlError::ResourceUnavailable(format!(
            "{}: port locking needs a unix host",
            path.display()
        )))
    }
}

impl Drop for PortLock {
    fn drop(&mut self) {
        debug!("unlocked {}", self.path.display());
    }
}

/// Ports held together with the lock that keeps other instances off them.
pub struct LockedPorts<P> {
    // Released before the lock.
    ports: P,
    _lock: PortLock,
}

impl<P: PortIo> LockedPorts<P> {
    pub fn new(lock: PortLock, ports: P) -> Self {
        Self { ports, _lock: lock }
    }
}

impl<P: PortIo> PortIo for LockedPorts<P> {
    fn outb(&mut self, port: u16, value: u8) {
        self.ports.outb(port, value)
    }

    fn inb(&mut self, port: u16) -> u8 {
        self.ports.inb(port)
    }
}

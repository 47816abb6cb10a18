//! Direct x86 port I/O from userspace.
//!
//! The port range is granted with `ioperm(2)`, which needs root (or
//! CAP_SYS_RAWIO) and is refused under kernel lockdown. Once granted, `in`
//! and `out` cannot fail.

use crate::ec::PortIo;
use crate::errors::FanControlError;

pub use imp::RawPorts;

#[cfg(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64")))]
mod imp {
    use std::arch::asm;
    use std::io;

    use log::{debug, error};

    use super::*;

    /// A reserved, contiguous range of I/O ports.
    pub struct RawPorts {
        first: u16,
        count: u16,
    }

    impl RawPorts {
        /// Reserve `first..=last` for this process.
        pub fn reserve(first: u16, last: u16) -> Result<Self, FanControlError> {
            if unsafe { libc::geteuid() } != 0 {
                return Err(FanControlError::PermissionDenied(
                    "must be root to use port based I/O for EC communication".into(),
                ));
            }

            let count = last - first + 1;
            let res = unsafe { libc::ioperm(first.into(), count.into(), 1) };
            if res != 0 {
                let os_error = io::Error::last_os_error();
                error!("ioperm failed, port I/O is likely blocked by kernel lockdown mode");
                return Err(FanControlError::ResourceUnavailable(format!(
                    "ports {:#X}..={:#X}: {}",
                    first, last, os_error
                )));
            }
            debug!("reserved ports {:#X}..={:#X}", first, last);

            Ok(Self { first, count })
        }
    }

    impl PortIo for RawPorts {
        fn outb(&mut self, port: u16, value: u8) {
            debug_assert!(port.wrapping_sub(self.first) < self.count);
            // SAFETY: ioperm granted this port range in reserve().
            unsafe {
                asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
            }
        }

        fn inb(&mut self, port: u16) -> u8 {
            debug_assert!(port.wrapping_sub(self.first) < self.count);
            let value: u8;
            // SAFETY: ioperm granted this port range in reserve().
            unsafe {
                asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
            }
            value
        }
    }

    impl Drop for RawPorts {
        fn drop(&mut self) {
            unsafe {
                libc::ioperm(self.first.into(), self.count.into(), 0);
            }
            debug!("released ports starting at {:#X}", self.first);
        }
    }
}

#[cfg(not(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64"))))]
mod imp {
    use std::convert::Infallible;

    use super::*;

    /// Port I/O is only available on Linux x86; this can never be constructed.
    pub struct RawPorts {
        never: Infallible,
    }

    impl RawPorts {
        pub fn reserve(_first: u16, _last: u16) -> Result<Self, FanControlError> {
            Err(FanControlError::ResourceUnavailable(
                "EC port I/O is only supported on Linux x86/x86_64".into(),
            ))
        }
    }

    impl PortIo for RawPorts {
        fn outb(&mut self, _port: u16, _value: u8) {
            match self.never {}
        }

        fn inb(&mut self, _port: u16) -> u8 {
            match self.never {}
        }
    }
}

/* Driver framework: the Transport trait the update sequencer talks to, the hidraw-backed DeviceIo
 * implementation, and the per-key lighting protocol encoders built on top of it. */
pub mod commit_packet;
pub mod effect_packet;
pub mod key_packet;
#[cfg(test)]
pub mod mock;
pub mod schedule;
pub mod sequencer;

use nix::libc;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/* Transport-level failures.                                       */
/*                                                                 */
/* `NotFound` is kept apart from generic ioctl failures so callers */
/* can tell a vanished device node from a rejected report.         */
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("I/O failure on {device}: {source}")]
    Io {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Feature report ioctl failed: {0}")]
    IoctlFailed(std::io::Error),

    #[error("Device {0} not found")]
    NotFound(String),

    #[error("Short transfer: sent {actual} of {expected} bytes")]
    ShortTransfer { expected: usize, actual: usize },
}

/* Compute the `HIDIOCSFEATURE(len)` ioctl request number.        */
/*                                                                */
/* Linux hidraw.h: `_IOC(_IOC_READ|_IOC_WRITE, 'H', 0x06, len)`. */
fn hid_set_feature_req(len: usize) -> libc::c_ulong {
    let ioc_readwrite: libc::c_ulong = 3;
    let ioc_type: libc::c_ulong = b'H' as libc::c_ulong;
    let ioc_nr: libc::c_ulong = 0x06;
    (ioc_readwrite << 30) | (ioc_type << 8) | ioc_nr | ((len as libc::c_ulong) << 16)
}

/// The blocking write/feature-report primitive every lighting update goes
/// through.
///
/// Implementations send each buffer verbatim; the first byte of every
/// buffer doubles as the report ID.
#[async_trait]
pub trait Transport: Send {
    /* Returns the transport name for logging purposes. */
    fn name(&self) -> &str;

    /* Deliver one feature report. */
    async fn send_feature_report(&mut self, report: &[u8]) -> Result<(), DriverError>;

    /* Deliver one output report on the interrupt channel. */
    async fn write(&mut self, report: &[u8]) -> Result<(), DriverError>;
}

/* Async wrapper around a `/dev/hidraw` file descriptor. */
/*                                                       */
/* All hardware I/O goes through this struct so that     */
/* the sequencer never touches raw file handles.         */
pub struct DeviceIo {
    file: tokio::fs::File,
    path: std::path::PathBuf,
    name: String,
}

impl DeviceIo {
    /* Open the hidraw device node at `path`. */
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open hidraw device {}", path.display()))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            name: path.display().to_string(),
        })
    }

    /* ENODEV/ENOENT mean the node went away underneath us. */
    fn is_gone(err: &std::io::Error) -> bool {
        matches!(err.raw_os_error(), Some(libc::ENODEV) | Some(libc::ENOENT))
    }
}

#[async_trait]
impl Transport for DeviceIo {
    fn name(&self) -> &str {
        &self.name
    }

    /* Set a HID feature report using the `HIDIOCSFEATURE` ioctl.  */
    /*                                                             */
    /* `report[0]` is the report ID. The kernel must accept the    */
    /* whole buffer, anything less is reported as a short transfer. */
    async fn send_feature_report(&mut self, report: &[u8]) -> Result<(), DriverError> {
        let fd = self.file.as_raw_fd();
        let req = hid_set_feature_req(report.len());

        /* SAFETY: `fd` is a valid open file descriptor for the     */
        /* lifetime of this call. `report` is a live immutable slice */
        /* and its length is encoded into `req` via the ioctl macro. */
        /* The kernel reads exactly `report.len()` bytes.            */
        let res = unsafe { libc::ioctl(fd, req, report.as_ptr()) };

        if res < 0 {
            let err = std::io::Error::last_os_error();
            if Self::is_gone(&err) {
                return Err(DriverError::NotFound(self.name.clone()));
            }
            return Err(DriverError::IoctlFailed(err));
        }

        let n = res as usize;
        debug!("SET_FEATURE {} bytes: {:02x?}", n, &report[..n.min(report.len())]);
        if n < report.len() {
            return Err(DriverError::ShortTransfer {
                expected: report.len(),
                actual: n,
            });
        }
        Ok(())
    }

    /* Write a raw HID output report to the device. */
    async fn write(&mut self, report: &[u8]) -> Result<(), DriverError> {
        if let Err(source) = self.file.write_all(report).await {
            if Self::is_gone(&source) {
                return Err(DriverError::NotFound(self.name.clone()));
            }
            return Err(DriverError::Io {
                device: self.path.display().to_string(),
                source,
            });
        }
        debug!("TX {} bytes: {:02x?}", report.len(), report);
        Ok(())
    }
}

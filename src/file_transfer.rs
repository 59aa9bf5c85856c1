//! Inbound file-data accumulation and the auto- vs manual-acknowledgement policy of §4.6.
//!
//! Auto mode appends each `FILE_DATA_RQST` payload to the destination file as it arrives and
//! acks immediately; manual mode stages bytes in RAM until the caller explicitly flushes them,
//! so the last chunk of a transfer can be acknowledged (or rejected) deliberately.

use std::fs::OpenOptions;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::{OrpError, Result};

/// Maximum length of a staged (non-auto) file-transfer chunk held in RAM.
pub const MAX_STAGING_LEN: usize = 100 * 1024;

/// Permission bits (`0o660`, user/group read-write) applied to created transfer files.
#[cfg(unix)]
const CREATE_MODE: u32 = 0o660;

/// Tracks one in-progress inbound file transfer.
#[derive(Debug)]
pub struct FileTransfer {
    file_name: PathBuf,
    expected_bytes: u64,
    received_bytes: u64,
    auto_mode: bool,
    staging: Vec<u8>,
}

impl FileTransfer {
    /// Begin a new transfer, deleting any pre-existing file at `name`. `expected_bytes == 0`
    /// means the total size is unknown and auto-mode is never force-disabled.
    pub fn setup(name: impl AsRef<Path>, expected_bytes: u64, auto_mode: bool) -> Result<Self> {
        let file_name = name.as_ref().to_path_buf();
        if file_name.exists() {
            std::fs::remove_file(&file_name).map_err(OrpError::Io)?;
        }
        Ok(Self {
            file_name,
            expected_bytes,
            received_bytes: 0,
            auto_mode,
            staging: Vec::new(),
        })
    }

    pub fn is_auto(&self) -> bool {
        self.auto_mode
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    fn open_append(&self) -> std::io::Result<std::fs::File> {
        let mut options = OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        options.mode(CREATE_MODE);
        options.open(&self.file_name)
    }

    fn write_all_retrying(file: &mut std::fs::File, mut bytes: &[u8]) -> std::io::Result<()> {
        while !bytes.is_empty() {
            match file.write(bytes) {
                Ok(0) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "file-transfer write returned 0 bytes",
                    ))
                }
                Ok(n) => bytes = &bytes[n..],
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Accept the next chunk of file data. In auto mode this appends immediately; otherwise it
    /// is staged in RAM for [`flush`](Self::flush). Forces auto mode off once
    /// `expected_bytes` is known and reached, so the final chunk is always acked manually.
    pub fn cache(&mut self, bytes: &[u8]) -> Result<()> {
        if self.auto_mode {
            let mut file = self.open_append().map_err(OrpError::Io)?;
            Self::write_all_retrying(&mut file, bytes).map_err(OrpError::Io)?;
        } else {
            if self.staging.len() + bytes.len() > MAX_STAGING_LEN {
                return Err(OrpError::BufferOverflow {
                    got: self.staging.len() + bytes.len(),
                    max: MAX_STAGING_LEN,
                });
            }
            self.staging.extend_from_slice(bytes);
        }
        self.received_bytes += bytes.len() as u64;

        if self.expected_bytes > 0 && self.received_bytes >= self.expected_bytes {
            self.auto_mode = false;
        }
        Ok(())
    }

    /// Append any staged bytes to the destination file and clear the staging buffer. A no-op
    /// in auto mode, where bytes are already on disk.
    pub fn flush(&mut self) -> Result<()> {
        if self.auto_mode || self.staging.is_empty() {
            return Ok(());
        }
        let mut file = self.open_append().map_err(OrpError::Io)?;
        Self::write_all_retrying(&mut file, &self.staging).map_err(OrpError::Io)?;
        self.staging.clear();
        Ok(())
    }
}

// Byte-addressable read-only sources: disk images on disk or in memory

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ProbeError;

/// A byte-addressable, read-only source of disk data.
///
/// Only forward, positive-offset reads are ever performed against it. File
/// sources are opened per read and closed before the call returns, so a
/// `ByteSource` holds no OS resources between calls and is cheap to clone.
#[derive(Debug, Clone)]
pub enum ByteSource {
    File(PathBuf),
    Buffer(Arc<[u8]>),
}

impl ByteSource {
    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        ByteSource::File(path.as_ref().to_path_buf())
    }

    pub fn buffer(data: Vec<u8>) -> Self {
        ByteSource::Buffer(data.into())
    }

    /// Total length of the source in bytes.
    pub fn len(&self) -> Result<u64, ProbeError> {
        match self {
            ByteSource::File(path) => Ok(std::fs::metadata(path)?.len()),
            ByteSource::Buffer(data) => Ok(data.len() as u64),
        }
    }

    pub fn is_empty(&self) -> Result<bool, ProbeError> {
        Ok(self.len()? == 0)
    }

    /// Read exactly `length` bytes at absolute `offset`.
    ///
    /// Open failures and short reads surface as `ProbeError::IoError`; the
    /// caller decides whether a truncated source is fatal.
    pub fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, ProbeError> {
        match self {
            ByteSource::File(path) => {
                let mut file = File::open(path)?;
                file.seek(SeekFrom::Start(offset))?;
                let mut buf = vec![0u8; length];
                file.read_exact(&mut buf)?;
                Ok(buf)
            }
            ByteSource::Buffer(data) => {
                let start = usize::try_from(offset).map_err(|_| {
                    ProbeError::InvalidInput(format!("offset {offset} exceeds address space"))
                })?;
                let end = start.checked_add(length).filter(|&end| end <= data.len());
                match end {
                    Some(end) => Ok(data[start..end].to_vec()),
                    None => Err(ProbeError::IoError(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "read of {} bytes at offset {} beyond source end {}",
                            length,
                            offset,
                            data.len()
                        ),
                    ))),
                }
            }
        }
    }
}

// Volume abstraction shared by all filesystem plugins

use std::fmt;

use humansize::{format_size, BINARY};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ProbeError;
use crate::source::ByteSource;

/// Raw partition-type identifier exactly as found in the partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PartitionTypeId {
    Mbr(u8),
    Gpt(Uuid),
}

impl fmt::Display for PartitionTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionTypeId::Mbr(type_byte) => write!(f, "{type_byte:#04x}"),
            PartitionTypeId::Gpt(guid) => write!(f, "{guid}"),
        }
    }
}

/// A filesystem volume decoded from a partition.
///
/// Plugins hand out unloaded volume objects; the caller invokes `load` with
/// the source and the partition's byte offset, then reads the accessors.
pub trait Volume {
    /// Load volume metadata from `source` starting at byte `offset`.
    fn load(&mut self, source: &ByteSource, offset: u64) -> Result<(), ProbeError>;

    /// Short filesystem kind tag, e.g. "ntfs" or "unknown".
    fn kind(&self) -> &'static str;

    /// Byte offset of the volume from the start of the source.
    fn offset(&self) -> u64;

    /// Volume size in bytes as reported by the volume's own metadata.
    fn size(&self) -> u64;

    /// One-line human-readable summary.
    fn description(&self) -> String;
}

/// Placeholder for a partition no plugin claimed.
///
/// Carrying the offset, raw type id and byte length keeps a scan of a
/// partially-understood disk complete instead of dropping entries.
#[derive(Debug, Clone, Serialize)]
pub struct UnknownVolume {
    pub offset: u64,
    pub type_id: PartitionTypeId,
    pub size: u64,
}

impl UnknownVolume {
    pub fn new(offset: u64, type_id: PartitionTypeId, size: u64) -> Self {
        Self {
            offset,
            type_id,
            size,
        }
    }
}

impl Volume for UnknownVolume {
    fn load(&mut self, _source: &ByteSource, offset: u64) -> Result<(), ProbeError> {
        self.offset = offset;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "unknown"
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn description(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for UnknownVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type: Unknown ({}), Offset: {:#X}, Size: {}",
            self.type_id,
            self.offset,
            format_size(self.size, BINARY)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_volume_reports_raw_type_id() {
        let volume = UnknownVolume::new(0x10000, PartitionTypeId::Mbr(0x42), 4 * 1024 * 1024);
        let text = volume.to_string();
        assert!(text.contains("0x42"), "{text}");
        assert!(text.contains("4 MiB"), "{text}");
        assert_eq!(volume.kind(), "unknown");
    }

    #[test]
    fn type_id_display_forms() {
        assert_eq!(PartitionTypeId::Mbr(0x07).to_string(), "0x07");
        let guid = Uuid::parse_str("EBD0A0A2-B9E5-4433-87C0-68B6B72699C7").unwrap();
        assert_eq!(
            PartitionTypeId::Gpt(guid).to_string(),
            "ebd0a0a2-b9e5-4433-87c0-68b6b72699c7"
        );
    }
}

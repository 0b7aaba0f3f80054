//! NTFS metadata decoding: boot sector, MFT table, records and attributes.

pub mod attributes;
pub mod boot_sector;
pub mod mft;
pub mod mft_entry;
pub mod volume;

use log::trace;
use uuid::{uuid, Uuid};

use diskprobe_core::{ByteSource, FilesystemPlugin, ProbeError, Volume};

pub use attributes::{AttrPayload, MftAttrHeader, MftAttribute};
pub use boot_sector::{BootSector, Bpb};
pub use mft::MftTable;
pub use mft_entry::MftEntry;
pub use volume::NtfsVolume;

use boot_sector::{NTFS_OEM_ID, OEM_ID_OFFSET};

/// MBR partition type byte for NTFS.
pub const NTFS_MBR_TYPE: u8 = 0x07;

/// GPT type GUID for Microsoft basic data partitions.
pub const MS_BASIC_DATA_GUID: Uuid = uuid!("EBD0A0A2-B9E5-4433-87C0-68B6B72699C7");

/// Detection plugin for NTFS partitions.
pub struct NtfsPlugin;

impl FilesystemPlugin for NtfsPlugin {
    fn name(&self) -> &'static str {
        "ntfs"
    }

    fn mbr_identifiers(&self) -> Vec<u8> {
        vec![NTFS_MBR_TYPE]
    }

    fn gpt_identifiers(&self) -> Vec<Uuid> {
        vec![MS_BASIC_DATA_GUID]
    }

    /// Byte-level check: the OEM id at partition offset 3 must read
    /// `NTFS    `. Basic data GUIDs cover FAT volumes too, so the type
    /// identifier alone is not trusted.
    fn detect(&self, source: &ByteSource, offset: u64) -> Result<bool, ProbeError> {
        let oem = source.read_at(offset + OEM_ID_OFFSET as u64, NTFS_OEM_ID.len())?;
        trace!("NTFS probe at {offset:#x}: OEM id {oem:02X?}");
        Ok(oem == NTFS_OEM_ID)
    }

    fn volume(&self) -> Box<dyn Volume> {
        Box::new(NtfsVolume::new())
    }
}

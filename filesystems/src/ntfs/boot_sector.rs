// NTFS boot sector and BIOS parameter block

use log::debug;
use serde::Serialize;

use diskprobe_core::{ByteCursor, ByteSource, ProbeError};

pub const NTFS_OEM_ID: &[u8; 8] = b"NTFS    ";
pub const OEM_ID_OFFSET: usize = 0x03;
pub const BOOTSECTOR_SIZE: usize = 512;

const BPB_OFFSET: usize = 0x0B;
const BPB_SIZE: usize = 25;
const EXTENDED_BPB_SIZE: usize = 48;

/// BIOS parameter block plus the NTFS extended BPB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bpb {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub media_descriptor: u8,
    pub sectors_per_track: u16,
    pub heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors: u64,
    pub mft_cluster: u64,
    pub mft_mirror_cluster: u64,
    /// Negative values encode the record size directly; see
    /// [`Bpb::mft_record_size`].
    pub clusters_per_mft: i8,
    pub clusters_per_index: i8,
    pub volume_serial: u64,
    pub checksum: u32,
}

impl Bpb {
    /// Decode from the 73-byte window starting at boot-sector offset 0x0B.
    fn decode(cursor: &ByteCursor) -> Self {
        Self {
            bytes_per_sector: cursor.get_u16_le(0),
            sectors_per_cluster: cursor.get_u8(2),
            reserved_sectors: cursor.get_u16_le(3),
            media_descriptor: cursor.get_u8(10),
            sectors_per_track: cursor.get_u16_le(13),
            heads: cursor.get_u16_le(15),
            hidden_sectors: cursor.get_u32_le(17),
            total_sectors: cursor.get_u64_le(29),
            mft_cluster: cursor.get_u64_le(37),
            mft_mirror_cluster: cursor.get_u64_le(45),
            clusters_per_mft: cursor.get_i8(53),
            clusters_per_index: cursor.get_i8(57),
            volume_serial: cursor.get_u64_le(61),
            checksum: cursor.get_u32_le(69),
        }
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        u32::from(self.bytes_per_sector) * u32::from(self.sectors_per_cluster)
    }

    /// MFT record size in bytes.
    ///
    /// A negative `clusters_per_mft` means the record size is
    /// 2^|clusters_per_mft| bytes; a positive value counts whole clusters.
    pub fn mft_record_size(&self) -> u32 {
        if self.clusters_per_mft < 0 {
            1u32 << (-i32::from(self.clusters_per_mft)) as u32
        } else {
            u32::from(self.clusters_per_mft as u8) * self.bytes_per_cluster()
        }
    }

    /// Index block size in bytes, same encoding as the MFT record size.
    pub fn index_block_size(&self) -> u32 {
        if self.clusters_per_index < 0 {
            1u32 << (-i32::from(self.clusters_per_index)) as u32
        } else {
            u32::from(self.clusters_per_index as u8) * self.bytes_per_cluster()
        }
    }

    /// Byte offset of the MFT from the start of the volume.
    pub fn mft_offset(&self) -> u64 {
        self.mft_cluster * u64::from(self.bytes_per_cluster())
    }

    /// Byte offset of the MFT mirror from the start of the volume.
    pub fn mft_mirror_offset(&self) -> u64 {
        self.mft_mirror_cluster * u64::from(self.bytes_per_cluster())
    }

    pub fn volume_size(&self) -> u64 {
        self.total_sectors * u64::from(self.bytes_per_sector)
    }

    pub fn total_clusters(&self) -> u64 {
        self.total_sectors / u64::from(self.sectors_per_cluster)
    }
}

/// The first 512 bytes of an NTFS partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootSector {
    pub oem_id: [u8; 8],
    pub bpb: Bpb,
}

impl BootSector {
    /// Read and decode the boot sector at byte `offset` of `source`.
    pub fn load(source: &ByteSource, offset: u64) -> Result<Self, ProbeError> {
        let cursor = ByteCursor::load(source, offset, BOOTSECTOR_SIZE)?;
        Self::decode(&cursor)
    }

    pub fn decode(cursor: &ByteCursor) -> Result<Self, ProbeError> {
        let mut oem_id = [0u8; 8];
        oem_id.copy_from_slice(cursor.get_bytes(OEM_ID_OFFSET, 8));
        if &oem_id != NTFS_OEM_ID {
            return Err(ProbeError::FormatError(format!(
                "boot sector OEM id is not NTFS: {oem_id:02X?}"
            )));
        }

        let bpb = Bpb::decode(&cursor.chunk(BPB_OFFSET, BPB_SIZE + EXTENDED_BPB_SIZE));
        debug!(
            "NTFS boot sector: {} bytes/sector, {} sectors/cluster, MFT at cluster {}",
            bpb.bytes_per_sector, bpb.sectors_per_cluster, bpb.mft_cluster
        );
        Ok(Self { oem_id, bpb })
    }
}
